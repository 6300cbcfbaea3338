use crate::calc::{self, Locale};
use crate::export;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::students::check_class_capacity;
use crate::ipc::helpers::{
    find_class, io_err, new_id, optional_bool, optional_str, required_str, respond, tenant_ctx,
    write_file_atomic,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::ranking;
use serde_json::{json, Value};
use std::path::PathBuf;

fn locale_param(req: &Request) -> Result<Locale, HandlerErr> {
    match optional_str(req, "locale") {
        None => Ok(Locale::default()),
        Some(s) => Locale::parse(&s).ok_or_else(|| {
            HandlerErr::new("bad_params", format!("unsupported locale: {}", s))
                .with_details(json!({ "supported": ["ar", "en"] }))
        }),
    }
}

fn results_open(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let classes = ctx.load_classes()?;
    let class = find_class(&classes, &class_id)?;
    let students = ctx.load_students()?;

    let ranked = ranking::rank_class(class, &students);
    let total_count = ranked.len();
    let rows = match optional_str(req, "search") {
        Some(q) => ranking::filter_by_name(ranked, &q),
        None => ranked,
    };
    Ok(json!({
        "class": class,
        "rows": rows,
        "totalCount": total_count,
    }))
}

fn results_export_xls(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let out_dir = PathBuf::from(required_str(req, "outDir")?);
    let locale = locale_param(req)?;
    let classes = ctx.load_classes()?;
    let class = find_class(&classes, &class_id)?;
    let students = ctx.load_students()?;

    let rows = ranking::rank_class(class, &students);
    let html = export::render_xls_html(&rows, class, locale);
    let file_name = export::xls_file_name(class).replace(['/', '\\'], "_");
    let path = out_dir.join(&file_name);
    let path_text = path.to_string_lossy().to_string();
    write_file_atomic(&path, html.as_bytes()).map_err(|e| io_err(&path_text, format!("{e:#}")))?;
    log::info!("exported {} rows of {} to {}", rows.len(), class.name, path_text);

    Ok(json!({
        "path": path_text,
        "fileName": file_name,
        "mimeType": export::XLS_MIME_TYPE,
        "rowCount": rows.len(),
    }))
}

fn results_export_csv(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let out_path = required_str(req, "outPath")?;
    let locale = locale_param(req)?;
    let classes = ctx.load_classes()?;
    let class = find_class(&classes, &class_id)?;
    let students = ctx.load_students()?;

    let rows = ranking::rank_class(class, &students);
    let text = export::encode_csv(&rows, class, locale);
    write_file_atomic(PathBuf::from(&out_path).as_path(), text.as_bytes())
        .map_err(|e| io_err(&out_path, format!("{e:#}")))?;
    log::info!("exported {} rows of {} to {}", rows.len(), class.name, out_path);

    Ok(json!({ "path": out_path, "rowCount": rows.len() }))
}

/// Bulk score import. `text` wins over `inPath` when both are given.
fn results_import_csv(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let strict = optional_bool(req, "strict");
    let text = match req.params.get("text").and_then(|v| v.as_str()) {
        Some(t) => t.to_string(),
        None => {
            let in_path = required_str(req, "inPath")?;
            std::fs::read_to_string(&in_path).map_err(|e| io_err(&in_path, e))?
        }
    };

    let classes = ctx.load_classes()?;
    let class = find_class(&classes, &class_id)?;
    let decoded = export::decode_csv(&text, class);

    if !decoded.is_aligned() {
        log::warn!(
            "csv import into {}: {} column mismatches",
            class.name,
            decoded.mismatches.len()
        );
        if strict {
            return Err(HandlerErr::new(
                "csv_column_mismatch",
                "csv columns do not match the class subjects",
            )
            .with_details(json!({ "mismatches": decoded.mismatches })));
        }
    }

    let mut students = ctx.load_students()?;
    check_class_capacity(&ctx.user()?, &students, class, decoded.students.len())?;

    let created: Vec<Student> = decoded
        .students
        .into_iter()
        .map(|imported| Student {
            id: new_id(),
            name: imported.name,
            class_id: imported.class_id,
            scores: imported.scores,
        })
        .collect();
    students.extend(created.iter().cloned());
    ctx.save_students(&students)?;
    log::info!("imported {} students into {}", created.len(), class.name);

    let views: Vec<_> = created.iter().map(|s| calc::compute_stats(s, class)).collect();
    Ok(json!({
        "created": views,
        "createdCount": views.len(),
        "mismatches": decoded.mismatches,
    }))
}

fn results_certificates(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let settings = ctx.load_settings()?;
    let classes = ctx.load_classes()?;
    let class = find_class(&classes, &class_id)?;
    let students = ctx.load_students()?;

    let certificates: Vec<Value> = ranking::rank_class(class, &students)
        .iter()
        .map(|r| {
            let subjects: Vec<Value> = class
                .subjects
                .iter()
                .map(|subj| {
                    json!({
                        "name": subj.name,
                        "score": calc::subject_score(&r.stats.student, &subj.id),
                        "maxScore": subj.max_score,
                    })
                })
                .collect();
            json!({
                "studentId": r.stats.student.id,
                "name": r.stats.student.name,
                "className": class.name,
                "rank": r.rank,
                "rankLabel": r.rank_label,
                "totalScore": r.stats.total_score,
                "maxPossibleScore": r.stats.max_possible_score,
                "percentage": r.stats.percentage,
                "gradeLabel": r.stats.grade_label,
                "gradeLabelArabic": r.stats.grade_label.arabic(),
                "subjects": subjects,
            })
        })
        .collect();

    Ok(json!({
        "settings": settings,
        "class": { "id": class.id, "name": class.name },
        "certificates": certificates,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "results.open" => results_open(state, req),
        "results.exportXls" => results_export_xls(state, req),
        "results.exportCsv" => results_export_csv(state, req),
        "results.importCsv" => results_import_csv(state, req),
        "results.certificates" => results_certificates(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

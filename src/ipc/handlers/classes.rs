use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{new_id, optional_str, required_str, respond, tenant_ctx};
use crate::ipc::types::{AppState, Request};
use crate::model::{SchoolClass, Subject};
use serde_json::{json, Value};

const DEFAULT_MAX_SCORE: f64 = 100.0;

fn max_score_param(req: &Request) -> Result<Option<f64>, HandlerErr> {
    let v = match req.params.get("maxScore") {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    match v.as_f64() {
        Some(n) if n.is_finite() && n > 0.0 => Ok(Some(n)),
        _ => Err(HandlerErr::new("bad_params", "maxScore must be a positive number")),
    }
}

fn class_index(classes: &[SchoolClass], class_id: &str) -> Result<usize, HandlerErr> {
    classes
        .iter()
        .position(|c| c.id == class_id)
        .ok_or_else(|| {
            HandlerErr::new("not_found", "class not found").with_details(json!({ "classId": class_id }))
        })
}

fn classes_list(state: &AppState) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let classes = ctx.load_classes()?;
    let students = ctx.load_students()?;
    let rows: Vec<Value> = classes
        .iter()
        .map(|c| {
            let student_count = students.iter().filter(|s| s.class_id == c.id).count();
            json!({
                "id": c.id,
                "name": c.name,
                "subjects": c.subjects,
                "subjectCount": c.subjects.len(),
                "studentCount": student_count,
            })
        })
        .collect();
    Ok(json!({ "classes": rows }))
}

fn classes_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let name = required_str(req, "name")?;
    let user = ctx.user()?;
    let mut classes = ctx.load_classes()?;
    if !user.may_hold_classes(classes.len() + 1) {
        return Err(HandlerErr::new(
            "limit_exceeded",
            format!("class limit reached ({})", user.limits.max_classes),
        )
        .with_details(json!({ "maxClasses": user.limits.max_classes })));
    }
    let class = SchoolClass {
        id: new_id(),
        name,
        subjects: Vec::new(),
    };
    classes.push(class.clone());
    ctx.save_classes(&classes)?;
    Ok(json!({ "class": class }))
}

fn classes_rename(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let name = required_str(req, "name")?;
    let mut classes = ctx.load_classes()?;
    let idx = class_index(&classes, &class_id)?;
    classes[idx].name = name;
    ctx.save_classes(&classes)?;
    Ok(json!({ "class": classes[idx] }))
}

/// Deleting a class also deletes its students.
fn classes_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let mut classes = ctx.load_classes()?;
    let idx = class_index(&classes, &class_id)?;
    let removed = classes.remove(idx);

    let mut students = ctx.load_students()?;
    let before = students.len();
    students.retain(|s| s.class_id != removed.id);
    let removed_students = before - students.len();

    ctx.replace_roster(&classes, &students, None)?;
    log::info!(
        "deleted class {} with {} students",
        removed.name,
        removed_students
    );
    Ok(json!({ "ok": true, "removedStudents": removed_students }))
}

fn subjects_add(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let name = required_str(req, "name")?;
    let max_score = max_score_param(req)?.unwrap_or(DEFAULT_MAX_SCORE);
    let mut classes = ctx.load_classes()?;
    let idx = class_index(&classes, &class_id)?;
    let subject = Subject {
        id: new_id(),
        name,
        max_score,
    };
    classes[idx].subjects.push(subject.clone());
    ctx.save_classes(&classes)?;
    Ok(json!({ "subject": subject }))
}

fn subject_position(class: &SchoolClass, subject_id: &str) -> Result<usize, HandlerErr> {
    class
        .subjects
        .iter()
        .position(|s| s.id == subject_id)
        .ok_or_else(|| {
            HandlerErr::new("not_found", "subject not found")
                .with_details(json!({ "classId": class.id, "subjectId": subject_id }))
        })
}

fn subjects_update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let name = optional_str(req, "name");
    let max_score = max_score_param(req)?;
    let mut classes = ctx.load_classes()?;
    let idx = class_index(&classes, &class_id)?;
    let pos = subject_position(&classes[idx], &subject_id)?;

    let subject = &mut classes[idx].subjects[pos];
    if let Some(name) = name {
        subject.name = name;
    }
    if let Some(max_score) = max_score {
        subject.max_score = max_score;
    }
    let subject = subject.clone();
    ctx.save_classes(&classes)?;
    Ok(json!({ "subject": subject }))
}

/// Scores already recorded for the subject stay on the students as stale
/// entries and stop counting.
fn subjects_remove(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let mut classes = ctx.load_classes()?;
    let idx = class_index(&classes, &class_id)?;
    let pos = subject_position(&classes[idx], &subject_id)?;
    classes[idx].subjects.remove(pos);
    ctx.save_classes(&classes)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "classes.list" => classes_list(state),
        "classes.create" => classes_create(state, req),
        "classes.rename" => classes_rename(state, req),
        "classes.delete" => classes_delete(state, req),
        "subjects.add" => subjects_add(state, req),
        "subjects.update" => subjects_update(state, req),
        "subjects.remove" => subjects_remove(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

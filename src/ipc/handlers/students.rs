use crate::auth::User;
use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{find_class, new_id, optional_str, required_str, respond, tenant_ctx};
use crate::ipc::types::{AppState, Request};
use crate::model::{self, SchoolClass, Student};
use serde_json::{json, Value};

fn student_view(student: &Student, classes: &[SchoolClass]) -> Result<Value, HandlerErr> {
    let class = classes.iter().find(|c| c.id == student.class_id);
    let mut v = match class {
        Some(c) => serde_json::to_value(calc::compute_stats(student, c)),
        None => serde_json::to_value(student),
    }
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    v["orphan"] = json!(class.is_none());
    Ok(v)
}

pub(crate) fn check_class_capacity(
    user: &User,
    students: &[Student],
    class: &SchoolClass,
    adding: usize,
) -> Result<(), HandlerErr> {
    let current = students.iter().filter(|s| s.class_id == class.id).count();
    if user.may_hold_students(current + adding) {
        return Ok(());
    }
    Err(HandlerErr::new(
        "limit_exceeded",
        format!(
            "class {} is full ({} students max)",
            class.name, user.limits.max_students_per_class
        ),
    )
    .with_details(json!({
        "classId": class.id,
        "maxStudentsPerClass": user.limits.max_students_per_class,
    })))
}

fn students_list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_filter = optional_str(req, "classId");
    let classes = ctx.load_classes()?;
    let students = ctx.load_students()?;

    let mut rows = Vec::new();
    let mut orphans = 0usize;
    for s in &students {
        if let Some(id) = class_filter.as_deref() {
            if s.class_id != id {
                continue;
            }
        }
        let row = student_view(s, &classes)?;
        if row["orphan"] == json!(true) {
            orphans += 1;
        }
        rows.push(row);
    }
    if orphans > 0 {
        log::warn!("{} students reference a missing class", orphans);
    }
    Ok(json!({ "students": rows, "orphanCount": orphans }))
}

fn students_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let class_id = required_str(req, "classId")?;
    let name = required_str(req, "name")?;
    let scores = model::scores_from_json(req.params.get("scores").unwrap_or(&Value::Null));

    let classes = ctx.load_classes()?;
    let class = find_class(&classes, &class_id)?;
    let mut students = ctx.load_students()?;
    check_class_capacity(&ctx.user()?, &students, class, 1)?;

    let student = Student {
        id: new_id(),
        name,
        class_id,
        scores,
    };
    students.push(student.clone());
    ctx.save_students(&students)?;
    Ok(json!({ "student": student_view(&student, &classes)? }))
}

/// A `scores` patch replaces the whole score map.
fn students_update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let student_id = required_str(req, "studentId")?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "missing params.patch"));
    };

    let classes = ctx.load_classes()?;
    let mut students = ctx.load_students()?;
    let Some(idx) = students.iter().position(|s| s.id == student_id) else {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    };

    let mut updated = students[idx].clone();
    if let Some(v) = patch.get("name") {
        let name = v.as_str().map(str::trim).unwrap_or("");
        if name.is_empty() {
            return Err(HandlerErr::new("bad_params", "name must be a non-empty string"));
        }
        updated.name = name.to_string();
    }
    if let Some(v) = patch.get("classId") {
        let Some(target) = v.as_str() else {
            return Err(HandlerErr::new("bad_params", "classId must be a string"));
        };
        if target != updated.class_id {
            let class = find_class(&classes, target)?;
            check_class_capacity(&ctx.user()?, &students, class, 1)?;
            updated.class_id = class.id.clone();
        }
    }
    if let Some(v) = patch.get("scores") {
        updated.scores = model::scores_from_json(v);
    }

    students[idx] = updated.clone();
    ctx.save_students(&students)?;
    Ok(json!({ "student": student_view(&updated, &classes)? }))
}

fn students_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let student_id = required_str(req, "studentId")?;
    let mut students = ctx.load_students()?;
    let before = students.len();
    students.retain(|s| s.id != student_id);
    if students.len() == before {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    }
    ctx.save_students(&students)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => students_list(state, req),
        "students.create" => students_create(state, req),
        "students.update" => students_update(state, req),
        "students.delete" => students_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

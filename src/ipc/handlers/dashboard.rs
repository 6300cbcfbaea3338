use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{find_class, optional_str, respond, tenant_ctx};
use crate::ipc::types::{AppState, Request};
use crate::stats;
use serde_json::{json, Value};

fn overview(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let classes = ctx.load_classes()?;
    let students = ctx.load_students()?;
    let school = stats::school_overview(&classes, &students);
    if school.orphan_count > 0 {
        log::warn!("dashboard skips {} orphaned students", school.orphan_count);
    }

    let class_stats = match optional_str(req, "classId") {
        Some(id) => Some(stats::class_stats(find_class(&classes, &id)?, &students)),
        None => None,
    };
    Ok(json!({ "school": school, "classStats": class_stats }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "dashboard.overview" => Some(respond(req, overview(state, req))),
        _ => None,
    }
}

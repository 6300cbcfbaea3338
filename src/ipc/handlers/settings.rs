use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{respond, tenant_ctx};
use crate::ipc::types::{AppState, Request};
use crate::model::SchoolSettings;
use serde_json::{json, Value};

fn settings_get(state: &AppState) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    Ok(json!({ "settings": ctx.load_settings()? }))
}

/// Shallow merge: keys present in `patch` overwrite, `logoUrl: null` clears
/// the logo.
fn settings_update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "missing params.patch"));
    };
    let current = ctx.load_settings()?;
    let mut merged = serde_json::to_value(&current)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    for (k, v) in patch {
        if !matches!(
            k.as_str(),
            "schoolName" | "principalName" | "academicYear" | "logoUrl"
        ) {
            return Err(HandlerErr::new("bad_params", format!("unknown setting: {}", k)));
        }
        merged[k.as_str()] = v.clone();
    }
    let settings: SchoolSettings = serde_json::from_value(merged).map_err(|e| {
        HandlerErr::new("bad_params", format!("invalid settings patch: {}", e))
    })?;
    ctx.save_settings(&settings)?;
    Ok(json!({ "settings": settings }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "settings.get" => settings_get(state),
        "settings.update" => settings_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

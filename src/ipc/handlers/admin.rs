use crate::auth::{self, NewUser};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{admin_conn, optional_str, optional_u32, required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn users_list(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = admin_conn(state)?;
    Ok(json!({ "users": auth::list_users(conn)? }))
}

fn users_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_conn(state)?;
    let new = NewUser {
        username: required_str(req, "username")?,
        password: required_str(req, "password")?,
        school_name: optional_str(req, "schoolName"),
        expiry_date: optional_str(req, "expiryDate"),
        max_classes: optional_u32(req, "maxClasses")?,
        max_students_per_class: optional_u32(req, "maxStudentsPerClass")?,
    };
    let user = auth::create_user(conn, new, auth::today())?;
    log::info!("created user {}", user.username);
    Ok(json!({ "user": user }))
}

fn users_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_conn(state)?;
    let username = required_str(req, "username")?;
    if state.session.as_ref().map(|s| s.username.as_str()) == Some(username.as_str()) {
        return Err(HandlerErr::new("forbidden", "cannot delete the logged-in account"));
    }
    let removed = auth::delete_user(conn, &username)?;
    log::info!("deleted user {} ({} snapshots)", username, removed);
    Ok(json!({ "ok": true, "removedSnapshots": removed }))
}

fn users_toggle_active(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_conn(state)?;
    let username = required_str(req, "username")?;
    if state.session.as_ref().map(|s| s.username.as_str()) == Some(username.as_str()) {
        return Err(HandlerErr::new("forbidden", "cannot disable the logged-in account"));
    }
    let user = auth::toggle_active(conn, &username)?;
    Ok(json!({ "user": user }))
}

fn users_extend(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_conn(state)?;
    let username = required_str(req, "username")?;
    let expiry = required_str(req, "expiryDate")?;
    let user = auth::extend_subscription(conn, &username, &expiry)?;
    Ok(json!({ "user": user }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "admin.users.list" => users_list(state),
        "admin.users.create" => users_create(state, req),
        "admin.users.delete" => users_delete(state, req),
        "admin.users.toggleActive" => users_toggle_active(state, req),
        "admin.users.extend" => users_extend(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

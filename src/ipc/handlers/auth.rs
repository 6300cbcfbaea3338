use crate::auth;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, required_str, respond, tenant_ctx};
use crate::ipc::types::{AppState, Request, Session};
use serde_json::{json, Value};

fn login(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let username = required_str(req, "username")?;
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let conn = db_conn(state)?;
    let user = match auth::login(conn, &username, password, auth::today()) {
        Ok(u) => u,
        Err(e) => {
            log::warn!("login rejected for {}: {}", username, e.code);
            return Err(e.into());
        }
    };
    state.session = Some(Session {
        username: user.username.clone(),
        role: user.role,
    });
    log::info!("logged in: {} ({})", user.username, user.role.as_str());
    Ok(json!({ "user": user }))
}

fn handle_logout(state: &mut AppState, req: &Request) -> Value {
    let was = state.session.take().map(|s| s.username);
    ok(&req.id, json!({ "loggedOut": was.is_some(), "username": was }))
}

/// `user` is null when nobody is logged in.
fn whoami(state: &AppState) -> Result<Value, HandlerErr> {
    if state.session.is_none() {
        return Ok(json!({ "user": null }));
    }
    let ctx = tenant_ctx(state)?;
    Ok(json!({ "user": ctx.user()? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "auth.login" => Some(respond(req, login(state, req))),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.whoami" => Some(respond(req, whoami(state))),
        _ => None,
    }
}

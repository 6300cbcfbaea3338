use crate::auth::{self, Role, User};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::model::{SchoolClass, SchoolSettings, Student};
use crate::store::{self, SqliteStore, TenantId};
use anyhow::Context;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    optional_str(req, key).ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

/// Trimmed string param; empty strings count as absent.
pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn optional_u32(req: &Request, key: &str) -> Result<Option<u32>, HandlerErr> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                HandlerErr::new("bad_params", format!("{} must be a non-negative integer", key))
            }),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> bool {
    req.params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn store_err(e: anyhow::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", format!("{e:#}"))
}

pub fn update_err(e: anyhow::Error) -> HandlerErr {
    HandlerErr::new("db_update_failed", format!("{e:#}"))
}

pub fn io_err(path: &str, e: impl std::fmt::Display) -> HandlerErr {
    HandlerErr::new("io_failed", e.to_string()).with_details(serde_json::json!({ "path": path }))
}

/// Connection plus the logged-in tenant. Every tenant-scoped handler goes
/// through this; the tenant never comes from request params.
pub struct TenantCtx<'a> {
    pub conn: &'a Connection,
    pub session: &'a Session,
    pub tenant: TenantId,
}

pub fn tenant_ctx(state: &AppState) -> Result<TenantCtx<'_>, HandlerErr> {
    let conn = db_conn(state)?;
    let session = state
        .session
        .as_ref()
        .ok_or_else(|| HandlerErr::new("not_authenticated", "log in first"))?;
    Ok(TenantCtx {
        conn,
        session,
        tenant: session.tenant(),
    })
}

pub fn admin_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    if ctx.session.role != Role::Admin {
        return Err(HandlerErr::new("forbidden", "admin account required"));
    }
    Ok(ctx.conn)
}

impl TenantCtx<'_> {
    pub fn store(&self) -> SqliteStore<'_> {
        SqliteStore::new(self.conn)
    }

    /// Current account row, so limit changes apply without a new login.
    pub fn user(&self) -> Result<User, HandlerErr> {
        auth::get_user(self.conn, &self.session.username)?
            .ok_or_else(|| HandlerErr::new("not_authenticated", "account no longer exists"))
    }

    pub fn load_classes(&self) -> Result<Vec<SchoolClass>, HandlerErr> {
        store::load_classes(&self.store(), &self.tenant).map_err(store_err)
    }

    pub fn save_classes(&self, classes: &[SchoolClass]) -> Result<(), HandlerErr> {
        store::save_classes(&self.store(), &self.tenant, classes).map_err(update_err)
    }

    pub fn load_students(&self) -> Result<Vec<Student>, HandlerErr> {
        store::load_students(&self.store(), &self.tenant).map_err(store_err)
    }

    pub fn save_students(&self, students: &[Student]) -> Result<(), HandlerErr> {
        store::save_students(&self.store(), &self.tenant, students).map_err(update_err)
    }

    pub fn load_settings(&self) -> Result<SchoolSettings, HandlerErr> {
        store::load_settings(&self.store(), &self.tenant).map_err(store_err)
    }

    pub fn save_settings(&self, settings: &SchoolSettings) -> Result<(), HandlerErr> {
        store::save_settings(&self.store(), &self.tenant, settings).map_err(update_err)
    }

    pub fn replace_roster(
        &self,
        classes: &[SchoolClass],
        students: &[Student],
        settings: Option<&SchoolSettings>,
    ) -> Result<(), HandlerErr> {
        store::replace_roster(self.conn, &self.tenant, classes, students, settings)
            .map_err(update_err)
    }
}

pub fn find_class<'c>(classes: &'c [SchoolClass], class_id: &str) -> Result<&'c SchoolClass, HandlerErr> {
    classes
        .iter()
        .find(|c| c.id == class_id)
        .ok_or_else(|| {
            HandlerErr::new("not_found", "class not found")
                .with_details(serde_json::json!({ "classId": class_id }))
        })
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Write through a sibling temp file and rename into place, so a failed
/// export never leaves a half-written file at `path`.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".partial");
    let tmp = std::path::PathBuf::from(tmp);
    let res = std::fs::write(&tmp, bytes)
        .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))
        .and_then(|_| {
            std::fs::rename(&tmp, path)
                .with_context(|| format!("failed to move output to {}", path.to_string_lossy()))
        });
    if res.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!("{}-{}", prefix, new_id()));
        std::fs::create_dir_all(&p).expect("create scratch dir");
        p
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = scratch_dir("gradebookd-write");
        let out = dir.join("nested").join("report.csv");
        write_file_atomic(&out, b"old").expect("first write");
        write_file_atomic(&out, b"new").expect("second write");
        assert_eq!(std::fs::read(&out).expect("read"), b"new");
        assert!(!dir.join("nested").join("report.csv.partial").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_move_leaves_no_partial_file() {
        let dir = scratch_dir("gradebookd-write");
        // a non-empty directory cannot be replaced by a file
        let out = dir.join("report.csv");
        std::fs::create_dir_all(out.join("keep")).expect("occupy target");
        assert!(write_file_atomic(&out, b"rows").is_err());
        assert!(!dir.join("report.csv.partial").exists());
        assert!(out.join("keep").is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

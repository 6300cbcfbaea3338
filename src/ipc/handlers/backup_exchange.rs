use crate::backup;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{admin_conn, io_err, required_str, respond, tenant_ctx, write_file_atomic};
use crate::ipc::types::{AppState, Request};
use crate::model::BackupDocument;
use serde_json::{json, Value};
use std::path::PathBuf;

fn backup_export(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let out_path = required_str(req, "outPath")?;
    let doc = BackupDocument {
        timestamp: chrono::Utc::now().to_rfc3339(),
        settings: Some(ctx.load_settings()?),
        classes: ctx.load_classes()?,
        students: ctx.load_students()?,
    };
    let text = serde_json::to_string_pretty(&doc)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    write_file_atomic(PathBuf::from(&out_path).as_path(), text.as_bytes())
        .map_err(|e| io_err(&out_path, format!("{e:#}")))?;
    log::info!("backup written for {} to {}", ctx.tenant.as_str(), out_path);

    Ok(json!({
        "path": out_path,
        "timestamp": doc.timestamp,
        "classCount": doc.classes.len(),
        "studentCount": doc.students.len(),
    }))
}

fn parse_backup(text: &str) -> Result<BackupDocument, HandlerErr> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| HandlerErr::new("bad_backup_json", format!("backup is not valid JSON: {}", e)))?;
    let missing: Vec<&str> = ["classes", "students"]
        .into_iter()
        .filter(|k| !raw.get(*k).map(|v| v.is_array()).unwrap_or(false))
        .collect();
    if !missing.is_empty() {
        return Err(HandlerErr::new("bad_backup", "backup is missing classes or students")
            .with_details(json!({ "missing": missing })));
    }
    serde_json::from_value(raw)
        .map_err(|e| HandlerErr::new("bad_backup", format!("backup has an unexpected shape: {}", e)))
}

/// Replace the tenant's classes and students (and settings, when the
/// document carries them) in one transaction.
fn backup_restore(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    let in_path = required_str(req, "inPath")?;
    let text = std::fs::read_to_string(&in_path).map_err(|e| io_err(&in_path, e))?;
    let doc = parse_backup(&text)?;

    ctx.replace_roster(&doc.classes, &doc.students, doc.settings.as_ref())?;
    log::info!(
        "restored backup from {} for {}: {} classes, {} students",
        doc.timestamp,
        ctx.tenant.as_str(),
        doc.classes.len(),
        doc.students.len()
    );

    Ok(json!({
        "ok": true,
        "timestamp": doc.timestamp,
        "classCount": doc.classes.len(),
        "studentCount": doc.students.len(),
        "settingsRestored": doc.settings.is_some(),
    }))
}

fn data_clear(state: &AppState) -> Result<Value, HandlerErr> {
    let ctx = tenant_ctx(state)?;
    ctx.replace_roster(&[], &[], None)?;
    log::info!("cleared classes and students for {}", ctx.tenant.as_str());
    Ok(json!({ "ok": true }))
}

fn workspace_export_bundle(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = admin_conn(state)?;
    let out_path = required_str(req, "outPath")?;
    let Some(workspace) = state.workspace.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");

    let summary = backup::export_workspace_bundle(workspace, PathBuf::from(&out_path).as_path())
        .map_err(|e| io_err(&out_path, format!("{e:#}")))?;
    log::info!("workspace bundle written to {}", out_path);
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "dbSha256": summary.db_sha256,
    }))
}

/// Replaces the whole workspace database, then reopens it. The session
/// ends because the accounts table was replaced too.
fn workspace_import_bundle(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    admin_conn(state)?;
    let in_path = required_str(req, "inPath")?;
    let Some(workspace) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Drop the open handle before the database file is replaced.
    state.db = None;
    let imported = backup::import_workspace_bundle(&src, &workspace);
    let reopened = open_workspace(state, &workspace);

    let summary = imported.map_err(|e| io_err(&in_path, format!("{e:#}")))?;
    reopened.map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    log::info!(
        "workspace restored from {} ({})",
        in_path,
        summary.bundle_format_detected
    );
    Ok(json!({
        "ok": true,
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.export" => backup_export(state, req),
        "backup.restore" => backup_restore(state, req),
        "data.clear" => data_clear(state),
        "workspace.exportBundle" => workspace_export_bundle(state, req),
        "workspace.importBundle" => workspace_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::backup;
use crate::ipc::helpers::{get_required_str, guard, require_college, respond, Access, HandlerErr, ADMIN};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

fn handle_backup_export_workspace_bundle(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let college = require_college(state)?;
    guard(college, params, Access::Roles(ADMIN))?;
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let summary = backup::export_data_bundle(&college.root, &out_path)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:?}")))?;
    info!(out = %out_path.display(), entries = summary.entry_count, "data bundle exported");
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
    }))
}

fn handle_backup_import_workspace_bundle(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let college = require_college(state)?;
    guard(college, params, Access::Roles(ADMIN))?;
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    let summary = backup::import_data_bundle(&in_path, &college.root)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:?}")))?;
    info!(from = %in_path.display(), restored = summary.restored.len(), "data bundle imported");
    Ok(json!({
        "ok": true,
        "bundleFormatDetected": summary.bundle_format_detected,
        "restored": summary.restored,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let res = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_backup_export_workspace_bundle(state, &req.params),
        "backup.importWorkspaceBundle" => handle_backup_import_workspace_bundle(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, res))
}

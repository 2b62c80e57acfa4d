use crate::auth::AuthSettings;
use crate::college::College;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "devTokens": state.config.allow_dev_tokens,
        }),
    )
}

/// Opens the data directory at `path`, seeding the admin collection when
/// configured to.
pub fn open_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<()> {
    let auth = AuthSettings {
        secret: state.config.jwt_secret.clone(),
        allow_dev_tokens: state.config.allow_dev_tokens,
    };
    let college = College::open(&path, state.config.uploads_dir.clone(), auth)?;
    if let Some(pw) = state.config.admin_password.as_deref() {
        // Must not prevent the workspace from opening.
        if let Err(e) = college.seed_admin(pw) {
            warn!("{e:?}");
        }
    }
    state.workspace = Some(path);
    state.college = Some(college);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, path.clone()) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => err(&req.id, "workspace_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "userId": state.user,
        }),
    )
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

    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.editor = None;
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

/// The identity collaborator: the frontend authenticates elsewhere and
/// tells the daemon who is acting. Null clears the user.
fn handle_session_set_user(state: &mut AppState, req: &Request) -> serde_json::Value {
    let v = req.params.get("userId");
    match v {
        None => err(&req.id, "bad_params", "missing userId", None),
        Some(v) if v.is_null() => {
            state.user = None;
            ok(&req.id, json!({ "userId": null }))
        }
        Some(v) => match v.as_str() {
            Some(s) if !s.is_empty() => {
                state.user = Some(s.to_string());
                ok(&req.id, json!({ "userId": s }))
            }
            _ => err(&req.id, "bad_params", "userId must be a string or null", None),
        },
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.setUser" => Some(handle_session_set_user(state, req)),
        _ => None,
    }
}

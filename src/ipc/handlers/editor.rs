use crate::editor::{CellPatch, EditorSession};
use crate::ipc::error::ok;
use crate::ipc::handlers::templates::{load_cells, save_template, template_exists};
use crate::ipc::helpers::{
    optional_str, required_i64, required_number, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, EditorState, Request};
use serde_json::json;

const METHODS: &[&str] = &[
    "editor.open",
    "editor.click",
    "editor.createCell",
    "editor.updateCell",
    "editor.deleteCell",
    "editor.splitHorizontal",
    "editor.splitVertical",
    "editor.addRow",
    "editor.addColumn",
    "editor.deleteRow",
    "editor.deleteColumn",
    "editor.multiSelect",
    "editor.serialFill",
    "editor.grid",
    "editor.save",
];

fn no_editor() -> HandlerErr {
    HandlerErr::new("no_editor", "open an editor session first")
}

/// Starts a session: from a stored template's cells, or blank.
fn editor_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let template_id = optional_str(params, "templateId");
    let session = match &template_id {
        Some(tid) => {
            let Some(conn) = state.db.as_ref() else {
                return Err(HandlerErr::new("no_workspace", "select a workspace first"));
            };
            if !template_exists(conn, tid)? {
                return Err(HandlerErr::not_found("template not found"));
            }
            EditorSession::from_cells(load_cells(conn, tid)?)
        }
        None => EditorSession::new(),
    };
    let snapshot = session.snapshot();
    state.editor = Some(EditorState {
        template_id,
        session,
    });
    Ok(json!({ "grid": snapshot }))
}

fn editor_save(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let department_id = optional_str(params, "departmentId");
    let year_id = optional_str(params, "yearId");
    let section_id = optional_str(params, "sectionId");
    let user = state.user.clone();
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let Some(editor) = state.editor.as_ref() else {
        return Err(no_editor());
    };
    let id = save_template(
        conn,
        user.as_deref(),
        editor.template_id.as_deref(),
        &name,
        department_id.as_deref(),
        year_id.as_deref(),
        section_id.as_deref(),
        editor.session.cells(),
    )?;
    let cell_count = editor.session.cells().len();
    if let Some(editor) = state.editor.as_mut() {
        editor.template_id = Some(id.clone());
    }
    Ok(json!({ "templateId": id, "cellCount": cell_count }))
}

fn dispatch(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let params = &req.params;
    match req.method.as_str() {
        "editor.open" => return editor_open(state, params),
        "editor.save" => return editor_save(state, params),
        _ => {}
    }

    let Some(editor) = state.editor.as_mut() else {
        return Err(no_editor());
    };
    let session = &mut editor.session;
    match req.method.as_str() {
        "editor.click" => {
            let row = required_i64(params, "row")?;
            let col = required_i64(params, "col")?;
            if row < 0 || col < 0 {
                return Err(HandlerErr::bad_params("row and col must be >= 0"));
            }
            let outcome = session.click(row, col);
            Ok(serde_json::to_value(&outcome)
                .map_err(|e| HandlerErr::new("internal", e.to_string()))?)
        }
        "editor.createCell" => {
            let created = session.create_cell()?;
            Ok(json!({ "created": created }))
        }
        "editor.updateCell" => {
            let Some(raw) = params.get("patch") else {
                return Err(HandlerErr::bad_params("missing patch"));
            };
            let patch: CellPatch = serde_json::from_value(raw.clone())
                .map_err(|e| HandlerErr::bad_params(format!("malformed patch: {}", e)))?;
            let updated = session.update_cell(&patch)?;
            Ok(json!({ "updated": updated }))
        }
        "editor.deleteCell" => {
            let row = required_i64(params, "row")?;
            let col = required_i64(params, "col")?;
            if !session.delete_cell(row, col) {
                return Err(HandlerErr::not_found("no cell anchored at coordinate"));
            }
            Ok(json!({ "deleted": true }))
        }
        "editor.splitHorizontal" => {
            session.split_horizontal()?;
            Ok(json!({ "grid": session.snapshot() }))
        }
        "editor.splitVertical" => {
            session.split_vertical()?;
            Ok(json!({ "grid": session.snapshot() }))
        }
        "editor.addRow" => {
            session.add_row();
            Ok(json!({ "maxRow": session.snapshot().max_row }))
        }
        "editor.addColumn" => {
            session.add_column();
            Ok(json!({ "maxCol": session.snapshot().max_col }))
        }
        "editor.deleteRow" => {
            let idx = required_i64(params, "index")?;
            session.delete_row(idx)?;
            Ok(json!({ "grid": session.snapshot() }))
        }
        "editor.deleteColumn" => {
            let idx = required_i64(params, "index")?;
            session.delete_column(idx)?;
            Ok(json!({ "grid": session.snapshot() }))
        }
        "editor.multiSelect" => {
            let Some(on) = params.get("enabled").and_then(|v| v.as_bool()) else {
                return Err(HandlerErr::bad_params("missing enabled"));
            };
            session.set_multi_select(on);
            Ok(json!({ "multiSelect": on }))
        }
        "editor.serialFill" => {
            let start_row = required_i64(params, "startRow")?;
            let end_row = required_i64(params, "endRow")?;
            let start_col = required_i64(params, "startCol")?;
            let end_col = required_i64(params, "endCol")?;
            if start_row < 0 || end_row < 0 || start_col < 0 || end_col < 0 {
                return Err(HandlerErr::bad_params("region coordinates must be >= 0"));
            }
            let start_number = required_number(params, "startNumber")?;
            let end_number = required_number(params, "endNumber")?;
            let created =
                session.serial_fill(start_row, end_row, start_col, end_col, start_number, end_number)?;
            Ok(json!({ "created": created }))
        }
        "editor.grid" => Ok(json!({ "grid": session.snapshot() })),
        _ => unreachable!(),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if !METHODS.contains(&req.method.as_str()) {
        return None;
    }
    Some(match dispatch(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

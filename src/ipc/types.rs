use std::path::PathBuf;

use crate::editor::EditorSession;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The editor session the daemon holds for the frontend, plus the template
/// it was opened from (None while authoring a brand-new template).
pub struct EditorState {
    pub template_id: Option<String>,
    pub session: EditorSession,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Acting user id; stamps created_by / marked_by on writes.
    pub user: Option<String>,
    pub editor: Option<EditorState>,
}

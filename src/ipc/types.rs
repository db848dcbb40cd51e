use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One line-delimited request frame: `{id, method, params}`.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Session state for one sidecar process. `db` is open exactly while a
/// workspace is selected; handlers refuse to run without it.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

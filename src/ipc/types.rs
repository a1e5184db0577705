use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::assistant::KnowledgeBase;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Tables answering `assistant.*`; replaced when a workspace ships its own.
    pub knowledge: KnowledgeBase,
}

impl AppState {
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self {
            workspace: None,
            db: None,
            knowledge,
        }
    }
}

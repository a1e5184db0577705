use crate::assistant::KnowledgeBase;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "knowledgeSource": state.knowledge.source().as_str(),
        }),
    )
}

/// Knowledge tables for a workspace: its `assistant.toml` when present and
/// valid, the built-in tables otherwise. The second value is a warning for
/// the caller when the override was rejected.
pub fn load_workspace_knowledge(
    workspace: &Path,
) -> anyhow::Result<(KnowledgeBase, Option<String>)> {
    match KnowledgeBase::from_workspace(workspace) {
        Ok(Some(kb)) => Ok((kb, None)),
        Ok(None) => Ok((KnowledgeBase::builtin()?, None)),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "ignoring workspace knowledge override");
            Ok((KnowledgeBase::builtin()?, Some(format!("{e:#}"))))
        }
    }
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    let conn = match db::open_db(&path) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    let (knowledge, warning) = match load_workspace_knowledge(&path) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "knowledge_load_failed", format!("{e:#}"), None),
    };

    // Best-effort: remember the last workspace; must not block opening.
    let _ = db::settings_set_json(
        &conn,
        "workspace.lastOpened",
        &json!({ "path": path.to_string_lossy() }),
    );

    info!(
        workspace = %path.to_string_lossy(),
        knowledge = knowledge.source().as_str(),
        "workspace selected"
    );
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    state.knowledge = knowledge;

    let mut result = json!({
        "workspacePath": path.to_string_lossy(),
        "knowledgeSource": state.knowledge.source().as_str(),
    });
    if let Some(w) = warning {
        result["knowledgeWarning"] = json!(w);
    }
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}

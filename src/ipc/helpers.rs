use rusqlite::Connection;

use crate::assistant::Role;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

/// Non-empty trimmed string param, or a `bad_params` response.
pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    match str_param(req, key).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

pub fn role_param(req: &Request) -> Result<Role, serde_json::Value> {
    let raw = required_str(req, "role")?;
    Role::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "role must be \"student\" or \"teacher\"",
            Some(serde_json::json!({ "role": raw })),
        )
    })
}

pub fn require_db<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

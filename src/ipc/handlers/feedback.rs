use crate::conversations;
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::{require_db, required_str, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let message_id = match required_str(req, "messageId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let conversation_id = match required_str(req, "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(is_positive) = req.params.get("isPositive").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing isPositive", None);
    };
    let comment = str_param(req, "comment")
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match conversations::record_feedback(conn, message_id, conversation_id, is_positive, comment) {
        Ok(id) => ok(&req.id, json!({ "feedbackId": id })),
        Err(e) => db_err(&req.id, "db_insert_failed", &e),
    }
}

fn handle_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match conversations::feedback_summary(conn, str_param(req, "conversationId")) {
        Ok(s) => ok(&req.id, json!(s)),
        Err(e) => db_err(&req.id, "db_query_failed", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feedback.submit" => Some(handle_submit(state, req)),
        "feedback.summary" => Some(handle_summary(state, req)),
        _ => None,
    }
}

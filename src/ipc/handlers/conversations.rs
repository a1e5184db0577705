use crate::conversations::{self, Speaker};
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::{require_db, required_str, role_param, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let role = match role_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = str_param(req, "title").unwrap_or("");
    let title = conversations::title_from(title);

    match conversations::create_conversation(conn, user_id, role, &title) {
        Ok(c) => ok(&req.id, json!({ "conversation": c })),
        Err(e) => db_err(&req.id, "db_insert_failed", &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "conversations": [] }));
    };
    match conversations::list_conversations(conn, str_param(req, "userId")) {
        Ok(rows) => ok(&req.id, json!({ "conversations": rows })),
        Err(e) => db_err(&req.id, "db_query_failed", &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match conversations::get_conversation(conn, id) {
        Ok(Some(c)) => ok(&req.id, json!({ "conversation": c })),
        Ok(None) => err(&req.id, "not_found", "conversation not found", None),
        Err(e) => db_err(&req.id, "db_query_failed", &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = str_param(req, "title").map(conversations::title_from);

    match conversations::update_conversation(conn, id, title.as_deref()) {
        Ok(true) => match conversations::get_conversation(conn, id) {
            Ok(Some(c)) => ok(&req.id, json!({ "conversation": c })),
            Ok(None) => err(&req.id, "not_found", "conversation not found", None),
            Err(e) => db_err(&req.id, "db_query_failed", &e),
        },
        Ok(false) => err(&req.id, "not_found", "conversation not found", None),
        Err(e) => db_err(&req.id, "db_update_failed", &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match conversations::delete_conversation(conn, id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "conversation not found", None),
        Err(e) => db_err(&req.id, "db_delete_failed", &e),
    }
}

fn handle_messages_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match conversations::get_messages_by_conversation_id(conn, id) {
        Ok(rows) => ok(&req.id, json!({ "messages": rows })),
        Err(e) => db_err(&req.id, "db_query_failed", &e),
    }
}

fn handle_messages_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(speaker) = str_param(req, "role").and_then(Speaker::parse) else {
        return err(
            &req.id,
            "bad_params",
            "role must be \"user\" or \"assistant\"",
            None,
        );
    };
    let Some(content) = str_param(req, "content") else {
        return err(&req.id, "bad_params", "missing content", None);
    };

    match conversations::get_conversation(conn, id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "conversation not found", None),
        Err(e) => return db_err(&req.id, "db_query_failed", &e),
    }
    match conversations::create_message(conn, id, speaker, content) {
        Ok(m) => ok(&req.id, json!({ "message": m })),
        Err(e) => db_err(&req.id, "db_insert_failed", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "conversations.create" => Some(handle_create(state, req)),
        "conversations.list" => Some(handle_list(state, req)),
        "conversations.get" => Some(handle_get(state, req)),
        "conversations.update" => Some(handle_update(state, req)),
        "conversations.delete" => Some(handle_delete(state, req)),
        "messages.list" => Some(handle_messages_list(state, req)),
        "messages.create" => Some(handle_messages_create(state, req)),
        _ => None,
    }
}

use crate::assistant::{self, Assistant};
use crate::conversations::{self, Speaker};
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::{require_db, role_param, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

/// `utterance` may be empty; only a missing or non-string value is rejected.
fn utterance_param(req: &Request) -> Result<&str, serde_json::Value> {
    str_param(req, "utterance").ok_or_else(|| err(&req.id, "bad_params", "missing utterance", None))
}

fn handle_respond(state: &mut AppState, req: &Request) -> serde_json::Value {
    let utterance = match utterance_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let role = match role_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let assistant = Assistant::new(&state.knowledge);
    let text = assistant.respond(utterance, role);
    ok(
        &req.id,
        json!({ "text": text, "intent": assistant.intent(utterance) }),
    )
}

/// Full chat turn: store the question, answer it, store the answer.
fn handle_ask(state: &mut AppState, req: &Request) -> serde_json::Value {
    let utterance = match utterance_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let role = match role_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = str_param(req, "userId")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous");

    // Both turns land together or not at all.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let (conversation_id, created) = match str_param(req, "conversationId") {
        Some(id) => match conversations::get_conversation(&tx, id) {
            Ok(Some(c)) => (c.id, false),
            Ok(None) => return err(&req.id, "not_found", "conversation not found", None),
            Err(e) => return db_err(&req.id, "db_query_failed", &e),
        },
        None => {
            let title = conversations::title_from(utterance);
            match conversations::create_conversation(&tx, user_id, role, &title) {
                Ok(c) => (c.id, true),
                Err(e) => return db_err(&req.id, "db_insert_failed", &e),
            }
        }
    };

    let user_msg = match conversations::create_message(&tx, &conversation_id, Speaker::User, utterance) {
        Ok(m) => m,
        Err(e) => return db_err(&req.id, "db_insert_failed", &e),
    };

    let assistant = Assistant::new(&state.knowledge);
    let text = assistant.respond(utterance, role);
    let intent = assistant.intent(utterance);

    let assistant_msg = match conversations::create_message(
        &tx,
        &conversation_id,
        Speaker::Assistant,
        &text,
    ) {
        Ok(m) => m,
        Err(e) => return db_err(&req.id, "db_insert_failed", &e),
    };
    if let Err(e) = conversations::update_conversation(&tx, &conversation_id, None) {
        return db_err(&req.id, "db_update_failed", &e);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    info!(
        conversation = %conversation_id,
        intent = ?intent,
        created,
        "assistant turn stored"
    );
    ok(
        &req.id,
        json!({
            "conversationId": conversation_id,
            "conversationCreated": created,
            "userMessageId": user_msg.id,
            "assistantMessageId": assistant_msg.id,
            "text": text,
            "intent": intent,
        }),
    )
}

fn handle_suggestions(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let role = match role_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({ "role": role, "suggestions": assistant::suggestions(role) }),
    )
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let role = match role_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match conversations::get_assistant_config_by_role(conn, role) {
        Ok(Some(cfg)) => ok(&req.id, json!(cfg)),
        Ok(None) => err(&req.id, "not_found", "assistant config not found", None),
        Err(e) => db_err(&req.id, "db_query_failed", &e),
    }
}

fn handle_config_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let role = match role_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let prompt = match str_param(req, "systemPrompt").map(str::trim) {
        Some(p) if !p.is_empty() => p,
        _ => return err(&req.id, "bad_params", "missing systemPrompt", None),
    };
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match conversations::set_assistant_config(conn, role, prompt) {
        Ok(cfg) => ok(&req.id, json!(cfg)),
        Err(e) => db_err(&req.id, "db_update_failed", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assistant.respond" => Some(handle_respond(state, req)),
        "assistant.ask" => Some(handle_ask(state, req)),
        "assistant.suggestions" => Some(handle_suggestions(state, req)),
        "assistant.config.get" => Some(handle_config_get(state, req)),
        "assistant.config.set" => Some(handle_config_set(state, req)),
        _ => None,
    }
}

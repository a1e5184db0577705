//! Conversation history, assistant prompts and feedback.
//!
//! Ids are v4 UUIDs; timestamps are RFC 3339 UTC strings.

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::assistant::Role;

const TITLE_MAX_CHARS: usize = 50;

fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Speaker::User),
            "assistant" => Some(Speaker::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    pub role: String,
    pub system_prompt: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub positive: i64,
    pub negative: i64,
}

/// Conversation title from the first user turn.
pub fn title_from(utterance: &str) -> String {
    let t = utterance.split_whitespace().collect::<Vec<_>>().join(" ");
    if t.is_empty() {
        return "Nueva conversación".to_string();
    }
    if t.chars().count() <= TITLE_MAX_CHARS {
        return t;
    }
    let cut: String = t.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", cut.trim_end())
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        title: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn create_conversation(
    conn: &Connection,
    user_id: &str,
    role: Role,
    title: &str,
) -> anyhow::Result<Conversation> {
    let id = Uuid::new_v4().to_string();
    let ts = now_ts();
    conn.execute(
        "INSERT INTO conversations(id, user_id, role, title, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, user_id, role.as_str(), title, &ts, &ts),
    )
    .context("insert conversation")?;
    Ok(Conversation {
        id,
        user_id: user_id.to_string(),
        role: role.as_str().to_string(),
        title: title.to_string(),
        created_at: ts.clone(),
        updated_at: ts,
    })
}

pub fn get_conversation(conn: &Connection, id: &str) -> anyhow::Result<Option<Conversation>> {
    let c = conn
        .query_row(
            "SELECT id, user_id, role, title, created_at, updated_at
             FROM conversations WHERE id = ?",
            [id],
            conversation_from_row,
        )
        .optional()?;
    Ok(c)
}

/// Most recently active first.
pub fn list_conversations(
    conn: &Connection,
    user_id: Option<&str>,
) -> anyhow::Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, role, title, created_at, updated_at
         FROM conversations
         WHERE (?1 IS NULL OR user_id = ?1)
         ORDER BY updated_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([user_id], conversation_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Bumps `updated_at`; renames when `title` is given. Returns false when the
/// conversation does not exist.
pub fn update_conversation(
    conn: &Connection,
    id: &str,
    title: Option<&str>,
) -> anyhow::Result<bool> {
    let changed = match title {
        Some(t) => conn.execute(
            "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?",
            (t, now_ts(), id),
        )?,
        None => conn.execute(
            "UPDATE conversations SET updated_at = ? WHERE id = ?",
            (now_ts(), id),
        )?,
    };
    Ok(changed > 0)
}

pub fn delete_conversation(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    // No ON DELETE CASCADE; children first.
    tx.execute("DELETE FROM feedback WHERE conversation_id = ?", [id])?;
    tx.execute("DELETE FROM messages WHERE conversation_id = ?", [id])?;
    let n = tx.execute("DELETE FROM conversations WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(n > 0)
}

pub fn create_message(
    conn: &Connection,
    conversation_id: &str,
    speaker: Speaker,
    content: &str,
) -> anyhow::Result<Message> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE id = ?",
            [conversation_id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(anyhow!("conversation not found: {}", conversation_id));
    }

    let id = Uuid::new_v4().to_string();
    let ts = now_ts();
    conn.execute(
        "INSERT INTO messages(id, conversation_id, role, content, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&id, conversation_id, speaker.as_str(), content, &ts),
    )
    .context("insert message")?;
    Ok(Message {
        id,
        conversation_id: conversation_id.to_string(),
        role: speaker.as_str().to_string(),
        content: content.to_string(),
        created_at: ts,
    })
}

/// Chronological; insertion order breaks timestamp ties.
pub fn get_messages_by_conversation_id(
    conn: &Connection,
    conversation_id: &str,
) -> anyhow::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, content, created_at
         FROM messages
         WHERE conversation_id = ?
         ORDER BY created_at, rowid",
    )?;
    let rows = stmt
        .query_map([conversation_id], |row| {
            Ok(Message {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_assistant_config_by_role(
    conn: &Connection,
    role: Role,
) -> anyhow::Result<Option<AssistantConfig>> {
    let cfg = conn
        .query_row(
            "SELECT role, system_prompt, updated_at FROM assistant_configs WHERE role = ?",
            [role.as_str()],
            |row| {
                Ok(AssistantConfig {
                    role: row.get(0)?,
                    system_prompt: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(cfg)
}

pub fn set_assistant_config(
    conn: &Connection,
    role: Role,
    system_prompt: &str,
) -> anyhow::Result<AssistantConfig> {
    let ts = now_ts();
    conn.execute(
        "INSERT INTO assistant_configs(role, system_prompt, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(role) DO UPDATE SET system_prompt = excluded.system_prompt, updated_at = excluded.updated_at",
        (role.as_str(), system_prompt, &ts),
    )?;
    Ok(AssistantConfig {
        role: role.as_str().to_string(),
        system_prompt: system_prompt.to_string(),
        updated_at: Some(ts),
    })
}

/// Store a thumbs up/down. Callers only get the id back.
pub fn record_feedback(
    conn: &Connection,
    message_id: &str,
    conversation_id: &str,
    is_positive: bool,
    comment: Option<&str>,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO feedback(id, message_id, conversation_id, is_positive, created_at, comment)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            message_id,
            conversation_id,
            is_positive as i64,
            now_ts(),
            comment,
        ),
    )
    .context("insert feedback")?;
    Ok(id)
}

pub fn feedback_summary(
    conn: &Connection,
    conversation_id: Option<&str>,
) -> anyhow::Result<FeedbackSummary> {
    let (positive, negative): (i64, i64) = conn.query_row(
        "SELECT
           COALESCE(SUM(CASE WHEN is_positive = 1 THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN is_positive = 0 THEN 1 ELSE 0 END), 0)
         FROM feedback
         WHERE (?1 IS NULL OR conversation_id = ?1)",
        [conversation_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(FeedbackSummary { positive, negative })
}

use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "diclass.sqlite3";

pub const DEFAULT_STUDENT_PROMPT: &str = "Eres el asistente de DiClass para estudiantes. Explica paso a paso, con lenguaje claro, y anima al estudiante a razonar por sí mismo.";
pub const DEFAULT_TEACHER_PROMPT: &str = "Eres el asistente de DiClass para profesores. Responde de forma concisa y ayuda con la gestión de clases, tareas y calificaciones.";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversations(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages(
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(conversation_id) REFERENCES conversations(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assistant_configs(
            role TEXT PRIMARY KEY,
            system_prompt TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    seed_assistant_configs(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback(
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            is_positive INTEGER NOT NULL,
            comment TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feedback_conversation ON feedback(conversation_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn seed_assistant_configs(conn: &Connection) -> anyhow::Result<()> {
    // INSERT OR IGNORE keeps prompts the user already edited.
    conn.execute(
        "INSERT OR IGNORE INTO assistant_configs(role, system_prompt, updated_at) VALUES('student', ?, NULL)",
        [DEFAULT_STUDENT_PROMPT],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO assistant_configs(role, system_prompt, updated_at) VALUES('teacher', ?, NULL)",
        [DEFAULT_TEACHER_PROMPT],
    )?;
    Ok(())
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_workspace(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("diclass-db-{}-{}", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn open_is_idempotent_and_seeds_prompts() {
        let ws = temp_workspace("open");
        let conn = open_db(&ws).expect("open");
        conn.execute(
            "UPDATE assistant_configs SET system_prompt = 'custom' WHERE role = 'teacher'",
            [],
        )
        .expect("edit prompt");
        drop(conn);

        let conn = open_db(&ws).expect("reopen");
        let teacher: String = conn
            .query_row(
                "SELECT system_prompt FROM assistant_configs WHERE role = 'teacher'",
                [],
                |r| r.get(0),
            )
            .expect("teacher prompt");
        assert_eq!(teacher, "custom");
        drop(conn);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn settings_upsert_overwrites() {
        let ws = temp_workspace("settings");
        let conn = open_db(&ws).expect("open");
        settings_set_json(&conn, "ui.lastRole", &json!("student")).expect("set");
        settings_set_json(&conn, "ui.lastRole", &json!("teacher")).expect("set again");
        let rows: Vec<String> = conn
            .prepare("SELECT value_json FROM settings WHERE key = 'ui.lastRole'")
            .expect("prepare")
            .query_map([], |r| r.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(rows, vec!["\"teacher\"".to_string()]);
        drop(conn);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn feedback_accepts_a_comment() {
        let ws = temp_workspace("feedback");
        let conn = open_db(&ws).expect("open");
        conn.execute(
            "INSERT INTO feedback(id, message_id, conversation_id, is_positive, comment, created_at)
             VALUES('f1', 'm1', 'c1', 0, 'poco claro', '2026-01-01T00:00:00Z')",
            [],
        )
        .expect("insert feedback");
        drop(conn);
        let _ = std::fs::remove_dir_all(ws);
    }
}

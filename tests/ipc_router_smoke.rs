use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_diclassd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn diclassd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_line(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_line(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("diclass-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert_eq!(health["result"]["knowledgeSource"], json!("builtin"));
    assert!(health["result"]["workspacePath"].is_null());

    let selected = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], json!(true));
    assert!(workspace.join("diclass.sqlite3").is_file());

    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "assistant.respond",
        json!({ "utterance": "hola", "role": "student" }),
    );
    let asked = request(
        &mut stdin,
        &mut reader,
        "4",
        "assistant.ask",
        json!({ "utterance": "cuánto es 2 + 2", "role": "student", "userId": "u1" }),
    );
    let conversation_id = asked["result"]["conversationId"]
        .as_str()
        .expect("conversationId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "assistant.suggestions",
        json!({ "role": "teacher" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "assistant.config.get",
        json!({ "role": "teacher" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "conversations.list",
        json!({ "userId": "u1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "messages.list",
        json!({ "conversationId": conversation_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "feedback.summary",
        json!({}),
    );
    let exported = request(
        &mut stdin,
        &mut reader,
        "10",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(exported["ok"], json!(true));

    let unknown = {
        writeln!(stdin, "{}", json!({ "id": "11", "method": "grades.compute", "params": {} }))
            .expect("write");
        stdin.flush().expect("flush");
        read_line(&mut reader)
    };
    assert_eq!(unknown["id"], json!("11"));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_lines_get_bad_json_and_blank_lines_are_skipped() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin).expect("blank");
    writeln!(stdin, "   ").expect("spaces");
    writeln!(stdin, "{{not json").expect("garbage");
    stdin.flush().expect("flush");

    let bad = read_line(&mut reader);
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(error_code(&bad), Some("bad_json"));
    assert!(bad.get("id").is_none());

    // The loop keeps serving after a bad line.
    let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(health["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn storage_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, method) in [
        "assistant.ask",
        "assistant.config.get",
        "conversations.create",
        "messages.list",
        "feedback.summary",
        "backup.exportWorkspaceBundle",
    ]
    .iter()
    .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("nw-{i}"),
            method,
            json!({
                "utterance": "hola",
                "role": "student",
                "userId": "u1",
                "conversationId": "c1",
                "outPath": "/tmp/never.zip",
            }),
        );
        assert_eq!(resp["ok"], json!(false), "{method}");
        assert_eq!(error_code(&resp), Some("no_workspace"), "{method}");
    }

    // Listing without a workspace is just empty.
    let listed = request(&mut stdin, &mut reader, "nw-list", "conversations.list", json!({}));
    assert_eq!(listed["result"]["conversations"], json!([]));

    drop(stdin);
    let _ = child.wait();
}

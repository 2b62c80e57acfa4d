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

fn spawn_sidecar(envs: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_colleged");
    let mut cmd = Command::new(exe);
    cmd.env_remove("COLLEGED_DATA_DIR")
        .env_remove("COLLEGED_UPLOADS_DIR")
        .env_remove("COLLEGED_DEV_TOKENS")
        .env("COLLEGED_JWT_SECRET", "flow-test-secret")
        .env("COLLEGED_ADMIN_PASSWORD", "admin-pw");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn colleged");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
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

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn student_login_attendance_scenario() {
    let workspace = temp_dir("colleged-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let admin = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "username": "admin", "password": "admin-pw" }),
    );
    let admin_token = admin["token"].as_str().expect("admin token").to_string();
    assert_eq!(admin["devToken"], json!(false));
    assert_eq!(admin["user"]["role"], json!("admin"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "token": admin_token,
            "record": {
                "name": "A",
                "rollNumber": "R1",
                "class": "X",
                "branch": "CS",
                "password": "p"
            }
        }),
    );
    let student_id = created["item"]["_id"].as_str().expect("_id").to_string();
    assert!(student_id.starts_with("student_"));
    assert!(student_id["student_".len()..].parse::<i64>().is_ok());

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "username": "R1", "password": "p" }),
    );
    let student_token = login["token"].as_str().expect("student token").to_string();
    assert_eq!(login["user"]["id"], json!(student_id));
    assert!(login["user"].get("password").is_none());

    let me = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.me",
        json!({ "token": student_token }),
    );
    assert_eq!(me["user"]["role"], json!("student"));
    assert_eq!(me["user"]["rollNumber"], json!("R1"));

    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.record",
        json!({
            "token": admin_token,
            "studentId": student_id,
            "subject": "Math",
            "present": true,
            "date": "2024-01-10"
        }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.student",
        json!({ "token": student_token, "studentId": student_id }),
    );
    assert_eq!(summary["summary"]["totalClasses"], json!(1));
    assert_eq!(summary["summary"]["presentClasses"], json!(1));
    assert_eq!(summary["summary"]["attendancePercentage"], json!(100));
    assert_eq!(summary["summary"]["records"][0]["date"], json!("2024-01-10"));
    assert_eq!(summary["summary"]["records"][0]["status"], json!("present"));

    let ledger: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.join("attendance.json")).expect("read ledger"),
    )
    .expect("ledger json");
    assert_eq!(ledger.as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rejected_credentials_and_roles() {
    let workspace = temp_dir("colleged-flow-reject");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[]);
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "username": "admin", "password": "nope" }),
    );
    assert_eq!(error_code(&bad), Some("unauthorized"));

    let no_token = request(&mut stdin, &mut reader, "3", "students.list", json!({}));
    assert_eq!(error_code(&no_token), Some("unauthorized"));

    let garbage = request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.me",
        json!({ "token": "Bearer abc.def.ghi" }),
    );
    assert_eq!(error_code(&garbage), Some("unauthorized"));

    let admin = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.login",
        json!({ "username": "ADMIN", "password": "admin-pw" }),
    );
    let admin_token = admin["token"].as_str().expect("token").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "token": admin_token,
            "record": { "name": "B", "rollNumber": "R2", "class": "X" }
        }),
    );

    // No stored password: the compatibility default applies.
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        json!({ "username": "r2", "password": "password123" }),
    );
    let student_token = student["token"].as_str().expect("token").to_string();
    let forbidden = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "token": student_token }),
    );
    assert_eq!(error_code(&forbidden), Some("forbidden"));

    let student_id = student["user"]["id"].as_str().expect("student id").to_string();
    let dev = request(
        &mut stdin,
        &mut reader,
        "9",
        "auth.me",
        json!({ "token": format!("dev-token-{}", student_id) }),
    );
    assert_eq!(error_code(&dev), Some("unauthorized"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn development_tokens_when_enabled() {
    let workspace = temp_dir("colleged-flow-dev");
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&[("COLLEGED_DEV_TOKENS", "true")]);
    let health = request_ok(&mut stdin, &mut reader, "0", "health", json!({}));
    assert_eq!(health["devTokens"], json!(true));
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let admin = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "username": "admin", "password": "admin-pw" }),
    );
    let admin_id = admin["user"]["id"].as_str().expect("admin id").to_string();

    let me = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.me",
        json!({ "token": format!("dev-token-{}", admin_id) }),
    );
    assert_eq!(me["user"]["id"], json!(admin_id));

    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "auth.me",
        json!({ "token": "dev-token-admin_1" }),
    );
    assert_eq!(error_code(&unknown), Some("unauthorized"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

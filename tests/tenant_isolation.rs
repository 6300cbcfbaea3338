use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

const ADMIN_USER: &str = "admin";
const ADMIN_PASSWORD: &str = "admin-pass";

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
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .env("GRADEBOOKD_ADMIN_USER", ADMIN_USER)
        .env("GRADEBOOKD_ADMIN_PASSWORD", ADMIN_PASSWORD)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn login_ok(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, username: &str, password: &str) {
    request_ok(
        stdin,
        reader,
        "login",
        "auth.login",
        json!({ "username": username, "password": password }),
    );
}

#[test]
fn one_tenant_never_sees_another_tenants_data() {
    let workspace = temp_dir("gradebook-tenant-isolation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    login_ok(&mut stdin, &mut reader, ADMIN_USER, ADMIN_PASSWORD);
    for (i, name) in ["north", "south"].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("u{}", i),
            "admin.users.create",
            json!({ "username": name, "password": format!("{}-pass", name) }),
        );
    }
    request_ok(&mut stdin, &mut reader, "1", "auth.logout", json!({}));

    login_ok(&mut stdin, &mut reader, "north", "north-pass");
    let class = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "N1" }));
    let north_class = class["class"]["id"].as_str().expect("class id").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": north_class, "name": "Rami", "scores": {} }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "settings.update",
        json!({ "patch": { "schoolName": "North School" } }),
    );
    request_ok(&mut stdin, &mut reader, "5", "auth.logout", json!({}));

    login_ok(&mut stdin, &mut reader, "south", "south-pass");
    let classes = request_ok(&mut stdin, &mut reader, "6", "classes.list", json!({}));
    assert_eq!(classes["classes"].as_array().map(|v| v.len()), Some(0));
    let students = request_ok(&mut stdin, &mut reader, "7", "students.list", json!({}));
    assert_eq!(students["students"].as_array().map(|v| v.len()), Some(0));
    let settings = request_ok(&mut stdin, &mut reader, "8", "settings.get", json!({}));
    assert_eq!(settings["settings"]["schoolName"].as_str(), Some(""));

    let foreign = request(
        &mut stdin,
        &mut reader,
        "9",
        "results.open",
        json!({ "classId": north_class }),
    );
    assert_eq!(error_code(&foreign), "not_found");
    let foreign_write = request(
        &mut stdin,
        &mut reader,
        "10",
        "students.create",
        json!({ "classId": north_class, "name": "Intruder", "scores": {} }),
    );
    assert_eq!(error_code(&foreign_write), "not_found");
    request_ok(&mut stdin, &mut reader, "11", "data.clear", json!({}));
    request_ok(&mut stdin, &mut reader, "12", "auth.logout", json!({}));

    login_ok(&mut stdin, &mut reader, "north", "north-pass");
    let classes = request_ok(&mut stdin, &mut reader, "13", "classes.list", json!({}));
    let rows = classes["classes"].as_array().expect("classes");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["studentCount"].as_u64(), Some(1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn data_persists_across_sidecar_restarts() {
    let workspace = temp_dir("gradebook-tenant-restart");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        request_ok(
            &mut stdin,
            &mut reader,
            "ws",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        login_ok(&mut stdin, &mut reader, ADMIN_USER, ADMIN_PASSWORD);
        request_ok(&mut stdin, &mut reader, "1", "classes.create", json!({ "name": "Kept" }));
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let anon = request(&mut stdin, &mut reader, "1", "classes.list", json!({}));
    assert_eq!(error_code(&anon), "not_authenticated");
    login_ok(&mut stdin, &mut reader, ADMIN_USER, ADMIN_PASSWORD);
    let classes = request_ok(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    assert_eq!(classes["classes"][0]["name"].as_str(), Some("Kept"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

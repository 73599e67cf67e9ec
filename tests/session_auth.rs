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

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u32,
}

impl Sidecar {
    fn start(workspace: &PathBuf) -> Self {
        let exe = env!("CARGO_BIN_EXE_campusd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn campusd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        let mut s = Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        };
        let resp = s.call(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        assert_eq!(resp["ok"], true, "workspace.select failed: {}", resp);
        s
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let payload = json!({
            "id": self.next_id.to_string(),
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        serde_json::from_str(line.trim()).expect("parse response json")
    }

    fn finish(mut self, workspace: PathBuf) {
        let _ = self.stdin.flush();
        drop(self.stdin);
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(workspace);
    }
}

fn error_code(resp: &serde_json::Value) -> &str {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn login_lifecycle_and_credential_checks() {
    let workspace = temp_dir("campusd-auth");
    let mut s = Sidecar::start(&workspace);

    // Fresh workspace: nobody is logged in and no bypass exists.
    let resp = s.call("session.current", json!({}));
    assert_eq!(resp["result"]["loggedIn"], false);
    let resp = s.call(
        "session.login",
        json!({ "email": "admin@example.test", "password": "anything" }),
    );
    assert_eq!(error_code(&resp), "bad_credentials");

    // Bootstrap user, then log in with the wrong and right password.
    let resp = s.call(
        "users.create",
        json!({
            "email": "Admin@Example.Test",
            "password": "correct horse",
            "displayName": "Head Admin"
        }),
    );
    assert_eq!(resp["ok"], true, "users.create failed: {}", resp);

    let resp = s.call(
        "session.login",
        json!({ "email": "admin@example.test", "password": "wrong horse" }),
    );
    assert_eq!(error_code(&resp), "bad_credentials");

    // Email comparison is case-insensitive via lowercase normalization.
    let resp = s.call(
        "session.login",
        json!({ "email": "ADMIN@example.test", "password": "correct horse" }),
    );
    assert_eq!(resp["ok"], true, "login failed: {}", resp);
    assert!(resp["result"]["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(resp["result"]["displayName"], "Head Admin");

    let resp = s.call("session.current", json!({}));
    assert_eq!(resp["result"]["loggedIn"], true);
    assert_eq!(resp["result"]["email"], "admin@example.test");

    // A second operator can only be added while logged in.
    let resp = s.call(
        "users.create",
        json!({
            "email": "second@example.test",
            "password": "pw2",
            "displayName": "Second"
        }),
    );
    assert_eq!(resp["ok"], true);

    let resp = s.call("session.logout", json!({}));
    assert_eq!(resp["ok"], true);
    let resp = s.call(
        "users.create",
        json!({
            "email": "third@example.test",
            "password": "pw3",
            "displayName": "Third"
        }),
    );
    assert_eq!(error_code(&resp), "no_session");

    // Duplicate email is a storage-level failure, not a silent overwrite.
    let resp = s.call(
        "session.login",
        json!({ "email": "second@example.test", "password": "pw2" }),
    );
    assert_eq!(resp["ok"], true);
    let resp = s.call(
        "users.create",
        json!({
            "email": "admin@example.test",
            "password": "pw",
            "displayName": "Dupe"
        }),
    );
    assert_eq!(error_code(&resp), "db_insert_failed");

    s.finish(workspace);
}

#[test]
fn switching_workspaces_drops_the_session() {
    let workspace_a = temp_dir("campusd-auth-a");
    let workspace_b = temp_dir("campusd-auth-b");
    let mut s = Sidecar::start(&workspace_a);

    let resp = s.call(
        "users.create",
        json!({ "email": "a@example.test", "password": "pw", "displayName": "A" }),
    );
    assert_eq!(resp["ok"], true);
    let resp = s.call(
        "session.login",
        json!({ "email": "a@example.test", "password": "pw" }),
    );
    assert_eq!(resp["ok"], true);

    let resp = s.call(
        "workspace.select",
        json!({ "path": workspace_b.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], true);
    let resp = s.call("session.current", json!({}));
    assert_eq!(resp["result"]["loggedIn"], false);

    let _ = std::fs::remove_dir_all(&workspace_b);
    s.finish(workspace_a);
}

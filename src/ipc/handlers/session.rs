use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_session, required_str};
use crate::ipc::types::{AppState, Request, Session};
use rusqlite::OptionalExtension;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    // The first user bootstraps an empty workspace; after that, adding
    // operators requires being logged in.
    let user_count: i64 = {
        let conn = match db_conn(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        match conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };
    if user_count > 0 {
        if let Err(e) = require_session(state, req) {
            return e;
        }
    }

    let email = match required_str(req, "email") {
        Ok(v) => v.to_lowercase(),
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display_name = match required_str(req, "displayName") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = Uuid::new_v4().to_string();
    let salt = Uuid::new_v4().to_string();
    let hash = password_digest(&salt, &password);
    let created_at = chrono::Utc::now().to_rfc3339();

    if let Err(e) = conn.execute(
        "INSERT INTO users(id, email, display_name, pass_salt, pass_hash, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&user_id, &email, &display_name, &salt, &hash, &created_at),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    ok(&req.id, json!({ "userId": user_id, "email": email }))
}

fn handle_session_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = match required_str(req, "email") {
        Ok(v) => v.to_lowercase(),
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let row = {
        let conn = match db_conn(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        match conn
            .query_row(
                "SELECT id, display_name, pass_salt, pass_hash FROM users WHERE email = ?",
                [&email],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    // Same error for unknown email and wrong password.
    let Some((user_id, display_name, salt, stored_hash)) = row else {
        return err(&req.id, "bad_credentials", "invalid email or password", None);
    };
    if password_digest(&salt, &password) != stored_hash {
        return err(&req.id, "bad_credentials", "invalid email or password", None);
    }

    let token = Uuid::new_v4().to_string();
    state.session = Some(Session {
        token: token.clone(),
        user_id,
        email,
        display_name: display_name.clone(),
    });

    ok(
        &req.id,
        json!({ "token": token, "displayName": display_name }),
    )
}

fn handle_session_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = None;
    ok(&req.id, json!({ "loggedIn": false }))
}

fn handle_session_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.as_ref() {
        Some(s) => ok(
            &req.id,
            json!({
                "loggedIn": true,
                "token": s.token,
                "userId": s.user_id,
                "email": s.email,
                "displayName": s.display_name
            }),
        ),
        None => ok(&req.id, json!({ "loggedIn": false })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(handle_users_create(state, req)),
        "session.login" => Some(handle_session_login(state, req)),
        "session.logout" => Some(handle_session_logout(state, req)),
        "session.current" => Some(handle_session_current(state, req)),
        _ => None,
    }
}

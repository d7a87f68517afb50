use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_ts, optional_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const KNOWN_ROLES: &[&str] = &["admin", "staff"];

fn validate_role(role: &str) -> Result<(), HandlerErr> {
    if !KNOWN_ROLES.contains(&role) {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("unknown role '{}'", role),
            details: Some(json!({ "known": KNOWN_ROLES })),
        });
    }
    Ok(())
}

fn roles_grant(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = required_str(params, "userId")?;
    let role = required_str(params, "role")?;
    validate_role(&role)?;
    // Granting an already-held role is a no-op, not an error.
    let inserted = conn
        .execute(
            "INSERT INTO user_roles(id, user_id, role, created_at) VALUES(?, ?, ?, ?)
             ON CONFLICT(user_id, role) DO NOTHING",
            (Uuid::new_v4().to_string(), &user_id, &role, now_ts()),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "user_roles" })),
        })?;
    Ok(json!({ "granted": inserted > 0 }))
}

fn roles_revoke(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = required_str(params, "userId")?;
    let role = required_str(params, "role")?;
    validate_role(&role)?;
    let removed = conn
        .execute(
            "DELETE FROM user_roles WHERE user_id = ? AND role = ?",
            [&user_id, &role],
        )
        .map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "user_roles" })),
        })?;
    Ok(json!({ "revoked": removed > 0 }))
}

fn roles_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = optional_str(params, "userId");
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "userId": r.get::<_, String>(0)?,
            "role": r.get::<_, String>(1)?,
        }))
    };
    let rows = match user_id {
        Some(uid) => {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, role FROM user_roles
                     WHERE user_id = ? ORDER BY role",
                )
                .map_err(HandlerErr::db_query)?;
            stmt.query_map([&uid], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT user_id, role FROM user_roles ORDER BY user_id, role")
                .map_err(HandlerErr::db_query)?;
            stmt.query_map([], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?
        }
    };
    Ok(json!({ "roles": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "roles.grant" | "roles.revoke" | "roles.list"
    );
    if !needs_db {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(
            &req.id,
            "no_workspace",
            "select a workspace first",
            None,
        ));
    };
    let result = match req.method.as_str() {
        "roles.grant" => roles_grant(conn, &req.params),
        "roles.revoke" => roles_revoke(conn, &req.params),
        "roles.list" => roles_list(conn, &req.params),
        _ => unreachable!(),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_ts, optional_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::RosterStudent;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Section roster in authoritative order: ascending roll number.
pub fn roster_for_section(
    conn: &Connection,
    section_id: &str,
) -> Result<Vec<RosterStudent>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, roll_number, name, email FROM students
             WHERE section_id = ?
             ORDER BY roll_number",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([section_id], |r| {
        Ok(RosterStudent {
            id: r.get(0)?,
            roll_number: r.get(1)?,
            name: r.get(2)?,
            email: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db_query)
}

pub fn section_exists(conn: &Connection, section_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM sections WHERE id = ?", [section_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = required_str(params, "sectionId")?;
    let roll_number = required_str(params, "rollNumber")?;
    let name = required_str(params, "name")?;
    if roll_number.trim().is_empty() || name.trim().is_empty() {
        return Err(HandlerErr::bad_params("rollNumber and name are required"));
    }
    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }
    let email = optional_str(params, "email");
    let gender = optional_str(params, "gender");
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, section_id, roll_number, name, email, gender, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &section_id,
            roll_number.trim(),
            name.trim(),
            &email,
            &gender,
            now_ts(),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;
    Ok(json!({ "studentId": id }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = required_str(params, "sectionId")?;
    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }
    let roster = roster_for_section(conn, &section_id)?;
    Ok(json!({ "students": roster }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db_query)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("student not found"));
    }

    // Validate the whole patch before touching the row, then apply it as a
    // single UPDATE; a rejected patch must leave the student untouched.
    let fields: [(&str, &str); 4] = [
        ("rollNumber", "roll_number"),
        ("name", "name"),
        ("email", "email"),
        ("gender", "gender"),
    ];
    let mut sets: Vec<(&str, Option<String>)> = Vec::new();
    for (key, column) in fields {
        let Some(v) = patch.get(key) else { continue };
        let value: Option<String> = if v.is_null() {
            None
        } else {
            match v.as_str() {
                Some(s) => Some(s.to_string()),
                None => return Err(HandlerErr::bad_params(format!("{} must be a string", key))),
            }
        };
        if (column == "roll_number" || column == "name")
            && value.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true)
        {
            return Err(HandlerErr::bad_params(format!("{} must be non-empty", key)));
        }
        sets.push((column, value));
    }
    if sets.is_empty() {
        return Ok(json!({ "updated": 0 }));
    }
    let clause = sets
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE students SET {} WHERE id = ?", clause);
    let mut bindings: Vec<&dyn rusqlite::ToSql> = sets
        .iter()
        .map(|(_, value)| value as &dyn rusqlite::ToSql)
        .collect();
    bindings.push(&student_id);
    conn.execute(&sql, bindings.as_slice())
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "students" })),
        })?;
    Ok(json!({ "updated": sets.len() }))
}

fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute("DELETE FROM attendance WHERE student_id = ?", [&student_id])
        .map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: None,
        })?;
    let removed = tx
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: None,
        })?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    if removed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "students.create" | "students.list" | "students.update" | "students.delete"
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
        "students.create" => students_create(conn, &req.params),
        "students.list" => students_list(conn, &req.params),
        "students.update" => students_update(conn, &req.params),
        "students.delete" => students_delete(conn, &req.params),
        _ => unreachable!(),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_ts, optional_str, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    conn.query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
        .map_err(HandlerErr::db_query)
}

fn colleges_create(
    conn: &Connection,
    params: &serde_json::Value,
    user: Option<&str>,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let code = required_str(params, "code")?;
    if name.trim().is_empty() || code.trim().is_empty() {
        return Err(HandlerErr::bad_params("name and code are required"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO colleges(id, name, code, created_by, created_at) VALUES(?, ?, ?, ?, ?)",
        (&id, name.trim(), code.trim(), user, now_ts()),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "colleges" })),
    })?;
    Ok(json!({ "collegeId": id }))
}

/// Validates a name/code patch as a whole before anything is written.
fn patch_name_code(patch: &serde_json::Value) -> Result<Vec<(&'static str, String)>, HandlerErr> {
    let mut sets = Vec::new();
    for key in ["name", "code"] {
        let Some(v) = patch.get(key) else { continue };
        let Some(s) = v.as_str() else {
            return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
        };
        if s.trim().is_empty() {
            return Err(HandlerErr::bad_params(format!("{} must be non-empty", key)));
        }
        sets.push((key, s.trim().to_string()));
    }
    Ok(sets)
}

/// One UPDATE covering every patched column, so a patch lands whole or not
/// at all.
fn apply_column_sets(
    conn: &Connection,
    table: &str,
    id: &str,
    sets: &[(&'static str, String)],
) -> Result<usize, HandlerErr> {
    if sets.is_empty() {
        return Ok(0);
    }
    let clause = sets
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, clause);
    let mut params: Vec<&dyn rusqlite::ToSql> = sets
        .iter()
        .map(|(_, value)| value as &dyn rusqlite::ToSql)
        .collect();
    params.push(&id);
    conn.execute(&sql, params.as_slice())
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        })?;
    Ok(sets.len())
}

fn colleges_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let college_id = required_str(params, "collegeId")?;
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    if !row_exists(conn, "colleges", &college_id)? {
        return Err(HandlerErr::not_found("college not found"));
    }
    let sets = patch_name_code(patch)?;
    let updated = apply_column_sets(conn, "colleges", &college_id, &sets)?;
    Ok(json!({ "updated": updated }))
}

fn colleges_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name, code FROM colleges ORDER BY name")
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "code": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "colleges": rows }))
}

fn departments_create(
    conn: &Connection,
    params: &serde_json::Value,
    user: Option<&str>,
) -> Result<serde_json::Value, HandlerErr> {
    let college_id = required_str(params, "collegeId")?;
    let name = required_str(params, "name")?;
    let code = required_str(params, "code")?;
    if name.trim().is_empty() || code.trim().is_empty() {
        return Err(HandlerErr::bad_params("name and code are required"));
    }
    if !row_exists(conn, "colleges", &college_id)? {
        return Err(HandlerErr::not_found("college not found"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO departments(id, college_id, name, code, created_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &college_id, name.trim(), code.trim(), user, now_ts()),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "departments" })),
    })?;
    Ok(json!({ "departmentId": id }))
}

fn departments_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let college_id = optional_str(params, "collegeId");
    let mut out = Vec::new();
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "collegeId": r.get::<_, String>(1)?,
            "name": r.get::<_, String>(2)?,
            "code": r.get::<_, String>(3)?,
        }))
    };
    match college_id {
        Some(cid) => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, college_id, name, code FROM departments
                     WHERE college_id = ? ORDER BY name",
                )
                .map_err(HandlerErr::db_query)?;
            let rows = stmt
                .query_map([&cid], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?;
            out.extend(rows);
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT id, college_id, name, code FROM departments ORDER BY name")
                .map_err(HandlerErr::db_query)?;
            let rows = stmt
                .query_map([], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?;
            out.extend(rows);
        }
    }
    Ok(json!({ "departments": out }))
}

fn departments_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let department_id = required_str(params, "departmentId")?;
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    if !row_exists(conn, "departments", &department_id)? {
        return Err(HandlerErr::not_found("department not found"));
    }
    let sets = patch_name_code(patch)?;
    let updated = apply_column_sets(conn, "departments", &department_id, &sets)?;
    Ok(json!({ "updated": updated }))
}

/// Removes a department and everything scoped under it; templates survive
/// with their scope references nulled.
fn departments_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let department_id = required_str(params, "departmentId")?;
    if !row_exists(conn, "departments", &department_id)? {
        return Err(HandlerErr::not_found("department not found"));
    }
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let steps: [&str; 8] = [
        "DELETE FROM attendance WHERE section_id IN (
            SELECT s.id FROM sections s JOIN years y ON s.year_id = y.id
            WHERE y.department_id = ?)",
        "DELETE FROM students WHERE section_id IN (
            SELECT s.id FROM sections s JOIN years y ON s.year_id = y.id
            WHERE y.department_id = ?)",
        "UPDATE attendance_sheet_templates SET section_id = NULL WHERE section_id IN (
            SELECT s.id FROM sections s JOIN years y ON s.year_id = y.id
            WHERE y.department_id = ?)",
        "UPDATE attendance_sheet_templates SET year_id = NULL WHERE year_id IN (
            SELECT id FROM years WHERE department_id = ?)",
        "UPDATE attendance_sheet_templates SET department_id = NULL WHERE department_id = ?",
        "DELETE FROM sections WHERE year_id IN (SELECT id FROM years WHERE department_id = ?)",
        "DELETE FROM years WHERE department_id = ?",
        "DELETE FROM departments WHERE id = ?",
    ];
    for sql in steps {
        tx.execute(sql, [&department_id]).map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: None,
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "deleted": true }))
}

fn years_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let department_id = required_str(params, "departmentId")?;
    let year_number = required_i64(params, "yearNumber")?;
    if year_number < 1 {
        return Err(HandlerErr::bad_params("yearNumber must be >= 1"));
    }
    if !row_exists(conn, "departments", &department_id)? {
        return Err(HandlerErr::not_found("department not found"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO years(id, department_id, year_number, created_at) VALUES(?, ?, ?, ?)",
        (&id, &department_id, year_number, now_ts()),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "years" })),
    })?;
    Ok(json!({ "yearId": id }))
}

fn years_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let department_id = optional_str(params, "departmentId");
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "departmentId": r.get::<_, String>(1)?,
            "yearNumber": r.get::<_, i64>(2)?,
        }))
    };
    let rows = match department_id {
        Some(did) => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, department_id, year_number FROM years
                     WHERE department_id = ? ORDER BY year_number",
                )
                .map_err(HandlerErr::db_query)?;
            stmt.query_map([&did], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT id, department_id, year_number FROM years ORDER BY year_number")
                .map_err(HandlerErr::db_query)?;
            stmt.query_map([], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?
        }
    };
    Ok(json!({ "years": rows }))
}

fn years_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let year_id = required_str(params, "yearId")?;
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    if !row_exists(conn, "years", &year_id)? {
        return Err(HandlerErr::not_found("year not found"));
    }
    let Some(v) = patch.get("yearNumber") else {
        return Ok(json!({ "updated": 0 }));
    };
    let Some(year_number) = v.as_i64() else {
        return Err(HandlerErr::bad_params("yearNumber must be an integer"));
    };
    if year_number < 1 {
        return Err(HandlerErr::bad_params("yearNumber must be >= 1"));
    }
    conn.execute(
        "UPDATE years SET year_number = ? WHERE id = ?",
        (year_number, &year_id),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "years" })),
    })?;
    Ok(json!({ "updated": 1 }))
}

/// Removes a year and its sections, students and attendance; templates
/// survive with their scope references nulled.
fn years_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let year_id = required_str(params, "yearId")?;
    if !row_exists(conn, "years", &year_id)? {
        return Err(HandlerErr::not_found("year not found"));
    }
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let steps: [&str; 6] = [
        "DELETE FROM attendance WHERE section_id IN (SELECT id FROM sections WHERE year_id = ?)",
        "DELETE FROM students WHERE section_id IN (SELECT id FROM sections WHERE year_id = ?)",
        "UPDATE attendance_sheet_templates SET section_id = NULL WHERE section_id IN (
            SELECT id FROM sections WHERE year_id = ?)",
        "UPDATE attendance_sheet_templates SET year_id = NULL WHERE year_id = ?",
        "DELETE FROM sections WHERE year_id = ?",
        "DELETE FROM years WHERE id = ?",
    ];
    for sql in steps {
        tx.execute(sql, [&year_id]).map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: None,
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "deleted": true }))
}

fn sections_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let year_id = required_str(params, "yearId")?;
    let name = required_str(params, "name")?;
    if name.trim().is_empty() {
        return Err(HandlerErr::bad_params("name is required"));
    }
    if !row_exists(conn, "years", &year_id)? {
        return Err(HandlerErr::not_found("year not found"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sections(id, year_id, name, created_at) VALUES(?, ?, ?, ?)",
        (&id, &year_id, name.trim(), now_ts()),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "sections" })),
    })?;
    Ok(json!({ "sectionId": id }))
}

fn sections_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let year_id = optional_str(params, "yearId");
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "yearId": r.get::<_, String>(1)?,
            "name": r.get::<_, String>(2)?,
        }))
    };
    let rows = match year_id {
        Some(yid) => {
            let mut stmt = conn
                .prepare("SELECT id, year_id, name FROM sections WHERE year_id = ? ORDER BY name")
                .map_err(HandlerErr::db_query)?;
            stmt.query_map([&yid], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT id, year_id, name FROM sections ORDER BY name")
                .map_err(HandlerErr::db_query)?;
            stmt.query_map([], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(HandlerErr::db_query)?
        }
    };
    Ok(json!({ "sections": rows }))
}

fn sections_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = required_str(params, "sectionId")?;
    let Some(patch) = params.get("patch") else {
        return Err(HandlerErr::bad_params("missing patch"));
    };
    if !row_exists(conn, "sections", &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }
    let mut sets = Vec::new();
    if let Some(v) = patch.get("name") {
        let Some(s) = v.as_str() else {
            return Err(HandlerErr::bad_params("name must be a string"));
        };
        if s.trim().is_empty() {
            return Err(HandlerErr::bad_params("name must be non-empty"));
        }
        sets.push(("name", s.trim().to_string()));
    }
    let updated = apply_column_sets(conn, "sections", &section_id, &sets)?;
    Ok(json!({ "updated": updated }))
}

fn sections_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = required_str(params, "sectionId")?;
    if !row_exists(conn, "sections", &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let steps: [&str; 4] = [
        "DELETE FROM attendance WHERE section_id = ?",
        "UPDATE attendance_sheet_templates SET section_id = NULL WHERE section_id = ?",
        "DELETE FROM students WHERE section_id = ?",
        "DELETE FROM sections WHERE id = ?",
    ];
    for sql in steps {
        tx.execute(sql, [&section_id]).map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: None,
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "colleges.create"
            | "colleges.update"
            | "colleges.list"
            | "departments.create"
            | "departments.update"
            | "departments.list"
            | "departments.delete"
            | "years.create"
            | "years.update"
            | "years.list"
            | "years.delete"
            | "sections.create"
            | "sections.update"
            | "sections.list"
            | "sections.delete"
    );
    if !needs_db {
        return None;
    }
    let user = state.user.clone();
    let Some(conn) = state.db.as_ref() else {
        return Some(err(
            &req.id,
            "no_workspace",
            "select a workspace first",
            None,
        ));
    };
    let result = match req.method.as_str() {
        "colleges.create" => colleges_create(conn, &req.params, user.as_deref()),
        "colleges.update" => colleges_update(conn, &req.params),
        "colleges.list" => colleges_list(conn),
        "departments.create" => departments_create(conn, &req.params, user.as_deref()),
        "departments.update" => departments_update(conn, &req.params),
        "departments.list" => departments_list(conn, &req.params),
        "departments.delete" => departments_delete(conn, &req.params),
        "years.create" => years_create(conn, &req.params),
        "years.update" => years_update(conn, &req.params),
        "years.list" => years_list(conn, &req.params),
        "years.delete" => years_delete(conn, &req.params),
        "sections.create" => sections_create(conn, &req.params),
        "sections.update" => sections_update(conn, &req.params),
        "sections.list" => sections_list(conn, &req.params),
        "sections.delete" => sections_delete(conn, &req.params),
        _ => unreachable!(),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

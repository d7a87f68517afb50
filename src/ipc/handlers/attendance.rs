use crate::ipc::error::{err, ok};
use crate::ipc::handlers::students::{roster_for_section, section_exists};
use crate::ipc::helpers::{
    now_ts, optional_str, param_date, required_str, validate_id_param, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, AttendanceBook, AttendanceStatus, RosterStudent};
use rusqlite::Connection;
use serde_json::json;
use std::fs;
use uuid::Uuid;

/// Day sheet for a section: every roster student seeded present, then
/// persisted rows merged on top.
pub fn load_book(
    conn: &Connection,
    section_id: &str,
    date: &str,
    roster: &[RosterStudent],
) -> Result<AttendanceBook, HandlerErr> {
    let mut book = AttendanceBook::seed(roster);
    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, status FROM attendance
             WHERE section_id = ? AND date = ?",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([section_id, date], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for (id, student_id, status) in rows {
        book.merge_persisted(&id, &student_id, AttendanceStatus::parse(&status));
    }
    Ok(book)
}

fn open_section_sheet(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(String, String, Vec<RosterStudent>, AttendanceBook), HandlerErr> {
    let section_id = required_str(params, "sectionId")?;
    validate_id_param(&section_id, "section")?;
    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }
    let date = param_date(params);
    let roster = roster_for_section(conn, &section_id)?;
    let book = load_book(conn, &section_id, &date, &roster)?;
    Ok((section_id, date, roster, book))
}

fn sheet_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_, date, roster, book) = open_section_sheet(conn, params)?;
    Ok(json!({
        "date": date,
        "students": roster,
        "entries": book.entries(),
        "stats": book.stats(),
    }))
}

/// Full replace of the (section, date) slice. The submitted entries are the
/// whole sheet; rows not resubmitted are gone after the save.
fn sheet_save(
    conn: &Connection,
    params: &serde_json::Value,
    user: Option<&str>,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = required_str(params, "sectionId")?;
    validate_id_param(&section_id, "section")?;
    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }
    let date = param_date(params);
    let Some(raw) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing entries"));
    };
    let mut entries = Vec::with_capacity(raw.len());
    for entry in raw {
        let student_id = required_str(entry, "studentId")?;
        let status_raw = required_str(entry, "status")?;
        let Some(status) = AttendanceStatus::parse_strict(&status_raw) else {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("unknown status '{}'", status_raw),
                details: Some(json!({ "studentId": student_id })),
            });
        };
        entries.push((student_id, status));
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute(
        "DELETE FROM attendance WHERE section_id = ? AND date = ?",
        [&section_id, &date],
    )
    .map_err(|e| HandlerErr {
        code: "db_delete_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance" })),
    })?;
    let now = now_ts();
    for (student_id, status) in &entries {
        tx.execute(
            "INSERT INTO attendance(
                id, section_id, student_id, date, status, marked_by, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &section_id,
                student_id,
                &date,
                status.as_str(),
                user,
                &now,
                &now,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    let present = entries
        .iter()
        .filter(|(_, s)| *s == AttendanceStatus::Present)
        .count();
    Ok(json!({
        "saved": entries.len(),
        "date": date,
        "stats": {
            "total": entries.len(),
            "present": present,
            "absent": entries.len() - present,
        },
    }))
}

fn sheet_stats(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_, date, _, book) = open_section_sheet(conn, params)?;
    Ok(json!({ "date": date, "stats": book.stats() }))
}

fn export_csv(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_, date, roster, book) = open_section_sheet(conn, params)?;
    let csv = store::export_csv(&roster, &book);
    let out_path = optional_str(params, "outPath");
    if let Some(path) = &out_path {
        fs::write(path, &csv).map_err(|e| HandlerErr {
            code: "io_failed",
            message: e.to_string(),
            details: Some(json!({ "path": path })),
        })?;
    }
    Ok(json!({
        "date": date,
        "rows": roster.len(),
        "csv": csv,
        "outPath": out_path,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "attendance.sheetOpen" | "attendance.save" | "attendance.stats" | "attendance.exportCsv"
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
        "attendance.sheetOpen" => sheet_open(conn, &req.params),
        "attendance.save" => sheet_save(conn, &req.params, user.as_deref()),
        "attendance.stats" => sheet_stats(conn, &req.params),
        "attendance.exportCsv" => export_csv(conn, &req.params),
        _ => unreachable!(),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

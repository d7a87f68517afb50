use crate::grid::{self, Cell, CellType};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::attendance::load_book;
use crate::ipc::handlers::students::{roster_for_section, section_exists};
use crate::ipc::helpers::{now_ts, optional_str, required_str, validate_id_param, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::render;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Client-submitted cell: ids and spans may be absent for fresh cells.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellInput {
    id: Option<String>,
    row_index: i64,
    col_index: i64,
    #[serde(default = "one")]
    rowspan: i64,
    #[serde(default = "one")]
    colspan: i64,
    cell_type: CellType,
    #[serde(default)]
    label: String,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

fn one() -> i64 {
    1
}

pub fn parse_cells(params: &serde_json::Value) -> Result<Vec<Cell>, HandlerErr> {
    let Some(raw) = params.get("cells") else {
        return Err(HandlerErr::bad_params("missing cells"));
    };
    let inputs: Vec<CellInput> = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("malformed cells: {}", e)))?;
    let mut cells = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.row_index < 0 || input.col_index < 0 {
            return Err(HandlerErr::bad_params("cell indexes must be >= 0"));
        }
        if input.rowspan < 1 || input.colspan < 1 {
            return Err(HandlerErr::bad_params("cell spans must be >= 1"));
        }
        cells.push(Cell {
            id: input.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            row_index: input.row_index,
            col_index: input.col_index,
            rowspan: input.rowspan,
            colspan: input.colspan,
            cell_type: input.cell_type,
            label: input.label,
            config: input.config,
        });
    }
    grid::ensure_disjoint(&cells)?;
    Ok(cells)
}

/// Atomic save: template metadata plus a full replace of its cell set.
/// Cells are never diffed against the stored set.
pub fn save_template(
    conn: &Connection,
    user: Option<&str>,
    template_id: Option<&str>,
    name: &str,
    department_id: Option<&str>,
    year_id: Option<&str>,
    section_id: Option<&str>,
    cells: &[Cell],
) -> Result<String, HandlerErr> {
    if name.trim().is_empty() {
        return Err(HandlerErr::bad_params("template name is required"));
    }
    grid::ensure_disjoint(cells)?;

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let now = now_ts();

    let id = match template_id {
        Some(tid) => {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM attendance_sheet_templates WHERE id = ?",
                    [tid],
                    |r| r.get::<_, i64>(0),
                )
                .optional()
                .map_err(HandlerErr::db_query)?
                .is_some();
            if !exists {
                return Err(HandlerErr::not_found("template not found"));
            }
            tx.execute(
                "UPDATE attendance_sheet_templates
                 SET name = ?, department_id = ?, year_id = ?, section_id = ?, updated_at = ?
                 WHERE id = ?",
                (name.trim(), department_id, year_id, section_id, &now, tid),
            )
            .map_err(|e| HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "attendance_sheet_templates" })),
            })?;
            tx.execute("DELETE FROM template_cells WHERE template_id = ?", [tid])
                .map_err(|e| HandlerErr {
                    code: "db_delete_failed",
                    message: e.to_string(),
                    details: Some(json!({ "table": "template_cells" })),
                })?;
            tid.to_string()
        }
        None => {
            let tid = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO attendance_sheet_templates(
                    id, name, department_id, year_id, section_id,
                    created_by, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &tid,
                    name.trim(),
                    department_id,
                    year_id,
                    section_id,
                    user,
                    &now,
                    &now,
                ),
            )
            .map_err(|e| HandlerErr {
                code: "db_insert_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "attendance_sheet_templates" })),
            })?;
            tid
        }
    };

    for cell in cells {
        let config = match &cell.config {
            Some(v) => Some(serde_json::to_string(v).map_err(|e| HandlerErr {
                code: "bad_params",
                message: format!("unserializable cell config: {}", e),
                details: None,
            })?),
            None => None,
        };
        tx.execute(
            "INSERT INTO template_cells(
                id, template_id, row_index, col_index, rowspan, colspan,
                cell_type, label, config, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &cell.id,
                &id,
                cell.row_index,
                cell.col_index,
                cell.rowspan,
                cell.colspan,
                cell.cell_type.as_str(),
                &cell.label,
                &config,
                &now,
                &now,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "template_cells" })),
        })?;
    }

    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(id)
}

/// Cells of a template in rendering order. Unknown stored cell types
/// degrade to static literals instead of failing the whole template.
pub fn load_cells(conn: &Connection, template_id: &str) -> Result<Vec<Cell>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, row_index, col_index, rowspan, colspan, cell_type, label, config
             FROM template_cells
             WHERE template_id = ?
             ORDER BY row_index, col_index",
        )
        .map_err(HandlerErr::db_query)?;
    stmt.query_map([template_id], |r| {
        let cell_type: String = r.get(5)?;
        let config_raw: Option<String> = r.get(7)?;
        Ok(Cell {
            id: r.get(0)?,
            row_index: r.get(1)?,
            col_index: r.get(2)?,
            rowspan: r.get(3)?,
            colspan: r.get(4)?,
            cell_type: CellType::parse(&cell_type).unwrap_or(CellType::Static),
            label: r.get(6)?,
            config: config_raw.and_then(|s| serde_json::from_str(&s).ok()),
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db_query)
}

pub fn template_exists(conn: &Connection, template_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM attendance_sheet_templates WHERE id = ?",
        [template_id],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn templates_save(
    conn: &Connection,
    params: &serde_json::Value,
    user: Option<&str>,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let template_id = optional_str(params, "templateId");
    let department_id = optional_str(params, "departmentId");
    let year_id = optional_str(params, "yearId");
    let section_id = optional_str(params, "sectionId");
    let cells = parse_cells(params)?;
    let id = save_template(
        conn,
        user,
        template_id.as_deref(),
        &name,
        department_id.as_deref(),
        year_id.as_deref(),
        section_id.as_deref(),
        &cells,
    )?;
    Ok(json!({ "templateId": id, "cellCount": cells.len() }))
}

fn templates_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, department_id, year_id, section_id, created_by, created_at
             FROM attendance_sheet_templates
             ORDER BY created_at DESC",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "departmentId": r.get::<_, Option<String>>(2)?,
                "yearId": r.get::<_, Option<String>>(3)?,
                "sectionId": r.get::<_, Option<String>>(4)?,
                "createdBy": r.get::<_, Option<String>>(5)?,
                "createdAt": r.get::<_, Option<String>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!({ "templates": rows }))
}

fn templates_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let template_id = required_str(params, "templateId")?;
    let template = conn
        .query_row(
            "SELECT id, name, department_id, year_id, section_id
             FROM attendance_sheet_templates WHERE id = ?",
            [&template_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "departmentId": r.get::<_, Option<String>>(2)?,
                    "yearId": r.get::<_, Option<String>>(3)?,
                    "sectionId": r.get::<_, Option<String>>(4)?,
                }))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("template not found"))?;
    let cells = load_cells(conn, &template_id)?;
    let (max_row, max_col) = grid::bounds(&cells);
    Ok(json!({
        "template": template,
        "cells": cells,
        "maxRow": max_row,
        "maxCol": max_col,
    }))
}

fn templates_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let template_id = required_str(params, "templateId")?;
    if !template_exists(conn, &template_id)? {
        return Err(HandlerErr::not_found("template not found"));
    }
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    for sql in [
        "DELETE FROM template_cells WHERE template_id = ?",
        "DELETE FROM attendance_sheet_templates WHERE id = ?",
    ] {
        tx.execute(sql, [&template_id]).map_err(|e| HandlerErr {
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

/// Expands a template against a section's roster with statuses merged from
/// the persisted day sheet.
fn templates_render(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let template_id = required_str(params, "templateId")?;
    let section_id = required_str(params, "sectionId")?;
    validate_id_param(&section_id, "section")?;
    if !template_exists(conn, &template_id)? {
        return Err(HandlerErr::not_found("template not found"));
    }
    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr::not_found("section not found"));
    }
    let date = crate::ipc::helpers::param_date(params);
    let cells = load_cells(conn, &template_id)?;
    let roster = roster_for_section(conn, &section_id)?;
    let book = load_book(conn, &section_id, &date, &roster)?;

    let header_rows = render::header_row_count(&cells);
    let pattern_height = render::pattern_rows(&cells, header_rows).len();
    let rows = render::expand(&cells, &roster, &book.statuses());
    Ok(json!({
        "date": date,
        "headerRowCount": header_rows,
        "patternHeight": pattern_height,
        "rows": rows,
        "stats": book.stats(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let needs_db = matches!(
        req.method.as_str(),
        "templates.save"
            | "templates.list"
            | "templates.get"
            | "templates.delete"
            | "templates.render"
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
        "templates.save" => templates_save(conn, &req.params, user.as_deref()),
        "templates.list" => templates_list(conn),
        "templates.get" => templates_get(conn, &req.params),
        "templates.delete" => templates_delete(conn, &req.params),
        "templates.render" => templates_render(conn, &req.params),
        _ => unreachable!(),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

use crate::grid::{self, Cell, CellType};
use crate::store::{AttendanceStatus, RosterStudent};
use serde::Serialize;
use std::collections::HashMap;

pub const ROLL_NUMBER_LABEL: &str = "Roll Number";
pub const STUDENT_NAME_LABEL: &str = "Student Name";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum RenderedCell {
    Header {
        label: String,
        rowspan: i64,
        colspan: i64,
    },
    Label {
        text: String,
        rowspan: i64,
        colspan: i64,
    },
    /// Free-text entry; value capture is not bound to persisted state.
    TextEntry {
        placeholder: String,
        rowspan: i64,
        colspan: i64,
    },
    /// Attendance toggle bound to one roster student.
    Toggle {
        student_id: String,
        present: bool,
        rowspan: i64,
        colspan: i64,
    },
    Action {
        label: String,
        rowspan: i64,
        colspan: i64,
    },
    /// Gap filler in the header region.
    Blank,
    /// "-" placeholder under a column the template touches elsewhere.
    Hole,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedRow {
    pub cells: Vec<RenderedCell>,
}

/// Number of header-region rows: the maximum `row_index + rowspan` among
/// header-typed cells, 0 when the template has none.
pub fn header_row_count(cells: &[Cell]) -> i64 {
    cells
        .iter()
        .filter(|c| c.cell_type == CellType::Header)
        .map(|c| c.row_index + c.rowspan)
        .max()
        .unwrap_or(0)
}

/// Sorted distinct anchor rows at or beyond the header region; this is the
/// pattern replicated once per roster student.
pub fn pattern_rows(cells: &[Cell], header_rows: i64) -> Vec<i64> {
    let mut rows: Vec<i64> = cells
        .iter()
        .filter(|c| c.row_index >= header_rows)
        .map(|c| c.row_index)
        .collect();
    rows.sort_unstable();
    rows.dedup();
    rows
}

fn column_touched(cells: &[Cell], col: i64) -> bool {
    cells
        .iter()
        .any(|c| col >= c.col_index && col < c.col_index + c.colspan)
}

fn anchored_at(cells: &[Cell], row: i64, col: i64) -> Option<&Cell> {
    cells
        .iter()
        .find(|c| c.row_index == row && c.col_index == col)
}

fn render_unbound(cell: &Cell) -> RenderedCell {
    match cell.cell_type {
        CellType::Header => RenderedCell::Header {
            label: cell.label.clone(),
            rowspan: cell.rowspan,
            colspan: cell.colspan,
        },
        CellType::Submit => RenderedCell::Action {
            label: if cell.label.is_empty() {
                "Submit".to_string()
            } else {
                cell.label.clone()
            },
            rowspan: cell.rowspan,
            colspan: cell.colspan,
        },
        CellType::Textarea => RenderedCell::TextEntry {
            placeholder: cell.label.clone(),
            rowspan: cell.rowspan,
            colspan: cell.colspan,
        },
        CellType::Text => RenderedCell::Label {
            text: cell.label.clone(),
            rowspan: cell.rowspan,
            colspan: cell.colspan,
        },
        _ => RenderedCell::Label {
            text: if cell.label.is_empty() {
                cell.cell_type.as_str().to_string()
            } else {
                cell.label.clone()
            },
            rowspan: cell.rowspan,
            colspan: cell.colspan,
        },
    }
}

fn render_bound(
    cell: &Cell,
    student: &RosterStudent,
    statuses: &HashMap<String, AttendanceStatus>,
) -> RenderedCell {
    match cell.cell_type {
        CellType::Checkbox => RenderedCell::Toggle {
            student_id: student.id.clone(),
            present: statuses
                .get(&student.id)
                .map(|s| *s == AttendanceStatus::Present)
                .unwrap_or(true),
            rowspan: cell.rowspan,
            colspan: cell.colspan,
        },
        CellType::Text => {
            let text = if cell.label == ROLL_NUMBER_LABEL {
                student.roll_number.clone()
            } else if cell.label == STUDENT_NAME_LABEL {
                student.name.clone()
            } else {
                cell.label.clone()
            };
            RenderedCell::Label {
                text,
                rowspan: cell.rowspan,
                colspan: cell.colspan,
            }
        }
        _ => render_unbound(cell),
    }
}

/// Expands a template against an ordered roster: header rows verbatim, then
/// the data-row pattern once per student with per-student substitution.
/// Roster order is authoritative and never changed here.
pub fn expand(
    cells: &[Cell],
    roster: &[RosterStudent],
    statuses: &HashMap<String, AttendanceStatus>,
) -> Vec<RenderedRow> {
    let (_, max_col) = grid::bounds(cells);
    let header_rows = header_row_count(cells);
    let pattern = pattern_rows(cells, header_rows);

    let mut rows = Vec::new();

    for row in 0..header_rows {
        let mut rendered = Vec::new();
        for col in 0..max_col {
            if let Some(cell) = anchored_at(cells, row, col) {
                rendered.push(render_unbound(cell));
            } else if !grid::is_occupied(cells, row, col) {
                rendered.push(RenderedCell::Blank);
            }
        }
        rows.push(RenderedRow { cells: rendered });
    }

    for student in roster {
        for &pattern_row in &pattern {
            let mut rendered = Vec::new();
            for col in 0..max_col {
                if let Some(cell) = anchored_at(cells, pattern_row, col) {
                    rendered.push(render_bound(cell, student, statuses));
                } else if grid::is_occupied(cells, pattern_row, col) {
                    // Covered by a spanning neighbour within the pattern.
                } else if column_touched(cells, col) {
                    rendered.push(RenderedCell::Hole);
                }
            }
            rows.push(RenderedRow { cells: rendered });
        }
    }

    rows
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    Header,
    Static,
    Text,
    Textarea,
    Checkbox,
    Submit,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Header => "header",
            CellType::Static => "static",
            CellType::Text => "text",
            CellType::Textarea => "textarea",
            CellType::Checkbox => "checkbox",
            CellType::Submit => "submit",
        }
    }

    pub fn parse(s: &str) -> Option<CellType> {
        match s {
            "header" => Some(CellType::Header),
            "static" => Some(CellType::Static),
            "text" => Some(CellType::Text),
            "textarea" => Some(CellType::Textarea),
            "checkbox" => Some(CellType::Checkbox),
            "submit" => Some(CellType::Submit),
            _ => None,
        }
    }
}

/// One rectangular region of a template grid. The id is a synthetic key
/// assigned at creation; coordinates are for spatial queries only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub id: String,
    pub row_index: i64,
    pub col_index: i64,
    pub rowspan: i64,
    pub colspan: i64,
    pub cell_type: CellType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl Cell {
    pub fn new(row: i64, col: i64, cell_type: CellType, label: &str) -> Cell {
        Cell {
            id: Uuid::new_v4().to_string(),
            row_index: row,
            col_index: col,
            rowspan: 1,
            colspan: 1,
            cell_type,
            label: label.to_string(),
            config: None,
        }
    }

    pub fn covers(&self, row: i64, col: i64) -> bool {
        row >= self.row_index
            && row < self.row_index + self.rowspan
            && col >= self.col_index
            && col < self.col_index + self.colspan
    }

    pub fn overlaps(&self, other: &Cell) -> bool {
        self.row_index < other.row_index + other.rowspan
            && other.row_index < self.row_index + self.rowspan
            && self.col_index < other.col_index + other.colspan
            && other.col_index < self.col_index + self.colspan
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GridError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GridError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// First cell whose footprint covers (row, col). Under the disjointness
/// invariant at most one matches; on a malformed cell set the first match
/// wins so rendering can degrade instead of failing.
pub fn cell_at(cells: &[Cell], row: i64, col: i64) -> Option<&Cell> {
    cells.iter().find(|c| c.covers(row, col))
}

pub fn is_occupied(cells: &[Cell], row: i64, col: i64) -> bool {
    cells.iter().any(|c| c.covers(row, col))
}

/// (max_row, max_col) covered by the cell set, each at least 1.
pub fn bounds(cells: &[Cell]) -> (i64, i64) {
    let max_row = cells
        .iter()
        .map(|c| c.row_index + c.rowspan)
        .max()
        .unwrap_or(1)
        .max(1);
    let max_col = cells
        .iter()
        .map(|c| c.col_index + c.colspan)
        .max()
        .unwrap_or(1)
        .max(1);
    (max_row, max_col)
}

/// Rejects a cell set in which any two footprints intersect.
pub fn ensure_disjoint(cells: &[Cell]) -> Result<(), GridError> {
    for (i, a) in cells.iter().enumerate() {
        for b in cells.iter().skip(i + 1) {
            if a.overlaps(b) {
                return Err(GridError::new("overlap", "cell footprints overlap")
                    .with_details(serde_json::json!({
                        "a": { "rowIndex": a.row_index, "colIndex": a.col_index },
                        "b": { "rowIndex": b.row_index, "colIndex": b.col_index },
                    })));
            }
        }
    }
    Ok(())
}

fn anchor_position(cells: &[Cell], row: i64, col: i64) -> Option<usize> {
    cells
        .iter()
        .position(|c| c.row_index == row && c.col_index == col)
}

/// Splits the cell anchored at (row, col) into left/right halves whose
/// colspans sum to the original. The left half keeps the original id.
pub fn split_horizontally(cells: &mut Vec<Cell>, row: i64, col: i64) -> Result<(), GridError> {
    let Some(pos) = anchor_position(cells, row, col) else {
        return Err(GridError::new("not_found", "no cell anchored at coordinate"));
    };
    if cells[pos].colspan < 2 {
        return Err(GridError::new(
            "invalid_split",
            "cell must span at least 2 columns to split",
        ));
    }
    let original = cells.remove(pos);
    let left_span = original.colspan / 2;
    let mut left = original.clone();
    left.colspan = left_span;
    let mut right = original.clone();
    right.id = Uuid::new_v4().to_string();
    right.col_index = original.col_index + left_span;
    right.colspan = original.colspan - left_span;
    cells.push(left);
    cells.push(right);
    Ok(())
}

/// Splits the cell anchored at (row, col) into top/bottom halves whose
/// rowspans sum to the original. The top half keeps the original id.
pub fn split_vertically(cells: &mut Vec<Cell>, row: i64, col: i64) -> Result<(), GridError> {
    let Some(pos) = anchor_position(cells, row, col) else {
        return Err(GridError::new("not_found", "no cell anchored at coordinate"));
    };
    if cells[pos].rowspan < 2 {
        return Err(GridError::new(
            "invalid_split",
            "cell must span at least 2 rows to split",
        ));
    }
    let original = cells.remove(pos);
    let top_span = original.rowspan / 2;
    let mut top = original.clone();
    top.rowspan = top_span;
    let mut bottom = original.clone();
    bottom.id = Uuid::new_v4().to_string();
    bottom.row_index = original.row_index + top_span;
    bottom.rowspan = original.rowspan - top_span;
    cells.push(top);
    cells.push(bottom);
    Ok(())
}

/// Removes the cell anchored exactly at (row, col). Clicking inside a
/// spanned cell away from its anchor removes nothing.
pub fn delete_cell(cells: &mut Vec<Cell>, row: i64, col: i64) -> bool {
    match anchor_position(cells, row, col) {
        Some(pos) => {
            cells.remove(pos);
            true
        }
        None => false,
    }
}

/// Drops cells anchored at the row and shifts later anchors up by one.
pub fn delete_row(cells: &mut Vec<Cell>, idx: i64) {
    cells.retain(|c| c.row_index != idx);
    for c in cells.iter_mut() {
        if c.row_index > idx {
            c.row_index -= 1;
        }
    }
}

/// Drops cells anchored at the column and shifts later anchors left by one.
pub fn delete_column(cells: &mut Vec<Cell>, idx: i64) {
    cells.retain(|c| c.col_index != idx);
    for c in cells.iter_mut() {
        if c.col_index > idx {
            c.col_index -= 1;
        }
    }
}

/// Cells in rendering order: by anchor row, then anchor column.
pub fn sorted_for_render(cells: &[Cell]) -> Vec<&Cell> {
    let mut out: Vec<&Cell> = cells.iter().collect();
    out.sort_by_key(|c| (c.row_index, c.col_index));
    out
}

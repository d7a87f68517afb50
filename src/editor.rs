use crate::grid::{self, Cell, CellType, GridError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROWS: i64 = 10;
pub const DEFAULT_COLS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coord {
    pub row: i64,
    pub col: i64,
}

/// Staged field changes applied on explicit update. Absent fields are left
/// untouched; spans are clamped to the current grid dimensions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellPatch {
    pub cell_type: Option<CellType>,
    pub label: Option<String>,
    pub rowspan: Option<i64>,
    pub colspan: Option<i64>,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum ClickOutcome {
    /// An occupied coordinate was clicked: a copy of the cell is staged.
    Edit { cell: Cell },
    /// An empty coordinate became the creation target.
    Target { at: Coord },
    /// Multi-select membership toggled for the coordinate.
    Toggled { at: Coord, selected: bool },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSnapshot {
    pub cells: Vec<Cell>,
    pub max_row: i64,
    pub max_col: i64,
    pub multi_select: bool,
    pub selected: Option<Coord>,
    pub selection: Vec<Coord>,
    pub editing: Option<Cell>,
}

/// Interactive authoring state for one template: the working cell set,
/// grid dimensions, the current selection and the staged edit copy.
#[derive(Debug, Clone)]
pub struct EditorSession {
    cells: Vec<Cell>,
    max_row: i64,
    max_col: i64,
    multi_select: bool,
    selected: Option<Coord>,
    selection: Vec<Coord>,
    editing: Option<Cell>,
}

impl EditorSession {
    pub fn new() -> EditorSession {
        EditorSession {
            cells: Vec::new(),
            max_row: DEFAULT_ROWS,
            max_col: DEFAULT_COLS,
            multi_select: false,
            selected: None,
            selection: Vec::new(),
            editing: None,
        }
    }

    pub fn from_cells(cells: Vec<Cell>) -> EditorSession {
        let (rows, cols) = grid::bounds(&cells);
        EditorSession {
            max_row: rows.max(DEFAULT_ROWS),
            max_col: cols.max(DEFAULT_COLS),
            cells,
            multi_select: false,
            selected: None,
            selection: Vec::new(),
            editing: None,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        EditorSnapshot {
            cells: grid::sorted_for_render(&self.cells)
                .into_iter()
                .cloned()
                .collect(),
            max_row: self.max_row,
            max_col: self.max_col,
            multi_select: self.multi_select,
            selected: self.selected,
            selection: self.selection.clone(),
            editing: self.editing.clone(),
        }
    }

    pub fn set_multi_select(&mut self, on: bool) {
        self.multi_select = on;
        self.selected = None;
        self.selection.clear();
        self.editing = None;
    }

    pub fn click(&mut self, row: i64, col: i64) -> ClickOutcome {
        let at = Coord { row, col };
        if self.multi_select {
            if let Some(pos) = self.selection.iter().position(|c| *c == at) {
                self.selection.remove(pos);
                return ClickOutcome::Toggled {
                    at,
                    selected: false,
                };
            }
            self.selection.push(at);
            return ClickOutcome::Toggled { at, selected: true };
        }
        if let Some(cell) = grid::cell_at(&self.cells, row, col) {
            let copy = cell.clone();
            self.editing = Some(copy.clone());
            self.selected = None;
            return ClickOutcome::Edit { cell: copy };
        }
        self.selected = Some(at);
        ClickOutcome::Target { at }
    }

    /// Instantiates 1x1 text cells: one at the creation target, or one per
    /// unoccupied selected coordinate in multi-select mode.
    pub fn create_cell(&mut self) -> Result<usize, GridError> {
        if self.multi_select {
            if self.selection.is_empty() {
                return Err(GridError::new("no_selection", "no coordinates selected"));
            }
            let mut created = 0;
            for at in std::mem::take(&mut self.selection) {
                if grid::is_occupied(&self.cells, at.row, at.col) {
                    continue;
                }
                self.cells.push(Cell::new(at.row, at.col, CellType::Text, ""));
                created += 1;
            }
            return Ok(created);
        }
        let Some(at) = self.selected.take() else {
            return Err(GridError::new("no_selection", "no coordinate selected"));
        };
        if grid::is_occupied(&self.cells, at.row, at.col) {
            return Err(GridError::new("occupied", "coordinate already holds a cell"));
        }
        self.cells.push(Cell::new(at.row, at.col, CellType::Text, ""));
        Ok(1)
    }

    fn apply_patch(&self, cell: &mut Cell, patch: &CellPatch) {
        if let Some(t) = patch.cell_type {
            cell.cell_type = t;
        }
        if let Some(label) = &patch.label {
            cell.label = label.clone();
        }
        if let Some(rs) = patch.rowspan {
            cell.rowspan = rs.clamp(1, self.max_row);
        }
        if let Some(cs) = patch.colspan {
            cell.colspan = cs.clamp(1, self.max_col);
        }
        if let Some(config) = &patch.config {
            cell.config = Some(config.clone());
        }
    }

    /// Commits staged field changes: to the single staged cell, or the same
    /// patch to every cell whose anchor is in the multi-selection. The cell
    /// set is left untouched when the result would violate disjointness.
    pub fn update_cell(&mut self, patch: &CellPatch) -> Result<usize, GridError> {
        if self.multi_select {
            if self.selection.is_empty() {
                return Err(GridError::new("no_selection", "no coordinates selected"));
            }
            let mut next = self.cells.clone();
            let mut updated = 0;
            for cell in next.iter_mut() {
                let anchor = Coord {
                    row: cell.row_index,
                    col: cell.col_index,
                };
                if self.selection.contains(&anchor) {
                    self.apply_patch(cell, patch);
                    updated += 1;
                }
            }
            if updated == 0 {
                return Err(GridError::new(
                    "no_selection",
                    "no selected coordinate holds a cell",
                ));
            }
            grid::ensure_disjoint(&next)?;
            self.cells = next;
            self.selection.clear();
            return Ok(updated);
        }

        let Some(staged) = self.editing.as_ref() else {
            return Err(GridError::new("no_selection", "no cell staged for edit"));
        };
        let mut updated = staged.clone();
        self.apply_patch(&mut updated, patch);
        let mut next = self.cells.clone();
        let Some(pos) = next.iter().position(|c| c.id == updated.id) else {
            return Err(GridError::new("not_found", "staged cell no longer exists"));
        };
        next[pos] = updated;
        grid::ensure_disjoint(&next)?;
        self.cells = next;
        self.editing = None;
        Ok(1)
    }

    pub fn split_horizontal(&mut self) -> Result<(), GridError> {
        let Some(staged) = self.editing.as_ref() else {
            return Err(GridError::new("no_selection", "no cell staged for edit"));
        };
        let (row, col) = (staged.row_index, staged.col_index);
        grid::split_horizontally(&mut self.cells, row, col)?;
        self.editing = None;
        Ok(())
    }

    pub fn split_vertical(&mut self) -> Result<(), GridError> {
        let Some(staged) = self.editing.as_ref() else {
            return Err(GridError::new("no_selection", "no cell staged for edit"));
        };
        let (row, col) = (staged.row_index, staged.col_index);
        grid::split_vertically(&mut self.cells, row, col)?;
        self.editing = None;
        Ok(())
    }

    pub fn delete_cell(&mut self, row: i64, col: i64) -> bool {
        let removed = grid::delete_cell(&mut self.cells, row, col);
        if removed {
            if let Some(staged) = self.editing.as_ref() {
                if staged.row_index == row && staged.col_index == col {
                    self.editing = None;
                }
            }
        }
        removed
    }

    pub fn add_row(&mut self) {
        self.max_row += 1;
    }

    pub fn add_column(&mut self) {
        self.max_col += 1;
    }

    pub fn delete_row(&mut self, idx: i64) -> Result<(), GridError> {
        if idx < 0 || idx >= self.max_row {
            return Err(GridError::new("bad_params", "row index out of range"));
        }
        grid::delete_row(&mut self.cells, idx);
        self.max_row = (self.max_row - 1).max(1);
        self.editing = None;
        Ok(())
    }

    pub fn delete_column(&mut self, idx: i64) -> Result<(), GridError> {
        if idx < 0 || idx >= self.max_col {
            return Err(GridError::new("bad_params", "column index out of range"));
        }
        grid::delete_column(&mut self.cells, idx);
        self.max_col = (self.max_col - 1).max(1);
        self.editing = None;
        Ok(())
    }

    /// Populates the unoccupied coordinates of a rectangular region with
    /// static cells labelled by a linear sequence from start to end, walked
    /// in row-major order. Occupied coordinates keep their position in the
    /// sequence but receive no cell.
    pub fn serial_fill(
        &mut self,
        start_row: i64,
        end_row: i64,
        start_col: i64,
        end_col: i64,
        start_number: f64,
        end_number: f64,
    ) -> Result<usize, GridError> {
        let (r0, r1) = (start_row.min(end_row), start_row.max(end_row));
        let (c0, c1) = (start_col.min(end_col), start_col.max(end_col));
        let cell_count = (r1 - r0 + 1) * (c1 - c0 + 1);
        let step = if cell_count > 1 {
            (end_number - start_number) / (cell_count - 1) as f64
        } else {
            0.0
        };

        let mut created = 0;
        let mut position = 0i64;
        for row in r0..=r1 {
            for col in c0..=c1 {
                let value = start_number + step * position as f64;
                position += 1;
                if grid::is_occupied(&self.cells, row, col) {
                    continue;
                }
                // f64-to-i64 casts saturate outside the i64 range; fall
                // back to the float's own text for such values.
                let rounded = value.round();
                let label = if rounded.is_finite() && rounded.abs() < 9.0e18 {
                    format!("{}", rounded as i64)
                } else {
                    format!("{}", rounded)
                };
                self.cells
                    .push(Cell::new(row, col, CellType::Static, &label));
                created += 1;
            }
        }
        Ok(created)
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        EditorSession::new()
    }
}

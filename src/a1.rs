//! A1 notation parsing for the few places a range has to become a grid range.

use crate::error::SheetsError;
use serde_json::{Map, Value, json};

/// Zero-based, end-exclusive bounds. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellBounds {
    pub start_row: Option<u32>,
    pub end_row: Option<u32>,
    pub start_col: Option<u32>,
    pub end_col: Option<u32>,
}

impl CellBounds {
    /// Sheets API `GridRange` for this area on `sheet_id`.
    pub fn to_grid_range(&self, sheet_id: i64) -> Value {
        let mut range = Map::new();
        range.insert("sheetId".into(), json!(sheet_id));
        if let Some(v) = self.start_row {
            range.insert("startRowIndex".into(), json!(v));
        }
        if let Some(v) = self.end_row {
            range.insert("endRowIndex".into(), json!(v));
        }
        if let Some(v) = self.start_col {
            range.insert("startColumnIndex".into(), json!(v));
        }
        if let Some(v) = self.end_col {
            range.insert("endColumnIndex".into(), json!(v));
        }
        Value::Object(range)
    }

    /// Split into one single-column range per column, as chart series expect.
    pub fn columns(&self) -> Vec<CellBounds> {
        match (self.start_col, self.end_col) {
            (Some(start), Some(end)) => (start..end)
                .map(|col| CellBounds {
                    start_col: Some(col),
                    end_col: Some(col + 1),
                    ..*self
                })
                .collect(),
            _ => vec![*self],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRef {
    row: Option<u32>,
    col: Option<u32>,
}

/// Parse the cell portion of an A1 range. A leading `Sheet!` prefix is ignored.
///
/// Accepts `A1`, `A1:D10`, `A:D` and `2:5`.
pub fn parse_range(input: &str) -> Result<CellBounds, SheetsError> {
    let cells = match input.rfind('!') {
        Some(idx) => &input[idx + 1..],
        None => input,
    };
    let cells = cells.trim();
    if cells.is_empty() {
        return Err(bad(input, "no cell reference"));
    }

    let (first, second) = match cells.split_once(':') {
        Some((a, b)) => (parse_cell(a, input)?, parse_cell(b, input)?),
        None => {
            let cell = parse_cell(cells, input)?;
            (cell, cell)
        }
    };

    if (first.row.is_none() && second.col.is_none())
        || (first.col.is_none() && second.row.is_none())
    {
        return Err(bad(input, "mixed column and row references"));
    }

    let (start_row, end_row) = ordered(first.row, second.row);
    let (start_col, end_col) = ordered(first.col, second.col);

    Ok(CellBounds {
        start_row,
        end_row: end_row.map(|r| r + 1),
        start_col,
        end_col: end_col.map(|c| c + 1),
    })
}

fn ordered(a: Option<u32>, b: Option<u32>) -> (Option<u32>, Option<u32>) {
    match (a, b) {
        (Some(a), Some(b)) => (Some(a.min(b)), Some(a.max(b))),
        // A missing side stays open, as in `A1:B` running to the end of column B.
        (a, b) => (a, b),
    }
}

fn parse_cell(cell: &str, input: &str) -> Result<CellRef, SheetsError> {
    let cell = cell.trim().replace('$', "");
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);

    if letters.is_empty() && digits.is_empty() {
        return Err(bad(input, "empty cell reference"));
    }
    if !letters.chars().all(|c| c.is_ascii_alphabetic())
        || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(bad(input, "expected a reference like B3"));
    }

    let col = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters).ok_or_else(|| bad(input, "column out of range"))?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        let row: u32 = digits.parse().map_err(|_| bad(input, "row out of range"))?;
        if row == 0 {
            return Err(bad(input, "rows start at 1"));
        }
        Some(row - 1)
    };
    Ok(CellRef { row, col })
}

/// Zero-based column index for letters such as `A` or `AB`.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut index: u32 = 0;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as u32).checked_sub('A' as u32)? + 1;
        if digit > 26 {
            return None;
        }
        index = index * 26 + digit;
    }
    Some(index - 1)
}

fn bad(input: &str, reason: &str) -> SheetsError {
    SheetsError::invalid_argument("data_range", format!("{input:?}: {reason}"))
}

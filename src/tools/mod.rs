pub mod charts;
pub mod formatting;
pub mod structure;
pub mod values;

pub use charts::*;
pub use formatting::*;
pub use structure::*;
pub use values::*;

use crate::error::SheetsError;
use crate::state::AppState;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

/// Rectangular block of cells on one sheet. Indices are 0-based, ends exclusive.
#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
pub struct GridRangeParams {
    /// Sheet ID (use sheets_get_sheet_id to find it)
    pub sheet_id: i64,
    /// Start row index (0-based, row 2 in the UI is index 1)
    pub start_row: u32,
    /// End row index (exclusive)
    pub end_row: u32,
    /// Start column index (0-based, column B is index 1)
    pub start_col: u32,
    /// End column index (exclusive)
    pub end_col: u32,
}

impl GridRangeParams {
    pub fn validate(&self) -> Result<(), SheetsError> {
        validate_span("end_row", self.start_row, self.end_row)?;
        validate_span("end_col", self.start_col, self.end_col)
    }

    pub fn to_api(&self) -> Value {
        json!({
            "sheetId": self.sheet_id,
            "startRowIndex": self.start_row,
            "endRowIndex": self.end_row,
            "startColumnIndex": self.start_col,
            "endColumnIndex": self.end_col,
        })
    }

    pub fn contains_col(&self, col: u32) -> bool {
        (self.start_col..self.end_col).contains(&col)
    }
}

pub(crate) fn validate_span(field: &str, start: u32, end: u32) -> Result<(), SheetsError> {
    if start >= end {
        return Err(SheetsError::invalid_argument(
            field,
            format!("must be greater than the start index ({start}), got {end}"),
        ));
    }
    Ok(())
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), SheetsError> {
    if value.trim().is_empty() {
        return Err(SheetsError::invalid_argument(field, "must not be empty"));
    }
    Ok(())
}

/// Parse `#RRGGBB` into a Sheets API color with channels in `0.0..=1.0`.
pub(crate) fn parse_hex_color(field: &str, input: &str) -> Result<Value, SheetsError> {
    let hex = input.trim().strip_prefix('#').unwrap_or(input.trim());
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SheetsError::invalid_argument(
            field,
            format!("expected a hex color like #1A2B3C, got {input:?}"),
        ));
    }
    let channel = |offset: usize| -> Result<f64, SheetsError> {
        u8::from_str_radix(&hex[offset..offset + 2], 16)
            .map(|v| f64::from(v) / 255.0)
            .map_err(|_| SheetsError::invalid_argument(field, "invalid hex digits"))
    };
    Ok(json!({
        "red": channel(0)?,
        "green": channel(2)?,
        "blue": channel(4)?,
    }))
}

/// Send one batchUpdate request and return the first reply.
pub(crate) async fn batch_update_single(
    state: &AppState,
    spreadsheet_id: &str,
    request: Value,
) -> Result<Value, SheetsError> {
    let api = state.sheets_api().await?;
    let response = api.batch_update(spreadsheet_id, vec![request]).await?;
    Ok(response.first_reply().clone())
}

pub(crate) fn reply_i64(reply: &Value, pointer: &str) -> i64 {
    reply.pointer(pointer).and_then(Value::as_i64).unwrap_or(0)
}

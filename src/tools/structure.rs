//! Row, sheet and range restructuring tools.

use super::{GridRangeParams, batch_update_single, reply_i64, require_non_empty, validate_span};
use crate::error::SheetsError;
use crate::model::{
    DeleteDuplicatesResponse, DeleteRowsResponse, DuplicateSheetResponse, FindReplaceResponse,
    InsertRowsResponse, MergeType, OperationResponse, PasteType, TrimWhitespaceResponse,
};
use crate::state::AppState;
use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteRowsParams {
    pub spreadsheet_id: String,
    /// Sheet ID (use sheets_get_sheet_id to find it)
    pub sheet_id: i64,
    /// Start row index (0-based, row 2 in the UI is index 1)
    pub start_row: u32,
    /// End row index (exclusive)
    pub end_row: u32,
}

pub async fn sheets_delete_rows(
    state: Arc<AppState>,
    params: DeleteRowsParams,
) -> Result<DeleteRowsResponse> {
    validate_span("end_row", params.start_row, params.end_row)?;
    let request = json!({
        "deleteDimension": {
            "range": {
                "sheetId": params.sheet_id,
                "dimension": "ROWS",
                "startIndex": params.start_row,
                "endIndex": params.end_row,
            }
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;

    let deleted = params.end_row - params.start_row;
    Ok(DeleteRowsResponse {
        success: true,
        deleted_rows: deleted,
        message: format!("Deleted {deleted} row(s)"),
    })
}

fn default_num_rows() -> u32 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InsertRowsParams {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    /// Row index to insert at (0-based)
    pub start_row: u32,
    /// Number of rows to insert
    #[serde(default = "default_num_rows")]
    pub num_rows: u32,
}

pub async fn sheets_insert_rows(
    state: Arc<AppState>,
    params: InsertRowsParams,
) -> Result<InsertRowsResponse> {
    if params.num_rows == 0 {
        return Err(SheetsError::invalid_argument("num_rows", "must be at least 1").into());
    }
    let end_row = params
        .start_row
        .checked_add(params.num_rows)
        .ok_or_else(|| SheetsError::invalid_argument("num_rows", "row index overflow"))?;
    let request = json!({
        "insertDimension": {
            "range": {
                "sheetId": params.sheet_id,
                "dimension": "ROWS",
                "startIndex": params.start_row,
                "endIndex": end_row,
            },
            "inheritFromBefore": false,
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;

    Ok(InsertRowsResponse {
        success: true,
        inserted_rows: params.num_rows,
        message: format!(
            "Inserted {} row(s) at row {}",
            params.num_rows,
            u64::from(params.start_row) + 1
        ),
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindReplaceParams {
    pub spreadsheet_id: String,
    /// Text to find
    pub find: String,
    /// Replacement text
    pub replacement: String,
    /// Limit the search to one sheet; all sheets when omitted
    #[serde(default)]
    pub sheet_id: Option<i64>,
    #[serde(default)]
    pub match_case: bool,
    /// Match entire cell contents only
    #[serde(default)]
    pub match_entire_cell: bool,
}

pub async fn sheets_find_replace(
    state: Arc<AppState>,
    params: FindReplaceParams,
) -> Result<FindReplaceResponse> {
    if params.find.is_empty() {
        return Err(SheetsError::invalid_argument("find", "must not be empty").into());
    }
    let mut spec = json!({
        "find": params.find,
        "replacement": params.replacement,
        "matchCase": params.match_case,
        "matchEntireCell": params.match_entire_cell,
    });
    match params.sheet_id {
        Some(sheet_id) => spec["sheetId"] = json!(sheet_id),
        None => spec["allSheets"] = json!(true),
    }

    let reply = batch_update_single(
        &state,
        &params.spreadsheet_id,
        json!({ "findReplace": spec }),
    )
    .await?;
    let replacements = reply_i64(&reply, "/findReplace/occurrencesChanged");
    Ok(FindReplaceResponse {
        success: true,
        replacements,
        message: format!("Replaced {replacements} occurrence(s)"),
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DuplicateSheetParams {
    pub spreadsheet_id: String,
    /// Sheet ID to duplicate
    pub source_sheet_id: i64,
    /// Name for the new sheet
    pub new_sheet_name: String,
}

pub async fn sheets_duplicate_sheet(
    state: Arc<AppState>,
    params: DuplicateSheetParams,
) -> Result<DuplicateSheetResponse> {
    require_non_empty("new_sheet_name", &params.new_sheet_name)?;
    let request = json!({
        "duplicateSheet": {
            "sourceSheetId": params.source_sheet_id,
            "newSheetName": params.new_sheet_name,
        }
    });
    let reply = batch_update_single(&state, &params.spreadsheet_id, request).await?;
    let properties = reply
        .pointer("/duplicateSheet/properties")
        .cloned()
        .unwrap_or(Value::Null);

    Ok(DuplicateSheetResponse {
        success: true,
        new_sheet_id: properties.get("sheetId").and_then(Value::as_i64),
        new_sheet_name: properties
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        message: format!("Duplicated sheet to \"{}\"", params.new_sheet_name),
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteDuplicatesParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
    /// Column indices compared when looking for duplicates (all columns when omitted)
    #[serde(default)]
    pub comparison_columns: Option<Vec<u32>>,
}

pub async fn sheets_delete_duplicates(
    state: Arc<AppState>,
    params: DeleteDuplicatesParams,
) -> Result<DeleteDuplicatesResponse> {
    params.range.validate()?;
    let mut spec = json!({ "range": params.range.to_api() });

    if let Some(columns) = params.comparison_columns.filter(|c| !c.is_empty()) {
        if let Some(outside) = columns.iter().find(|c| !params.range.contains_col(**c)) {
            return Err(SheetsError::invalid_argument(
                "comparison_columns",
                format!(
                    "column {outside} is outside the range {}..{}",
                    params.range.start_col, params.range.end_col
                ),
            )
            .into());
        }
        spec["comparisonColumns"] = columns
            .iter()
            .map(|col| {
                json!({
                    "sheetId": params.range.sheet_id,
                    "dimension": "COLUMNS",
                    "startIndex": col,
                    "endIndex": col + 1,
                })
            })
            .collect();
    }

    let reply = batch_update_single(
        &state,
        &params.spreadsheet_id,
        json!({ "deleteDuplicates": spec }),
    )
    .await?;
    let removed = reply_i64(&reply, "/deleteDuplicates/duplicatesRemovedCount");
    Ok(DeleteDuplicatesResponse {
        success: true,
        duplicates_removed: removed,
        message: format!("Removed {removed} duplicate row(s)"),
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TrimWhitespaceParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
}

pub async fn sheets_trim_whitespace(
    state: Arc<AppState>,
    params: TrimWhitespaceParams,
) -> Result<TrimWhitespaceResponse> {
    params.range.validate()?;
    let request = json!({ "trimWhitespace": { "range": params.range.to_api() } });
    let reply = batch_update_single(&state, &params.spreadsheet_id, request).await?;
    let trimmed = reply_i64(&reply, "/trimWhitespace/cellsChangedCount");
    Ok(TrimWhitespaceResponse {
        success: true,
        cells_trimmed: trimmed,
        message: format!("Trimmed whitespace from {trimmed} cell(s)"),
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergeCellsParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
    #[serde(default)]
    pub merge_type: MergeType,
}

pub async fn sheets_merge_cells(
    state: Arc<AppState>,
    params: MergeCellsParams,
) -> Result<OperationResponse> {
    params.range.validate()?;
    let request = json!({
        "mergeCells": {
            "range": params.range.to_api(),
            "mergeType": params.merge_type.as_ref(),
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;
    Ok(OperationResponse::ok(format!(
        "Merged cells with type: {}",
        params.merge_type
    )))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CopyPasteParams {
    pub spreadsheet_id: String,
    pub source_sheet_id: i64,
    /// Source start row (0-based)
    pub source_start_row: u32,
    /// Source end row (exclusive)
    pub source_end_row: u32,
    pub source_start_col: u32,
    pub source_end_col: u32,
    pub dest_sheet_id: i64,
    /// Destination top-left row (0-based)
    pub dest_start_row: u32,
    /// Destination top-left column (0-based)
    pub dest_start_col: u32,
    #[serde(default)]
    pub paste_type: PasteType,
}

pub async fn sheets_copy_paste(
    state: Arc<AppState>,
    params: CopyPasteParams,
) -> Result<OperationResponse> {
    let source = GridRangeParams {
        sheet_id: params.source_sheet_id,
        start_row: params.source_start_row,
        end_row: params.source_end_row,
        start_col: params.source_start_col,
        end_col: params.source_end_col,
    };
    validate_span("source_end_row", source.start_row, source.end_row)?;
    validate_span("source_end_col", source.start_col, source.end_col)?;

    let request = json!({
        "copyPaste": {
            "source": source.to_api(),
            "destination": {
                "sheetId": params.dest_sheet_id,
                "startRowIndex": params.dest_start_row,
                "startColumnIndex": params.dest_start_col,
            },
            "pasteType": params.paste_type.api_value(),
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;
    Ok(OperationResponse::ok(format!(
        "Copied range with paste type: {}",
        params.paste_type
    )))
}

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SortRangeParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
    /// Column index to sort by (0-based, must lie inside the range)
    pub sort_column: u32,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

pub async fn sheets_sort_range(
    state: Arc<AppState>,
    params: SortRangeParams,
) -> Result<OperationResponse> {
    params.range.validate()?;
    if !params.range.contains_col(params.sort_column) {
        return Err(SheetsError::invalid_argument(
            "sort_column",
            format!(
                "column {} is outside the range {}..{}",
                params.sort_column, params.range.start_col, params.range.end_col
            ),
        )
        .into());
    }
    let order = if params.ascending {
        "ASCENDING"
    } else {
        "DESCENDING"
    };
    let request = json!({
        "sortRange": {
            "range": params.range.to_api(),
            "sortSpecs": [{
                "dimensionIndex": params.sort_column,
                "sortOrder": order,
            }],
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;
    Ok(OperationResponse::ok(format!(
        "Sorted range by column {} ({})",
        params.sort_column,
        order.to_ascii_lowercase()
    )))
}

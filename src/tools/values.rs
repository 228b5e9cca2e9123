//! Spreadsheet creation and cell value tools.

use super::require_non_empty;
use crate::error::SheetsError;
use crate::model::{
    CreateSpreadsheetResponse, OperationResponse, ReadRangeResponse, SheetIdResponse, SheetSummary,
    WriteValuesResponse,
};
use crate::state::AppState;
use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const DEFAULT_SHEET_TITLE: &str = "Sheet1";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSpreadsheetParams {
    /// Title of the new spreadsheet
    pub title: String,
    /// Sheet names to create (defaults to a single "Sheet1")
    #[serde(default)]
    pub sheet_titles: Option<Vec<String>>,
}

pub async fn sheets_create(
    state: Arc<AppState>,
    params: CreateSpreadsheetParams,
) -> Result<CreateSpreadsheetResponse> {
    require_non_empty("title", &params.title)?;
    let sheet_titles = match params.sheet_titles {
        Some(titles) if !titles.is_empty() => titles,
        _ => vec![DEFAULT_SHEET_TITLE.to_string()],
    };
    for title in &sheet_titles {
        require_non_empty("sheet_titles", title)?;
    }

    let api = state.sheets_api().await?;
    let created = api.create_spreadsheet(&params.title, &sheet_titles).await?;
    tracing::info!(spreadsheet_id = %created.spreadsheet_id, "created spreadsheet");

    let spreadsheet_url = created.spreadsheet_url.clone().unwrap_or_else(|| {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/edit",
            created.spreadsheet_id
        )
    });
    Ok(CreateSpreadsheetResponse {
        sheets: created
            .sheets
            .iter()
            .map(|sheet| SheetSummary {
                sheet_id: sheet.properties.sheet_id,
                title: sheet.properties.title.clone(),
            })
            .collect(),
        spreadsheet_id: created.spreadsheet_id,
        spreadsheet_url,
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadRangeParams {
    pub spreadsheet_id: String,
    /// A1 notation range (e.g. 'Sheet1!A1:B10')
    pub range: String,
}

pub async fn sheets_read(
    state: Arc<AppState>,
    params: ReadRangeParams,
) -> Result<ReadRangeResponse> {
    let api = state.sheets_api().await?;
    let result = api.get_values(&params.spreadsheet_id, &params.range).await?;
    Ok(ReadRangeResponse {
        range: if result.range.is_empty() {
            params.range
        } else {
            result.range
        },
        values: result.values,
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteValuesParams {
    pub spreadsheet_id: String,
    /// A1 notation range (e.g. 'Sheet1!A1')
    pub range: String,
    /// 2D array of values; formulas such as =SUM(A1:A10) are evaluated
    pub values: Vec<Vec<Value>>,
}

pub async fn sheets_write(
    state: Arc<AppState>,
    params: WriteValuesParams,
) -> Result<WriteValuesResponse> {
    let api = state.sheets_api().await?;
    let result = api
        .update_values(&params.spreadsheet_id, &params.range, &params.values)
        .await?;
    Ok(WriteValuesResponse {
        updated_range: result.updated_range,
        updated_cells: result.updated_cells,
    })
}

pub async fn sheets_append(
    state: Arc<AppState>,
    params: WriteValuesParams,
) -> Result<WriteValuesResponse> {
    let api = state.sheets_api().await?;
    let result = api
        .append_values(&params.spreadsheet_id, &params.range, &params.values)
        .await?;
    Ok(WriteValuesResponse {
        updated_range: result.updates.updated_range,
        updated_cells: result.updates.updated_cells,
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetSheetIdParams {
    pub spreadsheet_id: String,
    /// Name of the sheet to find
    pub sheet_name: String,
}

pub async fn sheets_get_sheet_id(
    state: Arc<AppState>,
    params: GetSheetIdParams,
) -> Result<SheetIdResponse> {
    let api = state.sheets_api().await?;
    let spreadsheet = api.get_spreadsheet(&params.spreadsheet_id).await?;
    spreadsheet
        .sheets
        .iter()
        .find(|sheet| sheet.properties.title == params.sheet_name)
        .map(|sheet| SheetIdResponse {
            sheet_id: sheet.properties.sheet_id,
            sheet_name: params.sheet_name.clone(),
        })
        .ok_or_else(|| SheetsError::SheetNotFound(params.sheet_name.clone()).into())
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClearRangeParams {
    pub spreadsheet_id: String,
    /// A1 notation range to clear (e.g. 'Sheet1!A1:B10')
    pub range: String,
}

pub async fn sheets_clear_range(
    state: Arc<AppState>,
    params: ClearRangeParams,
) -> Result<OperationResponse> {
    let api = state.sheets_api().await?;
    api.clear_values(&params.spreadsheet_id, &params.range)
        .await?;
    Ok(OperationResponse::ok(format!(
        "Cleared range: {}",
        params.range
    )))
}

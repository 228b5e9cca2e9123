//! Cell formatting, borders, validation and conditional formatting.

use super::{GridRangeParams, batch_update_single, parse_hex_color};
use crate::error::SheetsError;
use crate::model::{BorderStyle, ConditionType, OperationResponse};
use crate::state::AppState;
use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FormatCellsParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
    #[serde(default)]
    pub bold: Option<bool>,
    #[serde(default)]
    pub italic: Option<bool>,
    /// Font size in points
    #[serde(default)]
    pub font_size: Option<u32>,
    /// Background color as hex (e.g. #FF0000)
    #[serde(default)]
    pub bg_color: Option<String>,
    /// Text color as hex (e.g. #000000)
    #[serde(default)]
    pub text_color: Option<String>,
}

pub async fn sheets_format_cells(
    state: Arc<AppState>,
    params: FormatCellsParams,
) -> Result<OperationResponse> {
    params.range.validate()?;

    let mut text_format = Map::new();
    if let Some(bold) = params.bold {
        text_format.insert("bold".into(), json!(bold));
    }
    if let Some(italic) = params.italic {
        text_format.insert("italic".into(), json!(italic));
    }
    if let Some(size) = params.font_size {
        if size == 0 {
            return Err(SheetsError::invalid_argument("font_size", "must be at least 1").into());
        }
        text_format.insert("fontSize".into(), json!(size));
    }
    if let Some(color) = params.text_color.as_deref() {
        text_format.insert(
            "foregroundColor".into(),
            parse_hex_color("text_color", color)?,
        );
    }

    let mut cell_format = Map::new();
    if !text_format.is_empty() {
        cell_format.insert("textFormat".into(), Value::Object(text_format));
    }
    if let Some(color) = params.bg_color.as_deref() {
        cell_format.insert("backgroundColor".into(), parse_hex_color("bg_color", color)?);
    }
    // An empty userEnteredFormat with this field mask would wipe existing formatting.
    if cell_format.is_empty() {
        return Err(SheetsError::invalid_argument(
            "format",
            "supply at least one of bold, italic, font_size, bg_color, text_color",
        )
        .into());
    }

    let request = json!({
        "repeatCell": {
            "range": params.range.to_api(),
            "cell": { "userEnteredFormat": Value::Object(cell_format) },
            "fields": "userEnteredFormat",
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;
    Ok(OperationResponse::ok("Formatted cells"))
}

fn default_border_color() -> String {
    "#000000".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddBordersParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
    #[serde(default)]
    pub style: BorderStyle,
    /// Border color as hex (e.g. #000000)
    #[serde(default = "default_border_color")]
    pub color: String,
}

pub async fn sheets_add_borders(
    state: Arc<AppState>,
    params: AddBordersParams,
) -> Result<OperationResponse> {
    params.range.validate()?;
    let border = json!({
        "style": params.style.as_ref(),
        "color": parse_hex_color("color", &params.color)?,
    });
    let request = json!({
        "updateBorders": {
            "range": params.range.to_api(),
            "top": border,
            "bottom": border,
            "left": border,
            "right": border,
            "innerHorizontal": border,
            "innerVertical": border,
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;
    Ok(OperationResponse::ok(format!(
        "Added {} borders",
        params.style
    )))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddDropdownParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
    /// Dropdown options
    pub values: Vec<String>,
}

pub async fn sheets_add_dropdown(
    state: Arc<AppState>,
    params: AddDropdownParams,
) -> Result<OperationResponse> {
    params.range.validate()?;
    if params.values.is_empty() {
        return Err(
            SheetsError::invalid_argument("values", "at least one option is required").into(),
        );
    }
    let options: Vec<Value> = params
        .values
        .iter()
        .map(|value| json!({ "userEnteredValue": value }))
        .collect();
    let request = json!({
        "setDataValidation": {
            "range": params.range.to_api(),
            "rule": {
                "condition": {
                    "type": "ONE_OF_LIST",
                    "values": options,
                },
                "showCustomUi": true,
            }
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;
    Ok(OperationResponse::ok(format!(
        "Added dropdown with {} option(s)",
        params.values.len()
    )))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConditionalFormatParams {
    pub spreadsheet_id: String,
    #[serde(flatten)]
    pub range: GridRangeParams,
    pub condition_type: ConditionType,
    /// Value to compare against; required unless the condition is BLANK or NOT_BLANK
    #[serde(default)]
    pub condition_value: Option<String>,
    /// Background color applied when the condition holds, as hex (e.g. #00FF00)
    pub bg_color: String,
}

pub async fn sheets_conditional_format(
    state: Arc<AppState>,
    params: ConditionalFormatParams,
) -> Result<OperationResponse> {
    params.range.validate()?;
    let background = parse_hex_color("bg_color", &params.bg_color)?;

    let mut condition = json!({ "type": params.condition_type.as_ref() });
    if params.condition_type.takes_value() {
        let value = params
            .condition_value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SheetsError::invalid_argument(
                    "condition_value",
                    format!("required for {}", params.condition_type),
                )
            })?;
        condition["values"] = json!([{ "userEnteredValue": value }]);
    }

    let request = json!({
        "addConditionalFormatRule": {
            "rule": {
                "ranges": [params.range.to_api()],
                "booleanRule": {
                    "condition": condition,
                    "format": { "backgroundColor": background },
                }
            },
            "index": 0,
        }
    });
    batch_update_single(&state, &params.spreadsheet_id, request).await?;
    Ok(OperationResponse::ok(format!(
        "Added conditional format rule: {}",
        params.condition_type
    )))
}

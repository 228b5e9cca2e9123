use super::{batch_update_single, require_non_empty};
use crate::a1::{self, CellBounds};
use crate::error::SheetsError;
use crate::model::{AddChartResponse, ChartType};
use crate::state::AppState;
use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddChartParams {
    pub spreadsheet_id: String,
    /// Sheet that holds the data and the chart
    pub sheet_id: i64,
    pub chart_type: ChartType,
    /// Data range in A1 notation; first column is the domain, the rest are series
    pub data_range: String,
    pub title: String,
    /// Anchor row for the chart's top-left corner
    #[serde(default)]
    pub row: u32,
    /// Anchor column for the chart's top-left corner
    #[serde(default)]
    pub col: u32,
}

pub async fn sheets_add_chart(
    state: Arc<AppState>,
    params: AddChartParams,
) -> Result<AddChartResponse> {
    require_non_empty("title", &params.title)?;
    let bounds = a1::parse_range(&params.data_range)?;
    let spec = chart_spec(&params, &bounds)?;

    let request = json!({
        "addChart": {
            "chart": {
                "spec": spec,
                "position": {
                    "overlayPosition": {
                        "anchorCell": {
                            "sheetId": params.sheet_id,
                            "rowIndex": params.row,
                            "columnIndex": params.col,
                        }
                    }
                }
            }
        }
    });
    let reply = batch_update_single(&state, &params.spreadsheet_id, request).await?;
    let chart_id = reply
        .pointer("/addChart/chart/chartId")
        .and_then(Value::as_i64);

    Ok(AddChartResponse {
        success: true,
        chart_id,
        message: format!("Added {} chart: {}", params.chart_type, params.title),
    })
}

fn source(bounds: &CellBounds, sheet_id: i64) -> Value {
    json!({ "sourceRange": { "sources": [bounds.to_grid_range(sheet_id)] } })
}

fn chart_spec(params: &AddChartParams, bounds: &CellBounds) -> Result<Value, SheetsError> {
    let columns = bounds.columns();
    let (domain, series) = match columns.split_first() {
        Some((domain, series)) if !series.is_empty() => (domain, series),
        _ => {
            return Err(SheetsError::invalid_argument(
                "data_range",
                "must span at least two columns: one domain column and one or more series",
            ));
        }
    };

    if params.chart_type == ChartType::Pie {
        return Ok(json!({
            "title": params.title,
            "pieChart": {
                "legendPosition": "RIGHT_LEGEND",
                "domain": source(domain, params.sheet_id),
                "series": source(&series[0], params.sheet_id),
            }
        }));
    }

    let series: Vec<Value> = series
        .iter()
        .map(|column| {
            json!({
                "series": source(column, params.sheet_id),
                "targetAxis": "LEFT_AXIS",
            })
        })
        .collect();

    Ok(json!({
        "title": params.title,
        "basicChart": {
            "chartType": params.chart_type.as_ref(),
            "legendPosition": "RIGHT_LEGEND",
            "axis": [
                { "position": "BOTTOM_AXIS" },
                { "position": "LEFT_AXIS" },
            ],
            "domains": [{ "domain": source(domain, params.sheet_id) }],
            "series": series,
            "headerCount": 1,
        }
    }))
}

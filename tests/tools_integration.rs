mod support;

use google_sheets_mcp::model::ChartType;
use google_sheets_mcp::tools::{self, AddChartParams, GridRangeParams};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use support::mcp::{call_tool, connect, error_code, structured};
use support::{Call, CredsDir, TestHarness};

#[tokio::test]
async fn lists_all_twenty_tools() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    assert_eq!(harness.server().tool_count(), 20);

    let client = connect(harness.server()).await?;
    let tools = client.list_all_tools().await?;
    assert_eq!(tools.len(), 20);
    assert!(tools.iter().any(|tool| tool.name == "sheets_conditional_format"));
    let read = tools
        .iter()
        .find(|tool| tool.name == "sheets_read")
        .expect("sheets_read listed");
    assert!(
        read.description
            .as_deref()
            .is_some_and(|text| text.contains("{range, values}"))
    );
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn write_then_read_returns_same_values() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let client = connect(harness.server()).await?;

    let write = client
        .call_tool(call_tool(
            "sheets_write",
            json!({
                "spreadsheet_id": "abc",
                "range": "Sheet1!A1:B2",
                "values": [["Name", "Total"], ["Ada", "=SUM(C1:C3)"]],
            }),
        ))
        .await?;
    let write = structured(&write);
    assert_eq!(write["updatedCells"], 4);
    assert_eq!(write["updatedRange"], "Sheet1!A1:B2");

    let read = client
        .call_tool(call_tool(
            "sheets_read",
            json!({ "spreadsheet_id": "abc", "range": "Sheet1!A1:B2" }),
        ))
        .await?;
    let read = structured(&read);
    assert_eq!(
        read["values"],
        json!([["Name", "Total"], ["Ada", "=SUM(C1:C3)"]])
    );

    assert!(harness.sheets.tokens_seen().contains("cached-access"));
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn plain_values_round_trip() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let client = connect(harness.server()).await?;
    let values = json!([["a", "1"], ["b", "2"]]);

    client
        .call_tool(call_tool(
            "sheets_write",
            json!({ "spreadsheet_id": "abc", "range": "Sheet1!A1:B2", "values": values }),
        ))
        .await?;
    let read = client
        .call_tool(call_tool(
            "sheets_read",
            json!({ "spreadsheet_id": "abc", "range": "Sheet1!A1:B2" }),
        ))
        .await?;
    assert_eq!(structured(&read)["values"], values);
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn clearing_twice_leaves_the_same_empty_range() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let client = connect(harness.server()).await?;
    let range = "Sheet1!A1:C3";

    client
        .call_tool(call_tool(
            "sheets_write",
            json!({ "spreadsheet_id": "abc", "range": range, "values": [["x", "y", "z"]] }),
        ))
        .await?;

    let mut reads = Vec::new();
    for _ in 0..2 {
        let result = client
            .call_tool(call_tool(
                "sheets_clear_range",
                json!({ "spreadsheet_id": "abc", "range": range }),
            ))
            .await?;
        let body = structured(&result);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Cleared range: Sheet1!A1:C3");

        let read = client
            .call_tool(call_tool(
                "sheets_read",
                json!({ "spreadsheet_id": "abc", "range": range }),
            ))
            .await?;
        reads.push(structured(&read)["values"].clone());
    }
    assert_eq!(reads[0], json!([]));
    assert_eq!(reads[0], reads[1]);
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn created_sheet_can_be_looked_up() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let client = connect(harness.server()).await?;

    let created = client
        .call_tool(call_tool(
            "sheets_create",
            json!({ "title": "Budget", "sheet_titles": ["Income", "Expenses"] }),
        ))
        .await?;
    let created = structured(&created);
    let spreadsheet_id = created["spreadsheetId"].as_str().expect("id").to_string();
    assert_eq!(
        created["spreadsheetUrl"],
        format!("https://docs.google.com/spreadsheets/d/{spreadsheet_id}/edit")
    );
    let sheets = created["sheets"].as_array().cloned().unwrap_or_default();
    assert_eq!(sheets.len(), 2);

    let mut found = BTreeSet::new();
    for sheet in &sheets {
        let title = sheet["title"].as_str().expect("title");
        let lookup = client
            .call_tool(call_tool(
                "sheets_get_sheet_id",
                json!({ "spreadsheet_id": spreadsheet_id, "sheet_name": title }),
            ))
            .await?;
        assert_eq!(structured(&lookup)["sheetId"], sheet["sheetId"]);
        found.insert(title.to_string());
    }
    assert_eq!(
        found,
        BTreeSet::from(["Expenses".to_string(), "Income".to_string()])
    );

    let missing = client
        .call_tool(call_tool(
            "sheets_get_sheet_id",
            json!({ "spreadsheet_id": spreadsheet_id, "sheet_name": "Nope" }),
        ))
        .await;
    assert!(missing.is_err());
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn create_defaults_to_single_sheet() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let response = tools::sheets_create(
        harness.state.clone(),
        tools::CreateSpreadsheetParams {
            title: "Empty".to_string(),
            sheet_titles: None,
        },
    )
    .await?;
    assert_eq!(response.sheets.len(), 1);
    assert_eq!(response.sheets[0].title, "Sheet1");
    assert_eq!(
        harness.sheets.calls()[0],
        Call::Create {
            title: "Empty".to_string(),
            sheets: vec!["Sheet1".to_string()],
        }
    );
    Ok(())
}

fn with_grid(mut args: Value) -> Value {
    let grid = json!({
        "spreadsheet_id": "abc",
        "sheet_id": 0,
        "start_row": 0,
        "end_row": 2,
        "start_col": 0,
        "end_col": 2,
    });
    if let (Some(args), Value::Object(grid)) = (args.as_object_mut(), grid) {
        args.extend(grid);
    }
    args
}

#[tokio::test]
async fn out_of_set_enum_values_are_rejected_before_any_call() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let client = connect(harness.server()).await?;

    let cases = [
        (
            "sheets_add_chart",
            json!({
                "spreadsheet_id": "abc",
                "sheet_id": 0,
                "chart_type": "DONUT",
                "data_range": "A1:B5",
                "title": "Sales",
            }),
        ),
        (
            "sheets_copy_paste",
            json!({
                "spreadsheet_id": "abc",
                "source_sheet_id": 0,
                "source_start_row": 0,
                "source_end_row": 2,
                "source_start_col": 0,
                "source_end_col": 2,
                "dest_sheet_id": 1,
                "dest_start_row": 5,
                "dest_start_col": 0,
                "paste_type": "EVERYTHING",
            }),
        ),
        ("sheets_add_borders", with_grid(json!({ "style": "WAVY" }))),
        (
            "sheets_merge_cells",
            with_grid(json!({ "merge_type": "MERGE_DIAGONAL" })),
        ),
        (
            "sheets_conditional_format",
            with_grid(json!({
                "condition_type": "NUMBER_ODD",
                "condition_value": "1",
                "bg_color": "#00FF00",
            })),
        ),
    ];

    for (tool, args) in cases {
        let result = client.call_tool(call_tool(tool, args)).await;
        assert_eq!(error_code(&result), Some(-32602), "{tool}");
    }
    assert!(harness.sheets.calls().is_empty());
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn chart_reports_new_chart_id() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    harness
        .sheets
        .push_reply(json!({ "addChart": { "chart": { "chartId": 4242 } } }));

    let response = tools::sheets_add_chart(
        harness.state.clone(),
        AddChartParams {
            spreadsheet_id: "abc".to_string(),
            sheet_id: 7,
            chart_type: ChartType::Column,
            data_range: "Data!A1:C10".to_string(),
            title: "Sales".to_string(),
            row: 2,
            col: 5,
        },
    )
    .await?;
    assert_eq!(response.chart_id, Some(4242));

    let requests = harness.sheets.batch_requests();
    let anchor = &requests[0]["addChart"]["chart"]["position"]["overlayPosition"]["anchorCell"];
    assert_eq!(anchor["sheetId"], 7);
    assert_eq!(anchor["rowIndex"], 2);
    assert_eq!(anchor["columnIndex"], 5);
    Ok(())
}

#[tokio::test]
async fn delete_rows_forwards_dimension_range() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let response = tools::sheets_delete_rows(
        harness.state.clone(),
        tools::DeleteRowsParams {
            spreadsheet_id: "abc".to_string(),
            sheet_id: 3,
            start_row: 1,
            end_row: 4,
        },
    )
    .await?;
    assert_eq!(response.message, "Deleted 3 row(s)");
    assert_eq!(
        harness.sheets.batch_requests(),
        vec![json!({
            "deleteDimension": {
                "range": { "sheetId": 3, "dimension": "ROWS", "startIndex": 1, "endIndex": 4 }
            }
        })]
    );
    Ok(())
}

#[tokio::test]
async fn inverted_row_span_is_rejected() {
    let harness = TestHarness::ready();
    let result = tools::sheets_delete_rows(
        harness.state.clone(),
        tools::DeleteRowsParams {
            spreadsheet_id: "abc".to_string(),
            sheet_id: 3,
            start_row: 5,
            end_row: 5,
        },
    )
    .await;
    assert!(result.is_err());
    assert!(harness.sheets.calls().is_empty());
}

#[tokio::test]
async fn find_replace_without_sheet_searches_all_sheets() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    harness
        .sheets
        .push_reply(json!({ "findReplace": { "occurrencesChanged": 6 } }));

    let response = tools::sheets_find_replace(
        harness.state.clone(),
        tools::FindReplaceParams {
            spreadsheet_id: "abc".to_string(),
            find: "foo".to_string(),
            replacement: "bar".to_string(),
            sheet_id: None,
            match_case: false,
            match_entire_cell: false,
        },
    )
    .await?;
    assert_eq!(response.replacements, 6);
    assert_eq!(response.message, "Replaced 6 occurrence(s)");

    let request = &harness.sheets.batch_requests()[0]["findReplace"];
    assert_eq!(request["allSheets"], true);
    assert!(request.get("sheetId").is_none());
    Ok(())
}

#[tokio::test]
async fn format_cells_converts_hex_colors() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    tools::sheets_format_cells(
        harness.state.clone(),
        tools::FormatCellsParams {
            spreadsheet_id: "abc".to_string(),
            range: GridRangeParams {
                sheet_id: 0,
                start_row: 0,
                end_row: 1,
                start_col: 0,
                end_col: 3,
            },
            bold: Some(true),
            italic: None,
            font_size: None,
            bg_color: Some("#FF0000".to_string()),
            text_color: None,
        },
    )
    .await?;

    let request = &harness.sheets.batch_requests()[0]["repeatCell"];
    assert_eq!(request["fields"], "userEnteredFormat");
    let format = &request["cell"]["userEnteredFormat"];
    assert_eq!(format["textFormat"]["bold"], true);
    assert_eq!(format["backgroundColor"]["red"], 1.0);
    assert_eq!(format["backgroundColor"]["green"], 0.0);
    Ok(())
}

#[tokio::test]
async fn bad_color_is_rejected_before_any_call() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let client = connect(harness.server()).await?;
    let result = client
        .call_tool(call_tool(
            "sheets_add_borders",
            json!({
                "spreadsheet_id": "abc",
                "sheet_id": 0,
                "start_row": 0,
                "end_row": 2,
                "start_col": 0,
                "end_col": 2,
                "color": "red",
            }),
        ))
        .await;
    assert!(result.is_err());
    assert!(harness.sheets.calls().is_empty());
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn disabled_tool_is_refused() -> anyhow::Result<()> {
    let creds = CredsDir::new();
    creds.write_valid_token();
    let harness = TestHarness::with_creds(creds, |config| {
        config.enabled_tools = Some(["sheets_read".to_string()].into_iter().collect());
    });
    let client = connect(harness.server()).await?;

    let result = client
        .call_tool(call_tool(
            "sheets_clear_range",
            json!({ "spreadsheet_id": "abc", "range": "A1" }),
        ))
        .await;
    assert!(result.is_err());
    assert!(harness.sheets.calls().is_empty());
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn tools_fail_without_credentials() -> anyhow::Result<()> {
    let harness = TestHarness::with_creds(CredsDir::new(), |_| {});
    let client = connect(harness.server()).await?;

    let result = client
        .call_tool(call_tool(
            "sheets_read",
            json!({ "spreadsheet_id": "abc", "range": "A1" }),
        ))
        .await;
    assert!(result.is_err());
    assert!(harness.sheets.calls().is_empty());
    client.cancel().await?;
    Ok(())
}

fn grid(sheet_id: i64, rows: (u32, u32), cols: (u32, u32)) -> GridRangeParams {
    GridRangeParams {
        sheet_id,
        start_row: rows.0,
        end_row: rows.1,
        start_col: cols.0,
        end_col: cols.1,
    }
}

#[tokio::test]
async fn append_then_insert_rows() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let appended = tools::sheets_append(
        harness.state.clone(),
        tools::WriteValuesParams {
            spreadsheet_id: "abc".to_string(),
            range: "Log!A1".to_string(),
            values: vec![vec![json!("2024-01-01"), json!(12)]],
        },
    )
    .await?;
    assert_eq!(appended.updated_cells, 2);

    let inserted = tools::sheets_insert_rows(
        harness.state.clone(),
        tools::InsertRowsParams {
            spreadsheet_id: "abc".to_string(),
            sheet_id: 0,
            start_row: 4,
            num_rows: 2,
        },
    )
    .await?;
    assert_eq!(inserted.message, "Inserted 2 row(s) at row 5");
    let request = &harness.sheets.batch_requests()[0]["insertDimension"];
    assert_eq!(request["range"]["endIndex"], 6);
    assert_eq!(request["inheritFromBefore"], false);
    Ok(())
}

#[tokio::test]
async fn duplicate_sheet_reports_new_properties() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    harness.sheets.push_reply(json!({
        "duplicateSheet": { "properties": { "sheetId": 77, "title": "Copy" } }
    }));
    let response = tools::sheets_duplicate_sheet(
        harness.state.clone(),
        tools::DuplicateSheetParams {
            spreadsheet_id: "abc".to_string(),
            source_sheet_id: 0,
            new_sheet_name: "Copy".to_string(),
        },
    )
    .await?;
    assert_eq!(response.new_sheet_id, Some(77));
    assert_eq!(response.message, "Duplicated sheet to \"Copy\"");
    Ok(())
}

#[tokio::test]
async fn delete_duplicates_checks_comparison_columns() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let outside = tools::sheets_delete_duplicates(
        harness.state.clone(),
        tools::DeleteDuplicatesParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(1, (0, 10), (0, 3)),
            comparison_columns: Some(vec![5]),
        },
    )
    .await;
    assert!(outside.is_err());
    assert!(harness.sheets.calls().is_empty());

    harness
        .sheets
        .push_reply(json!({ "deleteDuplicates": { "duplicatesRemovedCount": 2 } }));
    let response = tools::sheets_delete_duplicates(
        harness.state.clone(),
        tools::DeleteDuplicatesParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(1, (0, 10), (0, 3)),
            comparison_columns: Some(vec![1]),
        },
    )
    .await?;
    assert_eq!(response.message, "Removed 2 duplicate row(s)");
    let columns = &harness.sheets.batch_requests()[0]["deleteDuplicates"]["comparisonColumns"];
    assert_eq!(columns[0]["startIndex"], 1);
    assert_eq!(columns[0]["endIndex"], 2);
    Ok(())
}

#[tokio::test]
async fn trim_and_merge_forward_ranges() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    harness
        .sheets
        .push_reply(json!({ "trimWhitespace": { "cellsChangedCount": 9 } }));
    let trimmed = tools::sheets_trim_whitespace(
        harness.state.clone(),
        tools::TrimWhitespaceParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(0, (0, 3), (0, 3)),
        },
    )
    .await?;
    assert_eq!(trimmed.cells_trimmed, 9);

    let merged = tools::sheets_merge_cells(
        harness.state.clone(),
        tools::MergeCellsParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(0, (0, 1), (0, 4)),
            merge_type: Default::default(),
        },
    )
    .await?;
    assert_eq!(merged.message, "Merged cells with type: MERGE_ALL");
    let requests = harness.sheets.batch_requests();
    assert_eq!(requests[1]["mergeCells"]["mergeType"], "MERGE_ALL");
    assert_eq!(requests[1]["mergeCells"]["range"]["endColumnIndex"], 4);
    Ok(())
}

#[tokio::test]
async fn copy_paste_uses_api_paste_type() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let client = connect(harness.server()).await?;
    let result = client
        .call_tool(call_tool(
            "sheets_copy_paste",
            json!({
                "spreadsheet_id": "abc",
                "source_sheet_id": 0,
                "source_start_row": 0,
                "source_end_row": 2,
                "source_start_col": 0,
                "source_end_col": 2,
                "dest_sheet_id": 1,
                "dest_start_row": 5,
                "dest_start_col": 0,
                "paste_type": "VALUES",
            }),
        ))
        .await?;
    assert_eq!(
        structured(&result)["message"],
        "Copied range with paste type: VALUES"
    );
    let request = &harness.sheets.batch_requests()[0]["copyPaste"];
    assert_eq!(request["pasteType"], "PASTE_VALUES");
    assert_eq!(request["destination"]["startRowIndex"], 5);
    client.cancel().await?;
    Ok(())
}

#[tokio::test]
async fn sort_column_must_be_inside_range() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let outside = tools::sheets_sort_range(
        harness.state.clone(),
        tools::SortRangeParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(0, (1, 20), (0, 4)),
            sort_column: 4,
            ascending: true,
        },
    )
    .await;
    assert!(outside.is_err());

    tools::sheets_sort_range(
        harness.state.clone(),
        tools::SortRangeParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(0, (1, 20), (0, 4)),
            sort_column: 2,
            ascending: false,
        },
    )
    .await?;
    let spec = &harness.sheets.batch_requests()[0]["sortRange"]["sortSpecs"][0];
    assert_eq!(spec["dimensionIndex"], 2);
    assert_eq!(spec["sortOrder"], "DESCENDING");
    Ok(())
}

#[tokio::test]
async fn dropdown_and_conditional_format_payloads() -> anyhow::Result<()> {
    let harness = TestHarness::ready();
    let dropdown = tools::sheets_add_dropdown(
        harness.state.clone(),
        tools::AddDropdownParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(0, (1, 50), (2, 3)),
            values: vec!["Open".to_string(), "Closed".to_string()],
        },
    )
    .await?;
    assert_eq!(dropdown.message, "Added dropdown with 2 option(s)");

    let missing_value = tools::sheets_conditional_format(
        harness.state.clone(),
        tools::ConditionalFormatParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(0, (1, 50), (3, 4)),
            condition_type: google_sheets_mcp::model::ConditionType::NumberGreater,
            condition_value: None,
            bg_color: "#00FF00".to_string(),
        },
    )
    .await;
    assert!(missing_value.is_err());

    tools::sheets_conditional_format(
        harness.state.clone(),
        tools::ConditionalFormatParams {
            spreadsheet_id: "abc".to_string(),
            range: grid(0, (1, 50), (3, 4)),
            condition_type: google_sheets_mcp::model::ConditionType::NumberGreater,
            condition_value: Some("100".to_string()),
            bg_color: "#00FF00".to_string(),
        },
    )
    .await?;

    let requests = harness.sheets.batch_requests();
    assert_eq!(requests.len(), 2);
    let validation = &requests[0]["setDataValidation"]["rule"];
    assert_eq!(validation["condition"]["type"], "ONE_OF_LIST");
    assert_eq!(validation["condition"]["values"][1]["userEnteredValue"], "Closed");
    assert_eq!(validation["showCustomUi"], true);

    let rule = &requests[1]["addConditionalFormatRule"];
    assert_eq!(rule["index"], 0);
    let condition = &rule["rule"]["booleanRule"]["condition"];
    assert_eq!(condition["type"], "NUMBER_GREATER");
    assert_eq!(condition["values"][0]["userEnteredValue"], "100");
    Ok(())
}

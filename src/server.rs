use crate::config::ServerConfig;
use crate::error::{ToolDisabledError, to_rmcp_error};
use crate::model::{
    AddChartResponse, CreateSpreadsheetResponse, DeleteDuplicatesResponse, DeleteRowsResponse,
    DuplicateSheetResponse, FindReplaceResponse, InsertRowsResponse, OperationResponse,
    ReadRangeResponse, SheetIdResponse, TrimWhitespaceResponse, WriteValuesResponse,
};
use crate::state::AppState;
use crate::tools;
use anyhow::Result;
use rmcp::{
    ErrorData as McpError, Json, ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
};
use std::sync::Arc;

const INSTRUCTIONS: &str = "\
Google Sheets MCP: create, read, write and format Google Sheets spreadsheets.

WORKFLOW:
1) sheets_create for a new spreadsheet, or use an existing spreadsheet_id
2) sheets_get_sheet_id to turn a sheet name into the numeric sheet_id that structural tools need
3) sheets_read / sheets_write / sheets_append / sheets_clear_range work with A1 ranges (e.g. Sheet1!A1:C10)
4) Structural and formatting tools take sheet_id plus 0-based start_row/start_col and exclusive end_row/end_col

VALUES: Written as if typed by a user, so =SUM(A1:A10) becomes a formula.

ENUMS: chart_type COLUMN|BAR|LINE|AREA|SCATTER|PIE; merge_type MERGE_ALL|MERGE_COLUMNS|MERGE_ROWS; \
paste_type NORMAL|VALUES|FORMAT|NO_BORDERS|FORMULA|DATA_VALIDATION|CONDITIONAL_FORMATTING; \
style SOLID|SOLID_MEDIUM|SOLID_THICK|DASHED|DOTTED|DOUBLE.

COLORS: hex #RRGGBB.

ERRORS: Arguments that fail schema checks (unknown enum values, wrong types) return invalid_params \
without a data payload. Arguments rejected after parsing return invalid_params with data.kind \
InvalidArgument. Treat both as a bad argument.";

#[derive(Clone)]
pub struct SheetsServer {
    state: Arc<AppState>,
    tool_router: ToolRouter<SheetsServer>,
}

impl SheetsServer {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let state = Arc::new(AppState::new(config)?);
        Ok(Self::from_state(state))
    }

    pub fn from_state(state: Arc<AppState>) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Number of registered tools, independent of the enabled-tools filter.
    pub fn tool_count(&self) -> usize {
        self.tool_router.list_all().len()
    }

    pub async fn run_stdio(self) -> Result<()> {
        let service = self
            .serve(stdio())
            .await
            .inspect_err(|error| tracing::error!("serving error: {:?}", error))?;
        service.waiting().await?;
        Ok(())
    }

    fn ensure_tool_enabled(&self, tool: &str) -> Result<()> {
        tracing::info!(tool = tool, "tool invocation requested");
        if self.state.config().is_tool_enabled(tool) {
            Ok(())
        } else {
            Err(ToolDisabledError::new(tool).into())
        }
    }
}

#[tool_router]
impl SheetsServer {
    #[tool(
        name = "sheets_create",
        description = "Create a new spreadsheet, optionally with named sheets"
    )]
    pub async fn sheets_create(
        &self,
        Parameters(params): Parameters<tools::CreateSpreadsheetParams>,
    ) -> Result<Json<CreateSpreadsheetResponse>, McpError> {
        self.ensure_tool_enabled("sheets_create")
            .map_err(to_rmcp_error)?;
        tools::sheets_create(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_read",
        description = "Read values from an A1 range. Returns {range, values}; values is the 2D array of rows"
    )]
    pub async fn sheets_read(
        &self,
        Parameters(params): Parameters<tools::ReadRangeParams>,
    ) -> Result<Json<ReadRangeResponse>, McpError> {
        self.ensure_tool_enabled("sheets_read")
            .map_err(to_rmcp_error)?;
        tools::sheets_read(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_write",
        description = "Write a 2D array of values to an A1 range (supports formulas like =SUM(A1:A10))"
    )]
    pub async fn sheets_write(
        &self,
        Parameters(params): Parameters<tools::WriteValuesParams>,
    ) -> Result<Json<WriteValuesResponse>, McpError> {
        self.ensure_tool_enabled("sheets_write")
            .map_err(to_rmcp_error)?;
        tools::sheets_write(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_append",
        description = "Append rows after the last row of data in a range"
    )]
    pub async fn sheets_append(
        &self,
        Parameters(params): Parameters<tools::WriteValuesParams>,
    ) -> Result<Json<WriteValuesResponse>, McpError> {
        self.ensure_tool_enabled("sheets_append")
            .map_err(to_rmcp_error)?;
        tools::sheets_append(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_get_sheet_id",
        description = "Look up the numeric sheet ID for a sheet name (needed by structural tools)"
    )]
    pub async fn sheets_get_sheet_id(
        &self,
        Parameters(params): Parameters<tools::GetSheetIdParams>,
    ) -> Result<Json<SheetIdResponse>, McpError> {
        self.ensure_tool_enabled("sheets_get_sheet_id")
            .map_err(to_rmcp_error)?;
        tools::sheets_get_sheet_id(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_delete_rows",
        description = "Delete rows from a sheet. Row indices are 0-based, end exclusive"
    )]
    pub async fn sheets_delete_rows(
        &self,
        Parameters(params): Parameters<tools::DeleteRowsParams>,
    ) -> Result<Json<DeleteRowsResponse>, McpError> {
        self.ensure_tool_enabled("sheets_delete_rows")
            .map_err(to_rmcp_error)?;
        tools::sheets_delete_rows(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_insert_rows",
        description = "Insert blank rows into a sheet. Row indices are 0-based"
    )]
    pub async fn sheets_insert_rows(
        &self,
        Parameters(params): Parameters<tools::InsertRowsParams>,
    ) -> Result<Json<InsertRowsResponse>, McpError> {
        self.ensure_tool_enabled("sheets_insert_rows")
            .map_err(to_rmcp_error)?;
        tools::sheets_insert_rows(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_clear_range",
        description = "Clear values from an A1 range (formatting is kept)"
    )]
    pub async fn sheets_clear_range(
        &self,
        Parameters(params): Parameters<tools::ClearRangeParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_clear_range")
            .map_err(to_rmcp_error)?;
        tools::sheets_clear_range(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_find_replace",
        description = "Find and replace text in one sheet or across all sheets"
    )]
    pub async fn sheets_find_replace(
        &self,
        Parameters(params): Parameters<tools::FindReplaceParams>,
    ) -> Result<Json<FindReplaceResponse>, McpError> {
        self.ensure_tool_enabled("sheets_find_replace")
            .map_err(to_rmcp_error)?;
        tools::sheets_find_replace(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_duplicate_sheet",
        description = "Duplicate a sheet within the same spreadsheet"
    )]
    pub async fn sheets_duplicate_sheet(
        &self,
        Parameters(params): Parameters<tools::DuplicateSheetParams>,
    ) -> Result<Json<DuplicateSheetResponse>, McpError> {
        self.ensure_tool_enabled("sheets_duplicate_sheet")
            .map_err(to_rmcp_error)?;
        tools::sheets_duplicate_sheet(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_delete_duplicates",
        description = "Delete duplicate rows in a range, optionally comparing only some columns"
    )]
    pub async fn sheets_delete_duplicates(
        &self,
        Parameters(params): Parameters<tools::DeleteDuplicatesParams>,
    ) -> Result<Json<DeleteDuplicatesResponse>, McpError> {
        self.ensure_tool_enabled("sheets_delete_duplicates")
            .map_err(to_rmcp_error)?;
        tools::sheets_delete_duplicates(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_trim_whitespace",
        description = "Trim leading and trailing whitespace from every cell in a range"
    )]
    pub async fn sheets_trim_whitespace(
        &self,
        Parameters(params): Parameters<tools::TrimWhitespaceParams>,
    ) -> Result<Json<TrimWhitespaceResponse>, McpError> {
        self.ensure_tool_enabled("sheets_trim_whitespace")
            .map_err(to_rmcp_error)?;
        tools::sheets_trim_whitespace(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_merge_cells",
        description = "Merge the cells of a range"
    )]
    pub async fn sheets_merge_cells(
        &self,
        Parameters(params): Parameters<tools::MergeCellsParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_merge_cells")
            .map_err(to_rmcp_error)?;
        tools::sheets_merge_cells(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_copy_paste",
        description = "Copy a range and paste it at a destination cell"
    )]
    pub async fn sheets_copy_paste(
        &self,
        Parameters(params): Parameters<tools::CopyPasteParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_copy_paste")
            .map_err(to_rmcp_error)?;
        tools::sheets_copy_paste(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_format_cells",
        description = "Format cells (bold, italic, font size, text and background colors)"
    )]
    pub async fn sheets_format_cells(
        &self,
        Parameters(params): Parameters<tools::FormatCellsParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_format_cells")
            .map_err(to_rmcp_error)?;
        tools::sheets_format_cells(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_add_borders",
        description = "Draw borders around and inside a range"
    )]
    pub async fn sheets_add_borders(
        &self,
        Parameters(params): Parameters<tools::AddBordersParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_add_borders")
            .map_err(to_rmcp_error)?;
        tools::sheets_add_borders(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_add_chart",
        description = "Add a chart built from an A1 data range (first column is the domain)"
    )]
    pub async fn sheets_add_chart(
        &self,
        Parameters(params): Parameters<tools::AddChartParams>,
    ) -> Result<Json<AddChartResponse>, McpError> {
        self.ensure_tool_enabled("sheets_add_chart")
            .map_err(to_rmcp_error)?;
        tools::sheets_add_chart(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_add_dropdown",
        description = "Restrict cells to a dropdown list of options"
    )]
    pub async fn sheets_add_dropdown(
        &self,
        Parameters(params): Parameters<tools::AddDropdownParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_add_dropdown")
            .map_err(to_rmcp_error)?;
        tools::sheets_add_dropdown(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_conditional_format",
        description = "Color cells whose value meets a condition"
    )]
    pub async fn sheets_conditional_format(
        &self,
        Parameters(params): Parameters<tools::ConditionalFormatParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_conditional_format")
            .map_err(to_rmcp_error)?;
        tools::sheets_conditional_format(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }

    #[tool(
        name = "sheets_sort_range",
        description = "Sort a range by one column"
    )]
    pub async fn sheets_sort_range(
        &self,
        Parameters(params): Parameters<tools::SortRangeParams>,
    ) -> Result<Json<OperationResponse>, McpError> {
        self.ensure_tool_enabled("sheets_sort_range")
            .map_err(to_rmcp_error)?;
        tools::sheets_sort_range(self.state.clone(), params)
            .await
            .map(Json)
            .map_err(to_rmcp_error)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for SheetsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..ServerInfo::default()
        }
    }
}

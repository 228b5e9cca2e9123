//! Sheets v4 REST client.
//!
//! [`SheetsApi`] is the seam between the tool handlers and the remote service.
//! [`GoogleSheetsClient`] is the production implementation; tests substitute a
//! recording fake through [`ClientFactory`].

use crate::credentials::Credentials;
use crate::error::SheetsError;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
const VALUE_INPUT_OPTION: &str = "USER_ENTERED";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spreadsheet {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub spreadsheet_url: Option<String>,
    #[serde(default)]
    pub properties: Option<SpreadsheetProperties>,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetProperties {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(default)]
    pub sheet_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub index: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default)]
    pub range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub updated_range: String,
    #[serde(default)]
    pub updated_rows: i64,
    #[serde(default)]
    pub updated_columns: i64,
    #[serde(default)]
    pub updated_cells: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendValuesResponse {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub table_range: Option<String>,
    #[serde(default)]
    pub updates: UpdateValuesResponse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearValuesResponse {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub cleared_range: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub replies: Vec<Value>,
}

impl BatchUpdateResponse {
    /// The first reply, which is the only one for single-request batches.
    pub fn first_reply(&self) -> &Value {
        self.replies.first().unwrap_or(&Value::Null)
    }
}

// =============================================================================
// API TRAIT
// =============================================================================

#[async_trait]
pub trait SheetsApi: Send + Sync {
    async fn create_spreadsheet(
        &self,
        title: &str,
        sheet_titles: &[String],
    ) -> Result<Spreadsheet, SheetsError>;

    async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<Spreadsheet, SheetsError>;

    async fn get_values(&self, spreadsheet_id: &str, range: &str)
    -> Result<ValueRange, SheetsError>;

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<Value>],
    ) -> Result<UpdateValuesResponse, SheetsError>;

    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<Value>],
    ) -> Result<AppendValuesResponse, SheetsError>;

    async fn clear_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ClearValuesResponse, SheetsError>;

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateResponse, SheetsError>;
}

/// Builds a [`SheetsApi`] handle from valid credentials without touching the network.
pub trait ClientFactory: Send + Sync {
    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn SheetsApi>, SheetsError>;
}

// =============================================================================
// GOOGLE IMPLEMENTATION
// =============================================================================

pub struct GoogleClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleClientFactory {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(SHEETS_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("google-sheets-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build Sheets HTTP client")?;
        let base_url = base_url.into();
        Url::parse(&base_url).with_context(|| format!("invalid Sheets API base {base_url:?}"))?;
        Ok(Self { http, base_url })
    }
}

impl ClientFactory for GoogleClientFactory {
    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn SheetsApi>, SheetsError> {
        let token = credentials.access_token.expose_secret();
        if token.trim().is_empty() {
            return Err(SheetsError::ClientConstruction(
                "access token is empty".to_string(),
            ));
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            SheetsError::ClientConstruction(
                "access token contains characters not allowed in an HTTP header".to_string(),
            )
        })?;
        auth.set_sensitive(true);

        let base_url = Url::parse(&self.base_url)
            .map_err(|error| SheetsError::ClientConstruction(error.to_string()))?;

        Ok(Arc::new(GoogleSheetsClient {
            http: self.http.clone(),
            base_url,
            auth,
        }))
    }
}

pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base_url: Url,
    auth: HeaderValue,
}

#[derive(Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleSheetsClient {
    fn url(&self, segments: &[&str]) -> Result<Url, SheetsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::ClientConstruction("base URL cannot hold a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, SheetsError> {
        let endpoint = url.path().to_string();
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, self.auth.clone())
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|error| SheetsError::transport(&endpoint, &error))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| SheetsError::transport(&endpoint, &error))?;

        if !status.is_success() {
            return Err(remote_error(status.as_u16(), &bytes));
        }

        let slice: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        serde_json::from_slice(slice).map_err(|error| SheetsError::RemoteApi {
            status: status.as_u16(),
            code: None,
            message: format!("unexpected response from {endpoint}: {error}"),
        })
    }
}

fn remote_error(status: u16, body: &[u8]) -> SheetsError {
    match serde_json::from_slice::<GoogleErrorEnvelope>(body) {
        Ok(envelope) => SheetsError::RemoteApi {
            status,
            code: envelope.error.status,
            message: envelope.error.message,
        },
        Err(_) => SheetsError::RemoteApi {
            status,
            code: None,
            message: String::from_utf8_lossy(body).trim().to_string(),
        },
    }
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn create_spreadsheet(
        &self,
        title: &str,
        sheet_titles: &[String],
    ) -> Result<Spreadsheet, SheetsError> {
        let sheets: Vec<Value> = sheet_titles
            .iter()
            .map(|name| json!({ "properties": { "title": name } }))
            .collect();
        let body = json!({
            "properties": { "title": title },
            "sheets": sheets,
        });
        tracing::debug!(title = %title, sheets = sheet_titles.len(), "creating spreadsheet");
        let url = self.url(&["spreadsheets"])?;
        self.send(Method::POST, url, &[], Some(body)).await
    }

    async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<Spreadsheet, SheetsError> {
        tracing::debug!(spreadsheet_id = %spreadsheet_id, "fetching spreadsheet metadata");
        let url = self.url(&["spreadsheets", spreadsheet_id])?;
        self.send(
            Method::GET,
            url,
            &[(
                "fields",
                "spreadsheetId,spreadsheetUrl,properties.title,sheets.properties",
            )],
            None,
        )
        .await
    }

    async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ValueRange, SheetsError> {
        tracing::debug!(spreadsheet_id = %spreadsheet_id, range = %range, "reading values");
        let url = self.url(&["spreadsheets", spreadsheet_id, "values", range])?;
        self.send(Method::GET, url, &[], None).await
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<Value>],
    ) -> Result<UpdateValuesResponse, SheetsError> {
        tracing::debug!(spreadsheet_id = %spreadsheet_id, range = %range, rows = values.len(), "writing values");
        let url = self.url(&["spreadsheets", spreadsheet_id, "values", range])?;
        self.send(
            Method::PUT,
            url,
            &[("valueInputOption", VALUE_INPUT_OPTION)],
            Some(json!({ "values": values })),
        )
        .await
    }

    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<Value>],
    ) -> Result<AppendValuesResponse, SheetsError> {
        tracing::debug!(spreadsheet_id = %spreadsheet_id, range = %range, rows = values.len(), "appending values");
        let segment = format!("{range}:append");
        let url = self.url(&["spreadsheets", spreadsheet_id, "values", &segment])?;
        self.send(
            Method::POST,
            url,
            &[("valueInputOption", VALUE_INPUT_OPTION)],
            Some(json!({ "values": values })),
        )
        .await
    }

    async fn clear_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ClearValuesResponse, SheetsError> {
        tracing::debug!(spreadsheet_id = %spreadsheet_id, range = %range, "clearing values");
        let segment = format!("{range}:clear");
        let url = self.url(&["spreadsheets", spreadsheet_id, "values", &segment])?;
        self.send(Method::POST, url, &[], Some(json!({}))).await
    }

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateResponse, SheetsError> {
        tracing::debug!(
            spreadsheet_id = %spreadsheet_id,
            requests = requests.len(),
            "sending batch update"
        );
        let segment = format!("{spreadsheet_id}:batchUpdate");
        let url = self.url(&["spreadsheets", &segment])?;
        self.send(
            Method::POST,
            url,
            &[],
            Some(json!({ "requests": requests })),
        )
        .await
    }
}

#![allow(dead_code)]
pub mod mcp;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use google_sheets_mcp::client::{
    AppendValuesResponse, BatchUpdateResponse, ClearValuesResponse, ClientFactory, Sheet,
    SheetProperties, SheetsApi, Spreadsheet, UpdateValuesResponse, ValueRange,
};
use google_sheets_mcp::credentials::{ClientSecrets, Credentials, StoredToken};
use google_sheets_mcp::oauth::{TokenEndpoint, TokenResponse};
use google_sheets_mcp::state::AppState;
use google_sheets_mcp::{
    CredentialProvider, CredentialStore, ServerConfig, SheetsError, SheetsServer, TransportKind,
};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

pub const CLIENT_ID: &str = "test-client.apps.googleusercontent.com";
pub const CLIENT_SECRET: &str = "test-client-secret";

/// A throwaway credential directory.
pub struct CredsDir {
    _tempdir: TempDir,
    root: PathBuf,
}

impl CredsDir {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().join("mcp-gdrive");
        std::fs::create_dir_all(&root).expect("create creds dir");
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write_client_secret(&self) {
        let body = json!({
            "installed": {
                "client_id": CLIENT_ID,
                "client_secret": CLIENT_SECRET,
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"],
            }
        });
        std::fs::write(self.path("gcp-oauth.keys.json"), body.to_string()).expect("write secret");
    }

    /// Token file whose access token is valid for another hour.
    pub fn write_valid_token(&self) {
        self.write_token("cached-access", Utc::now() + ChronoDuration::hours(1));
    }

    pub fn write_expired_token(&self) {
        self.write_token("stale-access", Utc::now() - ChronoDuration::hours(1));
    }

    pub fn write_token(&self, access: &str, expiry: chrono::DateTime<Utc>) {
        let token = StoredToken {
            token: Some(access.to_string()),
            refresh_token: Some("refresh-1".to_string()),
            token_uri: Some("https://oauth2.googleapis.com/token".to_string()),
            client_id: Some(CLIENT_ID.to_string()),
            client_secret: Some(CLIENT_SECRET.to_string()),
            scopes: vec!["https://www.googleapis.com/auth/spreadsheets".to_string()],
            expiry: Some(expiry),
        };
        let body = serde_json::to_string_pretty(&token).expect("serialize token");
        std::fs::write(self.path("sheets-token.json"), body).expect("write token");
    }

    pub fn read_token(&self) -> Value {
        let body = std::fs::read_to_string(self.path("sheets-token.json")).expect("read token");
        serde_json::from_str(&body).expect("parse token")
    }

    pub fn config(&self) -> ServerConfig {
        ServerConfig {
            creds_dir: self.root.clone(),
            env_credentials: None,
            enabled_tools: None,
            transport: TransportKind::Stdio,
            http_bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            workers: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
            consent_timeout_secs: 300,
        }
    }
}

/// Token endpoint that hands out numbered access tokens, or fails on demand.
#[derive(Default)]
pub struct FakeTokenEndpoint {
    refreshes: AtomicUsize,
    started: AtomicUsize,
    fail_with: Mutex<Option<SheetsError>>,
    delay: Mutex<Option<std::time::Duration>>,
}

impl FakeTokenEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, error: SheetsError) {
        *self.fail_with.lock() = Some(error);
    }

    /// Refresh calls that have reached the endpoint, finished or not.
    pub fn refresh_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Make every refresh take this long before answering.
    pub fn slow_down(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }

    fn issue(&self) -> Result<TokenResponse, SheetsError> {
        if let Some(error) = self.fail_with.lock().take() {
            return Err(error);
        }
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenResponse {
            access_token: SecretString::from(format!("fresh-access-{n}")),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        })
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn refresh(
        &self,
        _client: &ClientSecrets,
        _refresh_token: &SecretString,
    ) -> Result<TokenResponse, SheetsError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.issue()
    }

    async fn exchange_code(
        &self,
        _client: &ClientSecrets,
        _code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, SheetsError> {
        self.issue()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create { title: String, sheets: Vec<String> },
    GetSpreadsheet(String),
    GetValues(String),
    UpdateValues(String),
    AppendValues(String),
    ClearValues(String),
    BatchUpdate(Vec<Value>),
}

/// In-memory Sheets backend. Values are stored per exact range string.
#[derive(Default)]
pub struct FakeSheets {
    calls: Mutex<Vec<Call>>,
    values: Mutex<HashMap<String, Vec<Vec<Value>>>>,
    sheets: Mutex<Vec<(i64, String)>>,
    replies: Mutex<Vec<Value>>,
    tokens_seen: Mutex<HashSet<String>>,
}

impl FakeSheets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn batch_requests(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::BatchUpdate(requests) => Some(requests),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Queue the reply returned by the next batch update.
    pub fn push_reply(&self, reply: Value) {
        self.replies.lock().push(reply);
    }

    pub fn tokens_seen(&self) -> HashSet<String> {
        self.tokens_seen.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SheetsApi for FakeSheets {
    async fn create_spreadsheet(
        &self,
        title: &str,
        sheet_titles: &[String],
    ) -> Result<Spreadsheet, SheetsError> {
        self.record(Call::Create {
            title: title.to_string(),
            sheets: sheet_titles.to_vec(),
        });
        let mut sheets = self.sheets.lock();
        sheets.clear();
        for (index, name) in sheet_titles.iter().enumerate() {
            sheets.push((1000 + index as i64, name.clone()));
        }
        Ok(Spreadsheet {
            spreadsheet_id: "fake-spreadsheet".to_string(),
            spreadsheet_url: None,
            properties: None,
            sheets: sheets
                .iter()
                .enumerate()
                .map(|(index, (sheet_id, title))| Sheet {
                    properties: SheetProperties {
                        sheet_id: *sheet_id,
                        title: title.clone(),
                        index: index as i64,
                    },
                })
                .collect(),
        })
    }

    async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<Spreadsheet, SheetsError> {
        self.record(Call::GetSpreadsheet(spreadsheet_id.to_string()));
        let sheets = self.sheets.lock();
        Ok(Spreadsheet {
            spreadsheet_id: spreadsheet_id.to_string(),
            spreadsheet_url: None,
            properties: None,
            sheets: sheets
                .iter()
                .enumerate()
                .map(|(index, (sheet_id, title))| Sheet {
                    properties: SheetProperties {
                        sheet_id: *sheet_id,
                        title: title.clone(),
                        index: index as i64,
                    },
                })
                .collect(),
        })
    }

    async fn get_values(
        &self,
        _spreadsheet_id: &str,
        range: &str,
    ) -> Result<ValueRange, SheetsError> {
        self.record(Call::GetValues(range.to_string()));
        Ok(ValueRange {
            range: range.to_string(),
            major_dimension: Some("ROWS".to_string()),
            values: self.values.lock().get(range).cloned().unwrap_or_default(),
        })
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<Value>],
    ) -> Result<UpdateValuesResponse, SheetsError> {
        self.record(Call::UpdateValues(range.to_string()));
        self.values
            .lock()
            .insert(range.to_string(), values.to_vec());
        Ok(UpdateValuesResponse {
            spreadsheet_id: spreadsheet_id.to_string(),
            updated_range: range.to_string(),
            updated_rows: values.len() as i64,
            updated_columns: values.iter().map(Vec::len).max().unwrap_or(0) as i64,
            updated_cells: values.iter().map(Vec::len).sum::<usize>() as i64,
        })
    }

    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<Value>],
    ) -> Result<AppendValuesResponse, SheetsError> {
        self.record(Call::AppendValues(range.to_string()));
        self.values
            .lock()
            .entry(range.to_string())
            .or_default()
            .extend(values.iter().cloned());
        Ok(AppendValuesResponse {
            spreadsheet_id: spreadsheet_id.to_string(),
            table_range: Some(range.to_string()),
            updates: UpdateValuesResponse {
                spreadsheet_id: spreadsheet_id.to_string(),
                updated_range: range.to_string(),
                updated_rows: values.len() as i64,
                updated_columns: 0,
                updated_cells: values.iter().map(Vec::len).sum::<usize>() as i64,
            },
        })
    }

    async fn clear_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ClearValuesResponse, SheetsError> {
        self.record(Call::ClearValues(range.to_string()));
        self.values.lock().remove(range);
        Ok(ClearValuesResponse {
            spreadsheet_id: spreadsheet_id.to_string(),
            cleared_range: range.to_string(),
        })
    }

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateResponse, SheetsError> {
        self.record(Call::BatchUpdate(requests));
        let mut replies = self.replies.lock();
        let reply = if replies.is_empty() {
            json!({})
        } else {
            replies.remove(0)
        };
        Ok(BatchUpdateResponse {
            spreadsheet_id: spreadsheet_id.to_string(),
            replies: vec![reply],
        })
    }
}

/// Hands the same [`FakeSheets`] to every tool call and records which token built it.
pub struct FakeFactory {
    sheets: Arc<FakeSheets>,
}

impl ClientFactory for FakeFactory {
    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn SheetsApi>, SheetsError> {
        self.sheets
            .tokens_seen
            .lock()
            .insert(credentials.access_token.expose_secret().to_string());
        Ok(self.sheets.clone())
    }
}

/// Everything a test needs to drive the server against fakes.
pub struct TestHarness {
    pub creds: CredsDir,
    pub sheets: Arc<FakeSheets>,
    pub endpoint: Arc<FakeTokenEndpoint>,
    pub state: Arc<AppState>,
}

impl TestHarness {
    /// Harness with a valid cached token.
    pub fn ready() -> Self {
        let creds = CredsDir::new();
        creds.write_valid_token();
        Self::with_creds(creds, |_| {})
    }

    pub fn with_creds(creds: CredsDir, customize: impl FnOnce(&mut ServerConfig)) -> Self {
        let mut config = creds.config();
        customize(&mut config);
        let config = Arc::new(config);

        let sheets = FakeSheets::new();
        let endpoint = FakeTokenEndpoint::new();
        let store = CredentialStore::from_config(&config);
        let provider = Arc::new(CredentialProvider::new(store, endpoint.clone()));
        let factory = Arc::new(FakeFactory {
            sheets: sheets.clone(),
        });
        let state = Arc::new(AppState::with_parts(config, provider, factory));
        Self {
            creds,
            sheets,
            endpoint,
            state,
        }
    }

    pub fn server(&self) -> SheetsServer {
        SheetsServer::from_state(self.state.clone())
    }
}

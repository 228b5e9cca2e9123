//! Error taxonomy for the Google Sheets MCP server
//!
//! This module provides:
//! - MCP error codes (JSON-RPC standard + custom codes)
//! - The typed [`SheetsError`] raised by the credential store, the client
//!   factory and the tool handlers
//! - Conversion from `anyhow::Error` chains into `rmcp::ErrorData`

use serde::Serialize;
use std::fmt;
use thiserror::Error;

// =============================================================================
// MCP ERROR CODES
// =============================================================================

/// MCP error codes following JSON-RPC 2.0 specification plus custom codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// The JSON sent is not a valid Request object
    InvalidRequest = -32600,
    /// Invalid method parameter(s)
    InvalidParams = -32602,
    /// Internal JSON-RPC error
    InternalError = -32603,

    /// No OAuth client secret, token or environment credentials were found
    CredentialsMissing = -32001,
    /// A client secret exists but the operator has not completed consent
    ConsentRequired = -32002,
    /// Token or client-secret file could not be parsed
    CredentialsInvalid = -32003,
    /// Credentials could not be turned into an API client
    ClientConstruction = -32004,
    /// Argument failed validation before any remote call
    InvalidArgument = -32005,
    /// Named sheet does not exist in the spreadsheet
    SheetNotFound = -32006,
    /// The Sheets API rejected the call
    RemoteApi = -32007,
    /// The Sheets API could not be reached
    Transport = -32008,
    /// Tool disabled by configuration
    ToolDisabled = -32014,
}

impl ErrorCode {
    /// Get the integer code
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Get the error category reported in error payloads
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::InvalidParams => "client_error",
            ErrorCode::InternalError => "server_error",
            ErrorCode::CredentialsMissing
            | ErrorCode::ConsentRequired
            | ErrorCode::CredentialsInvalid
            | ErrorCode::ClientConstruction => "credentials_error",
            ErrorCode::InvalidArgument => "validation_error",
            ErrorCode::SheetNotFound => "resource_not_found",
            ErrorCode::RemoteApi => "remote_error",
            ErrorCode::Transport => "transport_error",
            ErrorCode::ToolDisabled => "not_found",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// =============================================================================
// DOMAIN ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("no Google OAuth credentials found in {dir} (expected {expected})")]
    CredentialsMissing { dir: String, expected: String },

    #[error(
        "OAuth client secret found but no token has been issued; run `google-sheets-mcp auth` to grant access"
    )]
    ConsentRequired,

    #[error("invalid credentials file {path}: {reason}")]
    CredentialsInvalid { path: String, reason: String },

    #[error("cannot construct Sheets client: {0}")]
    ClientConstruction(String),

    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("sheet \"{0}\" not found")]
    SheetNotFound(String),

    #[error("Sheets API error {status}{}: {message}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    RemoteApi {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("failed to reach {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
}

impl SheetsError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SheetsError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(endpoint: impl Into<String>, error: &reqwest::Error) -> Self {
        SheetsError::Transport {
            endpoint: endpoint.into(),
            message: error.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SheetsError::CredentialsMissing { .. } => ErrorCode::CredentialsMissing,
            SheetsError::ConsentRequired => ErrorCode::ConsentRequired,
            SheetsError::CredentialsInvalid { .. } => ErrorCode::CredentialsInvalid,
            SheetsError::ClientConstruction(_) => ErrorCode::ClientConstruction,
            SheetsError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            SheetsError::SheetNotFound(_) => ErrorCode::SheetNotFound,
            SheetsError::RemoteApi { .. } => ErrorCode::RemoteApi,
            SheetsError::Transport { .. } => ErrorCode::Transport,
        }
    }

    fn payload(&self) -> serde_json::Value {
        let code = self.code();
        let mut data = serde_json::json!({
            "code": code.code(),
            "kind": format!("{:?}", code),
            "category": code.category(),
        });
        if let SheetsError::RemoteApi { status, code, .. } = self {
            data["status"] = serde_json::json!(status);
            if let Some(code) = code {
                data["remote_status"] = serde_json::json!(code);
            }
        }
        data
    }
}

/// Raised when a tool is called that the server configuration does not enable.
#[derive(Debug, Error)]
#[error("tool '{tool_name}' is disabled by server configuration")]
pub struct ToolDisabledError {
    tool_name: String,
}

impl ToolDisabledError {
    pub fn new(tool_name: &str) -> Self {
        Self {
            tool_name: tool_name.to_ascii_lowercase(),
        }
    }
}

// =============================================================================
// CONVERSION TO RMCP
// =============================================================================

/// Convert an `anyhow::Error` returned by a tool handler into `rmcp::ErrorData`.
///
/// The first [`SheetsError`] found in the chain decides the code; context
/// layers added on the way up are kept in the message.
pub fn to_rmcp_error(error: anyhow::Error) -> rmcp::ErrorData {
    if error.downcast_ref::<ToolDisabledError>().is_some() {
        let data = serde_json::json!({
            "code": ErrorCode::ToolDisabled.code(),
            "category": ErrorCode::ToolDisabled.category(),
        });
        return rmcp::ErrorData::invalid_request(error.to_string(), Some(data));
    }

    let message = format!("{error:#}");
    let sheets_error = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<SheetsError>());

    match sheets_error {
        Some(inner) => {
            let data = Some(inner.payload());
            match inner.code() {
                ErrorCode::InvalidArgument | ErrorCode::SheetNotFound => {
                    rmcp::ErrorData::invalid_params(message, data)
                }
                _ => rmcp::ErrorData::internal_error(message, data),
            }
        }
        None => rmcp::ErrorData::internal_error(message, None),
    }
}

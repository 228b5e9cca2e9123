//! Google OAuth 2.0 token endpoint: refresh-token grant and authorization-code
//! exchange. Both are plain form posts; the reply is the standard token JSON.

use crate::credentials::ClientSecrets;
use crate::error::SheetsError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens issued by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: SecretString,
    /// Only present on the first exchange, or when Google rotates it.
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl From<RawTokenResponse> for TokenResponse {
    fn from(raw: RawTokenResponse) -> Self {
        Self {
            access_token: SecretString::from(raw.access_token),
            refresh_token: raw.refresh_token.map(SecretString::from),
            expires_in: raw.expires_in,
            scope: raw.scope,
        }
    }
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(
        &self,
        client: &ClientSecrets,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, SheetsError>;

    async fn exchange_code(
        &self,
        client: &ClientSecrets,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, SheetsError>;
}

pub struct GoogleTokenEndpoint {
    http: reqwest::Client,
}

impl GoogleTokenEndpoint {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build OAuth HTTP client")?;
        Ok(Self { http })
    }

    async fn post_form(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, SheetsError> {
        let response = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|error| SheetsError::transport(token_uri, &error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| SheetsError::transport(token_uri, &error))?;

        if !status.is_success() {
            return Err(token_error(status.as_u16(), &body));
        }

        serde_json::from_str::<RawTokenResponse>(&body)
            .map(TokenResponse::from)
            .map_err(|error| SheetsError::RemoteApi {
                status: status.as_u16(),
                code: None,
                message: format!("unexpected token endpoint reply: {error}"),
            })
    }
}

#[async_trait]
impl TokenEndpoint for GoogleTokenEndpoint {
    async fn refresh(
        &self,
        client: &ClientSecrets,
        refresh_token: &SecretString,
    ) -> Result<TokenResponse, SheetsError> {
        tracing::debug!(token_uri = %client.token_uri, "requesting access token refresh");
        self.post_form(
            &client.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.expose_secret()),
                ("refresh_token", refresh_token.expose_secret()),
            ],
        )
        .await
    }

    async fn exchange_code(
        &self,
        client: &ClientSecrets,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, SheetsError> {
        self.post_form(
            &client.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.expose_secret()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }
}

fn token_error(status: u16, body: &str) -> SheetsError {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(parsed) => SheetsError::RemoteApi {
            status,
            message: parsed
                .error_description
                .unwrap_or_else(|| parsed.error.clone()),
            code: Some(parsed.error),
        },
        Err(_) => SheetsError::RemoteApi {
            status,
            code: None,
            message: body.trim().to_string(),
        },
    }
}

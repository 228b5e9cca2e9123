//! OAuth credential lifecycle.
//!
//! [`CredentialStore`] owns the files in the credential directory (client
//! secret and authorized-user token) and the optional environment credentials.
//! [`CredentialProvider`] sits on top of it, caches the current access token and
//! refreshes it through a [`TokenEndpoint`] when it is about to expire.
//!
//! The provider never starts an interactive consent flow. When no token has
//! been issued it reports [`SheetsError::ConsentRequired`] and the operator runs
//! the `auth` subcommand.

use crate::config::{CLIENT_SECRET_FILE, EnvCredentials, ServerConfig, TOKEN_FILE};
use crate::error::SheetsError;
use crate::oauth::{GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI, SHEETS_SCOPE, TokenEndpoint, TokenResponse};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex as SyncMutex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Access tokens are treated as expired this long before their stated expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Lifecycle of the server's Google credentials.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialState {
    /// No client secret, token, or environment credentials.
    Unconfigured,
    /// A client secret exists but consent was never granted.
    AwaitingConsent,
    Ready,
    /// The last refresh failed; the next successful one returns to `Ready`.
    Degraded,
}

/// The OAuth client registered in Google Cloud.
#[derive(Debug, Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<RawClientSecrets>,
    #[serde(default)]
    web: Option<RawClientSecrets>,
}

#[derive(Deserialize)]
struct RawClientSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ClientSecrets {
    pub fn parse(contents: &str) -> Result<Self, String> {
        let file: ClientSecretsFile =
            serde_json::from_str(contents).map_err(|error| error.to_string())?;
        let raw = file
            .installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" client".to_string())?;
        if raw.client_id.trim().is_empty() {
            return Err("client_id is empty".to_string());
        }
        Ok(Self {
            client_id: raw.client_id,
            client_secret: SecretString::from(raw.client_secret),
            auth_uri: raw.auth_uri,
            token_uri: raw.token_uri,
            redirect_uris: raw.redirect_uris,
        })
    }
}

/// Google "authorized user" token file as written by the consent flow.
///
/// Unknown fields are ignored so files written by other Google client
/// libraries stay readable.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// A usable access token handed to the client factory.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: SecretString,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaterialSource {
    Environment,
    TokenFile,
}

/// Everything needed to produce and renew an access token.
#[derive(Debug, Clone)]
struct Material {
    source: MaterialSource,
    client: ClientSecrets,
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    expiry: Option<DateTime<Utc>>,
    scopes: Vec<String>,
}

impl Material {
    fn usable_access_token(&self, now: DateTime<Utc>) -> Option<Credentials> {
        let token = self.access_token.as_ref()?;
        if token.expose_secret().is_empty() {
            return None;
        }
        if let Some(expiry) = self.expiry {
            if expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now {
                return None;
            }
        }
        Some(Credentials {
            access_token: token.clone(),
            expiry: self.expiry,
        })
    }

    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = Some(response.access_token);
        self.expiry = response
            .expires_in
            .map(|secs| now + Duration::seconds(secs));
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = response.scope {
            self.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
    }

    fn to_stored(&self) -> StoredToken {
        StoredToken {
            token: self
                .access_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            token_uri: Some(self.client.token_uri.clone()),
            client_id: Some(self.client.client_id.clone()),
            client_secret: Some(self.client.client_secret.expose_secret().to_string()),
            scopes: self.scopes.clone(),
            expiry: self.expiry,
        }
    }
}

/// Reads and writes credential material in the credential directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
    env: Option<EnvCredentials>,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>, env: Option<EnvCredentials>) -> Self {
        Self {
            dir: dir.into(),
            env,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.creds_dir.clone(), config.env_credentials.clone())
    }

    pub fn client_secret_path(&self) -> PathBuf {
        self.dir.join(CLIENT_SECRET_FILE)
    }

    pub fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    /// Whether any credential material exists, without validating it.
    pub fn has_material(&self) -> bool {
        self.env.is_some() || self.token_path().is_file() || self.client_secret_path().is_file()
    }

    pub fn load_client_secrets(&self) -> Result<ClientSecrets, SheetsError> {
        let path = self.client_secret_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(self.missing());
            }
            Err(error) => return Err(invalid(&path, error.to_string())),
        };
        ClientSecrets::parse(&contents).map_err(|reason| invalid(&path, reason))
    }

    pub fn load_token(&self) -> Result<Option<StoredToken>, SheetsError> {
        let path = self.token_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(invalid(&path, error.to_string())),
        };
        let token: StoredToken =
            serde_json::from_str(&contents).map_err(|error| invalid(&path, error.to_string()))?;
        if token.token.is_none() && token.refresh_token.is_none() {
            return Err(invalid(&path, "neither token nor refresh_token is present"));
        }
        Ok(Some(token))
    }

    /// Write the token file atomically, readable only by the owner.
    pub fn save_token(&self, token: &StoredToken) -> Result<()> {
        create_private_dir(&self.dir)
            .with_context(|| format!("failed to create credential directory {:?}", self.dir))?;

        let path = self.token_path();
        let tmp = self
            .dir
            .join(format!(".{TOKEN_FILE}.{}.tmp", std::process::id()));
        let json = serde_json::to_vec_pretty(token).context("failed to serialize token")?;

        let mut file = open_private_file(&tmp)
            .with_context(|| format!("failed to create temporary token file {:?}", tmp))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("failed to write temporary token file {:?}", tmp))?;
        drop(file);

        if let Err(error) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(error)
                .with_context(|| format!("failed to move token file into place at {:?}", path));
        }
        tracing::debug!(path = %path.display(), "token file saved");
        Ok(())
    }

    fn load_material(&self) -> Result<Material, SheetsError> {
        if let Some(env) = &self.env {
            return Ok(Material {
                source: MaterialSource::Environment,
                client: ClientSecrets {
                    client_id: env.client_id.clone(),
                    client_secret: env.client_secret.clone(),
                    auth_uri: GOOGLE_AUTH_URI.to_string(),
                    token_uri: GOOGLE_TOKEN_URI.to_string(),
                    redirect_uris: Vec::new(),
                },
                access_token: None,
                refresh_token: Some(env.refresh_token.clone()),
                expiry: None,
                scopes: vec![SHEETS_SCOPE.to_string()],
            });
        }

        match self.load_token()? {
            Some(stored) => {
                let client = self.client_for(&stored)?;
                Ok(Material {
                    source: MaterialSource::TokenFile,
                    client,
                    access_token: stored.token.map(SecretString::from),
                    refresh_token: stored.refresh_token.map(SecretString::from),
                    expiry: stored.expiry,
                    scopes: stored.scopes,
                })
            }
            None => {
                if self.client_secret_path().is_file() {
                    Err(SheetsError::ConsentRequired)
                } else {
                    Err(self.missing())
                }
            }
        }
    }

    /// Token files carry their own client; older ones fall back to the
    /// client-secret file.
    fn client_for(&self, stored: &StoredToken) -> Result<ClientSecrets, SheetsError> {
        match (&stored.client_id, &stored.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(ClientSecrets {
                client_id: client_id.clone(),
                client_secret: SecretString::from(client_secret.clone()),
                auth_uri: GOOGLE_AUTH_URI.to_string(),
                token_uri: stored
                    .token_uri
                    .clone()
                    .unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
                redirect_uris: Vec::new(),
            }),
            _ => self.load_client_secrets().map_err(|error| match error {
                SheetsError::CredentialsMissing { .. } => invalid(
                    &self.token_path(),
                    format!("token has no client_id and {CLIENT_SECRET_FILE} is missing"),
                ),
                other => other,
            }),
        }
    }

    fn missing(&self) -> SheetsError {
        SheetsError::CredentialsMissing {
            dir: self.dir.display().to_string(),
            expected: format!(
                "{CLIENT_SECRET_FILE}, {TOKEN_FILE}, or GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET/GOOGLE_REFRESH_TOKEN"
            ),
        }
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> SheetsError {
    SheetsError::CredentialsInvalid {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn open_private_file(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private_file(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Hands out valid access tokens to tool handlers.
///
/// Created once at startup and shared through `AppState`. Refreshes are
/// serialized by an in-process mutex; separate processes sharing a token file
/// only rely on the atomic rename in [`CredentialStore::save_token`].
pub struct CredentialProvider {
    store: CredentialStore,
    endpoint: Arc<dyn TokenEndpoint>,
    cache: RwLock<Option<Material>>,
    refresh_lock: Mutex<()>,
    last_refresh_error: SyncMutex<Option<String>>,
}

impl CredentialProvider {
    pub fn new(store: CredentialStore, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            store,
            endpoint,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            last_refresh_error: SyncMutex::new(None),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn endpoint(&self) -> Arc<dyn TokenEndpoint> {
        self.endpoint.clone()
    }

    /// Return a valid access token, refreshing it first when needed.
    ///
    /// The cache lock is never held across the token endpoint call, so
    /// [`CredentialProvider::state`] answers while a refresh is in flight.
    pub async fn get_credentials(&self) -> Result<Credentials, SheetsError> {
        {
            let cache = self.cache.read().await;
            if let Some(credentials) = cache
                .as_ref()
                .and_then(|material| material.usable_access_token(Utc::now()))
            {
                return Ok(credentials);
            }
        }

        let _guard = self.refresh_lock.lock().await;
        let material = self.current_material().await?;

        // Another task may have refreshed while this one waited for the lock.
        if let Some(credentials) = material.usable_access_token(Utc::now()) {
            return Ok(credentials);
        }

        if material.refresh_token.is_none() {
            return Err(invalid(
                &self.store.token_path(),
                "access token expired and no refresh_token is available",
            ));
        }
        self.refresh_material(material).await
    }

    /// Force a refresh of the access token.
    pub async fn refresh(&self) -> Result<Credentials, SheetsError> {
        let _guard = self.refresh_lock.lock().await;
        let material = self.current_material().await?;
        if material.refresh_token.is_none() {
            return Err(invalid(&self.store.token_path(), "no refresh_token is available"));
        }
        self.refresh_material(material).await
    }

    /// Cached material, loading it from the store on first use. Callers hold
    /// `refresh_lock`.
    async fn current_material(&self) -> Result<Material, SheetsError> {
        if let Some(material) = self.cache.read().await.clone() {
            return Ok(material);
        }
        let material = self.store.load_material()?;
        *self.cache.write().await = Some(material.clone());
        Ok(material)
    }

    async fn refresh_material(&self, mut material: Material) -> Result<Credentials, SheetsError> {
        let Some(refresh_token) = material.refresh_token.clone() else {
            return Err(SheetsError::ConsentRequired);
        };

        match self.endpoint.refresh(&material.client, &refresh_token).await {
            Ok(response) => {
                let now = Utc::now();
                material.apply(response, now);
                *self.last_refresh_error.lock() = None;

                if material.source == MaterialSource::TokenFile {
                    if let Err(error) = self.store.save_token(&material.to_stored()) {
                        tracing::warn!(
                            error = %format!("{error:#}"),
                            "failed to persist refreshed token"
                        );
                    }
                }
                tracing::info!(
                    expires_at = ?material.expiry,
                    source = ?material.source,
                    "refreshed Google access token"
                );

                let credentials = material.usable_access_token(now);
                *self.cache.write().await = Some(material);
                credentials.ok_or_else(|| SheetsError::RemoteApi {
                    status: 200,
                    code: None,
                    message: "token endpoint returned an already expired access token".to_string(),
                })
            }
            Err(error) => {
                tracing::warn!(error = %error, "access token refresh failed");
                *self.last_refresh_error.lock() = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Store the tokens issued by a completed consent flow.
    pub async fn complete_consent(
        &self,
        client: ClientSecrets,
        response: TokenResponse,
    ) -> Result<Credentials> {
        let _guard = self.refresh_lock.lock().await;
        let now = Utc::now();
        let mut material = Material {
            source: MaterialSource::TokenFile,
            client,
            access_token: None,
            refresh_token: None,
            expiry: None,
            scopes: vec![SHEETS_SCOPE.to_string()],
        };
        material.apply(response, now);
        if material.refresh_token.is_none() {
            tracing::warn!(
                "consent completed without a refresh token; the grant will stop working once the access token expires"
            );
        }

        self.store.save_token(&material.to_stored())?;
        let credentials = material
            .usable_access_token(now)
            .context("token endpoint returned an unusable access token")?;

        *self.cache.write().await = Some(material);
        *self.last_refresh_error.lock() = None;
        tracing::info!(
            path = %self.store.token_path().display(),
            "consent completed, token stored"
        );
        Ok(credentials)
    }

    pub fn last_refresh_error(&self) -> Option<String> {
        self.last_refresh_error.lock().clone()
    }

    pub async fn state(&self) -> CredentialState {
        if self.last_refresh_error.lock().is_some() {
            return CredentialState::Degraded;
        }
        if self.cache.read().await.is_some() {
            return CredentialState::Ready;
        }
        match self.store.load_material() {
            Ok(_) => CredentialState::Ready,
            Err(SheetsError::ConsentRequired) => CredentialState::AwaitingConsent,
            Err(SheetsError::CredentialsMissing { .. }) => CredentialState::Unconfigured,
            Err(_) => CredentialState::Degraded,
        }
    }
}

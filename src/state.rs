use crate::client::{ClientFactory, GoogleClientFactory, SheetsApi};
use crate::config::ServerConfig;
use crate::credentials::{CredentialProvider, CredentialStore};
use crate::error::SheetsError;
use crate::oauth::GoogleTokenEndpoint;
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared state handed to every tool invocation.
pub struct AppState {
    config: Arc<ServerConfig>,
    credentials: Arc<CredentialProvider>,
    client_factory: Arc<dyn ClientFactory>,
    started_at: Instant,
}

impl AppState {
    /// Production state: Google token endpoint and Sheets REST client.
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let store = CredentialStore::from_config(&config);
        let endpoint = Arc::new(GoogleTokenEndpoint::new()?);
        let credentials = Arc::new(CredentialProvider::new(store, endpoint));
        let client_factory = Arc::new(GoogleClientFactory::new()?);
        Ok(Self::with_parts(config, credentials, client_factory))
    }

    pub fn with_parts(
        config: Arc<ServerConfig>,
        credentials: Arc<CredentialProvider>,
        client_factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            config,
            credentials,
            client_factory,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    pub fn credentials(&self) -> Arc<CredentialProvider> {
        self.credentials.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Valid credentials turned into an API handle. Never prompts for consent.
    pub async fn sheets_api(&self) -> Result<Arc<dyn SheetsApi>, SheetsError> {
        let credentials = self.credentials.get_credentials().await?;
        self.client_factory.build(&credentials)
    }
}

mod support;

use assert_matches::assert_matches;
use google_sheets_mcp::config::EnvCredentials;
use google_sheets_mcp::oauth::TokenResponse;
use google_sheets_mcp::{CredentialProvider, CredentialState, CredentialStore, SheetsError};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use support::{CredsDir, FakeTokenEndpoint};

fn provider(creds: &CredsDir) -> (CredentialProvider, Arc<FakeTokenEndpoint>) {
    let endpoint = FakeTokenEndpoint::new();
    let store = CredentialStore::new(creds.root(), None);
    (CredentialProvider::new(store, endpoint.clone()), endpoint)
}

#[tokio::test]
async fn empty_directory_is_unconfigured() {
    let creds = CredsDir::new();
    let (provider, endpoint) = provider(&creds);

    assert_eq!(provider.state().await, CredentialState::Unconfigured);
    assert!(!provider.store().has_material());
    assert_matches!(
        provider.get_credentials().await,
        Err(SheetsError::CredentialsMissing { .. })
    );
    assert_eq!(endpoint.refresh_count(), 0);
}

#[tokio::test]
async fn client_secret_without_token_awaits_consent() {
    let creds = CredsDir::new();
    creds.write_client_secret();
    let (provider, endpoint) = provider(&creds);

    assert_eq!(provider.state().await, CredentialState::AwaitingConsent);
    assert!(provider.store().has_material());
    assert_matches!(
        provider.get_credentials().await,
        Err(SheetsError::ConsentRequired)
    );
    assert_eq!(endpoint.refresh_count(), 0);
}

#[tokio::test]
async fn valid_token_is_used_without_refresh() {
    let creds = CredsDir::new();
    creds.write_valid_token();
    let (provider, endpoint) = provider(&creds);

    let credentials = provider.get_credentials().await.expect("credentials");
    assert_eq!(credentials.access_token.expose_secret(), "cached-access");
    assert_eq!(endpoint.refresh_count(), 0);
    assert_eq!(provider.state().await, CredentialState::Ready);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_persisted() {
    let creds = CredsDir::new();
    creds.write_expired_token();
    let (provider, endpoint) = provider(&creds);

    let credentials = provider.get_credentials().await.expect("credentials");
    assert_eq!(credentials.access_token.expose_secret(), "fresh-access-1");
    assert_eq!(endpoint.refresh_count(), 1);

    let stored = creds.read_token();
    assert_eq!(stored["token"], "fresh-access-1");
    assert_eq!(stored["refresh_token"], "refresh-1");

    // Served from cache on the second call.
    provider.get_credentials().await.expect("cached");
    assert_eq!(endpoint.refresh_count(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn persisted_token_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let creds = CredsDir::new();
    creds.write_expired_token();
    let (provider, _endpoint) = provider(&creds);
    provider.get_credentials().await.expect("credentials");

    let mode = std::fs::metadata(creds.path("sheets-token.json"))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn failed_refresh_degrades_until_next_success() {
    let creds = CredsDir::new();
    creds.write_expired_token();
    let (provider, endpoint) = provider(&creds);

    endpoint.fail_next(SheetsError::RemoteApi {
        status: 400,
        code: Some("invalid_grant".to_string()),
        message: "Token has been expired or revoked.".to_string(),
    });
    let error = provider.get_credentials().await.expect_err("refresh fails");
    assert_matches!(error, SheetsError::RemoteApi { status: 400, .. });
    assert_eq!(provider.state().await, CredentialState::Degraded);
    assert!(
        provider
            .last_refresh_error()
            .expect("recorded")
            .contains("revoked")
    );

    provider.get_credentials().await.expect("recovers");
    assert_eq!(provider.state().await, CredentialState::Ready);
    assert!(provider.last_refresh_error().is_none());
}

#[tokio::test]
async fn malformed_token_file_is_invalid() {
    let creds = CredsDir::new();
    std::fs::write(creds.path("sheets-token.json"), "{ not json").expect("write");
    let (provider, endpoint) = provider(&creds);

    assert_matches!(
        provider.get_credentials().await,
        Err(SheetsError::CredentialsInvalid { .. })
    );
    assert_eq!(provider.state().await, CredentialState::Degraded);
    assert_eq!(endpoint.refresh_count(), 0);
}

#[tokio::test]
async fn environment_credentials_refresh_in_memory_only() {
    let creds = CredsDir::new();
    let endpoint = FakeTokenEndpoint::new();
    let env = EnvCredentials {
        client_id: "env-client".to_string(),
        client_secret: SecretString::from("env-secret"),
        refresh_token: SecretString::from("env-refresh"),
    };
    let store = CredentialStore::new(creds.root(), Some(env));
    let provider = CredentialProvider::new(store, endpoint.clone());

    let credentials = provider.get_credentials().await.expect("credentials");
    assert_eq!(credentials.access_token.expose_secret(), "fresh-access-1");
    assert!(!creds.path("sheets-token.json").exists());
}

#[tokio::test]
async fn consent_stores_token_file() {
    let creds = CredsDir::new();
    creds.write_client_secret();
    let (provider, _endpoint) = provider(&creds);
    let client = provider.store().load_client_secrets().expect("client");

    let tokens = TokenResponse {
        access_token: SecretString::from("consent-access"),
        refresh_token: Some(SecretString::from("consent-refresh")),
        expires_in: Some(3600),
        scope: Some("https://www.googleapis.com/auth/spreadsheets".to_string()),
    };
    provider
        .complete_consent(client, tokens)
        .await
        .expect("consent");

    assert_eq!(provider.state().await, CredentialState::Ready);
    let stored = creds.read_token();
    assert_eq!(stored["refresh_token"], "consent-refresh");
    assert_eq!(stored["client_id"], support::CLIENT_ID);

    let credentials = provider.get_credentials().await.expect("credentials");
    assert_eq!(credentials.access_token.expose_secret(), "consent-access");
}

#[test]
fn stored_token_debug_hides_secrets() {
    let creds = CredsDir::new();
    creds.write_valid_token();
    let store = CredentialStore::new(creds.root(), None);
    let token = store.load_token().expect("load").expect("present");
    let debug = format!("{token:?}");
    assert!(!debug.contains("cached-access"));
    assert!(!debug.contains("refresh-1"));
}

//! Interactive OAuth consent for the `auth` subcommand.
//!
//! Authorization-code flow with PKCE and a loopback redirect: a one-shot axum
//! listener on `127.0.0.1` receives the code, the state parameter is checked,
//! the code is exchanged at the token endpoint and the result is handed to the
//! [`CredentialProvider`] for persistence.

use crate::credentials::{ClientSecrets, CredentialProvider};
use crate::oauth::SHEETS_SCOPE;
use anyhow::{Context, Result, anyhow, bail};
use axum::{Router, extract::Query, extract::State, response::Html, routing::get};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 32;

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        Self::from_verifier(random_string(VERIFIER_LEN))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn authorization_url(
    client: &ClientSecrets,
    redirect_uri: &str,
    pkce: &Pkce,
    state: &str,
) -> Result<Url> {
    Url::parse_with_params(
        &client.auth_uri,
        &[
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", SHEETS_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("state", state),
        ],
    )
    .with_context(|| format!("invalid auth_uri {:?}", client.auth_uri))
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

type CallbackSlot = Arc<parking_lot::Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// Loopback listener that accepts exactly one redirect.
pub struct CallbackServer {
    redirect_uri: String,
    receiver: oneshot::Receiver<CallbackParams>,
    shutdown: CancellationToken,
}

impl CallbackServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .context("failed to bind loopback listener for the OAuth redirect")?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}/");

        let (sender, receiver) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(parking_lot::Mutex::new(Some(sender)));
        let router = Router::new().route("/", get(callback)).with_state(slot);

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            if let Err(error) = result {
                tracing::warn!(error = %error, "OAuth callback listener failed");
            }
        });

        Ok(Self {
            redirect_uri,
            receiver,
            shutdown,
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams> {
        let CallbackServer {
            receiver, shutdown, ..
        } = self;
        let result = tokio::time::timeout(timeout, receiver).await;
        shutdown.cancel();
        match result {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(anyhow!("OAuth callback listener stopped unexpectedly")),
            Err(_) => Err(anyhow!(
                "timed out after {}s waiting for the OAuth redirect",
                timeout.as_secs()
            )),
        }
    }
}

async fn callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let page = if params.error.is_some() {
        "<html><body><h1>Authorization was not granted</h1><p>Return to the terminal for details.</p></body></html>"
    } else {
        "<html><body><h1>Authorization complete</h1><p>You can close this window and return to the terminal.</p></body></html>"
    };
    if let Some(sender) = slot.lock().take() {
        let _ = sender.send(params);
    }
    Html(page)
}

/// Operator-driven consent: open the browser, wait for the redirect, store tokens.
pub struct ConsentFlow {
    timeout: Duration,
    open_browser: bool,
}

impl ConsentFlow {
    pub fn new(timeout: Duration, open_browser: bool) -> Self {
        Self {
            timeout,
            open_browser,
        }
    }

    pub async fn run(&self, provider: &CredentialProvider) -> Result<()> {
        let client = provider
            .store()
            .load_client_secrets()
            .context("the consent flow needs gcp-oauth.keys.json in the credential directory")?;

        let server = CallbackServer::start().await?;
        let pkce = Pkce::generate();
        let state = random_string(STATE_LEN);
        let redirect_uri = server.redirect_uri().to_string();
        let url = authorization_url(&client, &redirect_uri, &pkce, &state)?;

        println!();
        println!("Authorize Google Sheets access by visiting:");
        println!();
        println!("  {url}");
        println!();
        if self.open_browser {
            if let Err(error) = open::that(url.as_str()) {
                tracing::debug!(error = %error, "could not open browser automatically");
                println!("(Could not open a browser, copy the URL above)");
            }
        }
        println!("Waiting for authorization...");

        let params = server.wait(self.timeout).await?;
        let code = verify_callback(params, &state)?;

        let tokens = provider
            .endpoint()
            .exchange_code(&client, &code, &pkce.verifier, &redirect_uri)
            .await
            .context("authorization code exchange failed")?;
        provider.complete_consent(client, tokens).await?;

        println!();
        println!(
            "Authorization complete. Token stored in {}",
            provider.store().token_path().display()
        );
        Ok(())
    }
}

fn verify_callback(params: CallbackParams, expected_state: &str) -> Result<String> {
    if let Some(error) = params.error {
        bail!("authorization was denied: {error}");
    }
    if params.state.as_deref() != Some(expected_state) {
        bail!("OAuth state mismatch; refusing the redirect");
    }
    params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| anyhow!("redirect did not include an authorization code"))
}

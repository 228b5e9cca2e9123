use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

const DEFAULT_CREDS_SUBDIR: &str = ".config/mcp-gdrive";
const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 8000;
const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:8080"];
const DEFAULT_CONSENT_TIMEOUT_SECS: u64 = 300;

pub const CLIENT_SECRET_FILE: &str = "gcp-oauth.keys.json";
pub const TOKEN_FILE: &str = "sheets-token.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[value(alias = "stream-http", alias = "stream_http")]
    #[serde(alias = "stream-http", alias = "stream_http")]
    Http,
    Stdio,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Stdio => write!(f, "stdio"),
        }
    }
}

/// OAuth client and refresh token supplied through the environment instead of
/// the credential directory.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub creds_dir: PathBuf,
    pub env_credentials: Option<EnvCredentials>,
    pub enabled_tools: Option<HashSet<String>>,
    pub transport: TransportKind,
    pub http_bind_address: SocketAddr,
    pub workers: Option<usize>,
    pub cors_origins: Vec<String>,
    pub consent_timeout_secs: u64,
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            creds_dir: cli_creds_dir,
            google_client_id,
            google_client_secret,
            google_refresh_token,
            enabled_tools: cli_enabled_tools,
            transport: cli_transport,
            host: cli_host,
            port: cli_port,
            workers: cli_workers,
            cors_origins: cli_cors_origins,
            ..
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            creds_dir: file_creds_dir,
            enabled_tools: file_enabled_tools,
            transport: file_transport,
            host: file_host,
            port: file_port,
            workers: file_workers,
            cors_origins: file_cors_origins,
            consent_timeout_secs: file_consent_timeout,
        } = file_config;

        let creds_dir = cli_creds_dir
            .or(file_creds_dir)
            .unwrap_or_else(default_creds_dir);

        let env_credentials = match (
            google_client_id,
            google_client_secret,
            google_refresh_token,
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token))
                if !client_id.trim().is_empty() =>
            {
                Some(EnvCredentials {
                    client_id,
                    client_secret: SecretString::from(client_secret),
                    refresh_token: SecretString::from(refresh_token),
                })
            }
            _ => None,
        };

        let enabled_tools = cli_enabled_tools
            .or(file_enabled_tools)
            .map(|tools| {
                tools
                    .into_iter()
                    .map(|tool| tool.trim().to_ascii_lowercase())
                    .filter(|tool| !tool.is_empty())
                    .collect::<HashSet<_>>()
            })
            .filter(|set| !set.is_empty());

        let transport = cli_transport
            .or(file_transport)
            .unwrap_or(TransportKind::Stdio);

        let host = match cli_host.or(file_host) {
            Some(host) => host
                .parse::<IpAddr>()
                .with_context(|| format!("invalid bind host {host:?}"))?,
            None => DEFAULT_HTTP_HOST
                .parse()
                .context("default bind host is not an IP address")?,
        };
        let port = cli_port.or(file_port).unwrap_or(DEFAULT_HTTP_PORT);

        let cors_origins = cli_cors_origins
            .or(file_cors_origins)
            .unwrap_or_else(|| {
                DEFAULT_CORS_ORIGINS
                    .iter()
                    .map(|origin| (*origin).to_string())
                    .collect()
            })
            .into_iter()
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            creds_dir,
            env_credentials,
            enabled_tools,
            transport,
            http_bind_address: SocketAddr::new(host, port),
            workers: cli_workers.or(file_workers),
            cors_origins,
            consent_timeout_secs: file_consent_timeout.unwrap_or(DEFAULT_CONSENT_TIMEOUT_SECS),
        })
    }

    /// Fail fast on settings that would only surface once traffic arrives.
    pub fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers {
            anyhow::ensure!(workers > 0, "worker count must be at least 1");
        }
        if self.transport == TransportKind::Http {
            for origin in &self.cors_origins {
                let has_scheme = origin.starts_with("http://") || origin.starts_with("https://");
                anyhow::ensure!(
                    origin == "*" || has_scheme,
                    "CORS origin {:?} must start with http:// or https://",
                    origin
                );
            }
        }
        anyhow::ensure!(
            !self.creds_dir.as_os_str().is_empty(),
            "credential directory must not be empty"
        );
        anyhow::ensure!(
            self.consent_timeout_secs > 0,
            "consent timeout must be positive"
        );
        Ok(())
    }

    pub fn is_tool_enabled(&self, tool: &str) -> bool {
        match &self.enabled_tools {
            Some(set) => set.contains(&tool.to_ascii_lowercase()),
            None => true,
        }
    }
}

fn default_creds_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CREDS_SUBDIR)
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "google-sheets-mcp",
    about = "Google Sheets MCP server",
    version
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(
        long,
        env = "GOOGLE_SHEETS_MCP_CONFIG",
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "GDRIVE_CREDS_DIR",
        value_name = "DIR",
        help = "Directory holding gcp-oauth.keys.json and sheets-token.json",
        global = true
    )]
    pub creds_dir: Option<PathBuf>,

    #[arg(long, env = "GOOGLE_CLIENT_ID", hide_env_values = true, global = true)]
    pub google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub google_client_secret: Option<String>,

    #[arg(long, env = "GOOGLE_REFRESH_TOKEN", hide_env_values = true, global = true)]
    pub google_refresh_token: Option<String>,

    #[arg(
        long,
        env = "GOOGLE_SHEETS_MCP_ENABLED_TOOLS",
        value_name = "TOOL",
        value_delimiter = ',',
        help = "Restrict execution to the provided tool names",
        global = true
    )]
    pub enabled_tools: Option<Vec<String>>,

    #[arg(
        long,
        env = "MCP_TRANSPORT",
        value_enum,
        value_name = "TRANSPORT",
        help = "Transport to expose (stdio or http)",
        global = true
    )]
    pub transport: Option<TransportKind>,

    #[arg(
        long,
        env = "MCP_HOST",
        value_name = "HOST",
        help = "HTTP bind host when using http transport",
        global = true
    )]
    pub host: Option<String>,

    #[arg(
        long,
        env = "MCP_PORT",
        value_name = "PORT",
        help = "HTTP bind port when using http transport",
        global = true
    )]
    pub port: Option<u16>,

    #[arg(
        long,
        env = "MCP_WORKERS",
        value_name = "N",
        help = "Number of runtime worker threads for the http transport",
        global = true
    )]
    pub workers: Option<usize>,

    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_name = "ORIGIN",
        value_delimiter = ',',
        help = "Comma-separated list of allowed CORS origins",
        global = true
    )]
    pub cors_origins: Option<Vec<String>>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the MCP server (default)
    Serve,
    /// Run the interactive OAuth consent flow and store the issued token
    Auth(AuthArgs),
    /// Probe /health on a running http server; exits non-zero unless it answers 200
    HealthCheck(HealthCheckArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthArgs {
    #[arg(long, help = "Print the consent URL without trying to open a browser")]
    pub no_browser: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthCheckArgs {
    #[arg(long, value_name = "URL", help = "Full URL of the health endpoint")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    creds_dir: Option<PathBuf>,
    enabled_tools: Option<Vec<String>>,
    transport: Option<TransportKind>,
    host: Option<String>,
    port: Option<u16>,
    workers: Option<usize>,
    cors_origins: Option<Vec<String>>,
    consent_timeout_secs: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

use anyhow::{Context, Result};
use clap::Parser;
use google_sheets_mcp::{
    CliArgs, Command, LoggingConfig, ServerConfig, consent::ConsentFlow, init_logging, run_server,
    state::AppState,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn main() -> ExitCode {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = CliArgs::parse();
    let command = cli.command.clone().unwrap_or(Command::Serve);
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("error: {error:#}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(LoggingConfig::from_env().for_transport(config.transport)) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("failed to initialize logging: {error:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(command, config) {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "fatal error");
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: CliArgs) -> Result<ServerConfig> {
    let config = ServerConfig::from_args(cli)?;
    config.validate()?;
    Ok(config)
}

fn run(command: Command, config: ServerConfig) -> Result<ExitCode> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build().context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        match command {
            Command::Serve => run_server(config).await.map(|_| ExitCode::SUCCESS),
            Command::Auth(args) => {
                let timeout = Duration::from_secs(config.consent_timeout_secs);
                let state = AppState::new(Arc::new(config))?;
                ConsentFlow::new(timeout, !args.no_browser)
                    .run(&state.credentials())
                    .await?;
                Ok(ExitCode::SUCCESS)
            }
            Command::HealthCheck(args) => {
                let url = args.url.unwrap_or_else(|| {
                    format!(
                        "http://127.0.0.1:{}/health",
                        config.http_bind_address.port()
                    )
                });
                health_check(&url).await
            }
        }
    })
}

async fn health_check(url: &str) -> Result<ExitCode> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    match client.get(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => {
            let body = response.text().await.unwrap_or_default();
            println!("{body}");
            Ok(ExitCode::SUCCESS)
        }
        Ok(response) => {
            eprintln!("health check failed: {} returned {}", url, response.status());
            Ok(ExitCode::FAILURE)
        }
        Err(error) => {
            eprintln!("health check failed: {url}: {error}");
            Ok(ExitCode::FAILURE)
        }
    }
}

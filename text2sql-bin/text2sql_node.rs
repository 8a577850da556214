use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use text2sql_inference::{
    apis::ApiTrait, model_thread::ModelThreadDispatcher, models::candle::t5::T5Model,
    models::ModelConfig, HuggingFaceApi,
};
use text2sql_service::{
    config::Text2SqlServiceConfig,
    server::{run_server, AppState},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_appender::{
    non_blocking,
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::UtcTime},
    prelude::*,
    EnvFilter, Registry,
};

/// The directory where the logs are stored.
const LOGS: &str = "./logs";
/// The log file name.
const LOG_FILE: &str = "text2sql-node-service.log";
/// Environment variable holding the Hugging Face API token, for gated or private models.
const HF_TOKEN: &str = "HF_TOKEN";

/// Command line arguments for the text2sql node
#[derive(Parser)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config_path: String,
}

/// Configuration for the text2sql node.
struct Config {
    /// Configuration for the model.
    model: ModelConfig,

    /// Configuration for the HTTP service.
    service: Text2SqlServiceConfig,
}

impl Config {
    fn load(path: &str) -> Result<Self> {
        Ok(Self {
            model: ModelConfig::from_file_path(path)
                .context("Failed to parse the text2sql_inference configuration")?,
            service: Text2SqlServiceConfig::from_file_path(path)
                .context("Failed to parse the text2sql_service configuration")?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = setup_logging(LOGS).context("Failed to setup logging")?;

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load(&args.config_path)?;

    info!(
        target = "text2sql-node",
        event = "model_loading",
        model_id = config.model.model_id,
        revision = config.model.revision,
        "Loading model, this may take a while on the first run"
    );
    let hf_token = std::env::var(HF_TOKEN).ok();
    if hf_token.is_none() {
        warn!("{HF_TOKEN} is not set, only public models can be downloaded");
    }
    let api = HuggingFaceApi::create(hf_token, config.model.cache_dir.clone())
        .context("Failed to create the Hugging Face API client")?;
    let (dispatcher, model_thread_handle) =
        ModelThreadDispatcher::start::<T5Model, _>(api, config.model)
            .await
            .context("Failed to start the model thread")?;

    let tcp_listener = TcpListener::bind(&config.service.service_bind_address)
        .await
        .with_context(|| {
            format!(
                "Failed to bind to address {}",
                config.service.service_bind_address
            )
        })?;
    info!(
        target = "text2sql-node",
        event = "server_started",
        address = config.service.service_bind_address,
        "Starting text2sql service"
    );

    let server_result = run_server(AppState { dispatcher }, tcp_listener).await;

    // The router, and with it every dispatcher, is dropped once the server
    // returns, which lets the model thread exit.
    tokio::task::spawn_blocking(move || model_thread_handle.stop())
        .await
        .context("Failed to join the model thread")?;
    info!("text2sql node stopped");

    server_result
}

/// Configure logging with JSON formatting, file output, and console output.
///
/// The returned guard flushes the file writer when dropped, and must be kept
/// alive for the lifetime of the process.
fn setup_logging<P: AsRef<Path>>(log_dir: P) -> Result<WorkerGuard> {
    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let file_layer = fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_appender);

    let console_layer = fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_span_events(FmtSpan::ENTER);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,text2sql_service=debug,text2sql_inference=debug")
    });

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

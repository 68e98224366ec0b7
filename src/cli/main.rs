//! Bot entry point
//!
//! Parses flags, merges them over the environment configuration, installs the
//! subscriber and runs the polling loop next to the health endpoint until a
//! shutdown signal arrives.

use crate::{
    config::BotConfig,
    health,
    processor::{BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory},
    services::TracingProgressReporter,
    tracing_config::{spans, TracingConfig, TracingFormat},
    transport::{BotRunner, RequestHandler, TelegramTransport},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

/// Telegram bot that removes image backgrounds
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-bot")]
pub struct Cli {
    /// Inference backend (overrides INFERENCE_BACKEND)
    #[arg(short, long, value_name = "BACKEND")]
    pub backend: Option<BackendType>,

    /// Path to the local ONNX model (overrides MODEL_PATH)
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Health endpoint port (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}

impl Cli {
    /// Environment variables replaced by command-line flags
    fn env_overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(backend) = self.backend {
            overrides.push(("INFERENCE_BACKEND", backend.to_string()));
        }
        if let Some(model) = &self.model {
            overrides.push(("MODEL_PATH", model.display().to_string()));
        }
        if let Some(port) = self.port {
            overrides.push(("PORT", port.to_string()));
        }
        overrides
    }

    /// Build the configuration from flags layered over `lookup`
    fn load_config<F>(&self, lookup: F) -> crate::Result<BotConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = self.env_overrides();
        BotConfig::from_lookup(|key| {
            overrides
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.clone())
                .or_else(|| lookup(key))
        })
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id = uuid::Uuid::new_v4().to_string();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into())
        .with_session_id(session_id.clone())
        .init()
        .context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let config = cli
        .load_config(|key| std::env::var(key).ok())
        .context("Invalid configuration")?;

    let span = spans::session(&session_id, &config.backend_type.to_string());
    run_bot(config, cli.verbose > 0).instrument(span).await
}

async fn run_bot(config: BotConfig, verbose: bool) -> Result<()> {
    // Hosting platforms probe the port while the model is still loading
    let listener = health::bind(config.health_port)
        .await
        .context("Health endpoint unavailable")?;
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let health_task = tokio::spawn(health::serve_on(listener, async move {
        // A dropped sender also means shutdown
        let _ = stop_rx.changed().await;
    }));

    // Model loading reads and hashes the file, keep it off the runtime threads
    let backend_config = config.clone();
    let backend = tokio::task::spawn_blocking(move || {
        let _span = spans::backend_setup(&backend_config.backend_type.to_string()).entered();
        DefaultBackendFactory.create_backend(&backend_config)
    })
    .await
    .context("Backend setup task failed")?
    .context("Failed to create inference backend")?;

    let transport = Arc::new(TelegramTransport::new(&config).context("Failed to create chat transport")?);
    let username = transport
        .get_me()
        .await
        .context("Chat platform rejected the bot token")?;
    info!(%username, backend = backend.name(), "Bot authenticated");

    let processor = BackgroundRemovalProcessor::new(backend, config.inference_timeout())
        .with_progress_reporter(Arc::new(TracingProgressReporter::new(verbose)));
    let handler = RequestHandler::new(transport.clone(), processor, config.transfer_timeout());
    let runner = BotRunner::new(transport, handler);

    runner.run(shutdown_signal()).await?;

    let _ = stop_tx.send(true);
    match health_task.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!(error = %e, "Health endpoint failed"),
        Err(e) => error!(error = %e, "Health endpoint task panicked"),
    }

    info!("Bot stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn show_provider_diagnostics() {
    println!("Available inference backends:");
    for backend in DefaultBackendFactory.available_backends() {
        println!("  {backend}");
    }

    #[cfg(feature = "onnx")]
    {
        println!();
        println!("ONNX Runtime execution providers:");
        for (name, available, description) in crate::backends::OnnxModel::list_providers() {
            let status = if available { "✅" } else { "❌" };
            println!("  {status} {name:<8} {description}");
        }
    }
}

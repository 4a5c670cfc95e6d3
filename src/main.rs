//! Switchboard telephony event broker.
//!
//! Main entry point: wires the stream publisher and durable consumer, the
//! fan-out forwarder, the config watcher, and the HTTP surface, then
//! coordinates signal-driven graceful shutdown.

use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use switchboard_api::AppState;
use switchboard_core::{Config, ConfigReloader, OutcomeStore, RouteTable};
use switchboard_delivery::{ConsumerLoop, ForwardClient, Forwarder};
use switchboard_stream::{ConsumerSettings, EventConsumer, Publisher, DURABLE_NAME};

/// How long in-flight work may drain after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "switchboard", version, about = "Telephony event ingress and fan-out broker")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    info!("Starting switchboard event broker");

    let config = Config::load(&cli.config).context("failed to load configuration")?;
    info!(
        port = config.server.port,
        stream = %config.nats.stream_name,
        subject_pattern = %config.nats.subject_pattern,
        ack_wait_secs = config.nats.ack_wait_seconds,
        max_deliveries = config.nats.max_deliveries,
        route_count = config.routes.len(),
        "Configuration loaded"
    );

    let publisher = Arc::new(
        Publisher::connect(
            &config.nats.url,
            &config.nats.stream_name,
            &config.nats.subject_pattern,
        )
        .await
        .context("failed to create stream publisher")?,
    );

    let consumer = EventConsumer::connect(
        &config.nats.url,
        ConsumerSettings {
            stream_name: config.nats.stream_name.clone(),
            durable_name: DURABLE_NAME.to_string(),
            ack_wait: config.nats.ack_wait(),
            max_deliveries: config.nats.max_deliveries,
        },
    )
    .await
    .context("failed to bind stream consumer")?;

    let routes = Arc::new(RouteTable::new(&config.routes));
    let outcomes = Arc::new(OutcomeStore::default());
    let forwarder = Arc::new(Forwarder::new(
        Arc::clone(&routes),
        Arc::clone(&outcomes),
        ForwardClient::with_defaults().context("failed to build forward client")?,
        config.nats.max_deliveries,
    ));
    let reloader = Arc::new(ConfigReloader::new(
        &cli.config,
        Arc::clone(&routes),
        config.clone(),
    ));

    let shutdown = CancellationToken::new();

    let mut consumer_task =
        tokio::spawn(ConsumerLoop::new(consumer, Arc::clone(&forwarder)).run(shutdown.clone()));
    let watcher_task = tokio::spawn(Arc::clone(&reloader).watch(shutdown.clone()));

    let state = AppState::new(publisher, outcomes, routes, reloader);
    let server_config = config.server.clone();
    let server_shutdown = shutdown.clone();
    let mut server_task = tokio::spawn(async move {
        switchboard_api::start_server(state, &server_config, server_shutdown).await
    });

    info!("Service started successfully");

    let mut supervised_failure = false;
    tokio::select! {
        () = shutdown_signal() => {
            info!("Received shutdown signal");
        }
        result = &mut server_task => {
            supervised_failure = true;
            match result {
                Ok(Ok(())) => error!("HTTP server exited unexpectedly"),
                Ok(Err(err)) => error!(error = %err, "HTTP server error"),
                Err(err) => error!(error = %err, "HTTP server task panicked"),
            }
        }
        result = &mut consumer_task => {
            supervised_failure = true;
            match result {
                Ok(Ok(())) => error!("consumer loop exited unexpectedly"),
                Ok(Err(err)) => error!(error = %err, "consumer loop error"),
                Err(err) => error!(error = %err, "consumer loop task panicked"),
            }
        }
    }

    info!("Initiating graceful shutdown");
    shutdown.cancel();

    // The server drains connections and the consumer loop stops reading;
    // in-flight dispatches finish within their own delivery deadline.
    // Anything still unacknowledged after the grace window is redelivered
    // by the stream once ack_wait expires.
    let drain = async {
        let _ = watcher_task.await;
        if !server_task.is_finished() {
            let _ = (&mut server_task).await;
        }
        if !consumer_task.is_finished() {
            let _ = (&mut consumer_task).await;
        }
    };

    tokio::select! {
        () = drain => {
            info!("All tasks stopped");
        }
        () = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("Shutdown grace period expired, exiting with work in flight");
        }
    }

    info!("Shutdown complete");

    if supervised_failure {
        bail!("a supervised task failed");
    }
    Ok(())
}

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // RUST_LOG wins over the CLI flag when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},switchboard={level}")));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C");
        }
        () = terminate => {
            info!("Received SIGTERM");
        }
    }
}

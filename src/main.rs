// ABOUTME: Entry point for the Pépito relay: logging, config, feed relay, and Discord session
// ABOUTME: Runs until Ctrl-C or the Discord client gives up, then flushes the channel registry

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use pepito::config::Config;
use pepito::handler::EventHandler;
use pepito::lifecycle::run_reminder_sweep;
use pepito::platform::{DiscordPlatform, GatewayBridge};
use pepito::relay::run_relay;
use pepito::{metrics, paths, AppContext, ConnectionState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const HANDLER_DRAIN: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "pepito",
    version,
    about = "Relays Pépito cat-door events into Discord channels"
)]
struct Cli {
    /// Path to config.toml (overrides discovery)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, default_value_t = false)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! Pépito relay crashed with the following error:    ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Pépito relay");

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing::info!(
        feed = %config.feed.url,
        reconnect_secs = config.feed.reconnect_delay_secs,
        timezone = %config.notification.timezone,
        registry = %config.registry.path().display(),
        operator_tenant = ?config.operator.tenant_id,
        reminders = config.reminder.enabled,
        status_server = config.status.enabled,
        "Configuration loaded"
    );

    if cli.check_config {
        println!("Configuration OK");
        return Ok(());
    }

    let metrics_handle = match metrics::init_metrics() {
        Ok(handle) => Some(Arc::new(handle)),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let ctx = AppContext::new(config)?;
    metrics::set_configured_tenants(ctx.registry.lock().await.len());

    // The bridge forwards gateway dispatches to the handler
    let (event_tx, event_rx) = mpsc::channel(256);
    let bridge = GatewayBridge::new(event_tx);
    let gateway_state = bridge.state();
    let (platform, mut client) = DiscordPlatform::connect(&ctx.config.discord, bridge).await?;
    let shard_manager = client.shard_manager.clone();

    // Feed relay
    let feed = ctx.feed_client()?;
    let feed_state = feed.state();
    let (events, feed_task) = feed.spawn(ctx.shutdown_signal());
    let relay_task = {
        let platform = platform.clone();
        let registry = ctx.registry.clone();
        let translator = ctx.translator.clone();
        tokio::spawn(async move { run_relay(&platform, registry, &translator, events).await })
    };

    // Discord session and the handler consuming its events
    let mut gateway_task = tokio::spawn(async move { client.start().await });
    let handler = EventHandler::new(ctx.clone(), platform.clone());
    let handler_task = tokio::spawn(handler.run(event_rx));

    let reminder_task = {
        let platform = platform.clone();
        let registry = ctx.registry.clone();
        let config = ctx.config.reminder.clone();
        let shutdown = ctx.shutdown_signal();
        tokio::spawn(async move {
            run_reminder_sweep(&platform, &registry, &config, shutdown).await
        })
    };

    if ctx.config.status.enabled {
        spawn_status_server(&ctx, feed_state, gateway_state, metrics_handle);
    }

    tracing::info!("Pépito relay running - press Ctrl-C to stop");

    let mut exit: Result<()> = Ok(());
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
        result = &mut gateway_task => {
            exit = match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("Discord client stopped")),
                Err(e) => Err(anyhow::anyhow!("Gateway task panicked: {}", e)),
            };
        }
    }

    ctx.request_shutdown();

    if let Err(e) = feed_task.await {
        tracing::warn!(error = %e, "Feed task ended abnormally");
    }
    // The relay ends once the feed closes its event stream
    if let Err(e) = relay_task.await {
        tracing::warn!(error = %e, "Relay task ended abnormally");
    }
    shard_manager.shutdown_all().await;
    if !gateway_task.is_finished() {
        let _ = gateway_task.await;
    }
    // The handler ends once the client drops the bridge and its event sender
    if tokio::time::timeout(HANDLER_DRAIN, handler_task).await.is_err() {
        tracing::warn!("Platform event handler did not stop in time");
    }
    let _ = reminder_task.await;

    if let Err(e) = ctx.flush_registry().await {
        tracing::error!(error = %format!("{e:#}"), "Failed to save channel registry");
    }

    tracing::info!("Pépito relay stopped");
    exit
}

#[cfg(feature = "status")]
fn spawn_status_server(
    ctx: &AppContext,
    feed: watch::Receiver<ConnectionState>,
    gateway: watch::Receiver<ConnectionState>,
    metrics: Option<Arc<PrometheusHandle>>,
) {
    let state = pepito::status::StatusState {
        registry: ctx.registry.clone(),
        feed,
        gateway,
        metrics,
    };
    let config = ctx.config.status.clone();
    let shutdown = ctx.shutdown_signal();
    tokio::spawn(async move {
        if let Err(e) = pepito::status::start_status_server(&config, state, shutdown).await {
            tracing::error!(error = %format!("{e:#}"), "Status server stopped");
        }
    });
}

#[cfg(not(feature = "status"))]
fn spawn_status_server(
    _ctx: &AppContext,
    _feed: watch::Receiver<ConnectionState>,
    _gateway: watch::Receiver<ConnectionState>,
    _metrics: Option<Arc<PrometheusHandle>>,
) {
    tracing::warn!("Status server requested but this build lacks the `status` feature");
}

/// Console layer (text, or JSON with LOG_FORMAT=json) plus a daily log file
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let console = if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let log_dir = paths::log_dir();
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "pepito.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Failed to create log directory {}: {}", log_dir.display(), e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    guard
}

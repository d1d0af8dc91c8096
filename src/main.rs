//! Application entry point for the `codemetal-airwatch` backend service.
//!
//! This binary orchestrates the full startup sequence for the air quality
//! decision engine, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the database schema if it does not exist
//! - Loading the severity ladder once and wiring the alert lifecycle manager
//! - Starting the notification fanout worker and the periodic threshold scan
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - see `config.rs` for engine tunables
use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use airwatch::advisory::{AdvisoryGenerator, HttpAdvisoryGenerator};
use airwatch::fanout::{LogChannel, NotificationLogChannel, WebhookChannel};
use airwatch::routes::{self, AppState};
use airwatch::store::{PgAlertStore, PgReadingSource, PgSensorRegistry};
use airwatch::{
    config, schema, AlertManager, AqiCalculator, Config, Fanout, NotificationChannel,
    ReadingSource, SeverityLadder,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    // Threshold tables are loaded once and shared read-only from here on
    let ladder = match &cfg.thresholds_file {
        Some(path) => SeverityLadder::from_json_file(path)?,
        None => SeverityLadder::default(),
    };

    let channels = build_channels(&cfg, &pool)?;
    let (fanout, fanout_worker) = Fanout::new(channels, cfg.fanout_settings()).spawn();

    let manager = Arc::new(AlertManager::new(
        Arc::new(PgAlertStore::new(pool.clone())),
        Arc::new(PgSensorRegistry::new(pool.clone(), cfg.default_area.clone())),
        Arc::new(ladder),
        fanout,
        cfg.engine_settings(),
    ));
    let readings: Arc<dyn ReadingSource> = Arc::new(PgReadingSource::new(pool.clone()));

    let advisory: Option<Arc<dyn AdvisoryGenerator>> = match &cfg.advisory_api_url {
        Some(url) => Some(Arc::new(HttpAdvisoryGenerator::new(
            url.clone(),
            Duration::from_secs(15),
        )?)),
        None => None,
    };

    let scanner = tokio::spawn(run_scanner(
        Arc::clone(&manager),
        Arc::clone(&readings),
        cfg.clone(),
    ));

    // Build app from routes gateway (EMBP)
    let app = routes::router(AppState {
        manager,
        readings,
        calculator: Arc::new(AqiCalculator::default()),
        advisory,
        scan_window: cfg.scan_window(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The scanner holds the last manager (and fanout handle) outside the router.
    scanner.abort();
    let _ = scanner.await;

    // With every handle gone the worker drains the queue and exits.
    match tokio::time::timeout(FANOUT_DRAIN_TIMEOUT, fanout_worker).await {
        Ok(Ok(())) => tracing::info!("Notification queue drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Fanout worker failed during shutdown"),
        Err(_) => tracing::warn!(
            timeout_secs = FANOUT_DRAIN_TIMEOUT.as_secs(),
            "Gave up waiting for queued notifications"
        ),
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

const FANOUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    // ---
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}

// ---

/// Notification channels enabled by configuration. The log channel is always on.
fn build_channels(
    cfg: &Config,
    pool: &sqlx::PgPool,
) -> Result<Vec<Arc<dyn NotificationChannel>>> {
    // ---
    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![
        Arc::new(LogChannel),
        Arc::new(NotificationLogChannel::new(pool.clone())),
    ];

    if let Some(url) = &cfg.alert_webhook_url {
        channels.push(Arc::new(WebhookChannel::new(url.clone(), cfg.channel_timeout())?));
    }
    Ok(channels)
}

/// Periodic threshold scan over the trailing scan window.
///
/// The engine owns no timer; this loop is the external scheduler.
async fn run_scanner(manager: Arc<AlertManager>, readings: Arc<dyn ReadingSource>, cfg: Config) {
    // ---
    let mut interval = tokio::time::interval(cfg.scan_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Skip the first immediate tick
    interval.tick().await;
    tracing::info!(interval_secs = cfg.scan_interval_secs, "Threshold scanner scheduled");

    loop {
        interval.tick().await;
        let start = std::time::Instant::now();
        let window_start = Utc::now() - cfg.scan_window();

        match manager.scan_source(readings.as_ref(), window_start).await {
            Ok(summary) => tracing::debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                readings_scanned = summary.readings_scanned,
                "Scheduled scan finished"
            ),
            Err(e) => tracing::error!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                transient = e.is_transient(),
                "Scheduled scan failed"
            ),
        }
    }
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AXUM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

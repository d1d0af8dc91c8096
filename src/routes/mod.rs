//! HTTP gateway for the air quality engine (EMBP).
//!
//! Each sibling module exports a subrouter over [`AppState`]; `main.rs` only sees
//! [`router`].

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Duration, Utc};

use crate::advisory::AdvisoryGenerator;
use crate::aqi::AqiCalculator;
use crate::lifecycle::AlertManager;
use crate::store::ReadingSource;

mod alerts;
mod aqi;
mod error;
mod health;
mod monitor;
mod statistics;

pub use error::ApiError;

/// Longest trailing window a query may ask for.
const MAX_LOOKBACK_DAYS: i64 = 3650;

// ---

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AlertManager>,
    pub readings: Arc<dyn ReadingSource>,
    pub calculator: Arc<AqiCalculator>,
    pub advisory: Option<Arc<dyn AdvisoryGenerator>>,
    /// Trailing window covered by `POST /monitor/check`.
    pub scan_window: chrono::Duration,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(alerts::router())
        .merge(monitor::router())
        .merge(aqi::router())
        .merge(statistics::router())
        .merge(health::router())
        .with_state(state)
}

/// Start of the trailing window `span` ending at `now`.
///
/// `param` names the query parameter in the 400 returned for oversized windows.
fn window_start(now: DateTime<Utc>, span: Duration, param: &str) -> Result<DateTime<Utc>, ApiError> {
    // ---
    let out_of_range =
        || ApiError::BadRequest(format!("{param} must cover at most {MAX_LOOKBACK_DAYS} days"));

    if span > Duration::days(MAX_LOOKBACK_DAYS) {
        return Err(out_of_range());
    }
    now.checked_sub_signed(span).ok_or_else(out_of_range)
}

#[cfg(test)]
fn test_state(readings: Vec<crate::models::Reading>) -> AppState {
    // ---
    use crate::fanout::FanoutHandle;
    use crate::lifecycle::EngineSettings;
    use crate::severity::SeverityLadder;
    use crate::store::{InMemoryAlertStore, InMemoryReadingSource, StaticSensorRegistry};

    let manager = AlertManager::new(
        Arc::new(InMemoryAlertStore::new()),
        Arc::new(StaticSensorRegistry::new(Some("Pavlodar".into()))),
        Arc::new(SeverityLadder::default()),
        FanoutHandle::disabled(),
        EngineSettings::default(),
    );
    AppState {
        manager: Arc::new(manager),
        readings: Arc::new(InMemoryReadingSource::new(readings)),
        calculator: Arc::new(AqiCalculator::default()),
        advisory: None,
        scan_window: Duration::minutes(15),
    }
}

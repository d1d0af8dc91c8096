use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{window_start, ApiError, AppState};
use crate::lifecycle::AlertHistory;
use crate::models::{Alert, OpenAlertFilter};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/alerts/active", get(active))
        .route("/alerts/history", get(history))
        .route("/alerts/{id}/resolve", post(resolve))
}

#[derive(Debug, Serialize)]
struct ActiveAlerts {
    count: usize,
    alerts: Vec<Alert>,
}

async fn active(
    Query(filter): Query<OpenAlertFilter>,
    State(state): State<AppState>,
) -> Result<Json<ActiveAlerts>, ApiError> {
    // ---
    let alerts = state.manager.list_open(&filter).await?;
    Ok(Json(ActiveAlerts {
        count: alerts.len(),
        alerts,
    }))
}

async fn resolve(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Alert>, ApiError> {
    // ---
    info!("POST /alerts/{}/resolve", id);
    let alert = state.manager.resolve(id).await?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

async fn history(
    Query(params): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<AlertHistory>, ApiError> {
    // ---
    let days = params.days.unwrap_or(7);
    let since = window_start(Utc::now(), Duration::days(i64::from(days)), "days")?;
    let history = state.manager.history(since).await?;
    Ok(Json(history))
}

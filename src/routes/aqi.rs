use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{window_start, ApiError, AppState};
use crate::advisory::{advise, AdvisoryContext};
use crate::aqi::{average_levels, AqiResult, GeoBounds};
use crate::models::PollutantLevels;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/aqi/current", get(current))
        .route("/insights", get(insights))
}

#[derive(Debug, Deserialize)]
struct CurrentQuery {
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius_km: Option<f64>,
}

#[derive(Debug, Serialize)]
struct CurrentAqi {
    #[serde(flatten)]
    result: AqiResult,
    timestamp: DateTime<Utc>,
    readings_used: usize,
    data_points: PollutantLevels,
}

/// Current AQI from the last hour of readings, optionally near a coordinate.
async fn current(
    Query(params): Query<CurrentQuery>,
    State(state): State<AppState>,
) -> Result<Json<CurrentAqi>, ApiError> {
    // ---
    let now = Utc::now();
    let mut readings = state.readings.readings_since(now - Duration::hours(1)).await?;

    if let (Some(lat), Some(lon)) = (params.latitude, params.longitude) {
        let bounds = GeoBounds::around(lat, lon, params.radius_km.unwrap_or(5.0));
        readings.retain(|r| bounds.contains(r.latitude, r.longitude));
    }

    let averages = average_levels(&readings);
    Ok(Json(CurrentAqi {
        result: state.calculator.calculate(&averages),
        timestamp: now,
        readings_used: readings.len(),
        data_points: averages,
    }))
}

#[derive(Debug, Deserialize)]
struct InsightsQuery {
    area: Option<String>,
    hours: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Insights {
    timestamp: DateTime<Utc>,
    area: Option<String>,
    aqi: AqiResult,
    insights: String,
    data_quality: &'static str,
}

/// AQI over a trailing window plus advisory text, with a canned fallback.
async fn insights(
    Query(params): Query<InsightsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Insights>, ApiError> {
    // ---
    let now = Utc::now();
    let window_hours = i64::from(params.hours.unwrap_or(24));
    let since = window_start(now, Duration::hours(window_hours), "hours")?;
    let readings = state.readings.readings_since(since).await?;

    let averages = average_levels(&readings);
    let context = AdvisoryContext {
        area: params.area,
        aqi: state.calculator.calculate(&averages),
        averages,
        window_hours,
    };
    let text = advise(state.advisory.as_deref(), &context).await;

    Ok(Json(Insights {
        timestamp: now,
        area: context.area,
        aqi: context.aqi,
        insights: text,
        data_quality: if readings.len() > 100 { "good" } else { "limited" },
    }))
}

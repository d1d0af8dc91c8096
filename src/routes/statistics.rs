use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{window_start, ApiError, AppState};
use crate::models::Pollutant;
use crate::statistics::{detect_anomalies, hourly_statistics, AnomalyReport, HourlyStats};

/// Anomalies listed per response; `anomalies_found` still counts all of them.
const ANOMALY_LIMIT: usize = 20;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/statistics/hourly", get(hourly))
        .route("/anomalies", get(anomalies))
}

#[derive(Debug, Deserialize)]
struct HourlyQuery {
    hours: Option<u32>,
    sensor_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HourlyResponse {
    period_hours: u32,
    data_points: usize,
    statistics: Vec<HourlyStats>,
}

/// Hourly pollutant summaries over the last `hours` (default 24).
async fn hourly(
    Query(params): Query<HourlyQuery>,
    State(state): State<AppState>,
) -> Result<Json<HourlyResponse>, ApiError> {
    // ---
    let hours = params.hours.unwrap_or(24);
    let since = window_start(Utc::now(), Duration::hours(i64::from(hours)), "hours")?;
    let readings = state.readings.readings_since(since).await?;

    let statistics = hourly_statistics(&readings, params.sensor_id.as_deref());
    Ok(Json(HourlyResponse {
        period_hours: hours,
        data_points: statistics.len(),
        statistics,
    }))
}

#[derive(Debug, Deserialize)]
struct AnomalyQuery {
    hours: Option<u32>,
    threshold: Option<f64>,
    pollutant: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnomalyResponse {
    period_hours: u32,
    #[serde(flatten)]
    report: AnomalyReport,
}

/// Readings more than `threshold` standard deviations above the window mean.
async fn anomalies(
    Query(params): Query<AnomalyQuery>,
    State(state): State<AppState>,
) -> Result<Json<AnomalyResponse>, ApiError> {
    // ---
    let hours = params.hours.unwrap_or(24);
    let k = params.threshold.unwrap_or(2.0);
    if !k.is_finite() || k < 0.0 {
        return Err(ApiError::BadRequest(
            "threshold must be a non-negative number".to_string(),
        ));
    }
    let pollutant = match params.pollutant.as_deref() {
        None => Pollutant::Pm25,
        Some(name) => name
            .parse::<Pollutant>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };

    let since = window_start(Utc::now(), Duration::hours(i64::from(hours)), "hours")?;
    let readings = state.readings.readings_since(since).await?;

    let mut report = detect_anomalies(&readings, pollutant, k);
    report.anomalies.truncate(ANOMALY_LIMIT);
    Ok(Json(AnomalyResponse {
        period_hours: hours,
        report,
    }))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{PollutantLevels, Reading};
    use crate::routes::test_state;

    fn reading(sensor: &str, pm25: f64) -> Reading {
        Reading {
            sensor_id: sensor.into(),
            timestamp: Utc::now() - Duration::minutes(5),
            latitude: 52.28,
            longitude: 76.95,
            levels: PollutantLevels {
                pm25: Some(pm25),
                ..Default::default()
            },
            temperature: None,
            humidity: None,
            pressure: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_hourly_filters_by_sensor() {
        // ---
        let state = test_state(vec![reading("S1", 10.0), reading("S2", 30.0)]);
        let Json(body) = hourly(
            Query(HourlyQuery {
                hours: Some(1),
                sensor_id: Some("S2".into()),
            }),
            State(state),
        )
        .await
        .unwrap();

        let total: usize = body.statistics.iter().map(|s| s.readings).sum();
        assert_eq!(total, 1);
        assert!(body
            .statistics
            .iter()
            .all(|s| s.pollutants[&Pollutant::Pm25].max == 30.0));
    }

    #[tokio::test]
    async fn test_anomalies_are_capped() {
        // ---
        let mut readings: Vec<Reading> = (0..100).map(|i| reading(&format!("B{i}"), 5.0)).collect();
        readings.extend((0..25).map(|i| reading(&format!("H{i}"), 400.0)));

        let Json(body) = anomalies(
            Query(AnomalyQuery {
                hours: None,
                threshold: Some(1.0),
                pollutant: Some("pm2.5".into()),
            }),
            State(test_state(readings)),
        )
        .await
        .unwrap();

        assert_eq!(body.report.anomalies_found, 25);
        assert_eq!(body.report.anomalies.len(), ANOMALY_LIMIT);
    }

    #[tokio::test]
    async fn test_anomaly_parameters_are_validated() {
        // ---
        let bad_pollutant = anomalies(
            Query(AnomalyQuery {
                hours: None,
                threshold: None,
                pollutant: Some("radon".into()),
            }),
            State(test_state(Vec::new())),
        )
        .await;
        assert!(matches!(bad_pollutant, Err(ApiError::BadRequest(_))));

        let bad_threshold = anomalies(
            Query(AnomalyQuery {
                hours: None,
                threshold: Some(-1.0),
                pollutant: None,
            }),
            State(test_state(Vec::new())),
        )
        .await;
        assert!(matches!(bad_threshold, Err(ApiError::BadRequest(_))));

        let bad_window = hourly(
            Query(HourlyQuery {
                hours: Some(u32::MAX),
                sensor_id: None,
            }),
            State(test_state(Vec::new())),
        )
        .await;
        assert!(matches!(bad_window, Err(ApiError::BadRequest(_))));
    }
}

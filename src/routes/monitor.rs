use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ApiError, AppState};
use crate::lifecycle::ScanSummary;
use crate::models::{Alert, Reading};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/readings/evaluate", post(evaluate))
        .route("/monitor/check", post(check))
}

#[derive(Debug, Serialize)]
struct EvaluateResponse {
    alerts_created: Vec<Alert>,
    duplicates_suppressed: usize,
}

/// Push callback for a single reading.
///
/// Negative or non-finite concentrations are rejected with 400 before the engine
/// sees them.
async fn evaluate(
    State(state): State<AppState>,
    Json(reading): Json<Reading>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    // ---
    debug!(sensor_id = %reading.sensor_id, "POST /readings/evaluate");

    if let Some((pollutant, value)) = reading.levels.first_invalid() {
        warn!(sensor_id = %reading.sensor_id, pollutant = %pollutant, value, "Rejected reading");
        return Err(ApiError::BadRequest(format!(
            "{pollutant} concentration must be a non-negative number, got {value}"
        )));
    }

    let evaluation = state.manager.evaluate(&reading).await?;
    Ok(Json(EvaluateResponse {
        alerts_created: evaluation.created,
        duplicates_suppressed: evaluation.suppressed,
    }))
}

/// Run a threshold scan over the trailing scan window.
async fn check(State(state): State<AppState>) -> Result<Json<ScanSummary>, ApiError> {
    // ---
    info!("POST /monitor/check - Starting threshold scan");
    let window_start = Utc::now() - state.scan_window;
    let summary = state
        .manager
        .scan_source(state.readings.as_ref(), window_start)
        .await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{OpenAlertFilter, PollutantLevels};
    use crate::routes::test_state;

    fn reading(levels: PollutantLevels) -> Reading {
        Reading {
            sensor_id: "S7".into(),
            timestamp: Utc::now(),
            latitude: 52.28,
            longitude: 76.95,
            levels,
            temperature: None,
            humidity: None,
            pressure: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_negative_concentration_is_rejected() {
        // ---
        let state = test_state(Vec::new());
        let result = evaluate(
            State(state.clone()),
            Json(reading(PollutantLevels {
                pm25: Some(80.0),
                co: Some(-1.5),
                ..Default::default()
            })),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        let open = state.manager.list_open(&OpenAlertFilter::default()).await.unwrap();
        assert!(open.is_empty(), "rejected reading must not open alerts");
    }

    #[tokio::test]
    async fn test_non_finite_concentration_is_rejected() {
        // ---
        let result = evaluate(
            State(test_state(Vec::new())),
            Json(reading(PollutantLevels {
                pm10: Some(f64::INFINITY),
                ..Default::default()
            })),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_valid_reading_is_evaluated() {
        // ---
        let Json(body) = evaluate(
            State(test_state(Vec::new())),
            Json(reading(PollutantLevels {
                pm25: Some(60.0),
                ..Default::default()
            })),
        )
        .await
        .unwrap();

        assert_eq!(body.alerts_created.len(), 1);
        assert_eq!(body.duplicates_suppressed, 0);
    }

    #[tokio::test]
    async fn test_check_scans_reading_source() {
        // ---
        let state = test_state(vec![reading(PollutantLevels {
            pm25: Some(160.0),
            ..Default::default()
        })]);
        let Json(summary) = check(State(state)).await.unwrap();

        assert_eq!(summary.readings_scanned, 1);
        assert_eq!(summary.alerts_created, 1);
    }
}

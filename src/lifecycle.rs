//! Alert deduplication and lifecycle.
//!
//! [`AlertManager`] turns classified readings into alerts. For every pollutant at
//! or above [`Severity::ALERTING`] it checks the store for an open alert on the same
//! (sensor, pollutant) pair inside the dedup window and only creates a new one when
//! none exists. The check-and-create step runs under a lock scoped to that pair, so
//! concurrent readings for one pair cannot both open alerts while different pairs
//! proceed in parallel.
//!
//! Alerts only move from open to resolved. Resolving an already-resolved alert is
//! a no-op that returns the alert as stored.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::fanout::FanoutHandle;
use crate::models::{
    Alert, AlertLocation, AlertType, NewAlert, OpenAlertFilter, Pollutant, Reading, Severity,
};
use crate::severity::SeverityLadder;
use crate::store::{AlertStore, ReadingSource, SensorRegistry, OPEN_ALERT_LIMIT};

// ---

/// Tunables for the lifecycle manager.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub dedup_window: Duration,
    pub open_alert_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            dedup_window: Duration::hours(1),
            open_alert_limit: OPEN_ALERT_LIMIT,
        }
    }
}

/// Outcome of evaluating one reading.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub created: Vec<Alert>,
    /// Qualifying pollutants that already had an open alert in the window.
    pub suppressed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub readings_scanned: usize,
    pub alerts_created: usize,
    pub duplicates_suppressed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertHistory {
    pub since: DateTime<Utc>,
    pub total_alerts: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub alerts: Vec<Alert>,
}

type PairKey = (String, Pollutant);

/// Registry of per-(sensor, pollutant) locks. Entries are dropped once unused.
#[derive(Default)]
struct PairLocks {
    locks: Mutex<HashMap<PairKey, Arc<Mutex<()>>>>,
}

impl PairLocks {
    async fn entry(&self, key: &PairKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    async fn release(&self, key: &PairKey, entry: Arc<Mutex<()>>) {
        // ---
        let mut locks = self.locks.lock().await;
        // One reference in the map and the one we hold: nobody else is waiting.
        if Arc::strong_count(&entry) == 2 {
            locks.remove(key);
        }
    }

    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Owns alert creation and resolution.
pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    sensors: Arc<dyn SensorRegistry>,
    ladder: Arc<SeverityLadder>,
    fanout: FanoutHandle,
    settings: EngineSettings,
    pair_locks: PairLocks,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn AlertStore>,
        sensors: Arc<dyn SensorRegistry>,
        ladder: Arc<SeverityLadder>,
        fanout: FanoutHandle,
        settings: EngineSettings,
    ) -> Self {
        AlertManager {
            store,
            sensors,
            ladder,
            fanout,
            settings,
            pair_locks: PairLocks::default(),
        }
    }

    pub async fn evaluate(&self, reading: &Reading) -> EngineResult<Evaluation> {
        self.evaluate_at(reading, Utc::now()).await
    }

    /// Evaluate a reading as of `now`, which stamps new alerts and anchors the window.
    pub async fn evaluate_at(
        &self,
        reading: &Reading,
        now: DateTime<Utc>,
    ) -> EngineResult<Evaluation> {
        // ---
        let mut evaluation = Evaluation::default();
        let mut area: Option<Option<String>> = None;

        for (pollutant, value) in reading.levels.iter() {
            let severity = self.ladder.classify(pollutant, value);
            if !severity.is_alerting() {
                continue;
            }
            let Some(threshold) = self.ladder.threshold_for(pollutant, severity) else {
                continue;
            };

            if area.is_none() {
                area = Some(self.area_for(&reading.sensor_id).await);
            }
            let alert_area = area.clone().flatten();

            let key = (reading.sensor_id.clone(), pollutant);
            let entry = self.pair_locks.entry(&key).await;
            let guard = entry.lock().await;
            let outcome = self
                .open_if_absent(reading, pollutant, value, severity, threshold, alert_area, now)
                .await;
            drop(guard);
            self.pair_locks.release(&key, entry).await;

            match outcome? {
                Some(alert) => {
                    self.fanout.notify(alert.clone());
                    evaluation.created.push(alert);
                }
                None => evaluation.suppressed += 1,
            }
        }

        Ok(evaluation)
    }

    /// Dedup check and creation. Must run under the pair lock.
    #[allow(clippy::too_many_arguments)]
    async fn open_if_absent(
        &self,
        reading: &Reading,
        pollutant: Pollutant,
        value: f64,
        severity: Severity,
        threshold: f64,
        area: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Alert>> {
        // ---
        let since = now - self.settings.dedup_window;
        if let Some(existing) = self
            .store
            .find_open_alert(&reading.sensor_id, pollutant, since)
            .await?
        {
            debug!(
                sensor_id = %reading.sensor_id,
                pollutant = %pollutant,
                existing_alert = %existing.id,
                "Suppressing duplicate alert"
            );
            return Ok(None);
        }

        let message = alert_message(pollutant, value, severity, area.as_deref());
        let new_alert = NewAlert {
            created_at: now,
            alert_type: AlertType::ThresholdExceeded,
            severity,
            pollutant,
            value,
            threshold,
            sensor_id: reading.sensor_id.clone(),
            location: AlertLocation {
                latitude: reading.latitude,
                longitude: reading.longitude,
                area,
            },
            message,
            metadata: serde_json::json!({
                "sensor_id": reading.sensor_id,
                "reading_timestamp": reading.timestamp,
            }),
        };

        let alert = self.store.create(new_alert).await?;
        info!(
            alert_id = %alert.id,
            sensor_id = %alert.sensor_id,
            pollutant = %pollutant,
            severity = %severity,
            value,
            threshold,
            "Opened alert"
        );
        Ok(Some(alert))
    }

    async fn area_for(&self, sensor_id: &str) -> Option<String> {
        // ---
        match self.sensors.area_for(sensor_id).await {
            Ok(area) => area,
            Err(e) => {
                warn!(sensor_id = %sensor_id, error = %e, "Sensor area lookup failed");
                None
            }
        }
    }

    /// Resolve an alert. Already-resolved alerts are returned unchanged.
    pub async fn resolve(&self, alert_id: Uuid) -> EngineResult<Alert> {
        // ---
        let alert = self.store.resolve(alert_id, Utc::now()).await?;
        info!(alert_id = %alert.id, resolved_at = ?alert.resolved_at, "Resolved alert");
        Ok(alert)
    }

    /// Evaluate every reading with `timestamp >= window_start`.
    pub async fn scan_window(
        &self,
        readings: &[Reading],
        window_start: DateTime<Utc>,
    ) -> EngineResult<ScanSummary> {
        // ---
        let mut summary = ScanSummary::default();

        for reading in readings.iter().filter(|r| r.timestamp >= window_start) {
            let evaluation = self.evaluate(reading).await?;
            summary.readings_scanned += 1;
            summary.alerts_created += evaluation.created.len();
            summary.duplicates_suppressed += evaluation.suppressed;
        }

        info!(
            readings_scanned = summary.readings_scanned,
            alerts_created = summary.alerts_created,
            duplicates_suppressed = summary.duplicates_suppressed,
            "Threshold scan completed"
        );
        Ok(summary)
    }

    /// Pull readings since `window_start` from `source` and scan them.
    pub async fn scan_source(
        &self,
        source: &dyn ReadingSource,
        window_start: DateTime<Utc>,
    ) -> EngineResult<ScanSummary> {
        let readings = source.readings_since(window_start).await?;
        self.scan_window(&readings, window_start).await
    }

    /// Open alerts, newest first, capped at the configured limit.
    pub async fn list_open(&self, filter: &OpenAlertFilter) -> EngineResult<Vec<Alert>> {
        self.store
            .list_open(filter, self.settings.open_alert_limit)
            .await
    }

    pub async fn history(&self, since: DateTime<Utc>) -> EngineResult<AlertHistory> {
        // ---
        let alerts = self.store.history(since).await?;
        let mut by_severity = BTreeMap::new();
        for alert in &alerts {
            *by_severity.entry(alert.severity).or_insert(0) += 1;
        }

        Ok(AlertHistory {
            since,
            total_alerts: alerts.len(),
            by_severity,
            alerts,
        })
    }
}

/// Per-severity message template.
pub fn alert_message(pollutant: Pollutant, value: f64, severity: Severity, area: Option<&str>) -> String {
    // ---
    let name = pollutant.display_name();
    let unit = pollutant.unit();
    let location = area.map(|a| format!(" in {a}")).unwrap_or_default();

    match severity {
        Severity::Critical => format!(
            "CRITICAL: {name} levels{location} are HAZARDOUS ({value:.1} {unit}). \
             Stay indoors with windows closed and avoid all outdoor activity."
        ),
        Severity::High => format!(
            "HIGH: {name} levels{location} are VERY UNHEALTHY ({value:.1} {unit}). \
             Sensitive groups should stay indoors; everyone should cut back outdoor activity."
        ),
        Severity::Medium => format!(
            "ALERT: {name} levels{location} are UNHEALTHY ({value:.1} {unit}). \
             Sensitive groups should limit outdoor exposure."
        ),
        Severity::Low | Severity::Info => format!(
            "Notice: {name} levels{location} are elevated ({value:.1} {unit}). \
             Air quality is acceptable for most people."
        ),
    }
}

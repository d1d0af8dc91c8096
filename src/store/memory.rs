//! In-memory stores.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AlertStore, ReadingSource, SensorRegistry};
use crate::error::{EngineError, EngineResult};
use crate::models::{Alert, AlertStatus, NewAlert, OpenAlertFilter, Pollutant, Reading};

// ---

/// Alert store backed by a vector in insertion (creation) order.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<Vec<Alert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }
}

fn newest_first(mut alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    alerts
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn find_open_alert(
        &self,
        sensor_id: &str,
        pollutant: Pollutant,
        since: DateTime<Utc>,
    ) -> EngineResult<Option<Alert>> {
        // ---
        let alerts = self.alerts.read().await;
        Ok(alerts
            .iter()
            .filter(|a| {
                a.is_open()
                    && a.sensor_id == sensor_id
                    && a.pollutant == pollutant
                    && a.created_at >= since
            })
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn create(&self, alert: NewAlert) -> EngineResult<Alert> {
        let alert = Alert::open(Uuid::new_v4(), alert);
        self.alerts.write().await.push(alert.clone());
        Ok(alert)
    }

    async fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<Alert> {
        // ---
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(EngineError::AlertNotFound(id))?;

        if alert.is_open() {
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(at);
        }
        Ok(alert.clone())
    }

    async fn get(&self, id: Uuid) -> EngineResult<Option<Alert>> {
        Ok(self.alerts.read().await.iter().find(|a| a.id == id).cloned())
    }

    async fn list_open(&self, filter: &OpenAlertFilter, limit: usize) -> EngineResult<Vec<Alert>> {
        // ---
        let open: Vec<Alert> = self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        Ok(newest_first(open).into_iter().take(limit).collect())
    }

    async fn history(&self, since: DateTime<Utc>) -> EngineResult<Vec<Alert>> {
        // ---
        let recent: Vec<Alert> = self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| a.created_at >= since)
            .cloned()
            .collect();
        Ok(newest_first(recent))
    }
}

/// Fixed set of readings, e.g. replayed from a file or built in tests.
#[derive(Debug, Default)]
pub struct InMemoryReadingSource {
    readings: Vec<Reading>,
}

impl InMemoryReadingSource {
    pub fn new(readings: Vec<Reading>) -> Self {
        InMemoryReadingSource { readings }
    }
}

#[async_trait]
impl ReadingSource for InMemoryReadingSource {
    async fn readings_since(&self, since: DateTime<Utc>) -> EngineResult<Vec<Reading>> {
        Ok(self
            .readings
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect())
    }
}

/// Sensor areas known up front, with an optional fallback for unknown sensors.
#[derive(Debug, Clone, Default)]
pub struct StaticSensorRegistry {
    areas: HashMap<String, String>,
    default_area: Option<String>,
}

impl StaticSensorRegistry {
    pub fn new(default_area: Option<String>) -> Self {
        StaticSensorRegistry {
            areas: HashMap::new(),
            default_area,
        }
    }

    pub fn with_area(mut self, sensor_id: impl Into<String>, area: impl Into<String>) -> Self {
        self.areas.insert(sensor_id.into(), area.into());
        self
    }
}

#[async_trait]
impl SensorRegistry for StaticSensorRegistry {
    async fn area_for(&self, sensor_id: &str) -> EngineResult<Option<String>> {
        Ok(self
            .areas
            .get(sensor_id)
            .cloned()
            .or_else(|| self.default_area.clone()))
    }
}

//! Storage interfaces consumed by the engine.
//!
//! The engine only needs narrow read/write access to readings, alerts and sensor
//! location metadata. Postgres-backed implementations live in `postgres`, and
//! in-memory ones in `memory` (used by tests and single-process deployments).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Alert, NewAlert, OpenAlertFilter, Pollutant, Reading};

mod memory;
mod postgres;

pub use memory::{InMemoryAlertStore, InMemoryReadingSource, StaticSensorRegistry};
pub use postgres::{PgAlertStore, PgReadingSource, PgSensorRegistry};

/// Default cap for open-alert listings.
pub const OPEN_ALERT_LIMIT: usize = 50;

// ---

/// Persistent alert storage.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Newest open alert for the pair created at or after `since`.
    async fn find_open_alert(
        &self,
        sensor_id: &str,
        pollutant: Pollutant,
        since: DateTime<Utc>,
    ) -> EngineResult<Option<Alert>>;

    /// Persist a new open alert and return it with its assigned id.
    async fn create(&self, alert: NewAlert) -> EngineResult<Alert>;

    /// Flip an alert to resolved. Resolving twice keeps the first resolution time.
    async fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<Alert>;

    async fn get(&self, id: Uuid) -> EngineResult<Option<Alert>>;

    /// Open alerts matching `filter`, newest first.
    async fn list_open(&self, filter: &OpenAlertFilter, limit: usize) -> EngineResult<Vec<Alert>>;

    /// All alerts created at or after `since`, newest first.
    async fn history(&self, since: DateTime<Utc>) -> EngineResult<Vec<Alert>>;
}

/// Pull access to stored readings.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn readings_since(&self, since: DateTime<Utc>) -> EngineResult<Vec<Reading>>;
}

/// Location metadata for sensors.
#[async_trait]
pub trait SensorRegistry: Send + Sync {
    async fn area_for(&self, sensor_id: &str) -> EngineResult<Option<String>>;
}

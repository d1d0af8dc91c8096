//! Postgres-backed stores. Tables are created by [`crate::schema::create_schema`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AlertStore, ReadingSource, SensorRegistry};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    Alert, AlertLocation, AlertStatus, AlertType, NewAlert, OpenAlertFilter, Pollutant,
    PollutantLevels, Reading, Severity,
};

const ALERT_COLUMNS: &str = "id, created_at, alert_type, severity, pollutant, value, threshold, \
     sensor_id, latitude, longitude, area, message, resolved, resolved_at, metadata";

// ---

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    // ---
    id: Uuid,
    created_at: DateTime<Utc>,
    alert_type: String,
    severity: String,
    pollutant: String,
    value: f64,
    threshold: f64,
    sensor_id: String,
    latitude: f64,
    longitude: f64,
    area: Option<String>,
    message: String,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
}

impl TryFrom<AlertRow> for Alert {
    type Error = EngineError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        // ---
        let alert_type = match row.alert_type.as_str() {
            "threshold_exceeded" => AlertType::ThresholdExceeded,
            other => {
                return Err(EngineError::InvalidRecord(format!(
                    "alert {} has unknown type {other}",
                    row.id
                )))
            }
        };
        let severity = row
            .severity
            .parse::<Severity>()
            .map_err(EngineError::InvalidRecord)?;
        let pollutant = row
            .pollutant
            .parse::<Pollutant>()
            .map_err(|e| EngineError::InvalidRecord(e.to_string()))?;

        Ok(Alert {
            id: row.id,
            created_at: row.created_at,
            alert_type,
            severity,
            pollutant,
            value: row.value,
            threshold: row.threshold,
            sensor_id: row.sensor_id,
            location: AlertLocation {
                latitude: row.latitude,
                longitude: row.longitude,
                area: row.area,
            },
            message: row.message,
            status: if row.resolved {
                AlertStatus::Resolved
            } else {
                AlertStatus::Open
            },
            resolved_at: row.resolved_at,
            metadata: row.metadata,
        })
    }
}

fn into_alerts(rows: Vec<AlertRow>) -> EngineResult<Vec<Alert>> {
    rows.into_iter().map(Alert::try_from).collect()
}

/// Alert store over the `alerts` table.
#[derive(Debug, Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        PgAlertStore { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn find_open_alert(
        &self,
        sensor_id: &str,
        pollutant: Pollutant,
        since: DateTime<Utc>,
    ) -> EngineResult<Option<Alert>> {
        // ---
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE sensor_id = $1 AND pollutant = $2 AND created_at >= $3 AND NOT resolved \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row: Option<AlertRow> = sqlx::query_as(&sql)
            .bind(sensor_id)
            .bind(pollutant.as_str())
            .bind(since)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Alert::try_from).transpose()
    }

    async fn create(&self, alert: NewAlert) -> EngineResult<Alert> {
        // ---
        let alert = Alert::open(Uuid::new_v4(), alert);

        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, created_at, alert_type, severity, pollutant, value, threshold,
                sensor_id, latitude, longitude, area, message, resolved, resolved_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, NULL, $13)
            "#,
        )
        .bind(alert.id)
        .bind(alert.created_at)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(alert.pollutant.as_str())
        .bind(alert.value)
        .bind(alert.threshold)
        .bind(&alert.sensor_id)
        .bind(alert.location.latitude)
        .bind(alert.location.longitude)
        .bind(&alert.location.area)
        .bind(&alert.message)
        .bind(&alert.metadata)
        .execute(&self.pool)
        .await?;

        Ok(alert)
    }

    async fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> EngineResult<Alert> {
        // ---
        let sql = format!(
            "UPDATE alerts SET resolved = TRUE, resolved_at = COALESCE(resolved_at, $2) \
             WHERE id = $1 RETURNING {ALERT_COLUMNS}"
        );
        let row: Option<AlertRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(EngineError::AlertNotFound(id))?.try_into()
    }

    async fn get(&self, id: Uuid) -> EngineResult<Option<Alert>> {
        // ---
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1");
        let row: Option<AlertRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Alert::try_from).transpose()
    }

    async fn list_open(&self, filter: &OpenAlertFilter, limit: usize) -> EngineResult<Vec<Alert>> {
        // ---
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE NOT resolved \
               AND ($1::TEXT IS NULL OR severity = $1) \
               AND ($2::TEXT IS NULL OR area = $2) \
             ORDER BY created_at DESC LIMIT $3"
        );
        let rows: Vec<AlertRow> = sqlx::query_as(&sql)
            .bind(filter.severity.map(|s| s.as_str()))
            .bind(&filter.area)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        into_alerts(rows)
    }

    async fn history(&self, since: DateTime<Utc>) -> EngineResult<Vec<Alert>> {
        // ---
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE created_at >= $1 ORDER BY created_at DESC"
        );
        let rows: Vec<AlertRow> = sqlx::query_as(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        into_alerts(rows)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReadingRow {
    // ---
    sensor_id: String,
    timestamp: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    pm25: Option<f64>,
    pm10: Option<f64>,
    no2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
    so2: Option<f64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    metadata: Option<serde_json::Value>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            sensor_id: row.sensor_id,
            timestamp: row.timestamp,
            latitude: row.latitude,
            longitude: row.longitude,
            levels: PollutantLevels {
                pm25: row.pm25,
                pm10: row.pm10,
                no2: row.no2,
                co: row.co,
                o3: row.o3,
                so2: row.so2,
            },
            temperature: row.temperature,
            humidity: row.humidity,
            pressure: row.pressure,
            metadata: row.metadata,
        }
    }
}

/// Reading source over the `sensor_readings` table.
#[derive(Debug, Clone)]
pub struct PgReadingSource {
    pool: PgPool,
}

impl PgReadingSource {
    pub fn new(pool: PgPool) -> Self {
        PgReadingSource { pool }
    }
}

#[async_trait]
impl ReadingSource for PgReadingSource {
    async fn readings_since(&self, since: DateTime<Utc>) -> EngineResult<Vec<Reading>> {
        // ---
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT sensor_id, timestamp, latitude, longitude,
                   pm25, pm10, no2, co, o3, so2,
                   temperature, humidity, pressure, metadata
            FROM sensor_readings
            WHERE timestamp >= $1
            ORDER BY timestamp
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Reading::from).collect())
    }
}

/// Sensor areas from the `sensors` registry table, with a fallback area.
#[derive(Debug, Clone)]
pub struct PgSensorRegistry {
    pool: PgPool,
    default_area: Option<String>,
}

impl PgSensorRegistry {
    pub fn new(pool: PgPool, default_area: Option<String>) -> Self {
        PgSensorRegistry { pool, default_area }
    }
}

#[async_trait]
impl SensorRegistry for PgSensorRegistry {
    async fn area_for(&self, sensor_id: &str) -> EngineResult<Option<String>> {
        // ---
        let area: Option<Option<String>> =
            sqlx::query_scalar("SELECT location_description FROM sensors WHERE sensor_id = $1")
                .bind(sensor_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(area.flatten().or_else(|| self.default_area.clone()))
    }
}

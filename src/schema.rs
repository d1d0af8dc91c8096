//! Database schema management for `codemetal-airwatch`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `sensors` registry, the `sensor_readings` fact table, the `alerts`
/// table owned by the lifecycle manager, and the `notifications` mirror. Safe to
/// call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Sensor registry; only the area description is consumed by the engine
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            sensor_id            TEXT PRIMARY KEY,
            name                 TEXT             NOT NULL,
            latitude             DOUBLE PRECISION NOT NULL,
            longitude            DOUBLE PRECISION NOT NULL,
            location_description TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id          BIGSERIAL PRIMARY KEY,
            sensor_id   TEXT             NOT NULL,
            timestamp   TIMESTAMPTZ      NOT NULL,
            latitude    DOUBLE PRECISION NOT NULL,
            longitude   DOUBLE PRECISION NOT NULL,
            pm25        DOUBLE PRECISION,
            pm10        DOUBLE PRECISION,
            no2         DOUBLE PRECISION,
            co          DOUBLE PRECISION,
            o3          DOUBLE PRECISION,
            so2         DOUBLE PRECISION,
            temperature DOUBLE PRECISION,
            humidity    DOUBLE PRECISION,
            pressure    DOUBLE PRECISION,
            metadata    JSONB
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Tables created before the metadata column existed
    sqlx::query("ALTER TABLE sensor_readings ADD COLUMN IF NOT EXISTS metadata JSONB;")
        .execute(&mut *tx)
        .await?;

    // Alerts are never deleted; resolution flips `resolved` once
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id          UUID PRIMARY KEY,
            created_at  TIMESTAMPTZ      NOT NULL,
            alert_type  TEXT             NOT NULL,
            severity    TEXT             NOT NULL,
            pollutant   TEXT             NOT NULL,
            value       DOUBLE PRECISION NOT NULL,
            threshold   DOUBLE PRECISION NOT NULL,
            sensor_id   TEXT             NOT NULL,
            latitude    DOUBLE PRECISION NOT NULL,
            longitude   DOUBLE PRECISION NOT NULL,
            area        TEXT,
            message     TEXT             NOT NULL,
            resolved    BOOLEAN          NOT NULL DEFAULT FALSE,
            resolved_at TIMESTAMPTZ,
            metadata    JSONB            NOT NULL DEFAULT '{}'::jsonb
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id       BIGSERIAL PRIMARY KEY,
            alert_id UUID        NOT NULL REFERENCES alerts (id),
            sent_at  TIMESTAMPTZ NOT NULL,
            severity TEXT        NOT NULL,
            message  TEXT        NOT NULL,
            area     TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_timestamp
            ON sensor_readings (timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Dedup lookup: open alerts per (sensor, pollutant) by creation time
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_open_pair
            ON alerts (sensor_id, pollutant, created_at)
            WHERE NOT resolved;
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_created_at
            ON alerts (created_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

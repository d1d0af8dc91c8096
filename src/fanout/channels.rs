//! Concrete notification channels.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use super::{ChannelError, NotificationChannel};
use crate::models::Alert;

// ---

/// Emits a structured log event per alert.
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            pollutant = %alert.pollutant,
            sensor_id = %alert.sensor_id,
            area = alert.location.area.as_deref().unwrap_or("-"),
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// JSON body posted to webhook endpoints.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event_type: &'static str,
    alert: &'a Alert,
}

/// Posts each alert as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChannelError> {
        // ---
        let client = Client::builder().timeout(timeout).build()?;
        Ok(WebhookChannel {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        // ---
        let payload = WebhookPayload {
            event_type: "alert.opened",
            alert,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ChannelError::Rejected(status.as_u16()))
        }
    }
}

/// Mirrors each notification into the `notifications` table for web and mobile clients.
#[derive(Debug, Clone)]
pub struct NotificationLogChannel {
    pool: PgPool,
}

impl NotificationLogChannel {
    pub fn new(pool: PgPool) -> Self {
        NotificationLogChannel { pool }
    }
}

#[async_trait]
impl NotificationChannel for NotificationLogChannel {
    fn name(&self) -> &str {
        "notification_log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO notifications (alert_id, sent_at, severity, message, area)
            VALUES ($1, NOW(), $2, $3, $4)
            "#,
        )
        .bind(alert.id)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(&alert.location.area)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

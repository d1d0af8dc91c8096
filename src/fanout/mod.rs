//! Notification fanout for newly opened alerts.
//!
//! Alert creation is committed before anything here runs. The lifecycle manager
//! hands alerts to a [`FanoutHandle`], which only enqueues onto a bounded channel;
//! a background worker drains the queue and delivers each alert to every registered
//! channel concurrently. Every channel delivery has its own timeout and its own
//! failure, and none of them can affect the caller that created the alert.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::models::Alert;

mod channels;

pub use channels::{LogChannel, NotificationLogChannel, WebhookChannel};

// ---

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint rejected notification with status {0}")]
    Rejected(u16),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// A notification sink, invoked once per newly created alert.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name used in logs and delivery reports.
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub channel: String,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct FanoutSettings {
    /// Alerts buffered between the engine and the worker.
    pub queue_depth: usize,
    /// Alerts delivered at the same time.
    pub max_concurrency: usize,
    pub channel_timeout: Duration,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        FanoutSettings {
            queue_depth: 256,
            max_concurrency: 4,
            channel_timeout: Duration::from_secs(5),
        }
    }
}

/// Set of channels plus delivery settings.
pub struct Fanout {
    channels: Vec<Arc<dyn NotificationChannel>>,
    settings: FanoutSettings,
}

impl Fanout {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, settings: FanoutSettings) -> Self {
        Fanout { channels, settings }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Deliver one alert to every channel concurrently and collect the outcomes.
    ///
    /// Reports arrive in completion order.
    pub async fn deliver(&self, alert: &Alert) -> Vec<DeliveryReport> {
        // ---
        let alert = Arc::new(alert.clone());
        let timeout = self.settings.channel_timeout;
        let mut tasks = JoinSet::new();

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let alert = Arc::clone(&alert);
            tasks.spawn(async move {
                let name = channel.name().to_string();
                let outcome = match tokio::time::timeout(timeout, channel.send(&alert)).await {
                    Ok(Ok(())) => DeliveryOutcome::Delivered,
                    Ok(Err(e)) => DeliveryOutcome::Failed(e.to_string()),
                    Err(_) => DeliveryOutcome::TimedOut,
                };
                DeliveryReport {
                    channel: name,
                    outcome,
                }
            });
        }

        let mut reports = Vec::with_capacity(self.channels.len());
        while let Some(joined) = tasks.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    // The channel name went down with the task.
                    error!(alert_id = %alert.id, error = %e, "Notification channel task panicked");
                    DeliveryReport {
                        channel: "<panicked>".to_string(),
                        outcome: DeliveryOutcome::Failed(e.to_string()),
                    }
                }
            };
            log_report(&alert, &report);
            reports.push(report);
        }
        reports
    }

    /// Start the background worker. Returns the enqueue handle and the worker task,
    /// which finishes once every handle is dropped and the queue is drained.
    pub fn spawn(self) -> (FanoutHandle, JoinHandle<()>) {
        // ---
        let (tx, rx) = mpsc::channel(self.settings.queue_depth.max(1));
        info!(
            channels = ?self.channel_names(),
            queue_depth = self.settings.queue_depth,
            max_concurrency = self.settings.max_concurrency,
            "Starting notification fanout"
        );
        let worker = tokio::spawn(run_worker(Arc::new(self), rx));
        (FanoutHandle { tx: Some(tx) }, worker)
    }
}

fn log_report(alert: &Alert, report: &DeliveryReport) {
    // ---
    match &report.outcome {
        DeliveryOutcome::Delivered => {
            debug!(alert_id = %alert.id, channel = %report.channel, "Notification delivered")
        }
        DeliveryOutcome::Failed(reason) => warn!(
            alert_id = %alert.id,
            channel = %report.channel,
            error = %reason,
            "Notification delivery failed"
        ),
        DeliveryOutcome::TimedOut => warn!(
            alert_id = %alert.id,
            channel = %report.channel,
            "Notification delivery timed out"
        ),
    }
}

async fn run_worker(fanout: Arc<Fanout>, mut rx: mpsc::Receiver<Alert>) {
    // ---
    let limit = fanout.settings.max_concurrency.max(1);
    let permits = Arc::new(Semaphore::new(limit));

    while let Some(alert) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let fanout = Arc::clone(&fanout);
        tokio::spawn(async move {
            let _permit = permit;
            fanout.deliver(&alert).await;
        });
    }

    // Wait for in-flight deliveries by taking back every permit.
    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    if permits.acquire_many(limit).await.is_err() {
        warn!("Fanout permits closed before in-flight deliveries finished");
    }
    info!("Notification fanout stopped");
}

/// Cheap, cloneable enqueue side of the fanout.
#[derive(Debug, Clone)]
pub struct FanoutHandle {
    tx: Option<mpsc::Sender<Alert>>,
}

impl FanoutHandle {
    /// A handle that discards every alert, for engines run without notifications.
    pub fn disabled() -> Self {
        FanoutHandle { tx: None }
    }

    /// Enqueue without waiting. Returns `false` if the alert was not queued.
    pub fn notify(&self, alert: Alert) -> bool {
        // ---
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(alert) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(alert)) => {
                error!(alert_id = %alert.id, "Fanout queue full, dropping notification");
                false
            }
            Err(mpsc::error::TrySendError::Closed(alert)) => {
                error!(alert_id = %alert.id, "Fanout worker stopped, dropping notification");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{AlertLocation, AlertType, NewAlert, Pollutant, Severity};
    use chrono::Utc;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct Recording {
        seen: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl NotificationChannel for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
            self.seen.lock().await.push(alert.id);
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationChannel for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn send(&self, _alert: &Alert) -> Result<(), ChannelError> {
            Err(ChannelError::Other("gateway down".into()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl NotificationChannel for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn send(&self, _alert: &Alert) -> Result<(), ChannelError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn sample_alert() -> Alert {
        Alert::open(
            Uuid::new_v4(),
            NewAlert {
                created_at: Utc::now(),
                alert_type: AlertType::ThresholdExceeded,
                severity: Severity::High,
                pollutant: Pollutant::Pm25,
                value: 60.0,
                threshold: 55.0,
                sensor_id: "S1".into(),
                location: AlertLocation {
                    latitude: 0.0,
                    longitude: 0.0,
                    area: None,
                },
                message: "test".into(),
                metadata: serde_json::Value::Null,
            },
        )
    }

    fn settings() -> FanoutSettings {
        FanoutSettings {
            queue_depth: 8,
            max_concurrency: 2,
            channel_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_failing_channels_are_isolated() {
        // ---
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let fanout = Fanout::new(
            vec![Arc::new(Broken), Arc::new(Stalled), recording.clone()],
            settings(),
        );

        let alert = sample_alert();
        let reports = fanout.deliver(&alert).await;

        let outcome = |name: &str| {
            reports
                .iter()
                .find(|r| r.channel == name)
                .map(|r| r.outcome.clone())
        };
        assert_eq!(outcome("recording"), Some(DeliveryOutcome::Delivered));
        assert_eq!(outcome("stalled"), Some(DeliveryOutcome::TimedOut));
        assert!(matches!(outcome("broken"), Some(DeliveryOutcome::Failed(_))));
        assert_eq!(recording.seen.lock().await.as_slice(), &[alert.id]);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_shutdown() {
        // ---
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let (handle, worker) = Fanout::new(vec![recording.clone()], settings()).spawn();

        let alerts: Vec<Alert> = (0..5).map(|_| sample_alert()).collect();
        for alert in &alerts {
            assert!(handle.notify(alert.clone()));
        }
        drop(handle);
        worker.await.unwrap();

        let mut seen = recording.seen.lock().await.clone();
        let mut expected: Vec<Uuid> = alerts.iter().map(|a| a.id).collect();
        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_disabled_handle_drops() {
        // ---
        assert!(!FanoutHandle::disabled().notify(sample_alert()));
    }
}

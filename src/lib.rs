//! Air quality decision engine.
//!
//! Pipeline: a [`Reading`] is classified per pollutant by the [`SeverityLadder`],
//! the [`AlertManager`] deduplicates and opens alerts in an [`AlertStore`], and new
//! alerts are handed to the notification [`Fanout`]. The [`AqiCalculator`] answers
//! "current air quality" queries independently of the alert path.
//!
//! Storage, notification channels and advisory text are traits so the engine can
//! run against Postgres in production and in-memory doubles in tests.

pub mod advisory;
pub mod aqi;
pub mod config;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod schema;
pub mod severity;
pub mod statistics;
pub mod store;

pub use aqi::{AqiCalculator, AqiCategory, AqiResult};
pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use fanout::{Fanout, FanoutHandle, FanoutSettings, NotificationChannel};
pub use lifecycle::{AlertManager, EngineSettings, Evaluation, ScanSummary};
pub use models::{Alert, AlertStatus, Pollutant, PollutantLevels, Reading, Severity};
pub use severity::SeverityLadder;
pub use store::{AlertStore, ReadingSource, SensorRegistry};

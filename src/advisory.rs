//! Free-text air quality advisories.
//!
//! Advisory text comes from an optional external generator. The engine never
//! depends on it: [`advise`] falls back to a deterministic message built from the
//! AQI result whenever the generator is missing, fails, or returns nothing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::aqi::AqiResult;
use crate::models::PollutantLevels;

// ---

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Advisory generator returned no text")]
    EmptyResponse,
}

/// Inputs handed to the generator.
#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryContext {
    pub area: Option<String>,
    pub aqi: AqiResult,
    pub averages: PollutantLevels,
    pub window_hours: i64,
}

#[async_trait]
pub trait AdvisoryGenerator: Send + Sync {
    async fn generate(&self, context: &AdvisoryContext) -> Result<String, AdvisoryError>;
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    text: String,
}

/// Posts the context as JSON and expects `{"text": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpAdvisoryGenerator {
    client: Client,
    url: String,
}

impl HttpAdvisoryGenerator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AdvisoryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpAdvisoryGenerator {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AdvisoryGenerator for HttpAdvisoryGenerator {
    async fn generate(&self, context: &AdvisoryContext) -> Result<String, AdvisoryError> {
        // ---
        let body: GeneratedText = self
            .client
            .post(&self.url)
            .json(context)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.text)
    }
}

/// Canned advisory used whenever generated text is unavailable.
pub fn fallback_advisory(context: &AdvisoryContext) -> String {
    // ---
    let place = context
        .area
        .as_deref()
        .map(|a| format!(" in {a}"))
        .unwrap_or_default();

    match context.aqi.dominant_pollutant {
        None => format!("No recent air quality data{place}."),
        Some(dominant) => format!(
            "Air quality{place} is {} (AQI {}), driven mainly by {}. {}",
            context.aqi.category.label(),
            context.aqi.aqi,
            dominant.display_name(),
            context.aqi.health_message
        ),
    }
}

/// Generated advisory text, or the canned fallback. Never fails.
pub async fn advise(generator: Option<&dyn AdvisoryGenerator>, context: &AdvisoryContext) -> String {
    // ---
    let Some(generator) = generator else {
        return fallback_advisory(context);
    };

    match generator.generate(context).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("{}", AdvisoryError::EmptyResponse);
            fallback_advisory(context)
        }
        Err(e) => {
            warn!(error = %e, "Advisory generation failed, using fallback text");
            fallback_advisory(context)
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::aqi::AqiCalculator;

    struct Failing;

    #[async_trait]
    impl AdvisoryGenerator for Failing {
        async fn generate(&self, _context: &AdvisoryContext) -> Result<String, AdvisoryError> {
            Err(AdvisoryError::EmptyResponse)
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl AdvisoryGenerator for Fixed {
        async fn generate(&self, _context: &AdvisoryContext) -> Result<String, AdvisoryError> {
            Ok(self.0.to_string())
        }
    }

    fn context(pm25: Option<f64>) -> AdvisoryContext {
        let averages = PollutantLevels {
            pm25,
            ..Default::default()
        };
        AdvisoryContext {
            area: Some("Pavlodar".into()),
            aqi: AqiCalculator::default().calculate(&averages),
            averages,
            window_hours: 24,
        }
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        // ---
        let ctx = context(Some(10.0));
        let text = advise(Some(&Failing), &ctx).await;
        assert!(text.starts_with("Air quality in Pavlodar is Good (AQI 41), driven mainly by PM2.5."));
    }

    #[tokio::test]
    async fn test_blank_text_falls_back() {
        // ---
        let ctx = context(None);
        let text = advise(Some(&Fixed("   ")), &ctx).await;
        assert_eq!(text, "No recent air quality data in Pavlodar.");
    }

    #[tokio::test]
    async fn test_generated_text_is_used() {
        // ---
        let ctx = context(Some(80.0));
        assert_eq!(advise(Some(&Fixed("Wear a mask.")), &ctx).await, "Wear a mask.");
        assert!(advise(None, &ctx).await.contains("AQI"));
    }
}

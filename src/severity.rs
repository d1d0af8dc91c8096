//! Per-pollutant severity classification.
//!
//! Each pollutant carries a four-step ladder of concentration thresholds in its
//! native unit. These are health-advisory thresholds, separate
//! from the AQI breakpoint tables in [`crate::aqi`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Pollutant, Severity};

// ---

/// Threshold ladder for one pollutant. Values must be non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    pub moderate: f64,
    pub unhealthy: f64,
    pub very_unhealthy: f64,
    pub hazardous: f64,
}

impl Ladder {
    pub const fn new(moderate: f64, unhealthy: f64, very_unhealthy: f64, hazardous: f64) -> Self {
        Ladder {
            moderate,
            unhealthy,
            very_unhealthy,
            hazardous,
        }
    }

    pub fn classify(&self, value: f64) -> Severity {
        // ---
        if value >= self.hazardous {
            Severity::Critical
        } else if value >= self.very_unhealthy {
            Severity::High
        } else if value >= self.unhealthy {
            Severity::Medium
        } else if value >= self.moderate {
            Severity::Low
        } else {
            Severity::Info
        }
    }

    /// Boundary that places a value in `severity`. `Info` has no lower boundary.
    pub fn boundary(&self, severity: Severity) -> Option<f64> {
        match severity {
            Severity::Info => None,
            Severity::Low => Some(self.moderate),
            Severity::Medium => Some(self.unhealthy),
            Severity::High => Some(self.very_unhealthy),
            Severity::Critical => Some(self.hazardous),
        }
    }

    fn is_ordered(&self) -> bool {
        self.moderate <= self.unhealthy
            && self.unhealthy <= self.very_unhealthy
            && self.very_unhealthy <= self.hazardous
    }
}

/// Immutable ladder table, loaded once at startup and shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeverityLadder {
    ladders: BTreeMap<Pollutant, Ladder>,
}

impl Default for SeverityLadder {
    fn default() -> Self {
        // ---
        let ladders = BTreeMap::from([
            (Pollutant::Pm25, Ladder::new(15.0, 35.0, 55.0, 150.0)),
            (Pollutant::Pm10, Ladder::new(45.0, 150.0, 250.0, 350.0)),
            (Pollutant::No2, Ladder::new(100.0, 200.0, 400.0, 800.0)),
            (Pollutant::Co, Ladder::new(9.0, 15.0, 30.0, 50.0)),
            (Pollutant::O3, Ladder::new(100.0, 160.0, 240.0, 400.0)),
            (Pollutant::So2, Ladder::new(40.0, 125.0, 350.0, 500.0)),
        ]);
        SeverityLadder { ladders }
    }
}

impl SeverityLadder {
    /// Load a ladder table from a JSON object keyed by pollutant name.
    ///
    /// Pollutants missing from the file keep no ladder and classify as `Info`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        // ---
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read thresholds file {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        // ---
        let ladder: SeverityLadder =
            serde_json::from_str(raw).context("Invalid thresholds JSON")?;

        if let Some((pollutant, _)) = ladder.ladders.iter().find(|(_, l)| !l.is_ordered()) {
            return Err(anyhow!(
                "Thresholds for {} must be non-decreasing",
                pollutant
            ));
        }
        Ok(ladder)
    }

    pub fn ladder(&self, pollutant: Pollutant) -> Option<&Ladder> {
        self.ladders.get(&pollutant)
    }

    pub fn classify(&self, pollutant: Pollutant, value: f64) -> Severity {
        self.ladder(pollutant)
            .map_or(Severity::Info, |ladder| ladder.classify(value))
    }

    /// Classify by wire name. Unknown names fall to the lowest tier.
    pub fn classify_named(&self, pollutant: &str, value: f64) -> Severity {
        pollutant
            .parse::<Pollutant>()
            .map_or(Severity::Info, |p| self.classify(p, value))
    }

    /// Ladder boundary corresponding to the assigned tier.
    pub fn threshold_for(&self, pollutant: Pollutant, severity: Severity) -> Option<f64> {
        self.ladder(pollutant).and_then(|l| l.boundary(severity))
    }
}

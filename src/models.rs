//! Data models shared by the decision engine.
//!
//! Readings are immutable facts produced by ingestion. Alerts are owned by the
//! lifecycle manager and only ever flip from open to resolved.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

/// Pollutants tracked by the sensor network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    No2,
    Co,
    O3,
    So2,
}

impl Pollutant {
    /// Canonical order; also the tie-break order for dominant pollutant selection.
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::No2,
        Pollutant::Co,
        Pollutant::O3,
        Pollutant::So2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::No2 => "no2",
            Pollutant::Co => "co",
            Pollutant::O3 => "o3",
            Pollutant::So2 => "so2",
        }
    }

    /// Human-readable name used in alert messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::No2 => "Nitrogen Dioxide (NO₂)",
            Pollutant::Co => "Carbon Monoxide (CO)",
            Pollutant::O3 => "Ozone (O₃)",
            Pollutant::So2 => "Sulfur Dioxide (SO₂)",
        }
    }

    /// Native unit of the concentrations reported by sensors.
    pub fn unit(&self) -> &'static str {
        match self {
            Pollutant::Co => "mg/m³",
            _ => "µg/m³",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pollutant: {0}")]
pub struct UnknownPollutant(pub String);

impl FromStr for Pollutant {
    type Err = UnknownPollutant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "pm25" | "pm2.5" | "pm2_5" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            "no2" => Ok(Pollutant::No2),
            "co" => Ok(Pollutant::Co),
            "o3" => Ok(Pollutant::O3),
            "so2" => Ok(Pollutant::So2),
            other => Err(UnknownPollutant(other.to_string())),
        }
    }
}

/// Optional concentration per pollutant, in each pollutant's native unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollutantLevels {
    // ---
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
}

impl PollutantLevels {
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::No2 => self.no2,
            Pollutant::Co => self.co,
            Pollutant::O3 => self.o3,
            Pollutant::So2 => self.so2,
        }
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        let slot = match pollutant {
            Pollutant::Pm25 => &mut self.pm25,
            Pollutant::Pm10 => &mut self.pm10,
            Pollutant::No2 => &mut self.no2,
            Pollutant::Co => &mut self.co,
            Pollutant::O3 => &mut self.o3,
            Pollutant::So2 => &mut self.so2,
        };
        *slot = value;
    }

    /// Supplied concentrations in canonical pollutant order.
    pub fn iter(&self) -> impl Iterator<Item = (Pollutant, f64)> + '_ {
        Pollutant::ALL
            .into_iter()
            .filter_map(move |p| self.get(p).map(|v| (p, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// First supplied concentration that is negative or not a finite number.
    pub fn first_invalid(&self) -> Option<(Pollutant, f64)> {
        self.iter().find(|(_, v)| !v.is_finite() || *v < 0.0)
    }
}

/// A single sensor reading. Produced by ingestion and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(flatten)]
    pub levels: PollutantLevels,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    /// Free-form sensor payload, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Health-risk tier, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Lowest tier that opens an alert.
    pub const ALERTING: Severity = Severity::Medium;

    pub fn is_alerting(&self) -> bool {
        *self >= Self::ALERTING
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ThresholdExceeded,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ThresholdExceeded => "threshold_exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub area: Option<String>,
}

/// Alert contents decided by the lifecycle manager, before the store assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    // ---
    pub created_at: DateTime<Utc>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub pollutant: Pollutant,
    pub value: f64,
    pub threshold: f64,
    pub sensor_id: String,
    pub location: AlertLocation,
    pub message: String,
    pub metadata: serde_json::Value,
}

/// A persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    // ---
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub pollutant: Pollutant,
    pub value: f64,
    pub threshold: f64,
    pub sensor_id: String,
    pub location: AlertLocation,
    pub message: String,
    pub status: AlertStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl Alert {
    /// Materialize an open alert from its decided contents.
    pub fn open(id: Uuid, new: NewAlert) -> Self {
        // ---
        Alert {
            id,
            created_at: new.created_at,
            alert_type: new.alert_type,
            severity: new.severity,
            pollutant: new.pollutant,
            value: new.value,
            threshold: new.threshold,
            sensor_id: new.sensor_id,
            location: new.location,
            message: new.message,
            status: AlertStatus::Open,
            resolved_at: None,
            metadata: new.metadata,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}

/// Filter for open-alert listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAlertFilter {
    pub severity: Option<Severity>,
    pub area: Option<String>,
}

impl OpenAlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        // ---
        alert.is_open()
            && self.severity.map_or(true, |s| alert.severity == s)
            && self
                .area
                .as_ref()
                .map_or(true, |a| alert.location.area.as_ref() == Some(a))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pollutant_parse_aliases() {
        // ---
        assert_eq!("pm2.5".parse::<Pollutant>(), Ok(Pollutant::Pm25));
        assert_eq!(" PM10 ".parse::<Pollutant>(), Ok(Pollutant::Pm10));
        assert!("radon".parse::<Pollutant>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        // ---
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert!(!Severity::Low.is_alerting());
        assert!(Severity::Medium.is_alerting());
    }

    #[test]
    fn test_levels_iterate_in_canonical_order() {
        // ---
        let levels = PollutantLevels {
            so2: Some(3.0),
            pm25: Some(1.0),
            co: Some(2.0),
            ..Default::default()
        };

        let seen: Vec<Pollutant> = levels.iter().map(|(p, _)| p).collect();
        assert_eq!(seen, vec![Pollutant::Pm25, Pollutant::Co, Pollutant::So2]);
        assert!(PollutantLevels::default().is_empty());
    }

    #[test]
    fn test_first_invalid_level() {
        // ---
        let ok = PollutantLevels {
            pm25: Some(0.0),
            co: Some(3.2),
            ..Default::default()
        };
        assert_eq!(ok.first_invalid(), None);

        let negative = PollutantLevels {
            pm25: Some(12.0),
            no2: Some(-4.0),
            ..Default::default()
        };
        assert_eq!(negative.first_invalid(), Some((Pollutant::No2, -4.0)));

        let nan = PollutantLevels {
            o3: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(nan.first_invalid().map(|(p, _)| p), Some(Pollutant::O3));
    }

    #[test]
    fn test_reading_deserializes_flat_levels() {
        // ---
        let json = r#"{
            "sensor_id": "S1",
            "timestamp": "2025-03-26T18:45:00Z",
            "latitude": 52.28,
            "longitude": 76.95,
            "pm25": 60.0,
            "temperature": 21.5,
            "humidity": null,
            "pressure": null,
            "metadata": { "firmware": "2.1.0", "battery": 87 }
        }"#;

        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.sensor_id, "S1");
        assert_eq!(
            reading.timestamp,
            Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
        );
        assert_eq!(reading.levels.pm25, Some(60.0));
        assert_eq!(reading.levels.pm10, None);
        assert_eq!(
            reading.metadata.as_ref().and_then(|m| m.get("firmware")),
            Some(&serde_json::json!("2.1.0"))
        );
    }

    #[test]
    fn test_reading_metadata_is_optional() {
        // ---
        let json = r#"{
            "sensor_id": "S2",
            "timestamp": "2025-03-26T18:45:00Z",
            "latitude": 52.28,
            "longitude": 76.95,
            "no2": 120.0,
            "temperature": null,
            "humidity": null,
            "pressure": null
        }"#;

        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.metadata, None);
        assert_eq!(reading.levels.no2, Some(120.0));

        let back = serde_json::to_value(&reading).unwrap();
        assert!(back.get("metadata").is_none());
    }

    #[test]
    fn test_open_filter_matches() {
        // ---
        let mut alert = Alert::open(
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
                    area: Some("Center".into()),
                },
                message: String::new(),
                metadata: serde_json::Value::Null,
            },
        );

        let by_area = OpenAlertFilter {
            severity: None,
            area: Some("Center".into()),
        };
        let by_severity = OpenAlertFilter {
            severity: Some(Severity::Critical),
            area: None,
        };
        assert!(by_area.matches(&alert));
        assert!(!by_severity.matches(&alert));

        alert.status = AlertStatus::Resolved;
        assert!(!by_area.matches(&alert));
    }
}

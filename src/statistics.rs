//! Windowed statistics over stored readings.
//!
//! Both computations work on a slice already pulled from a
//! [`ReadingSource`](crate::store::ReadingSource), so they are independent of the
//! storage backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Pollutant, Reading};

// ---

/// Average, minimum and maximum of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: usize,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        // ---
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    fn summary(&self) -> Option<Summary> {
        (self.count > 0).then(|| Summary {
            avg: self.sum / self.count as f64,
            min: self.min,
            max: self.max,
            count: self.count,
        })
    }
}

/// Aggregates for one clock hour (UTC).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyStats {
    pub hour: DateTime<Utc>,
    pub readings: usize,
    pub pollutants: BTreeMap<Pollutant, Summary>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Default)]
struct HourBucket {
    readings: usize,
    pollutants: BTreeMap<Pollutant, Accumulator>,
    temperature: Accumulator,
    humidity: Accumulator,
}

fn hour_of(timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs = timestamp.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0)
}

/// Per-hour pollutant summaries, oldest hour first. Hours without readings are absent.
pub fn hourly_statistics(readings: &[Reading], sensor_id: Option<&str>) -> Vec<HourlyStats> {
    // ---
    let mut buckets: BTreeMap<DateTime<Utc>, HourBucket> = BTreeMap::new();

    let selected = readings
        .iter()
        .filter(|r| sensor_id.map_or(true, |id| r.sensor_id == id));

    for reading in selected {
        let Some(hour) = hour_of(reading.timestamp) else {
            continue;
        };
        let bucket = buckets.entry(hour).or_default();
        bucket.readings += 1;
        for (pollutant, value) in reading.levels.iter() {
            bucket.pollutants.entry(pollutant).or_default().push(value);
        }
        if let Some(t) = reading.temperature {
            bucket.temperature.push(t);
        }
        if let Some(h) = reading.humidity {
            bucket.humidity.push(h);
        }
    }

    buckets
        .into_iter()
        .map(|(hour, bucket)| HourlyStats {
            hour,
            readings: bucket.readings,
            pollutants: bucket
                .pollutants
                .iter()
                .filter_map(|(p, acc)| acc.summary().map(|s| (*p, s)))
                .collect(),
            temperature: bucket.temperature.summary().map(|s| s.avg),
            humidity: bucket.humidity.summary().map(|s| s.avg),
        })
        .collect()
}

/// Mean and spread the anomaly cut-off was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    pub mean: f64,
    /// Sample standard deviation.
    pub stddev: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub pollutant: Pollutant,
    pub samples: usize,
    /// `None` when fewer than two readings carry the pollutant.
    pub baseline: Option<Baseline>,
    pub anomalies_found: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Readings whose `pollutant` level is above `mean + k * stddev` of the slice.
pub fn detect_anomalies(readings: &[Reading], pollutant: Pollutant, k: f64) -> AnomalyReport {
    // ---
    let values: Vec<f64> = readings
        .iter()
        .filter_map(|r| r.levels.get(pollutant))
        .collect();

    let baseline = (values.len() >= 2).then(|| {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let stddev = variance.sqrt();
        Baseline {
            mean,
            stddev,
            threshold: mean + k * stddev,
        }
    });

    let anomalies: Vec<Anomaly> = match baseline {
        None => Vec::new(),
        Some(b) => readings
            .iter()
            .filter_map(|r| {
                let value = r.levels.get(pollutant)?;
                (value > b.threshold).then(|| Anomaly {
                    sensor_id: r.sensor_id.clone(),
                    timestamp: r.timestamp,
                    value,
                    latitude: r.latitude,
                    longitude: r.longitude,
                })
            })
            .collect(),
    };

    AnomalyReport {
        pollutant,
        samples: values.len(),
        baseline,
        anomalies_found: anomalies.len(),
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::PollutantLevels;
    use chrono::TimeZone;

    fn reading(sensor: &str, timestamp: DateTime<Utc>, levels: PollutantLevels) -> Reading {
        Reading {
            sensor_id: sensor.into(),
            timestamp,
            latitude: 52.28,
            longitude: 76.95,
            levels,
            temperature: Some(20.0),
            humidity: None,
            pressure: None,
            metadata: None,
        }
    }

    fn pm25(value: f64) -> PollutantLevels {
        PollutantLevels {
            pm25: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn test_hourly_buckets() {
        // ---
        let t = |h, m| Utc.with_ymd_and_hms(2025, 3, 26, h, m, 0).unwrap();
        let readings = vec![
            reading("S1", t(10, 5), pm25(10.0)),
            reading("S1", t(10, 55), pm25(30.0)),
            reading("S2", t(10, 30), pm25(50.0)),
            reading(
                "S1",
                t(11, 0),
                PollutantLevels {
                    pm25: Some(12.0),
                    no2: Some(80.0),
                    ..Default::default()
                },
            ),
        ];

        let stats = hourly_statistics(&readings, None);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].hour, t(10, 0));
        assert_eq!(stats[0].readings, 3);

        let pm = stats[0].pollutants[&Pollutant::Pm25];
        assert_eq!(pm.avg, 30.0);
        assert_eq!(pm.min, 10.0);
        assert_eq!(pm.max, 50.0);
        assert_eq!(stats[0].temperature, Some(20.0));
        assert_eq!(stats[0].humidity, None);

        assert_eq!(stats[1].hour, t(11, 0));
        assert_eq!(stats[1].pollutants[&Pollutant::No2].count, 1);

        let only_s1 = hourly_statistics(&readings, Some("S1"));
        assert_eq!(only_s1[0].readings, 2);
        assert_eq!(only_s1[0].pollutants[&Pollutant::Pm25].max, 30.0);
    }

    #[test]
    fn test_outlier_above_two_sigma() {
        // ---
        let now = Utc::now();
        let mut readings: Vec<Reading> = (0..9).map(|_| reading("S1", now, pm25(10.0))).collect();
        readings.push(reading("S9", now, pm25(100.0)));

        let report = detect_anomalies(&readings, Pollutant::Pm25, 2.0);
        let baseline = report.baseline.unwrap();

        assert_eq!(report.samples, 10);
        assert_eq!(baseline.mean, 19.0);
        // sample variance: (9 * 81 + 81 * 81) / 9 = 810
        assert!((baseline.stddev - 810f64.sqrt()).abs() < 1e-9);
        assert_eq!(report.anomalies_found, 1);
        assert_eq!(report.anomalies[0].sensor_id, "S9");
        assert_eq!(report.anomalies[0].value, 100.0);
    }

    #[test]
    fn test_anomalies_need_two_samples() {
        // ---
        let readings = vec![
            reading("S1", Utc::now(), pm25(500.0)),
            reading("S2", Utc::now(), PollutantLevels::default()),
        ];
        let report = detect_anomalies(&readings, Pollutant::Pm25, 2.0);

        assert_eq!(report.samples, 1);
        assert_eq!(report.baseline, None);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_flat_series_has_no_anomalies() {
        // ---
        let readings: Vec<Reading> = (0..5).map(|_| reading("S1", Utc::now(), pm25(42.0))).collect();
        let report = detect_anomalies(&readings, Pollutant::Pm25, 0.0);

        assert_eq!(report.baseline.map(|b| b.stddev), Some(0.0));
        assert_eq!(report.anomalies_found, 0);
    }
}

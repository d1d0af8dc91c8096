//! Air Quality Index calculation.
//!
//! Sub-indices are computed per pollutant by piecewise-linear interpolation over
//! EPA breakpoint tables (expressed in each pollutant's native unit), and the
//! overall index is the maximum sub-index. Tables are contiguous: every segment
//! starts where the previous one ends, so the index never jumps at a boundary.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Pollutant, PollutantLevels, Reading};

// ---

/// One interpolation segment: `[c_low, c_high]` maps onto `[i_low, i_high]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub c_low: f64,
    pub c_high: f64,
    pub i_low: f64,
    pub i_high: f64,
}

const fn seg(c_low: f64, c_high: f64, i_low: f64, i_high: f64) -> Segment {
    Segment {
        c_low,
        c_high,
        i_low,
        i_high,
    }
}

impl Segment {
    fn slope(&self) -> f64 {
        (self.i_high - self.i_low) / (self.c_high - self.c_low)
    }

    fn interpolate(&self, concentration: f64) -> f64 {
        self.i_low + self.slope() * (concentration - self.c_low)
    }
}

/// Ordered breakpoint table for one pollutant.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointTable {
    segments: Vec<Segment>,
}

impl BreakpointTable {
    pub fn new(segments: Vec<Segment>) -> Self {
        BreakpointTable { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Interpolated sub-index. Values past the last segment extrapolate along its slope.
    pub fn sub_index(&self, concentration: f64) -> Option<f64> {
        // ---
        let last = self.segments.last()?;
        let segment = self
            .segments
            .iter()
            .find(|s| concentration <= s.c_high)
            .unwrap_or(last);
        Some(segment.interpolate(concentration))
    }
}

// µg/m³ for particulates and gases, mg/m³ for CO. Gas breakpoints are the EPA ppb/ppm
// values converted at 25 °C.
const PM25: [Segment; 6] = [
    seg(0.0, 12.0, 0.0, 50.0),
    seg(12.0, 35.4, 50.0, 100.0),
    seg(35.4, 55.4, 100.0, 150.0),
    seg(55.4, 150.4, 150.0, 200.0),
    seg(150.4, 250.4, 200.0, 300.0),
    seg(250.4, 500.4, 300.0, 500.0),
];

const PM10: [Segment; 6] = [
    seg(0.0, 54.0, 0.0, 50.0),
    seg(54.0, 154.0, 50.0, 100.0),
    seg(154.0, 254.0, 100.0, 150.0),
    seg(254.0, 354.0, 150.0, 200.0),
    seg(354.0, 424.0, 200.0, 300.0),
    seg(424.0, 604.0, 300.0, 500.0),
];

const NO2: [Segment; 6] = [
    seg(0.0, 100.0, 0.0, 50.0),
    seg(100.0, 188.0, 50.0, 100.0),
    seg(188.0, 677.0, 100.0, 150.0),
    seg(677.0, 1220.0, 150.0, 200.0),
    seg(1220.0, 2348.0, 200.0, 300.0),
    seg(2348.0, 3852.0, 300.0, 500.0),
];

const CO: [Segment; 6] = [
    seg(0.0, 5.0, 0.0, 50.0),
    seg(5.0, 10.8, 50.0, 100.0),
    seg(10.8, 14.2, 100.0, 150.0),
    seg(14.2, 17.6, 150.0, 200.0),
    seg(17.6, 34.8, 200.0, 300.0),
    seg(34.8, 57.7, 300.0, 500.0),
];

const O3: [Segment; 6] = [
    seg(0.0, 106.0, 0.0, 50.0),
    seg(106.0, 137.0, 50.0, 100.0),
    seg(137.0, 167.0, 100.0, 150.0),
    seg(167.0, 206.0, 150.0, 200.0),
    seg(206.0, 392.0, 200.0, 300.0),
    seg(392.0, 800.0, 300.0, 500.0),
];

const SO2: [Segment; 6] = [
    seg(0.0, 92.0, 0.0, 50.0),
    seg(92.0, 197.0, 50.0, 100.0),
    seg(197.0, 485.0, 100.0, 150.0),
    seg(485.0, 797.0, 150.0, 200.0),
    seg(797.0, 1583.0, 200.0, 300.0),
    seg(1583.0, 2631.0, 300.0, 500.0),
];

/// Fixed AQI categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AqiCategory {
    #[serde(rename = "No Data")]
    NoData,
    Good,
    Moderate,
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_index(aqi: u32) -> Self {
        // ---
        match aqi {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::NoData => "No Data",
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AqiCategory::NoData => "#9e9e9e",
            AqiCategory::Good => "#00e400",
            AqiCategory::Moderate => "#ffff00",
            AqiCategory::UnhealthyForSensitiveGroups => "#ff7e00",
            AqiCategory::Unhealthy => "#ff0000",
            AqiCategory::VeryUnhealthy => "#8f3f97",
            AqiCategory::Hazardous => "#7e0023",
        }
    }

    pub fn health_message(&self) -> &'static str {
        match self {
            AqiCategory::NoData => "No recent air quality data is available.",
            AqiCategory::Good => "Air quality is good and poses little or no health risk.",
            AqiCategory::Moderate => {
                "Air quality is acceptable, though unusually sensitive people may be affected."
            }
            AqiCategory::UnhealthyForSensitiveGroups => {
                "Sensitive groups may experience health effects; the general public is less likely to be affected."
            }
            AqiCategory::Unhealthy => {
                "Everyone may begin to experience health effects; sensitive groups more seriously."
            }
            AqiCategory::VeryUnhealthy => {
                "Health alert: everyone faces an increased risk of health effects."
            }
            AqiCategory::Hazardous => {
                "Emergency conditions: the entire population is likely to be affected."
            }
        }
    }
}

/// Result of an AQI computation. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AqiResult {
    pub aqi: u32,
    pub category: AqiCategory,
    pub color: &'static str,
    pub health_message: &'static str,
    pub dominant_pollutant: Option<Pollutant>,
}

impl AqiResult {
    pub fn no_data() -> Self {
        Self::for_category(0, AqiCategory::NoData, None)
    }

    fn for_category(aqi: u32, category: AqiCategory, dominant: Option<Pollutant>) -> Self {
        AqiResult {
            aqi,
            category,
            color: category.color(),
            health_message: category.health_message(),
            dominant_pollutant: dominant,
        }
    }
}

/// AQI calculator over an immutable set of breakpoint tables.
#[derive(Debug, Clone)]
pub struct AqiCalculator {
    tables: BTreeMap<Pollutant, BreakpointTable>,
}

impl Default for AqiCalculator {
    fn default() -> Self {
        // ---
        let tables = [
            (Pollutant::Pm25, &PM25[..]),
            (Pollutant::Pm10, &PM10[..]),
            (Pollutant::No2, &NO2[..]),
            (Pollutant::Co, &CO[..]),
            (Pollutant::O3, &O3[..]),
            (Pollutant::So2, &SO2[..]),
        ]
        .into_iter()
        .map(|(p, segments)| (p, BreakpointTable::new(segments.to_vec())))
        .collect();

        AqiCalculator { tables }
    }
}

impl AqiCalculator {
    pub fn table(&self, pollutant: Pollutant) -> Option<&BreakpointTable> {
        self.tables.get(&pollutant)
    }

    /// Sub-index for one pollutant; `None` when no table covers it.
    pub fn sub_index(&self, pollutant: Pollutant, concentration: f64) -> Option<f64> {
        self.table(pollutant)?.sub_index(concentration)
    }

    pub fn calculate(&self, levels: &PollutantLevels) -> AqiResult {
        // ---
        let mut best: Option<(Pollutant, f64)> = None;

        for (pollutant, concentration) in levels.iter() {
            let Some(index) = self.sub_index(pollutant, concentration) else {
                continue;
            };
            // Strictly greater keeps the first pollutant on ties.
            if best.map_or(true, |(_, top)| index > top) {
                best = Some((pollutant, index));
            }
        }

        match best {
            None => AqiResult::no_data(),
            Some((dominant, index)) => {
                let aqi = index.max(0.0).trunc() as u32;
                AqiResult::for_category(aqi, AqiCategory::from_index(aqi), Some(dominant))
            }
        }
    }

    /// Calculate from named concentrations; unrecognized names are skipped.
    pub fn calculate_named<'a, I>(&self, named: I) -> AqiResult
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        // ---
        let mut levels = PollutantLevels::default();
        for (name, value) in named {
            match name.parse::<Pollutant>() {
                Ok(pollutant) => levels.set(pollutant, Some(value)),
                Err(e) => tracing::debug!("Skipping AQI input: {}", e),
            }
        }
        self.calculate(&levels)
    }
}

/// Simple coordinate range box used to pick nearby readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

const KM_PER_DEGREE: f64 = 111.0;

impl GeoBounds {
    pub fn around(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        // ---
        let lat_range = radius_km / KM_PER_DEGREE;
        // Clamp near the poles where a degree of longitude shrinks to nothing.
        let cos_lat = latitude.to_radians().cos().abs().max(0.01);
        let lon_range = radius_km / (KM_PER_DEGREE * cos_lat);

        GeoBounds {
            min_lat: latitude - lat_range,
            max_lat: latitude + lat_range,
            min_lon: longitude - lon_range,
            max_lon: longitude + lon_range,
        }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }
}

/// Per-pollutant mean over the readings that report each pollutant.
pub fn average_levels<'a, I>(readings: I) -> PollutantLevels
where
    I: IntoIterator<Item = &'a Reading>,
{
    // ---
    let mut sums: BTreeMap<Pollutant, (f64, u32)> = BTreeMap::new();
    for reading in readings {
        for (pollutant, value) in reading.levels.iter() {
            let entry = sums.entry(pollutant).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let mut levels = PollutantLevels::default();
    for (pollutant, (sum, count)) in sums {
        levels.set(pollutant, Some(sum / f64::from(count)));
    }
    levels
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::Utc;

    fn pm25(value: f64) -> PollutantLevels {
        PollutantLevels {
            pm25: Some(value),
            ..Default::default()
        }
    }

    fn reading_at(lat: f64, lon: f64, levels: PollutantLevels) -> Reading {
        Reading {
            sensor_id: "S1".into(),
            timestamp: Utc::now(),
            latitude: lat,
            longitude: lon,
            levels,
            temperature: None,
            humidity: None,
            pressure: None,
            metadata: None,
        }
    }

    #[test]
    fn test_good_pm25_is_truncated() {
        // ---
        let result = AqiCalculator::default().calculate(&pm25(10.0));

        // 50 / 12 * 10 = 41.67, truncated
        assert_eq!(result.aqi, 41);
        assert_eq!(result.category, AqiCategory::Good);
        assert_eq!(result.category.label(), "Good");
        assert_eq!(result.color, "#00e400");
        assert_eq!(result.dominant_pollutant, Some(Pollutant::Pm25));
    }

    #[test]
    fn test_no_data_sentinel() {
        // ---
        let result = AqiCalculator::default().calculate(&PollutantLevels::default());
        assert_eq!(result.aqi, 0);
        assert_eq!(result.category.label(), "No Data");
        assert_eq!(result.dominant_pollutant, None);
    }

    #[test]
    fn test_category_boundaries() {
        // ---
        assert_eq!(AqiCategory::from_index(50), AqiCategory::Good);
        assert_eq!(AqiCategory::from_index(51), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_index(100), AqiCategory::Moderate);
        assert_eq!(
            AqiCategory::from_index(150),
            AqiCategory::UnhealthyForSensitiveGroups
        );
        assert_eq!(AqiCategory::from_index(200), AqiCategory::Unhealthy);
        assert_eq!(AqiCategory::from_index(300), AqiCategory::VeryUnhealthy);
        assert_eq!(AqiCategory::from_index(301), AqiCategory::Hazardous);
    }

    #[test]
    fn test_extrapolates_past_last_segment() {
        // ---
        let calc = AqiCalculator::default();
        let top = calc.sub_index(Pollutant::Pm25, 500.4).unwrap();
        let beyond = calc.sub_index(Pollutant::Pm25, 600.4).unwrap();

        assert!((top - 500.0).abs() < 1e-9);
        // last slope is 200 / 250 = 0.8 per µg/m³
        assert!((beyond - 580.0).abs() < 1e-9);
        assert_eq!(calc.calculate(&pm25(600.4)).category, AqiCategory::Hazardous);
    }

    #[test]
    fn test_monotonic_for_every_pollutant() {
        // ---
        let calc = AqiCalculator::default();
        for pollutant in Pollutant::ALL {
            let mut previous = 0;
            for step in 0..4000 {
                let mut levels = PollutantLevels::default();
                levels.set(pollutant, Some(step as f64 * 1.1));
                let aqi = calc.calculate(&levels).aqi;
                assert!(aqi >= previous, "{pollutant} decreased at step {step}");
                previous = aqi;
            }
        }
    }

    #[test]
    fn test_tables_are_continuous() {
        // ---
        let calc = AqiCalculator::default();
        for pollutant in Pollutant::ALL {
            let segments = calc.table(pollutant).unwrap().segments();
            for pair in segments.windows(2) {
                let (lower, upper) = (pair[0], pair[1]);
                assert_eq!(lower.c_high, upper.c_low, "{pollutant} has a gap");
                let from_lower = lower.interpolate(lower.c_high);
                let from_upper = upper.interpolate(upper.c_low);
                assert!(
                    (from_lower - from_upper).abs() < 1e-9,
                    "{pollutant} jumps at {}",
                    lower.c_high
                );
            }
        }
    }

    #[test]
    fn test_dominant_pollutant_has_max_sub_index() {
        // ---
        let calc = AqiCalculator::default();
        let levels = PollutantLevels {
            pm25: Some(20.0),
            pm10: Some(300.0),
            no2: Some(50.0),
            co: Some(1.0),
            ..Default::default()
        };

        let result = calc.calculate(&levels);
        let dominant = result.dominant_pollutant.unwrap();
        assert_eq!(dominant, Pollutant::Pm10);

        let dominant_index = calc
            .sub_index(dominant, levels.get(dominant).unwrap())
            .unwrap();
        assert_eq!(result.aqi, dominant_index.trunc() as u32);
        for (p, v) in levels.iter() {
            assert!(calc.sub_index(p, v).unwrap() <= dominant_index);
        }
    }

    #[test]
    fn test_named_input_skips_unknown() {
        // ---
        let result = AqiCalculator::default().calculate_named([("radon", 9000.0), ("pm25", 10.0)]);
        assert_eq!(result.aqi, 41);
        assert_eq!(result.dominant_pollutant, Some(Pollutant::Pm25));

        let nothing = AqiCalculator::default().calculate_named([("radon", 9000.0)]);
        assert_eq!(nothing.category, AqiCategory::NoData);
    }

    #[test]
    fn test_geo_bounds_filter() {
        // ---
        let bounds = GeoBounds::around(52.28, 76.95, 5.0);
        assert!(bounds.contains(52.28, 76.95));
        assert!(bounds.contains(52.30, 76.99));
        assert!(!bounds.contains(52.40, 76.95));
        assert!(!bounds.contains(52.28, 77.10));
    }

    #[test]
    fn test_average_levels_per_pollutant() {
        // ---
        let readings = vec![
            reading_at(0.0, 0.0, pm25(10.0)),
            reading_at(
                0.0,
                0.0,
                PollutantLevels {
                    pm25: Some(20.0),
                    no2: Some(40.0),
                    ..Default::default()
                },
            ),
        ];

        let avg = average_levels(&readings);
        assert_eq!(avg.pm25, Some(15.0));
        assert_eq!(avg.no2, Some(40.0));
        assert_eq!(avg.pm10, None);
    }
}

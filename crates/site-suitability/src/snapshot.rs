//! Environmental measurements for a single coordinate
//!
//! Sources hand back [`RawMeasurements`] with every field optional. The
//! provider chain merges them, fills gaps from [`StaticDefaults`] and produces
//! an [`EnvironmentalSnapshot`] whose fields are always in range:
//!
//! - angular fields are taken mod 360
//! - coverage is clamped to [0, 1]
//! - slope is clamped to [0, 90]
//! - non-finite values are replaced by the static default

use crate::{normalize_bearing, GeoPoint, SuitabilityError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Short-term barometric tendency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureTrend {
    FallingRapidly,
    Falling,
    Stable,
    Rising,
    RisingRapidly,
}

impl PressureTrend {
    /// Contribution of the pressure tendency to weather-front activity (0-1)
    pub fn front_signal(&self) -> f64 {
        match self {
            Self::FallingRapidly => 1.0,
            Self::Falling => 0.6,
            Self::Stable => 0.0,
            Self::Rising => 0.2,
            Self::RisingRapidly => 0.5,
        }
    }
}

/// Change in wind over the trend horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindTrend {
    /// Magnitude of the wind direction shift (0-180°)
    pub direction_shift_deg: f64,
    /// Speed change over the horizon (mph, signed)
    pub speed_change: f64,
}

/// Short-horizon (≤48h) weather trend summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherTrend {
    pub wind: WindTrend,
    pub pressure: PressureTrend,
}

impl WeatherTrend {
    /// Strength of detected weather-front activity (0-1)
    pub fn front_strength(&self) -> f64 {
        let shift = (self.wind.direction_shift_deg.abs() / 90.0).min(1.0);
        let speed = (self.wind.speed_change.abs() / 15.0).min(1.0);
        let strength = self.pressure.front_signal().max(shift).max(speed);
        if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Where a measurement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// First source in the chain
    Primary,
    /// A later source (secondary computation method)
    Secondary,
    /// Static domain default
    Default,
}

impl Default for Provenance {
    fn default() -> Self {
        Self::Default
    }
}

/// Provenance of each data group on a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataQuality {
    pub terrain: Provenance,
    pub canopy: Provenance,
    pub disturbance: Provenance,
    pub weather: Provenance,
    pub trend: Provenance,
}

impl DataQuality {
    /// Every group measured by the primary source
    pub fn all_primary() -> Self {
        Self {
            terrain: Provenance::Primary,
            canopy: Provenance::Primary,
            disturbance: Provenance::Primary,
            weather: Provenance::Primary,
            trend: Provenance::Primary,
        }
    }
}

/// Measurements as returned by a single source; absent fields are `None`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurements {
    pub elevation_m: Option<f64>,
    pub slope_deg: Option<f64>,
    pub aspect_deg: Option<f64>,
    pub canopy_coverage: Option<f64>,
    pub disturbance_distance_m: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_speed: Option<f64>,
    pub temperature: Option<f64>,
}

/// Per-field provenance accumulated while merging sources
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldSources {
    pub elevation_m: Provenance,
    pub slope_deg: Provenance,
    pub aspect_deg: Provenance,
    pub canopy_coverage: Provenance,
    pub disturbance_distance_m: Provenance,
    pub wind_direction_deg: Provenance,
    pub wind_speed: Provenance,
    pub temperature: Provenance,
}

impl FieldSources {
    pub fn quality(&self, trend: Provenance) -> DataQuality {
        DataQuality {
            terrain: self.slope_deg.max(self.aspect_deg),
            canopy: self.canopy_coverage,
            disturbance: self.disturbance_distance_m,
            weather: self.wind_speed.max(self.wind_direction_deg).max(self.temperature),
            trend,
        }
    }
}

fn fill(slot: &mut Option<f64>, incoming: Option<f64>, source: &mut Provenance, provenance: Provenance) {
    if slot.is_none() {
        if let Some(v) = incoming.filter(|v| v.is_finite()) {
            *slot = Some(v);
            *source = provenance;
        }
    }
}

impl RawMeasurements {
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|v| v.is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.fields().iter().all(|v| v.is_some())
    }

    fn fields(&self) -> [Option<f64>; 8] {
        [
            self.elevation_m,
            self.slope_deg,
            self.aspect_deg,
            self.canopy_coverage,
            self.disturbance_distance_m,
            self.wind_direction_deg,
            self.wind_speed,
            self.temperature,
        ]
    }

    /// Fill fields still missing here from `other`, recording where they came from
    pub fn fill_from(&mut self, other: &RawMeasurements, provenance: Provenance, sources: &mut FieldSources) {
        fill(&mut self.elevation_m, other.elevation_m, &mut sources.elevation_m, provenance);
        fill(&mut self.slope_deg, other.slope_deg, &mut sources.slope_deg, provenance);
        fill(&mut self.aspect_deg, other.aspect_deg, &mut sources.aspect_deg, provenance);
        fill(&mut self.canopy_coverage, other.canopy_coverage, &mut sources.canopy_coverage, provenance);
        fill(
            &mut self.disturbance_distance_m,
            other.disturbance_distance_m,
            &mut sources.disturbance_distance_m,
            provenance,
        );
        fill(&mut self.wind_direction_deg, other.wind_direction_deg, &mut sources.wind_direction_deg, provenance);
        fill(&mut self.wind_speed, other.wind_speed, &mut sources.wind_speed, provenance);
        fill(&mut self.temperature, other.temperature, &mut sources.temperature, provenance);
    }
}

/// Last-resort values used when no source supplies a measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticDefaults {
    pub elevation_m: f64,
    pub slope_deg: f64,
    pub aspect_deg: f64,
    pub canopy_coverage: f64,
    pub disturbance_distance_m: f64,
    pub wind_direction_deg: f64,
    /// Moderate, never zero: zero would silently force the light-wind branch
    pub wind_speed: f64,
    pub temperature: f64,
}

impl Default for StaticDefaults {
    fn default() -> Self {
        Self {
            elevation_m: 0.0,
            slope_deg: 12.0,
            aspect_deg: 180.0,
            canopy_coverage: 0.5,
            disturbance_distance_m: 250.0,
            wind_direction_deg: 270.0,
            wind_speed: 8.0,
            temperature: 55.0,
        }
    }
}

/// Immutable per-coordinate environmental value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalSnapshot {
    pub location: GeoPoint,
    pub elevation_m: f64,
    /// Slope angle (0-90°)
    pub slope_deg: f64,
    /// Downhill-facing direction (0-360°)
    pub aspect_deg: f64,
    /// Canopy coverage fraction (0-1)
    pub canopy_coverage: f64,
    /// Distance to nearest road or structure (m, ≥0)
    pub disturbance_distance_m: f64,
    /// Wind FROM-direction (0-360°)
    pub wind_direction_deg: f64,
    /// Wind speed (mph)
    pub wind_speed: f64,
    /// Temperature (°F)
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_trend: Option<WindTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_trend: Option<PressureTrend>,
    pub quality: DataQuality,
    /// Rationale for every value clamped or substituted during validation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<String>,
}

/// Check a measurement against its physical range
pub fn validate_measurement(field: &'static str, value: f64, min: f64, max: f64) -> crate::Result<f64> {
    if !value.is_finite() {
        return Err(SuitabilityError::InvalidMeasurement {
            field,
            value,
            reason: "value is not finite".to_string(),
        });
    }
    if value < min || value > max {
        return Err(SuitabilityError::InvalidMeasurement {
            field,
            value,
            reason: format!("outside [{}, {}]", min, max),
        });
    }
    Ok(value)
}

impl EnvironmentalSnapshot {
    /// Build a snapshot from merged measurements, filling gaps from defaults
    pub fn from_measurements(
        location: GeoPoint,
        raw: &RawMeasurements,
        sources: &FieldSources,
        defaults: &StaticDefaults,
    ) -> Self {
        let mut snapshot = Self {
            location,
            elevation_m: raw.elevation_m.unwrap_or(defaults.elevation_m),
            slope_deg: raw.slope_deg.unwrap_or(defaults.slope_deg),
            aspect_deg: raw.aspect_deg.unwrap_or(defaults.aspect_deg),
            canopy_coverage: raw.canopy_coverage.unwrap_or(defaults.canopy_coverage),
            disturbance_distance_m: raw.disturbance_distance_m.unwrap_or(defaults.disturbance_distance_m),
            wind_direction_deg: raw.wind_direction_deg.unwrap_or(defaults.wind_direction_deg),
            wind_speed: raw.wind_speed.unwrap_or(defaults.wind_speed),
            temperature: raw.temperature.unwrap_or(defaults.temperature),
            wind_trend: None,
            pressure_trend: None,
            quality: sources.quality(Provenance::Default),
            adjustments: Vec::new(),
        };
        snapshot.sanitize(defaults);
        snapshot
    }

    /// Range-validated copy; out-of-range values are clamped with a rationale
    pub fn normalized(&self) -> Self {
        self.normalized_with(&StaticDefaults::default())
    }

    /// As [`normalized`](Self::normalized), with non-finite values replaced from `defaults`
    pub fn normalized_with(&self, defaults: &StaticDefaults) -> Self {
        let mut copy = self.clone();
        copy.sanitize(defaults);
        copy
    }

    pub fn with_trend(mut self, trend: Option<WeatherTrend>, provenance: Provenance) -> Self {
        self.wind_trend = trend.map(|t| t.wind);
        self.pressure_trend = trend.map(|t| t.pressure);
        self.quality.trend = if trend.is_some() { provenance } else { Provenance::Default };
        self
    }

    pub fn trend(&self) -> Option<WeatherTrend> {
        match (self.wind_trend, self.pressure_trend) {
            (Some(wind), Some(pressure)) => Some(WeatherTrend { wind, pressure }),
            (None, Some(pressure)) => Some(WeatherTrend {
                wind: WindTrend {
                    direction_shift_deg: 0.0,
                    speed_change: 0.0,
                },
                pressure,
            }),
            _ => None,
        }
    }

    /// Anchor conditions moved to another point with an adjusted aspect
    pub fn approximate_at(&self, location: GeoPoint, aspect_deg: f64) -> Self {
        let mut copy = self.clone();
        copy.location = location;
        copy.aspect_deg = normalize_bearing(aspect_deg);
        copy.adjustments.push(format!(
            "approximated from anchor ({:.5}, {:.5}) with aspect {:.0}°",
            self.location.lat, self.location.lon, copy.aspect_deg
        ));
        copy
    }

    fn sanitize(&mut self, defaults: &StaticDefaults) {
        let notes = &mut self.adjustments;
        self.elevation_m = checked(notes, "elevation_m", self.elevation_m, -500.0, 9000.0, defaults.elevation_m);
        self.slope_deg = checked(notes, "slope_deg", self.slope_deg, 0.0, 90.0, defaults.slope_deg);
        self.aspect_deg = angular(notes, "aspect_deg", self.aspect_deg, defaults.aspect_deg);
        self.canopy_coverage = checked(notes, "canopy_coverage", self.canopy_coverage, 0.0, 1.0, defaults.canopy_coverage);
        self.disturbance_distance_m = checked(
            notes,
            "disturbance_distance_m",
            self.disturbance_distance_m,
            0.0,
            f64::MAX,
            defaults.disturbance_distance_m,
        );
        self.wind_direction_deg = angular(notes, "wind_direction_deg", self.wind_direction_deg, defaults.wind_direction_deg);
        self.wind_speed = checked(notes, "wind_speed", self.wind_speed, 0.0, 200.0, defaults.wind_speed);
        self.temperature = checked(notes, "temperature", self.temperature, -80.0, 140.0, defaults.temperature);
    }
}

fn checked(notes: &mut Vec<String>, field: &'static str, value: f64, min: f64, max: f64, default: f64) -> f64 {
    match validate_measurement(field, value, min, max) {
        Ok(v) => v,
        Err(e) => {
            let replacement = if value.is_finite() { value.clamp(min, max) } else { default };
            warn!("{}; using {}", e, replacement);
            notes.push(format!("{} {} replaced by {}", field, value, replacement));
            replacement
        }
    }
}

fn angular(notes: &mut Vec<String>, field: &'static str, value: f64, default: f64) -> f64 {
    match validate_measurement(field, value, 0.0, 360.0) {
        Ok(v) => normalize_bearing(v),
        Err(e) => {
            let replacement = if value.is_finite() {
                normalize_bearing(value)
            } else {
                normalize_bearing(default)
            };
            warn!("{}; using {}", e, replacement);
            notes.push(format!("{} {} replaced by {}", field, value, replacement));
            replacement
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> GeoPoint {
        GeoPoint::new(44.0, -110.0)
    }

    #[test]
    fn test_defaults_fill_missing() {
        let raw = RawMeasurements {
            slope_deg: Some(15.0),
            ..Default::default()
        };
        let mut sources = FieldSources::default();
        sources.slope_deg = Provenance::Primary;
        let defaults = StaticDefaults::default();
        let snap = EnvironmentalSnapshot::from_measurements(point(), &raw, &sources, &defaults);

        assert_eq!(snap.slope_deg, 15.0);
        assert_eq!(snap.wind_speed, defaults.wind_speed);
        assert!(snap.wind_speed > 0.0);
        assert_eq!(snap.quality.canopy, Provenance::Default);
        assert!(snap.adjustments.is_empty());
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let raw = RawMeasurements {
            slope_deg: Some(120.0),
            aspect_deg: Some(370.0),
            canopy_coverage: Some(1.4),
            disturbance_distance_m: Some(-5.0),
            wind_direction_deg: Some(-90.0),
            ..Default::default()
        };
        let snap = EnvironmentalSnapshot::from_measurements(
            point(),
            &raw,
            &FieldSources::default(),
            &StaticDefaults::default(),
        );

        assert_eq!(snap.slope_deg, 90.0);
        assert!((snap.aspect_deg - 10.0).abs() < 1e-9);
        assert_eq!(snap.canopy_coverage, 1.0);
        assert_eq!(snap.disturbance_distance_m, 0.0);
        assert_eq!(snap.wind_direction_deg, 270.0);
        assert_eq!(snap.adjustments.len(), 5);
    }

    #[test]
    fn test_nan_replaced_by_default() {
        let snap = EnvironmentalSnapshot {
            location: point(),
            elevation_m: 1200.0,
            slope_deg: f64::NAN,
            aspect_deg: f64::INFINITY,
            canopy_coverage: 0.7,
            disturbance_distance_m: 300.0,
            wind_direction_deg: 90.0,
            wind_speed: 5.0,
            temperature: 50.0,
            wind_trend: None,
            pressure_trend: None,
            quality: DataQuality::default(),
            adjustments: Vec::new(),
        }
        .normalized();

        assert_eq!(snap.slope_deg, StaticDefaults::default().slope_deg);
        assert_eq!(snap.aspect_deg, StaticDefaults::default().aspect_deg);
        assert_eq!(snap.adjustments.len(), 2);
    }

    #[test]
    fn test_fill_from_prefers_first_source() {
        let mut merged = RawMeasurements::default();
        let mut sources = FieldSources::default();
        let primary = RawMeasurements {
            wind_speed: Some(12.0),
            ..Default::default()
        };
        let secondary = RawMeasurements {
            wind_speed: Some(3.0),
            canopy_coverage: Some(0.8),
            ..Default::default()
        };
        merged.fill_from(&primary, Provenance::Primary, &mut sources);
        merged.fill_from(&secondary, Provenance::Secondary, &mut sources);

        assert_eq!(merged.wind_speed, Some(12.0));
        assert_eq!(merged.canopy_coverage, Some(0.8));
        assert_eq!(sources.wind_speed, Provenance::Primary);
        assert_eq!(sources.canopy_coverage, Provenance::Secondary);
        assert_eq!(sources.quality(Provenance::Default).weather, Provenance::Default);
    }

    #[test]
    fn test_front_strength() {
        let calm = WeatherTrend {
            wind: WindTrend {
                direction_shift_deg: 5.0,
                speed_change: 1.0,
            },
            pressure: PressureTrend::Stable,
        };
        assert!(calm.front_strength() < 0.1);

        let front = WeatherTrend {
            wind: WindTrend {
                direction_shift_deg: 120.0,
                speed_change: -4.0,
            },
            pressure: PressureTrend::FallingRapidly,
        };
        assert_eq!(front.front_strength(), 1.0);
    }

    #[test]
    fn test_validate_measurement() {
        assert!(validate_measurement("slope_deg", 45.0, 0.0, 90.0).is_ok());
        assert!(matches!(
            validate_measurement("slope_deg", 95.0, 0.0, 90.0),
            Err(SuitabilityError::InvalidMeasurement { field: "slope_deg", .. })
        ));
    }
}

//! Habitat Site Suitability
//!
//! Scores a target coordinate for habitat use (rest areas, travel-corridor
//! stands, forage areas, sensor placements) by fusing terrain, canopy cover,
//! human disturbance and weather trend signals, then searches outward when the
//! target itself does not qualify.
//!
//! # Scoring Model (6-Factor)
//!
//! ```text
//! Score = w₁·C + w₂·I + w₃·A + w₄·S + w₅·W + w₆·T
//! ```
//!
//! | Factor | Weight | Description |
//! |--------|--------|-------------|
//! | C      | 0.25   | Canopy cover |
//! | I      | 0.25   | Isolation from roads and structures |
//! | A      | 0.15   | Aspect (thermal / leeward priority) |
//! | S      | 0.15   | Slope |
//! | W      | 0.10   | Wind protection |
//! | T      | 0.10   | Thermal comfort |
//!
//! # Flow
//!
//! ```text
//! SourceChain -> criteria -> SuitabilityEvaluator -> { positions (pass) | search (fail) } -> confidence -> SiteSet
//! ```
//!
//! Units: temperature °F, wind mph, distances metres, bearings compass degrees.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

pub mod confidence;
pub mod config;
pub mod criteria;
pub mod evaluator;
pub mod export;
pub mod positions;
pub mod provider;
pub mod search;
pub mod snapshot;

pub use confidence::ConfidenceBreakdown;
pub use config::{CriteriaThresholds, ScoringWeights, SearchTier, SiteConfig};
pub use criteria::{Criterion, CriterionScore};
pub use evaluator::{SuitabilityEvaluator, SuitabilityResult};
pub use provider::{EnvironmentSource, Lookup, SourceChain, Unavailable};
pub use search::{CancelToken, SiteEngine};
pub use snapshot::{EnvironmentalSnapshot, PressureTrend, RawMeasurements, WeatherTrend, WindTrend};

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Error, Debug)]
pub enum SuitabilityError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("No environmental data source reachable for ({lat:.5}, {lon:.5}): {reason}")]
    DataUnavailable { lat: f64, lon: f64, reason: String },
    #[error("Invalid measurement {field}={value}: {reason}")]
    InvalidMeasurement {
        field: &'static str,
        value: f64,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SuitabilityError>;

/// WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Reject coordinates outside the WGS84 domain
    pub fn validated(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
            return Err(SuitabilityError::InvalidMeasurement {
                field: "lat",
                value: lat,
                reason: "latitude must be within [-90, 90]".to_string(),
            });
        }
        if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
            return Err(SuitabilityError::InvalidMeasurement {
                field: "lon",
                value: lon,
                reason: "longitude must be within [-180, 180]".to_string(),
            });
        }
        Ok(Self { lat, lon })
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_m(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Normalize any angle to [0, 360)
pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Smallest angle between two compass directions, in [0, 180]
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (normalize_bearing(a) - normalize_bearing(b)).abs();
    diff.min(360.0 - diff)
}

/// Haversine distance between two points in metres
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1 * PI / 180.0;
    let lat2_rad = lat2 * PI / 180.0;
    let dlat = (lat2 - lat1) * PI / 180.0;
    let dlon = (lon2 - lon1) * PI / 180.0;

    let a = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Great-circle forward projection from `origin` along `bearing_deg` for `distance_m`
pub fn destination_point(origin: GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = normalize_bearing(bearing_deg).to_radians();
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lon.to_radians();

    let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos();
    let phi2 = sin_phi2.clamp(-1.0, 1.0).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    let lon = (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    GeoPoint {
        lat: phi2.to_degrees(),
        lon,
    }
}

/// Role of a site within a returned set, serialized as its label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteRole {
    Primary,
    Secondary,
    Escape,
    Alternative(u32),
}

impl SiteRole {
    pub fn label(&self) -> String {
        match self {
            Self::Primary => "primary".to_string(),
            Self::Secondary => "secondary".to_string(),
            Self::Escape => "escape".to_string(),
            Self::Alternative(n) => format!("alternative_{}", n),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            "escape" => Some(Self::Escape),
            other => other
                .strip_prefix("alternative_")
                .and_then(|n| n.parse().ok())
                .map(Self::Alternative),
        }
    }
}

impl Serialize for SiteRole {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for SiteRole {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::from_label(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown site role '{}'", label)))
    }
}

/// Compass quadrant of a site's aspect, used for diversity filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectBucket {
    North,
    East,
    South,
    West,
}

impl AspectBucket {
    pub fn from_aspect(aspect_deg: f64) -> Self {
        let a = normalize_bearing(aspect_deg);
        if !(45.0..315.0).contains(&a) {
            Self::North
        } else if a < 135.0 {
            Self::East
        } else if a < 225.0 {
            Self::South
        } else {
            Self::West
        }
    }
}

/// An evaluated site. Never mutated after creation, only filtered and ranked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteCandidate {
    pub location: GeoPoint,
    pub role: SiteRole,
    /// Bearing from the anchor this candidate was derived from
    pub bearing_deg: f64,
    /// Distance from that anchor
    pub distance_m: f64,
    pub suitability: SuitabilityResult,
    /// 0 = original location, >0 = fallback tier that produced it
    pub search_tier: u32,
    /// True when the anchor snapshot was reused with an adjusted aspect
    pub approximated: bool,
}

impl SiteCandidate {
    pub fn aspect_bucket(&self) -> AspectBucket {
        AspectBucket::from_aspect(self.suitability.criteria.aspect_deg)
    }
}

/// Why a search ended without reaching the desired count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    TiersExhausted,
    TimeBudgetSpent,
    Cancelled,
}

/// Terminal state of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SearchOutcome {
    Sufficient,
    Exhausted { reason: ExhaustionReason },
}

/// Accepted, diversity-filtered sites for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSet {
    pub request_id: uuid::Uuid,
    pub generated_at: String,
    pub target: GeoPoint,
    pub desired_count: usize,
    /// Evaluation of the target point itself
    pub anchor: SuitabilityResult,
    pub candidates: Vec<SiteCandidate>,
    /// Aggregate confidence (0-1)
    pub confidence: f64,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub outcome: SearchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_rejection_reason: Option<String>,
    pub tiers_searched: u32,
    pub points_evaluated: u32,
}

impl SiteSet {
    /// Smallest distance between any two candidates, None for fewer than two
    pub fn min_pairwise_separation_m(&self) -> Option<f64> {
        let mut min: Option<f64> = None;
        for (i, a) in self.candidates.iter().enumerate() {
            for b in &self.candidates[i + 1..] {
                let d = a.location.distance_m(&b.location);
                min = Some(min.map_or(d, |m| m.min(d)));
            }
        }
        min
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.outcome, SearchOutcome::Exhausted { .. })
    }
}

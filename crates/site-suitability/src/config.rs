//! Versioned scoring and search configuration
//!
//! Loaded once, validated, then shared read-only (`Arc<SiteConfig>`) across
//! requests. Tier relaxation never mutates a loaded value: [`relax`] returns a
//! derived [`CriteriaThresholds`].

use crate::snapshot::StaticDefaults;
use crate::{normalize_bearing, Result, SuitabilityError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Configuration schema version
pub const CONFIG_VERSION: &str = "1";

/// Scoring weights (6-factor model). Sum = 1.0
pub const W_CANOPY: f64 = 0.25;
pub const W_ISOLATION: f64 = 0.25;
pub const W_ASPECT: f64 = 0.15;
pub const W_SLOPE: f64 = 0.15;
pub const W_WIND_PROTECTION: f64 = 0.10;
pub const W_THERMAL: f64 = 0.10;

/// Clockwise arc of compass directions from `start_deg` to `end_deg`.
/// An arc with `start_deg > end_deg` wraps through north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectRange {
    pub start_deg: f64,
    pub end_deg: f64,
}

impl AspectRange {
    pub fn new(start_deg: f64, end_deg: f64) -> Self {
        Self {
            start_deg: normalize_bearing(start_deg),
            end_deg: normalize_bearing(end_deg),
        }
    }

    pub fn contains(&self, deg: f64) -> bool {
        let d = normalize_bearing(deg);
        if self.start_deg <= self.end_deg {
            d >= self.start_deg && d <= self.end_deg
        } else {
            d >= self.start_deg || d <= self.end_deg
        }
    }

    /// Arc widened by `margin_deg` on both sides
    pub fn widened(&self, margin_deg: f64) -> Self {
        if self.width() + 2.0 * margin_deg >= 360.0 {
            return Self {
                start_deg: 0.0,
                end_deg: 360.0,
            };
        }
        Self::new(self.start_deg - margin_deg, self.end_deg + margin_deg)
    }

    /// Same arc rotated by 180°
    pub fn opposite(&self) -> Self {
        Self::new(self.start_deg + 180.0, self.end_deg + 180.0)
    }

    pub fn width(&self) -> f64 {
        (self.end_deg - self.start_deg).rem_euclid(360.0)
    }
}

/// Named, tunable pass/fail thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaThresholds {
    /// Minimum canopy coverage fraction (0-1)
    pub min_canopy: f64,
    /// Minimum distance to roads/structures (m)
    pub min_disturbance_distance_m: f64,
    pub min_slope_deg: f64,
    pub max_slope_deg: f64,
    /// Thermally preferred downhill-facing directions
    pub optimal_aspect_range: AspectRange,
    /// Minimum overall score (0-100) for a pass
    pub pass_threshold: f64,
}

impl Default for CriteriaThresholds {
    fn default() -> Self {
        Self {
            min_canopy: 0.60,
            min_disturbance_distance_m: 200.0,
            min_slope_deg: 5.0,
            max_slope_deg: 30.0,
            optimal_aspect_range: AspectRange::new(135.0, 225.0),
            pass_threshold: 70.0,
        }
    }
}

impl CriteriaThresholds {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_canopy) {
            return Err(config_error(format!("min_canopy {} outside [0, 1]", self.min_canopy)));
        }
        if !(self.min_disturbance_distance_m >= 0.0) {
            return Err(config_error(format!(
                "min_disturbance_distance_m {} must be >= 0",
                self.min_disturbance_distance_m
            )));
        }
        if !(0.0..=90.0).contains(&self.min_slope_deg) || !(0.0..=90.0).contains(&self.max_slope_deg) {
            return Err(config_error("slope limits must be within [0, 90]".to_string()));
        }
        if self.min_slope_deg > self.max_slope_deg {
            return Err(config_error(format!(
                "min_slope_deg {} exceeds max_slope_deg {}",
                self.min_slope_deg, self.max_slope_deg
            )));
        }
        let arc = self.optimal_aspect_range;
        if !(0.0..=360.0).contains(&arc.start_deg) || !(0.0..=360.0).contains(&arc.end_deg) {
            return Err(config_error("optimal_aspect_range must be within [0, 360]".to_string()));
        }
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(config_error(format!("pass_threshold {} outside [0, 100]", self.pass_threshold)));
        }
        Ok(())
    }
}

/// Criterion weights; must sum to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub canopy: f64,
    pub isolation: f64,
    pub aspect: f64,
    pub slope: f64,
    pub wind_protection: f64,
    pub thermal: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            canopy: W_CANOPY,
            isolation: W_ISOLATION,
            aspect: W_ASPECT,
            slope: W_SLOPE,
            wind_protection: W_WIND_PROTECTION,
            thermal: W_THERMAL,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.canopy + self.isolation + self.aspect + self.slope + self.wind_protection + self.thermal
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            self.canopy,
            self.isolation,
            self.aspect,
            self.slope,
            self.wind_protection,
            self.thermal,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(config_error("weights must be finite and non-negative".to_string()));
        }
        let total = self.sum();
        if (total - 1.0).abs() > 0.001 {
            return Err(config_error(format!("weights must sum to 1.0, got {:.4}", total)));
        }
        Ok(())
    }
}

/// Tunable constants used by the criterion scorers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    /// Full canopy credit is reached at this multiple of `min_canopy`
    pub canopy_full_credit_ratio: f64,
    /// Isolation reaches 100 at this distance (m)
    pub isolation_excellent_m: f64,
    /// Highest isolation score possible below the minimum distance
    pub isolation_below_min_cap: f64,
    /// Slope score reaches 0 this many degrees beyond `max_slope_deg`
    pub slope_decay_margin_deg: f64,
    /// Wind speed (mph) above which leeward shelter drives aspect scoring
    pub strong_wind_threshold: f64,
    /// Temperature (°F) below which thermal need dominates
    pub cold_threshold: f64,
    /// Temperature (°F) above which shade is preferred
    pub hot_threshold: f64,
    /// Thermal score when neither cold nor thermal-driven
    pub mild_thermal_score: f64,
    /// Slopes below this are treated as flat for escape bearings
    pub near_flat_slope_deg: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            canopy_full_credit_ratio: 1.25,
            isolation_excellent_m: 450.0,
            isolation_below_min_cap: 55.0,
            slope_decay_margin_deg: 15.0,
            strong_wind_threshold: 10.0,
            cold_threshold: 40.0,
            hot_threshold: 75.0,
            mild_thermal_score: 70.0,
            near_flat_slope_deg: 3.0,
        }
    }
}

impl ScoringParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.canopy_full_credit_ratio >= 1.0) {
            return Err(config_error("canopy_full_credit_ratio must be >= 1".to_string()));
        }
        if !(self.isolation_excellent_m > 0.0) {
            return Err(config_error("isolation_excellent_m must be > 0".to_string()));
        }
        if !(0.0..=100.0).contains(&self.isolation_below_min_cap) || !(0.0..=100.0).contains(&self.mild_thermal_score) {
            return Err(config_error("score parameters must be within [0, 100]".to_string()));
        }
        if !(self.slope_decay_margin_deg > 0.0) {
            return Err(config_error("slope_decay_margin_deg must be > 0".to_string()));
        }
        if self.cold_threshold >= self.hot_threshold {
            return Err(config_error(format!(
                "cold_threshold {} must be below hot_threshold {}",
                self.cold_threshold, self.hot_threshold
            )));
        }
        Ok(())
    }
}

/// One ring of the fallback search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTier {
    /// Ring radius from the anchor (m)
    pub distance_m: f64,
    /// Number of evenly spaced bearings, starting at north, clockwise
    pub bearing_count: u32,
    /// Points subtracted from `pass_threshold`
    #[serde(default)]
    pub pass_threshold_decrement: f64,
    /// Multiplier applied to `min_canopy` (1.0 = unchanged)
    #[serde(default = "unit")]
    pub canopy_relaxation: f64,
    /// Multiplier applied to `min_disturbance_distance_m` (1.0 = unchanged)
    #[serde(default = "unit")]
    pub disturbance_relaxation: f64,
}

fn unit() -> f64 {
    1.0
}

impl SearchTier {
    pub fn new(distance_m: f64, bearing_count: u32) -> Self {
        Self {
            distance_m,
            bearing_count,
            pass_threshold_decrement: 0.0,
            canopy_relaxation: 1.0,
            disturbance_relaxation: 1.0,
        }
    }

    pub fn with_pass_decrement(mut self, points: f64) -> Self {
        self.pass_threshold_decrement = points;
        self
    }

    pub fn with_canopy_relaxation(mut self, factor: f64) -> Self {
        self.canopy_relaxation = factor;
        self
    }

    pub fn with_disturbance_relaxation(mut self, factor: f64) -> Self {
        self.disturbance_relaxation = factor;
        self
    }

    /// Fixed evaluation order of bearings in this ring
    pub fn bearings(&self) -> Vec<f64> {
        let n = self.bearing_count.max(1);
        (0..n).map(|i| i as f64 * 360.0 / n as f64).collect()
    }
}

/// Derive the thresholds for a tier. The base value is never modified.
pub fn relax(base: &CriteriaThresholds, tier: &SearchTier) -> CriteriaThresholds {
    CriteriaThresholds {
        min_canopy: (base.min_canopy * tier.canopy_relaxation).clamp(0.0, 1.0),
        min_disturbance_distance_m: (base.min_disturbance_distance_m * tier.disturbance_relaxation).max(0.0),
        pass_threshold: (base.pass_threshold - tier.pass_threshold_decrement).clamp(0.0, 100.0),
        ..base.clone()
    }
}

/// How variant sites get their snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantSnapshots {
    /// Fetch a snapshot at the variant coordinate, approximating on failure
    Fetch,
    /// Reuse the anchor snapshot with the variant bearing as aspect
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Rings in increasing distance order
    pub tiers: Vec<SearchTier>,
    /// Minimum pairwise distance between accepted sites (m)
    pub min_separation_m: f64,
    pub default_desired_count: usize,
    /// Largest desired count a caller may request
    pub max_desired_count: usize,
    /// Wall-clock bound for one search (ms)
    pub max_duration_ms: u64,
    pub variant_snapshots: VariantSnapshots,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                SearchTier::new(100.0, 8),
                SearchTier::new(200.0, 8).with_pass_decrement(5.0),
                SearchTier::new(400.0, 8)
                    .with_pass_decrement(10.0)
                    .with_canopy_relaxation(0.85),
                SearchTier::new(800.0, 12)
                    .with_pass_decrement(15.0)
                    .with_canopy_relaxation(0.75)
                    .with_disturbance_relaxation(0.8),
            ],
            min_separation_m: 75.0,
            default_desired_count: 3,
            max_desired_count: 50,
            max_duration_ms: 30_000,
            variant_snapshots: VariantSnapshots::Fetch,
        }
    }
}

impl SearchConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    /// Tiers paired with their 1-based tier number, nearest first
    pub fn ordered_tiers(&self) -> Vec<(u32, &SearchTier)> {
        let mut tiers: Vec<&SearchTier> = self.tiers.iter().collect();
        tiers.sort_by(|a, b| a.distance_m.partial_cmp(&b.distance_m).unwrap_or(std::cmp::Ordering::Equal));
        tiers.into_iter().enumerate().map(|(i, t)| (i as u32 + 1, t)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(config_error("search requires at least one tier".to_string()));
        }
        for tier in &self.tiers {
            if !(tier.distance_m > 0.0) || tier.bearing_count == 0 {
                return Err(config_error(format!(
                    "tier at {} m with {} bearings is invalid",
                    tier.distance_m, tier.bearing_count
                )));
            }
            if !(tier.canopy_relaxation > 0.0) || !(tier.disturbance_relaxation > 0.0) || tier.pass_threshold_decrement < 0.0 {
                return Err(config_error(format!("tier at {} m has invalid relaxation", tier.distance_m)));
            }
        }
        if !(self.min_separation_m > 0.0) {
            return Err(config_error("min_separation_m must be > 0".to_string()));
        }
        if self.default_desired_count == 0 {
            return Err(config_error("default_desired_count must be >= 1".to_string()));
        }
        if self.max_desired_count < self.default_desired_count {
            return Err(config_error(format!(
                "max_desired_count {} is below default_desired_count {}",
                self.max_desired_count, self.default_desired_count
            )));
        }
        if self.max_duration_ms == 0 {
            return Err(config_error("max_duration_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantConfig {
    /// Offset before slope/wind scaling (m)
    pub base_distance_m: f64,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self { base_distance_m: 120.0 }
    }
}

/// Base value and per-bonus caps for the confidence aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub base: f64,
    pub suitability_cap: f64,
    pub canopy_data_cap: f64,
    pub disturbance_data_cap: f64,
    pub weather_data_cap: f64,
    pub front_activity_cap: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base: 0.20,
            suitability_cap: 0.30,
            canopy_data_cap: 0.125,
            disturbance_data_cap: 0.125,
            weather_data_cap: 0.10,
            front_activity_cap: 0.15,
        }
    }
}

impl ConfidenceConfig {
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.base,
            self.suitability_cap,
            self.canopy_data_cap,
            self.disturbance_data_cap,
            self.weather_data_cap,
            self.front_activity_cap,
        ];
        if all.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(config_error("confidence values must be within [0, 1]".to_string()));
        }
        Ok(())
    }
}

/// Retry, backoff and timeout for calls to environmental sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
            call_timeout_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based), doubling and capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(config_error("max_attempts must be >= 1".to_string()));
        }
        if self.call_timeout_ms == 0 {
            return Err(config_error("call_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Complete configuration for one deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub version: String,
    #[serde(default)]
    pub thresholds: CriteriaThresholds,
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub scoring: ScoringParams,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub variants: VariantConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub defaults: StaticDefaults,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            thresholds: CriteriaThresholds::default(),
            weights: ScoringWeights::default(),
            scoring: ScoringParams::default(),
            search: SearchConfig::default(),
            variants: VariantConfig::default(),
            confidence: ConfidenceConfig::default(),
            retry: RetryPolicy::default(),
            defaults: StaticDefaults::default(),
        }
    }
}

impl SiteConfig {
    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading site configuration from {:?}", path);

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: SiteConfig = serde_json::from_reader(reader)?;
        config.validate()?;

        info!(
            "Configuration v{} loaded: {} search tiers, pass threshold {:.1}",
            config.version,
            config.search.tiers.len(),
            config.thresholds.pass_threshold
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(config_error("version must not be empty".to_string()));
        }
        self.thresholds.validate()?;
        self.weights.validate()?;
        self.scoring.validate()?;
        self.search.validate()?;
        self.confidence.validate()?;
        self.retry.validate()?;
        if !(self.variants.base_distance_m > 0.0) {
            return Err(config_error("variants.base_distance_m must be > 0".to_string()));
        }
        Ok(())
    }
}

fn config_error(msg: String) -> SuitabilityError {
    SuitabilityError::Configuration(msg)
}

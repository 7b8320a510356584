//! Suitability evaluator
//!
//! Combines the six criterion scores into a weighted overall score and applies
//! the compensating pass rule:
//!
//! ```text
//! primary  = canopy ≥ min_canopy  OR  disturbance ≥ 1.5 × min_disturbance
//! terrain  = min_slope ≤ slope ≤ max_slope
//! pass     = primary AND terrain AND overall ≥ pass_threshold
//! ```

use crate::config::{CriteriaThresholds, ScoringParams, ScoringWeights, SiteConfig};
use crate::criteria::{
    score_aspect, score_canopy, score_isolation, score_slope, score_thermal, score_wind_protection, Criterion,
    CriterionScore,
};
use crate::snapshot::{EnvironmentalSnapshot, StaticDefaults};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Exceptional isolation that offsets marginal canopy
pub const ISOLATION_COMPENSATION_FACTOR: f64 = 1.5;

/// Outcome of scoring one snapshot against one set of thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityResult {
    /// Validated measurements the scores were computed from
    pub criteria: EnvironmentalSnapshot,
    pub scores: BTreeMap<Criterion, CriterionScore>,
    /// Weighted sum (0-100)
    pub overall_score: f64,
    pub meets_criteria: bool,
    pub primary_criteria_met: bool,
    pub terrain_suitable: bool,
    pub thresholds_used: CriteriaThresholds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl SuitabilityResult {
    pub fn score(&self, criterion: Criterion) -> f64 {
        self.scores.get(&criterion).map(|s| s.score).unwrap_or(0.0)
    }

    pub fn rationale(&self, criterion: Criterion) -> &str {
        self.scores.get(&criterion).map(|s| s.rationale.as_str()).unwrap_or("")
    }
}

/// Stateless scorer parameterised by weights and scoring constants
#[derive(Debug, Clone)]
pub struct SuitabilityEvaluator {
    weights: ScoringWeights,
    params: ScoringParams,
    /// Replacements for non-finite measurements
    defaults: StaticDefaults,
}

impl Default for SuitabilityEvaluator {
    fn default() -> Self {
        Self::new(ScoringWeights::default(), ScoringParams::default())
    }
}

impl SuitabilityEvaluator {
    pub fn new(weights: ScoringWeights, params: ScoringParams) -> Self {
        Self {
            weights,
            params,
            defaults: StaticDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: StaticDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(config.weights.clone(), config.scoring.clone()).with_defaults(config.defaults.clone())
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn evaluate(&self, snapshot: &EnvironmentalSnapshot, thresholds: &CriteriaThresholds) -> SuitabilityResult {
        let snap = snapshot.normalized_with(&self.defaults);
        let params = &self.params;

        let canopy = score_canopy(snap.canopy_coverage, thresholds.min_canopy, params);
        let isolation = score_isolation(snap.disturbance_distance_m, thresholds.min_disturbance_distance_m, params);
        let slope = score_slope(snap.slope_deg, thresholds, params);
        let aspect = score_aspect(&snap, thresholds, params);
        let wind_protection = score_wind_protection(snap.wind_direction_deg, snap.aspect_deg);
        let thermal = score_thermal(snap.temperature, &aspect, params);

        let w = &self.weights;
        let overall_score = (w.canopy * canopy.score
            + w.isolation * isolation.score
            + w.aspect * aspect.score
            + w.slope * slope.score
            + w.wind_protection * wind_protection.score
            + w.thermal * thermal.score)
            .clamp(0.0, 100.0);

        let canopy_ok = snap.canopy_coverage >= thresholds.min_canopy;
        let isolation_exceptional =
            snap.disturbance_distance_m >= ISOLATION_COMPENSATION_FACTOR * thresholds.min_disturbance_distance_m;
        let primary_criteria_met = canopy_ok || isolation_exceptional;
        let terrain_suitable = snap.slope_deg >= thresholds.min_slope_deg && snap.slope_deg <= thresholds.max_slope_deg;
        let score_ok = overall_score >= thresholds.pass_threshold;
        let meets_criteria = primary_criteria_met && terrain_suitable && score_ok;

        let mut reasons = Vec::new();
        if !primary_criteria_met {
            reasons.push(format!(
                "canopy {:.0}% below {:.0}% and disturbance {:.0} m below {:.0} m",
                snap.canopy_coverage * 100.0,
                thresholds.min_canopy * 100.0,
                snap.disturbance_distance_m,
                ISOLATION_COMPENSATION_FACTOR * thresholds.min_disturbance_distance_m
            ));
        }
        if !terrain_suitable {
            reasons.push(format!(
                "slope {:.1}° outside [{:.0}, {:.0}]",
                snap.slope_deg, thresholds.min_slope_deg, thresholds.max_slope_deg
            ));
        }
        if !score_ok {
            reasons.push(format!(
                "overall {:.1} below pass threshold {:.1}",
                overall_score, thresholds.pass_threshold
            ));
        }

        debug!(
            "Evaluated ({:.5}, {:.5}): {:.1} pass={} (canopy={:.0}, iso={:.0}, slope={:.0}, aspect={:.0}, wind={:.0}, thermal={:.0})",
            snap.location.lat,
            snap.location.lon,
            overall_score,
            meets_criteria,
            canopy.score,
            isolation.score,
            slope.score,
            aspect.score,
            wind_protection.score,
            thermal.score
        );

        let scores = BTreeMap::from([
            (Criterion::Canopy, canopy),
            (Criterion::Isolation, isolation),
            (Criterion::Slope, slope),
            (Criterion::Aspect, aspect),
            (Criterion::WindProtection, wind_protection),
            (Criterion::Thermal, thermal),
        ]);

        SuitabilityResult {
            criteria: snap,
            scores,
            overall_score,
            meets_criteria,
            primary_criteria_met,
            terrain_suitable,
            thresholds_used: thresholds.clone(),
            rejection_reason: if reasons.is_empty() { None } else { Some(reasons.join("; ")) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::DataQuality;
    use crate::GeoPoint;

    fn good_snapshot() -> EnvironmentalSnapshot {
        EnvironmentalSnapshot {
            location: GeoPoint::new(45.2, -110.8),
            elevation_m: 1800.0,
            slope_deg: 15.0,
            aspect_deg: 180.0,
            canopy_coverage: 0.8,
            disturbance_distance_m: 500.0,
            wind_direction_deg: 0.0,
            wind_speed: 5.0,
            temperature: 30.0,
            wind_trend: None,
            pressure_trend: None,
            quality: DataQuality::all_primary(),
            adjustments: Vec::new(),
        }
    }

    #[test]
    fn test_configured_defaults_fill_non_finite() {
        let mut config = SiteConfig::default();
        config.defaults.slope_deg = 18.0;
        config.defaults.temperature = 33.0;
        let mut snap = good_snapshot();
        snap.slope_deg = f64::NAN;
        snap.temperature = f64::INFINITY;

        let result = SuitabilityEvaluator::from_config(&config).evaluate(&snap, &CriteriaThresholds::default());
        assert_eq!(result.criteria.slope_deg, 18.0);
        assert_eq!(result.criteria.temperature, 33.0);
        assert_eq!(result.criteria.adjustments.len(), 2);

        let builtin = SuitabilityEvaluator::default().evaluate(&snap, &CriteriaThresholds::default());
        assert_eq!(builtin.criteria.slope_deg, StaticDefaults::default().slope_deg);
    }

    #[test]
    fn test_good_site_passes() {
        let result = SuitabilityEvaluator::default().evaluate(&good_snapshot(), &CriteriaThresholds::default());
        assert!(result.meets_criteria, "{:?}", result.rejection_reason);
        assert!(result.overall_score > 90.0);
        assert!(result.rejection_reason.is_none());
        assert_eq!(result.scores.len(), Criterion::ALL.len());
    }

    #[test]
    fn test_steep_anchor_fails_terrain() {
        let mut snap = good_snapshot();
        snap.slope_deg = 35.0;
        let result = SuitabilityEvaluator::default().evaluate(&snap, &CriteriaThresholds::default());
        assert!(!result.terrain_suitable);
        assert!(!result.meets_criteria);
        assert!(result.rejection_reason.as_deref().unwrap_or("").contains("slope"));
    }

    #[test]
    fn test_isolation_compensates_for_canopy() {
        let thresholds = CriteriaThresholds::default();
        let mut snap = good_snapshot();
        snap.canopy_coverage = 0.5;
        snap.disturbance_distance_m = 310.0;
        let result = SuitabilityEvaluator::default().evaluate(&snap, &thresholds);
        assert!(result.primary_criteria_met);

        snap.disturbance_distance_m = 250.0;
        let result = SuitabilityEvaluator::default().evaluate(&snap, &thresholds);
        assert!(!result.primary_criteria_met);
        assert!(!result.meets_criteria);
    }

    #[test]
    fn test_canopy_does_not_offset_poor_isolation_score() {
        let mut snap = good_snapshot();
        snap.canopy_coverage = 1.0;
        snap.disturbance_distance_m = 10.0;
        let result = SuitabilityEvaluator::default().evaluate(&snap, &CriteriaThresholds::default());
        assert!(result.primary_criteria_met);
        assert!(result.score(Criterion::Isolation) < 20.0);
    }

    #[test]
    fn test_deterministic() {
        let evaluator = SuitabilityEvaluator::default();
        let thresholds = CriteriaThresholds::default();
        let a = evaluator.evaluate(&good_snapshot(), &thresholds);
        let b = evaluator.evaluate(&good_snapshot(), &thresholds);
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_range_input_is_clamped_not_nan() {
        let mut snap = good_snapshot();
        snap.slope_deg = f64::NAN;
        snap.aspect_deg = 720.0;
        snap.canopy_coverage = 3.0;
        let result = SuitabilityEvaluator::default().evaluate(&snap, &CriteriaThresholds::default());
        assert!(result.overall_score.is_finite());
        assert_eq!(result.criteria.canopy_coverage, 1.0);
        assert_eq!(result.criteria.aspect_deg, 0.0);
        assert!(!result.criteria.adjustments.is_empty());
    }

    #[test]
    fn test_lowered_pass_threshold() {
        let mut snap = good_snapshot();
        snap.canopy_coverage = 0.62;
        snap.disturbance_distance_m = 210.0;
        snap.temperature = 60.0;
        snap.aspect_deg = 90.0;
        let strict = CriteriaThresholds {
            pass_threshold: 95.0,
            ..Default::default()
        };
        let relaxed = CriteriaThresholds {
            pass_threshold: 50.0,
            ..Default::default()
        };
        let evaluator = SuitabilityEvaluator::default();
        assert!(!evaluator.evaluate(&snap, &strict).meets_criteria);
        assert!(evaluator.evaluate(&snap, &relaxed).meets_criteria);
    }

    #[test]
    fn test_rationales_present() {
        let result = SuitabilityEvaluator::default().evaluate(&good_snapshot(), &CriteriaThresholds::default());
        for criterion in Criterion::ALL {
            assert!(!result.rationale(criterion).is_empty(), "{:?}", criterion);
        }
    }
}

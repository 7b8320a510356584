//! Criterion scorers
//!
//! Pure functions mapping one measurement plus context to a 0-100 score and a
//! human-readable rationale. No scorer returns NaN or leaves [0, 100].

use crate::config::{CriteriaThresholds, ScoringParams};
use crate::snapshot::EnvironmentalSnapshot;
use crate::{angular_distance, normalize_bearing};
use serde::{Deserialize, Serialize};

/// Slopes in this band get a flat aspect bonus
const IDEAL_SLOPE_BAND: (f64, f64) = (10.0, 25.0);
const IDEAL_SLOPE_BONUS: f64 = 5.0;
/// Aspect penalty per degree beyond `max_slope_deg`, and its cap
const STEEP_PENALTY_PER_DEG: f64 = 2.0;
const STEEP_PENALTY_CAP: f64 = 20.0;
/// Windward-exposed aspects never score above this
const WINDWARD_EXPOSED_SCORE: f64 = 30.0;
/// Bonus for thermal alignment inside the leeward band, or leeward alignment in light wind
const ALIGNMENT_BONUS: f64 = 5.0;
/// Isolation score at zero distance
const ISOLATION_FLOOR: f64 = 10.0;

/// The six scored criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Canopy,
    Isolation,
    Slope,
    Aspect,
    WindProtection,
    Thermal,
}

impl Criterion {
    pub const ALL: [Criterion; 6] = [
        Criterion::Canopy,
        Criterion::Isolation,
        Criterion::Slope,
        Criterion::Aspect,
        Criterion::WindProtection,
        Criterion::Thermal,
    ];
}

/// Score (0-100) with the reason it was given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    pub rationale: String,
}

impl CriterionScore {
    fn new(score: f64, rationale: impl Into<String>) -> Self {
        let score = if score.is_finite() { score.clamp(0.0, 100.0) } else { 0.0 };
        Self {
            score,
            rationale: rationale.into(),
        }
    }
}

/// Canopy cover, proportional below the soft ceiling at `min_canopy × full_credit_ratio`
pub fn score_canopy(coverage: f64, min_canopy: f64, params: &ScoringParams) -> CriterionScore {
    if min_canopy <= 0.0 {
        return CriterionScore::new(100.0, "no canopy requirement");
    }
    let full_credit = min_canopy * params.canopy_full_credit_ratio;
    let score = (coverage / full_credit * 100.0).min(100.0);
    let rationale = if coverage >= full_credit {
        format!("canopy {:.0}% gives full cover", coverage * 100.0)
    } else if coverage >= min_canopy {
        format!(
            "canopy {:.0}% meets the {:.0}% minimum",
            coverage * 100.0,
            min_canopy * 100.0
        )
    } else {
        format!(
            "canopy {:.0}% below the {:.0}% minimum, partial credit",
            coverage * 100.0,
            min_canopy * 100.0
        )
    };
    CriterionScore::new(score, rationale)
}

/// Isolation from disturbance; never zero so other criteria can compensate
pub fn score_isolation(distance_m: f64, min_distance_m: f64, params: &ScoringParams) -> CriterionScore {
    let excellent = params.isolation_excellent_m.max(min_distance_m);
    let below_cap = params.isolation_below_min_cap.max(ISOLATION_FLOOR);

    if distance_m >= excellent {
        return CriterionScore::new(100.0, format!("{:.0} m from disturbance, excellent isolation", distance_m));
    }
    if distance_m >= min_distance_m {
        // 60 at the minimum, 100 at the excellent distance
        let span = excellent - min_distance_m;
        let score = if span > 0.0 {
            60.0 + 40.0 * (distance_m - min_distance_m) / span
        } else {
            100.0
        };
        return CriterionScore::new(
            score,
            format!("{:.0} m from disturbance, adequate isolation", distance_m),
        );
    }
    let score = ISOLATION_FLOOR + (below_cap - ISOLATION_FLOOR) * (distance_m / min_distance_m);
    CriterionScore::new(
        score,
        format!(
            "{:.0} m from disturbance, inside the {:.0} m minimum",
            distance_m, min_distance_m
        ),
    )
}

/// Plateau of 100 across the middle third of [min_slope, max_slope]
pub fn score_slope(slope_deg: f64, thresholds: &CriteriaThresholds, params: &ScoringParams) -> CriterionScore {
    let min = thresholds.min_slope_deg;
    let max = thresholds.max_slope_deg;
    let third = (max - min) / 3.0;
    let ideal_lo = min + third;
    let ideal_hi = max - third;
    let zero_at = max + params.slope_decay_margin_deg;

    let (score, rationale) = if slope_deg >= ideal_lo && slope_deg <= ideal_hi {
        (100.0, format!("{:.1}° slope in the ideal band", slope_deg))
    } else if slope_deg > ideal_hi && slope_deg <= max {
        let t = if max > ideal_hi { (slope_deg - ideal_hi) / (max - ideal_hi) } else { 0.0 };
        (100.0 - 30.0 * t, format!("{:.1}° slope, steep side of acceptable", slope_deg))
    } else if slope_deg > max {
        let t = ((slope_deg - max) / (zero_at - max)).min(1.0);
        (70.0 * (1.0 - t), format!("{:.1}° slope exceeds the {:.0}° maximum", slope_deg, max))
    } else if slope_deg >= min {
        let t = if ideal_lo > min { (slope_deg - min) / (ideal_lo - min) } else { 1.0 };
        (70.0 + 30.0 * t, format!("{:.1}° slope, gentle side of acceptable", slope_deg))
    } else {
        let t = if min > 0.0 { slope_deg / min } else { 0.0 };
        (70.0 * t, format!("{:.1}° slope below the {:.0}° minimum, near flat", slope_deg, min))
    };
    CriterionScore::new(score, rationale)
}

/// Aspect priority state machine: leeward shelter in strong wind, thermal comfort otherwise,
/// then a slope adjustment.
pub fn score_aspect(
    snapshot: &EnvironmentalSnapshot,
    thresholds: &CriteriaThresholds,
    params: &ScoringParams,
) -> CriterionScore {
    let aspect = snapshot.aspect_deg;
    let wind_direction = snapshot.wind_direction_deg;
    let leeward_bearing = normalize_bearing(wind_direction + 180.0);
    let leeward_diff = angular_distance(aspect, leeward_bearing);
    let cold = snapshot.temperature < params.cold_threshold;
    let hot = snapshot.temperature > params.hot_threshold;
    let sun_facing = thresholds.optimal_aspect_range;
    let shade_facing = sun_facing.opposite();

    let mut notes: Vec<String> = Vec::new();
    let mut windward_exposed = false;

    let oriented = if snapshot.wind_speed > params.strong_wind_threshold {
        let base = if leeward_diff <= 30.0 {
            notes.push(format!("leeward shelter, {:.0}° off lee", leeward_diff));
            100.0
        } else if leeward_diff <= 60.0 {
            notes.push(format!("leeward shelter, {:.0}° off lee", leeward_diff));
            90.0
        } else if leeward_diff <= 90.0 {
            notes.push(format!("partial leeward shelter, {:.0}° off lee", leeward_diff));
            75.0
        } else if angular_distance(aspect, wind_direction) <= 45.0 {
            windward_exposed = true;
            notes.push("direct windward exposure".to_string());
            WINDWARD_EXPOSED_SCORE
        } else {
            notes.push("crosswind exposure".to_string());
            50.0
        };
        if leeward_diff <= 60.0 && ((cold && sun_facing.contains(aspect)) || (hot && shade_facing.contains(aspect))) {
            notes.push("thermal bonus".to_string());
            base + ALIGNMENT_BONUS
        } else {
            base
        }
    } else {
        let base = if cold {
            if sun_facing.contains(aspect) {
                notes.push("thermal optimal".to_string());
                100.0
            } else if sun_facing.widened(45.0).contains(aspect) {
                notes.push("thermal acceptable".to_string());
                80.0
            } else {
                notes.push("cold shaded aspect, dense cover needed".to_string());
                50.0
            }
        } else if hot {
            if shade_facing.contains(aspect) {
                notes.push("shade optimal".to_string());
                100.0
            } else if shade_facing.widened(45.0).contains(aspect) {
                notes.push("shade acceptable".to_string());
                80.0
            } else {
                notes.push("hot sun-facing aspect, dense cover needed".to_string());
                50.0
            }
        } else if sun_facing.contains(aspect) {
            notes.push("mild, sun-facing".to_string());
            90.0
        } else {
            notes.push("mild conditions".to_string());
            85.0
        };
        if leeward_diff <= 60.0 {
            notes.push("light wind from behind".to_string());
            base + ALIGNMENT_BONUS
        } else {
            base
        }
    };
    // Bonuses saturate before the slope adjustment
    let mut score = oriented.min(100.0);

    let slope = snapshot.slope_deg;
    if slope > thresholds.max_slope_deg {
        let penalty = (STEEP_PENALTY_PER_DEG * (slope - thresholds.max_slope_deg)).min(STEEP_PENALTY_CAP);
        notes.push(format!("-{:.0} steep slope", penalty));
        score -= penalty;
    } else if slope >= IDEAL_SLOPE_BAND.0 && slope <= IDEAL_SLOPE_BAND.1 {
        notes.push("ideal slope".to_string());
        score += IDEAL_SLOPE_BONUS;
    }
    if windward_exposed {
        score = score.min(WINDWARD_EXPOSED_SCORE);
    }

    CriterionScore::new(score, notes.join("; "))
}

/// Shelter from the wind given where the slope faces
pub fn score_wind_protection(wind_direction_deg: f64, aspect_deg: f64) -> CriterionScore {
    let diff = angular_distance(wind_direction_deg, aspect_deg);
    if diff > 90.0 {
        CriterionScore::new(100.0, format!("slope faces {:.0}° away from the wind, sheltered", diff))
    } else {
        CriterionScore::new(
            50.0 + 50.0 * diff / 90.0,
            format!("slope faces {:.0}° off the wind, exposed", diff),
        )
    }
}

/// Thermal need dominates only in the cold
pub fn score_thermal(temperature: f64, aspect: &CriterionScore, params: &ScoringParams) -> CriterionScore {
    if temperature < params.cold_threshold {
        CriterionScore::new(
            aspect.score,
            format!("{:.0}°F is cold, thermal need follows aspect", temperature),
        )
    } else {
        CriterionScore::new(
            params.mild_thermal_score,
            format!("{:.0}°F, thermal advantage minor", temperature),
        )
    }
}

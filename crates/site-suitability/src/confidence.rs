//! Confidence aggregation
//!
//! `confidence = clamp(base + Σ clamp(bonusᵢ, 0, capᵢ), 0, 1)`
//!
//! Bonuses: accepted-site suitability, canopy and disturbance data quality,
//! weather completeness, short-term front activity.

use crate::config::ConfidenceConfig;
use crate::snapshot::{EnvironmentalSnapshot, Provenance};
use crate::SiteCandidate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub base: f64,
    pub suitability: f64,
    pub canopy_data: f64,
    pub disturbance_data: f64,
    pub weather_data: f64,
    pub front_activity: f64,
    /// Final value in [0, 1]
    pub total: f64,
}

fn provenance_weight(p: Provenance) -> f64 {
    match p {
        Provenance::Primary => 1.0,
        Provenance::Secondary => 0.5,
        Provenance::Default => 0.0,
    }
}

fn capped(value: f64, cap: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, cap.max(0.0))
    } else {
        0.0
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Aggregate confidence for a set of accepted candidates around `anchor`
pub fn aggregate(
    candidates: &[SiteCandidate],
    desired_count: usize,
    anchor: &EnvironmentalSnapshot,
    config: &ConfidenceConfig,
) -> ConfidenceBreakdown {
    let fill_ratio = if desired_count == 0 {
        1.0
    } else {
        (candidates.len() as f64 / desired_count as f64).min(1.0)
    };
    let avg_score = mean(candidates.iter().map(|c| c.suitability.overall_score));
    let suitability = capped(avg_score / 100.0 * config.suitability_cap * fill_ratio, config.suitability_cap);

    // Data quality of what was actually accepted, or of the anchor when nothing was
    let snapshots: Vec<&EnvironmentalSnapshot> = if candidates.is_empty() {
        vec![anchor]
    } else {
        candidates.iter().map(|c| &c.suitability.criteria).collect()
    };
    let canopy_quality = mean(snapshots.iter().map(|s| provenance_weight(s.quality.canopy)));
    let disturbance_quality = mean(snapshots.iter().map(|s| provenance_weight(s.quality.disturbance)));
    let canopy_data = capped(canopy_quality * config.canopy_data_cap, config.canopy_data_cap);
    let disturbance_data = capped(disturbance_quality * config.disturbance_data_cap, config.disturbance_data_cap);

    let trend = anchor.trend();
    let weather_completeness =
        0.5 * provenance_weight(anchor.quality.weather) + if trend.is_some() { 0.5 } else { 0.0 };
    let weather_data = capped(weather_completeness * config.weather_data_cap, config.weather_data_cap);

    let front_activity = capped(
        trend.map(|t| t.front_strength()).unwrap_or(0.0) * config.front_activity_cap,
        config.front_activity_cap,
    );

    let base = capped(config.base, 1.0);
    let total = capped(
        base + suitability + canopy_data + disturbance_data + weather_data + front_activity,
        1.0,
    );

    ConfidenceBreakdown {
        base,
        suitability,
        canopy_data,
        disturbance_data,
        weather_data,
        front_activity,
        total,
    }
}

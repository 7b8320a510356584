//! Site position generator
//!
//! Derives 2-3 variant sites around a qualifying anchor. Bearings follow the
//! wind and terrain:
//!
//! | Role      | Bearing |
//! |-----------|---------|
//! | primary   | leeward (wind + 180), flipped 180° more in the cold |
//! | secondary | crosswind (wind + 90) |
//! | escape    | terrain aspect, or leeward + 45 on near-flat ground |
//!
//! Offset distance grows with slope and wind so variants spread out on steep
//! or exposed terrain. Coordinates come from great-circle forward projection.

use crate::config::{CriteriaThresholds, ScoringParams, SiteConfig, VariantConfig, VariantSnapshots};
use crate::evaluator::{SuitabilityEvaluator, SuitabilityResult};
use crate::provider::SourceChain;
use crate::snapshot::EnvironmentalSnapshot;
use crate::{destination_point, normalize_bearing, GeoPoint, SiteCandidate, SiteRole};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Where a variant will be placed relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantOffset {
    pub role: SiteRole,
    pub bearing_deg: f64,
    pub distance_m: f64,
    pub location: GeoPoint,
}

/// Role bearings for the given conditions
pub fn variant_bearings(snapshot: &EnvironmentalSnapshot, params: &ScoringParams) -> [(SiteRole, f64); 3] {
    let leeward = normalize_bearing(snapshot.wind_direction_deg + 180.0);
    let primary = if snapshot.temperature < params.cold_threshold {
        normalize_bearing(leeward + 180.0)
    } else {
        leeward
    };
    let secondary = normalize_bearing(snapshot.wind_direction_deg + 90.0);
    let escape = if snapshot.slope_deg < params.near_flat_slope_deg {
        normalize_bearing(leeward + 45.0)
    } else {
        normalize_bearing(snapshot.aspect_deg)
    };
    [
        (SiteRole::Primary, primary),
        (SiteRole::Secondary, secondary),
        (SiteRole::Escape, escape),
    ]
}

/// `base × (1 + slope/100) × (1 + wind/50)`
pub fn offset_distance(base_m: f64, slope_deg: f64, wind_speed: f64) -> f64 {
    base_m * (1.0 + slope_deg.max(0.0) / 100.0) * (1.0 + wind_speed.max(0.0) / 50.0)
}

/// Planned offsets around `anchor`; offsets closer than `min_separation_m` to an
/// earlier one are dropped.
pub fn plan_variants(
    anchor: GeoPoint,
    snapshot: &EnvironmentalSnapshot,
    params: &ScoringParams,
    variants: &VariantConfig,
    min_separation_m: f64,
) -> Vec<VariantOffset> {
    let distance_m = offset_distance(variants.base_distance_m, snapshot.slope_deg, snapshot.wind_speed);
    let mut planned: Vec<VariantOffset> = Vec::with_capacity(3);

    for (role, bearing_deg) in variant_bearings(snapshot, params) {
        let location = destination_point(anchor, bearing_deg, distance_m);
        if planned
            .iter()
            .any(|p| p.location.distance_m(&location) < min_separation_m)
        {
            debug!("Dropping {} variant at {:.0}°: too close to another variant", role.label(), bearing_deg);
            continue;
        }
        planned.push(VariantOffset {
            role,
            bearing_deg,
            distance_m,
            location,
        });
    }
    planned
}

/// Builds and evaluates variants against live or approximated snapshots
pub struct PositionGenerator<'a> {
    config: &'a SiteConfig,
    evaluator: &'a SuitabilityEvaluator,
    chain: &'a SourceChain,
}

impl<'a> PositionGenerator<'a> {
    pub fn new(config: &'a SiteConfig, evaluator: &'a SuitabilityEvaluator, chain: &'a SourceChain) -> Self {
        Self {
            config,
            evaluator,
            chain,
        }
    }

    /// Evaluate every planned variant around an evaluated anchor.
    ///
    /// Snapshots not fetched before `deadline` are approximated from the anchor.
    /// Returned candidates are not filtered on `meets_criteria`.
    pub async fn generate_variants(
        &self,
        anchor: &SuitabilityResult,
        thresholds: &CriteriaThresholds,
        search_tier: u32,
        deadline: Instant,
    ) -> Vec<SiteCandidate> {
        let anchor_snapshot = &anchor.criteria;
        let offsets = plan_variants(
            anchor_snapshot.location,
            anchor_snapshot,
            self.evaluator.params(),
            &self.config.variants,
            self.config.search.min_separation_m,
        );

        let mut candidates = Vec::with_capacity(offsets.len());
        for offset in offsets {
            let (snapshot, approximated) = self.snapshot_for(anchor_snapshot, &offset, deadline).await;
            let suitability = self.evaluator.evaluate(&snapshot, thresholds);
            debug!(
                "Variant {} at {:.0}°/{:.0} m: {:.1} pass={}{}",
                offset.role.label(),
                offset.bearing_deg,
                offset.distance_m,
                suitability.overall_score,
                suitability.meets_criteria,
                if approximated { " (approximated)" } else { "" }
            );
            candidates.push(SiteCandidate {
                location: offset.location,
                role: offset.role,
                bearing_deg: offset.bearing_deg,
                distance_m: offset.distance_m,
                suitability,
                search_tier,
                approximated,
            });
        }
        candidates
    }

    async fn snapshot_for(
        &self,
        anchor: &EnvironmentalSnapshot,
        offset: &VariantOffset,
        deadline: Instant,
    ) -> (EnvironmentalSnapshot, bool) {
        if self.config.search.variant_snapshots == VariantSnapshots::Fetch && Instant::now() < deadline {
            if let Ok(Ok(snapshot)) = timeout_at(deadline, self.chain.snapshot(offset.location)).await {
                let trend_provenance = anchor.quality.trend;
                return (snapshot.with_trend(anchor.trend(), trend_provenance), false);
            }
        }
        (anchor.approximate_at(offset.location, offset.bearing_deg), true)
    }
}

//! Fallback search controller
//!
//! ```text
//! AnchorEval ──pass──▶ Accepted ──enough variants──▶ Sufficient
//!     │                    │
//!     └──fail──▶ Searching ◀┘
//!                    │
//!                    ├──desired count reached──▶ Sufficient
//!                    └──tiers / time / cancel──▶ Exhausted
//! ```
//!
//! Tiers are walked nearest first and bearings in fixed clockwise order, so
//! identical inputs give identical sets. Each tier evaluates against thresholds
//! derived with [`relax`]; the base thresholds are never modified. The search is
//! bounded by `max_duration_ms` and can be cancelled between tiers.

use crate::confidence;
use crate::config::{relax, CriteriaThresholds, SiteConfig};
use crate::evaluator::{SuitabilityEvaluator, SuitabilityResult};
use crate::positions::PositionGenerator;
use crate::provider::SourceChain;
use crate::snapshot::{EnvironmentalSnapshot, Provenance};
use crate::{
    destination_point, AspectBucket, ExhaustionReason, GeoPoint, Result, SearchOutcome, SiteCandidate, SiteRole,
    SiteSet, SuitabilityError,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cooperative cancellation flag, checked at tier boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchState {
    AnchorEval,
    Accepted,
    Searching,
    Sufficient,
    Exhausted(ExhaustionReason),
}

impl SearchState {
    fn transition(self, next: SearchState, request_id: &Uuid) -> SearchState {
        debug!("Search {}: {:?} -> {:?}", request_id, self, next);
        next
    }
}

/// Enforces separation and aspect-bucket diversity over accepted sites
struct Acceptor {
    desired: usize,
    min_separation_m: f64,
    accepted: Vec<SiteCandidate>,
    buckets: HashSet<AspectBucket>,
    /// Passing sites skipped only for duplicating a bucket
    reserve: Vec<SiteCandidate>,
}

impl Acceptor {
    fn new(desired: usize, min_separation_m: f64) -> Self {
        Self {
            desired,
            min_separation_m,
            accepted: Vec::new(),
            buckets: HashSet::new(),
            reserve: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.accepted.len() >= self.desired
    }

    fn separated(&self, location: &GeoPoint) -> bool {
        self.accepted
            .iter()
            .all(|c| c.location.distance_m(location) >= self.min_separation_m)
    }

    /// Accept a passing candidate if it keeps the set diverse
    fn offer(&mut self, candidate: SiteCandidate) -> bool {
        if self.is_full() {
            return false;
        }
        if !self.separated(&candidate.location) {
            debug!(
                "Skipping {} at ({:.5}, {:.5}): within {:.0} m of an accepted site",
                candidate.role.label(),
                candidate.location.lat,
                candidate.location.lon,
                self.min_separation_m
            );
            return false;
        }
        let bucket = candidate.aspect_bucket();
        if self.buckets.contains(&bucket) {
            debug!(
                "Deferring {} at ({:.5}, {:.5}): {:?} aspect already represented",
                candidate.role.label(),
                candidate.location.lat,
                candidate.location.lon,
                bucket
            );
            self.reserve.push(candidate);
            return false;
        }
        self.buckets.insert(bucket);
        self.accepted.push(candidate);
        true
    }

    /// Admit deferred candidates that still satisfy separation
    fn fill(&mut self) -> usize {
        let reserve = std::mem::take(&mut self.reserve);
        let mut added = 0;
        for candidate in reserve {
            if self.is_full() {
                break;
            }
            if self.separated(&candidate.location) {
                self.buckets.insert(candidate.aspect_bucket());
                self.accepted.push(candidate);
                added += 1;
            }
        }
        added
    }

    fn into_candidates(self) -> Vec<SiteCandidate> {
        let mut alternative = 0;
        self.accepted
            .into_iter()
            .map(|c| match c.role {
                SiteRole::Alternative(_) => {
                    alternative += 1;
                    SiteCandidate {
                        role: SiteRole::Alternative(alternative),
                        ..c
                    }
                }
                _ => c,
            })
            .collect()
    }
}

/// Counters carried through one search
struct Progress {
    tiers_searched: u32,
    points_evaluated: u32,
}

/// Entry point for evaluation and site search.
///
/// Holds only read-only shared state; concurrent requests need no coordination.
pub struct SiteEngine {
    config: Arc<SiteConfig>,
    chain: Arc<SourceChain>,
    evaluator: SuitabilityEvaluator,
}

impl SiteEngine {
    pub fn new(config: Arc<SiteConfig>, chain: Arc<SourceChain>) -> Self {
        let evaluator = SuitabilityEvaluator::from_config(&config);
        Self {
            config,
            chain,
            evaluator,
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Score a single coordinate
    pub async fn evaluate_site(
        &self,
        lat: f64,
        lon: f64,
        thresholds: Option<&CriteriaThresholds>,
    ) -> Result<SuitabilityResult> {
        let point = GeoPoint::validated(lat, lon)?;
        let thresholds = self.resolve_thresholds(thresholds)?;
        let snapshot = self.chain.snapshot_with_trend(point).await?;
        Ok(self.evaluator.evaluate(&snapshot, &thresholds))
    }

    pub async fn find_site_set(
        &self,
        lat: f64,
        lon: f64,
        desired_count: usize,
        thresholds: Option<&CriteriaThresholds>,
    ) -> Result<SiteSet> {
        self.find_site_set_with_cancel(lat, lon, desired_count, thresholds, &CancelToken::new())
            .await
    }

    /// Find up to `desired_count` diverse sites (0 uses the configured default).
    ///
    /// Only invalid input and a total data outage at the target are errors;
    /// running out of tiers, time or being cancelled yields an exhausted set.
    pub async fn find_site_set_with_cancel(
        &self,
        lat: f64,
        lon: f64,
        desired_count: usize,
        thresholds: Option<&CriteriaThresholds>,
        cancel: &CancelToken,
    ) -> Result<SiteSet> {
        let target = GeoPoint::validated(lat, lon)?;
        let base = self.resolve_thresholds(thresholds)?;
        let desired = if desired_count == 0 {
            self.config.search.default_desired_count
        } else {
            desired_count
        };
        if desired > self.config.search.max_desired_count {
            return Err(SuitabilityError::Configuration(format!(
                "desired_count {} exceeds the maximum of {}",
                desired, self.config.search.max_desired_count
            )));
        }
        let request_id = Uuid::new_v4();
        let deadline = Instant::now() + self.config.search.max_duration();
        info!(
            "Search {} at ({:.5}, {:.5}) for {} sites",
            request_id, target.lat, target.lon, desired
        );

        let mut state = SearchState::AnchorEval;
        let anchor_snapshot = match timeout_at(deadline, self.chain.snapshot(target)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SuitabilityError::DataUnavailable {
                    lat: target.lat,
                    lon: target.lon,
                    reason: "no data before the search time bound".to_string(),
                })
            }
        };
        // Trend is optional; a timeout leaves it unset
        let anchor_snapshot = match timeout_at(deadline, self.chain.weather_trend(target)).await {
            Ok(Some((trend, provenance))) => anchor_snapshot.with_trend(Some(trend), provenance),
            Ok(None) => anchor_snapshot.with_trend(None, Provenance::Default),
            Err(_) => {
                warn!("Search {}: weather trend not available before the time bound", request_id);
                anchor_snapshot.with_trend(None, Provenance::Default)
            }
        };
        let anchor = self.evaluator.evaluate(&anchor_snapshot, &base);
        let generator = PositionGenerator::new(&self.config, &self.evaluator, &self.chain);
        let mut acceptor = Acceptor::new(desired, self.config.search.min_separation_m);
        let mut progress = Progress {
            tiers_searched: 0,
            points_evaluated: 1,
        };

        if anchor.meets_criteria {
            state = state.transition(SearchState::Accepted, &request_id);
            let variants = generator.generate_variants(&anchor, &base, 0, deadline).await;
            progress.points_evaluated += variants.len() as u32;
            for variant in variants.into_iter().filter(|v| v.suitability.meets_criteria) {
                acceptor.offer(variant);
            }
            state = if acceptor.is_full() {
                state.transition(SearchState::Sufficient, &request_id)
            } else {
                info!(
                    "Anchor accepted with {} of {} variants passing; searching for more",
                    acceptor.accepted.len(),
                    desired
                );
                state.transition(SearchState::Searching, &request_id)
            };
        } else {
            info!(
                "Anchor rejected ({:.1}): {}",
                anchor.overall_score,
                anchor.rejection_reason.as_deref().unwrap_or("unknown")
            );
            state = state.transition(SearchState::Searching, &request_id);
        }

        if state == SearchState::Searching {
            let variants_generated = anchor.meets_criteria;
            let next = self
                .search_tiers(
                    target,
                    &anchor_snapshot,
                    &base,
                    &generator,
                    &mut acceptor,
                    &mut progress,
                    variants_generated,
                    deadline,
                    cancel,
                )
                .await;
            state = state.transition(next, &request_id);
        }

        let outcome = match state {
            SearchState::Sufficient => SearchOutcome::Sufficient,
            SearchState::Exhausted(reason) => SearchOutcome::Exhausted { reason },
            other => {
                warn!("Search {} ended in non-terminal state {:?}", request_id, other);
                SearchOutcome::Exhausted {
                    reason: ExhaustionReason::TiersExhausted,
                }
            }
        };

        let candidates = acceptor.into_candidates();
        let primary_rejection_reason = if !anchor.meets_criteria {
            anchor.rejection_reason.clone()
        } else if matches!(outcome, SearchOutcome::Exhausted { .. }) {
            Some(format!(
                "anchor accepted but only {} of {} diverse sites met criteria",
                candidates.len(),
                desired
            ))
        } else {
            None
        };
        let breakdown = confidence::aggregate(&candidates, desired, &anchor.criteria, &self.config.confidence);

        info!(
            "Search {} finished {:?}: {} sites, confidence {:.2}, {} tiers, {} points",
            request_id,
            outcome,
            candidates.len(),
            breakdown.total,
            progress.tiers_searched,
            progress.points_evaluated
        );

        Ok(SiteSet {
            request_id,
            generated_at: chrono::Utc::now().to_rfc3339(),
            target,
            desired_count: desired,
            anchor,
            candidates,
            confidence: breakdown.total,
            confidence_breakdown: breakdown,
            outcome,
            primary_rejection_reason,
            tiers_searched: progress.tiers_searched,
            points_evaluated: progress.points_evaluated,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn search_tiers(
        &self,
        target: GeoPoint,
        anchor_snapshot: &EnvironmentalSnapshot,
        base: &CriteriaThresholds,
        generator: &PositionGenerator<'_>,
        acceptor: &mut Acceptor,
        progress: &mut Progress,
        mut variants_generated: bool,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> SearchState {
        let trend = anchor_snapshot.trend();
        let trend_provenance = anchor_snapshot.quality.trend;
        let mut stopped: Option<ExhaustionReason> = None;

        'tiers: for (tier_no, tier) in self.config.search.ordered_tiers() {
            if cancel.is_cancelled() {
                info!("Search cancelled before tier {}", tier_no);
                stopped = Some(ExhaustionReason::Cancelled);
                break;
            }
            if Instant::now() >= deadline {
                stopped = Some(ExhaustionReason::TimeBudgetSpent);
                break;
            }

            let thresholds = relax(base, tier);
            progress.tiers_searched = tier_no;
            info!(
                "Tier {}: {} bearings at {:.0} m, pass threshold {:.1}, min canopy {:.2}",
                tier_no, tier.bearing_count, tier.distance_m, thresholds.pass_threshold, thresholds.min_canopy
            );

            for bearing in tier.bearings() {
                let point = destination_point(target, bearing, tier.distance_m);
                let snapshot = match timeout_at(deadline, self.chain.snapshot(point)).await {
                    Ok(Ok(snapshot)) => snapshot.with_trend(trend, trend_provenance),
                    Ok(Err(e)) => {
                        debug!("Tier {} bearing {:.0}°: skipped, {}", tier_no, bearing, e);
                        continue;
                    }
                    Err(_) => {
                        warn!("Search time bound reached during tier {}", tier_no);
                        stopped = Some(ExhaustionReason::TimeBudgetSpent);
                        break 'tiers;
                    }
                };
                progress.points_evaluated += 1;

                let suitability = self.evaluator.evaluate(&snapshot, &thresholds);
                if !suitability.meets_criteria {
                    continue;
                }
                let candidate = SiteCandidate {
                    location: point,
                    role: SiteRole::Alternative(0),
                    bearing_deg: bearing,
                    distance_m: tier.distance_m,
                    suitability,
                    search_tier: tier_no,
                    approximated: false,
                };
                let anchor_for_variants = (!variants_generated).then(|| candidate.suitability.clone());
                if !acceptor.offer(candidate) {
                    continue;
                }
                info!(
                    "Tier {} accepted site at {:.0}° ({}/{})",
                    tier_no,
                    bearing,
                    acceptor.accepted.len(),
                    acceptor.desired
                );

                if let Some(fallback_anchor) = anchor_for_variants {
                    variants_generated = true;
                    let variants = generator
                        .generate_variants(&fallback_anchor, &thresholds, tier_no, deadline)
                        .await;
                    progress.points_evaluated += variants.len() as u32;
                    for variant in variants.into_iter().filter(|v| v.suitability.meets_criteria) {
                        acceptor.offer(variant);
                    }
                }
                if acceptor.is_full() {
                    return SearchState::Sufficient;
                }
            }
        }

        let filled = acceptor.fill();
        if filled > 0 {
            info!("Admitted {} sites sharing an aspect bucket to reach the desired count", filled);
        }
        if acceptor.is_full() {
            SearchState::Sufficient
        } else {
            SearchState::Exhausted(stopped.unwrap_or(ExhaustionReason::TiersExhausted))
        }
    }

    fn resolve_thresholds(&self, thresholds: Option<&CriteriaThresholds>) -> Result<CriteriaThresholds> {
        match thresholds {
            Some(t) => {
                t.validate()?;
                Ok(t.clone())
            }
            None => Ok(self.config.thresholds.clone()),
        }
    }
}

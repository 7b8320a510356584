//! End-to-end search behaviour against synthetic landscapes

use futures::future::BoxFuture;
use site_suitability::config::{SiteConfig, VariantSnapshots};
use site_suitability::snapshot::{PressureTrend, Provenance, RawMeasurements, WindTrend};
use site_suitability::{
    normalize_bearing, CancelToken, CriteriaThresholds, EnvironmentSource, ExhaustionReason, GeoPoint, Lookup,
    SearchOutcome, SiteEngine, SourceChain, SuitabilityError, Unavailable, WeatherTrend,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TARGET: GeoPoint = GeoPoint { lat: 45.3, lon: -110.7 };

fn initial_bearing(from: GeoPoint, to: GeoPoint) -> f64 {
    let (phi1, phi2) = (from.lat.to_radians(), to.lat.to_radians());
    let dlon = (to.lon - from.lon).to_radians();
    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

/// Synthetic terrain: steep ground within `core_radius_m` of the target, a
/// uniform slope elsewhere, each slope facing away from the target.
struct Landscape {
    core_radius_m: f64,
    core_slope: f64,
    outer_slope: f64,
    canopy: f64,
    disturbance_m: f64,
    /// Delay applied to every point outside the core
    outer_delay: Option<Duration>,
    /// Trend calls sleep this long and then fail transiently
    stalled_trend: Option<Duration>,
}

impl Landscape {
    fn new(core_slope: f64, outer_slope: f64) -> Self {
        Self {
            core_radius_m: 5.0,
            core_slope,
            outer_slope,
            canopy: 0.8,
            disturbance_m: 500.0,
            outer_delay: None,
            stalled_trend: None,
        }
    }
}

impl EnvironmentSource for Landscape {
    fn name(&self) -> &str {
        "landscape"
    }

    fn measurements(&self, point: GeoPoint) -> BoxFuture<'_, Lookup<RawMeasurements>> {
        Box::pin(async move {
            let distance = TARGET.distance_m(&point);
            let in_core = distance < self.core_radius_m;
            if !in_core {
                if let Some(delay) = self.outer_delay {
                    tokio::time::sleep(delay).await;
                }
            }
            Lookup::Found(RawMeasurements {
                elevation_m: Some(1800.0),
                slope_deg: Some(if in_core { self.core_slope } else { self.outer_slope }),
                aspect_deg: Some(if in_core { 180.0 } else { initial_bearing(TARGET, point) }),
                canopy_coverage: Some(self.canopy),
                disturbance_distance_m: Some(self.disturbance_m),
                wind_direction_deg: Some(0.0),
                wind_speed: Some(5.0),
                temperature: Some(50.0),
            })
        })
    }

    fn weather_trend(&self, _point: GeoPoint) -> BoxFuture<'_, Lookup<WeatherTrend>> {
        Box::pin(async move {
            if let Some(delay) = self.stalled_trend {
                tokio::time::sleep(delay).await;
                return Lookup::Unavailable(Unavailable::transient("trend service stalled"));
            }
            Lookup::Found(WeatherTrend {
                wind: WindTrend {
                    direction_shift_deg: 10.0,
                    speed_change: 1.0,
                },
                pressure: PressureTrend::Stable,
            })
        })
    }
}

struct Outage;

impl EnvironmentSource for Outage {
    fn name(&self) -> &str {
        "outage"
    }

    fn measurements(&self, _point: GeoPoint) -> BoxFuture<'_, Lookup<RawMeasurements>> {
        Box::pin(async { Lookup::Unavailable(Unavailable::permanent("service offline")) })
    }
}

fn engine_with(config: SiteConfig, landscape: Landscape) -> SiteEngine {
    let chain = SourceChain::from_config(&config).with_source(landscape);
    SiteEngine::new(Arc::new(config), Arc::new(chain))
}

#[tokio::test]
async fn anchor_fails_fallback_succeeds() {
    let engine = engine_with(SiteConfig::default(), Landscape::new(35.0, 15.0));

    let set = engine.find_site_set(TARGET.lat, TARGET.lon, 3, None).await.unwrap();

    assert!(!set.anchor.meets_criteria);
    assert!(!set.anchor.terrain_suitable);
    assert!(set.primary_rejection_reason.as_deref().unwrap_or("").contains("slope"));
    assert!(!set.candidates.is_empty());
    assert!(set.candidates.iter().any(|c| c.search_tier >= 1));
    assert_eq!(set.outcome, SearchOutcome::Sufficient);
    assert!((0.0..=1.0).contains(&set.confidence));
}

#[tokio::test]
async fn search_terminates_when_nothing_passes() {
    let config = SiteConfig::default();
    let expected_points: u32 = 1 + config.search.tiers.iter().map(|t| t.bearing_count).sum::<u32>();
    let engine = engine_with(config, Landscape::new(60.0, 60.0));

    let set = engine.find_site_set(TARGET.lat, TARGET.lon, 3, None).await.unwrap();

    assert!(set.candidates.is_empty());
    assert_eq!(
        set.outcome,
        SearchOutcome::Exhausted {
            reason: ExhaustionReason::TiersExhausted
        }
    );
    assert_eq!(set.tiers_searched, 4);
    assert_eq!(set.points_evaluated, expected_points);
    assert!(set.primary_rejection_reason.is_some());
    assert_eq!(set.confidence_breakdown.suitability, 0.0);
}

#[tokio::test]
async fn accepted_sites_are_separated() {
    let config = SiteConfig::default();
    let min_separation = config.search.min_separation_m;
    let engine = engine_with(config, Landscape::new(35.0, 15.0));

    for desired in [2, 3, 5] {
        let set = engine.find_site_set(TARGET.lat, TARGET.lon, desired, None).await.unwrap();
        assert!(set.candidates.len() <= desired);
        if let Some(min) = set.min_pairwise_separation_m() {
            assert!(min >= min_separation, "desired {} gave separation {}", desired, min);
        }
    }
}

#[tokio::test]
async fn passing_anchor_yields_variants() {
    let engine = engine_with(SiteConfig::default(), Landscape::new(15.0, 15.0));

    let set = engine.find_site_set(TARGET.lat, TARGET.lon, 2, None).await.unwrap();

    assert!(set.anchor.meets_criteria);
    assert!(set.primary_rejection_reason.is_none());
    assert_eq!(set.candidates.len(), 2);
    assert!(set.candidates.iter().all(|c| c.search_tier == 0));
    assert!(set.candidates.iter().all(|c| !c.approximated));
}

#[tokio::test]
async fn approximate_variant_mode() {
    let mut config = SiteConfig::default();
    config.search.variant_snapshots = VariantSnapshots::Approximate;
    let engine = engine_with(config, Landscape::new(15.0, 15.0));

    let set = engine.find_site_set(TARGET.lat, TARGET.lon, 2, None).await.unwrap();

    let variants: Vec<_> = set.candidates.iter().filter(|c| c.search_tier == 0).collect();
    assert!(!variants.is_empty());
    assert!(variants.iter().all(|c| c.approximated));
}

#[tokio::test]
async fn cancelled_search_stops_at_tier_boundary() {
    let engine = engine_with(SiteConfig::default(), Landscape::new(35.0, 15.0));
    let token = CancelToken::new();
    token.cancel();

    let set = engine
        .find_site_set_with_cancel(TARGET.lat, TARGET.lon, 3, None, &token)
        .await
        .unwrap();

    assert_eq!(
        set.outcome,
        SearchOutcome::Exhausted {
            reason: ExhaustionReason::Cancelled
        }
    );
    assert_eq!(set.tiers_searched, 0);
    assert_eq!(set.points_evaluated, 1);
}

#[tokio::test]
async fn slow_source_bounded_by_time_budget() {
    let mut config = SiteConfig::default();
    config.search.max_duration_ms = 300;
    let mut landscape = Landscape::new(35.0, 60.0);
    landscape.outer_delay = Some(Duration::from_millis(120));
    let engine = engine_with(config, landscape);

    let started = Instant::now();
    let set = engine.find_site_set(TARGET.lat, TARGET.lon, 3, None).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        set.outcome,
        SearchOutcome::Exhausted {
            reason: ExhaustionReason::TimeBudgetSpent
        }
    );
    assert!(set.points_evaluated < 10);
}

#[tokio::test]
async fn stalled_trend_degrades_instead_of_failing() {
    let mut config = SiteConfig::default();
    config.search.max_duration_ms = 400;
    config.retry.call_timeout_ms = 200;
    config.retry.max_attempts = 3;
    config.retry.initial_backoff_ms = 10;
    let mut landscape = Landscape::new(35.0, 15.0);
    landscape.stalled_trend = Some(Duration::from_millis(150));
    let engine = engine_with(config, landscape);

    let started = Instant::now();
    let set = engine.find_site_set(TARGET.lat, TARGET.lon, 3, None).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(set.anchor.criteria.quality.trend, Provenance::Default);
    assert!(set.anchor.criteria.pressure_trend.is_none());
    assert_eq!(set.confidence_breakdown.front_activity, 0.0);
    assert!(matches!(set.outcome, SearchOutcome::Exhausted { .. }));
}

#[tokio::test]
async fn oversized_desired_count_rejected() {
    let engine = engine_with(SiteConfig::default(), Landscape::new(35.0, 15.0));

    for desired in [usize::MAX, 1_000_000_000, 51] {
        assert!(matches!(
            engine.find_site_set(TARGET.lat, TARGET.lon, desired, None).await,
            Err(SuitabilityError::Configuration(_))
        ));
    }
    let set = engine.find_site_set(TARGET.lat, TARGET.lon, 50, None).await.unwrap();
    assert_eq!(set.desired_count, 50);
}

#[tokio::test]
async fn identical_inputs_identical_sets() {
    let engine = engine_with(SiteConfig::default(), Landscape::new(35.0, 15.0));

    let a = engine.find_site_set(TARGET.lat, TARGET.lon, 3, None).await.unwrap();
    let b = engine.find_site_set(TARGET.lat, TARGET.lon, 3, None).await.unwrap();

    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.candidates.len(), b.candidates.len());
    for (x, y) in a.candidates.iter().zip(&b.candidates) {
        assert_eq!(x.location, y.location);
        assert_eq!(x.role, y.role);
        assert_eq!(x.suitability, y.suitability);
    }
    assert_eq!(a.confidence, b.confidence);
    assert_eq!(a.outcome, b.outcome);
}

#[tokio::test]
async fn total_outage_is_an_error() {
    let config = SiteConfig::default();
    let chain = SourceChain::from_config(&config).with_source(Outage);
    let engine = SiteEngine::new(Arc::new(config), Arc::new(chain));

    let err = engine.find_site_set(TARGET.lat, TARGET.lon, 3, None).await.unwrap_err();
    assert!(matches!(err, SuitabilityError::DataUnavailable { .. }));
}

#[tokio::test]
async fn caller_thresholds_respected() {
    let engine = engine_with(SiteConfig::default(), Landscape::new(15.0, 15.0));

    let strict = CriteriaThresholds {
        min_canopy: 0.95,
        min_disturbance_distance_m: 1_000.0,
        ..Default::default()
    };
    let result = engine.evaluate_site(TARGET.lat, TARGET.lon, Some(&strict)).await.unwrap();
    assert!(!result.primary_criteria_met);
    assert_eq!(result.thresholds_used, strict);

    let invalid = CriteriaThresholds {
        min_slope_deg: 40.0,
        max_slope_deg: 10.0,
        ..Default::default()
    };
    assert!(matches!(
        engine.evaluate_site(TARGET.lat, TARGET.lon, Some(&invalid)).await,
        Err(SuitabilityError::Configuration(_))
    ));
}

#[tokio::test]
async fn invalid_target_rejected() {
    let engine = engine_with(SiteConfig::default(), Landscape::new(15.0, 15.0));
    assert!(matches!(
        engine.find_site_set(95.0, 0.0, 3, None).await,
        Err(SuitabilityError::InvalidMeasurement { field: "lat", .. })
    ));
}

#[tokio::test]
async fn concurrent_requests_share_engine() {
    let engine = Arc::new(engine_with(SiteConfig::default(), Landscape::new(35.0, 15.0)));

    let (a, b) = tokio::join!(
        engine.find_site_set(TARGET.lat, TARGET.lon, 3, None),
        engine.find_site_set(TARGET.lat, TARGET.lon, 2, None)
    );
    assert_eq!(a.unwrap().desired_count, 3);
    assert_eq!(b.unwrap().desired_count, 2);
}

//! Environmental snapshot provider chain
//!
//! Sources are explicitly constructed and injected; nothing here is global.
//! Absence of data is an ordinary [`Lookup::Unavailable`] value, not an error.
//! The chain walks sources in order (primary, then secondary computation
//! methods), merges their fields, and fills whatever is still missing from
//! [`StaticDefaults`], so the evaluator always receives a complete snapshot.
//!
//! Every call is bounded by a timeout and retried with exponential backoff when
//! the source reports a transient failure.

use crate::config::{RetryPolicy, SiteConfig};
use crate::snapshot::{EnvironmentalSnapshot, FieldSources, Provenance, RawMeasurements, StaticDefaults, WeatherTrend};
use crate::{GeoPoint, Result, SuitabilityError};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Why a source had nothing for a request
#[derive(Debug, Clone, PartialEq)]
pub struct Unavailable {
    pub reason: String,
    /// Worth retrying (timeouts, rate limits, 5xx)
    pub transient: bool,
}

impl Unavailable {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            transient: true,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            transient: false,
        }
    }
}

/// Result of asking one source for one value
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Unavailable(Unavailable),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(v) => Lookup::Found(f(v)),
            Self::Unavailable(u) => Lookup::Unavailable(u),
        }
    }
}

/// A provider of raw environmental measurements
pub trait EnvironmentSource: Send + Sync {
    fn name(&self) -> &str;

    /// Point-in-time measurements; any subset of fields may be present
    fn measurements(&self, point: GeoPoint) -> BoxFuture<'_, Lookup<RawMeasurements>>;

    /// Short-horizon (≤48h) wind and pressure trend
    fn weather_trend(&self, _point: GeoPoint) -> BoxFuture<'_, Lookup<WeatherTrend>> {
        Box::pin(futures::future::ready(Lookup::Unavailable(Unavailable::permanent(
            "weather trend not provided",
        ))))
    }

    /// Release held resources (connections, caches)
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(futures::future::ready(()))
    }
}

/// Ordered fallback chain: primary source, secondary sources, static defaults
pub struct SourceChain {
    sources: Vec<Arc<dyn EnvironmentSource>>,
    retry: RetryPolicy,
    defaults: StaticDefaults,
}

impl SourceChain {
    pub fn new(retry: RetryPolicy, defaults: StaticDefaults) -> Self {
        Self {
            sources: Vec::new(),
            retry,
            defaults,
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        Self::new(config.retry.clone(), config.defaults.clone())
    }

    /// Append a source; the first one added is the primary
    pub fn with_source<S: EnvironmentSource + 'static>(self, source: S) -> Self {
        self.with_shared_source(Arc::new(source))
    }

    pub fn with_shared_source(mut self, source: Arc<dyn EnvironmentSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn defaults(&self) -> &StaticDefaults {
        &self.defaults
    }

    /// Complete snapshot for `point`, degraded to defaults where sources are silent.
    ///
    /// Fails with [`SuitabilityError::DataUnavailable`] only when no source
    /// returned anything at all.
    pub async fn snapshot(&self, point: GeoPoint) -> Result<EnvironmentalSnapshot> {
        let mut merged = RawMeasurements::default();
        let mut fields = FieldSources::default();
        let mut failures: Vec<String> = Vec::new();
        let mut any_data = false;

        for (i, source) in self.sources.iter().enumerate() {
            if merged.is_complete() {
                break;
            }
            let provenance = if i == 0 { Provenance::Primary } else { Provenance::Secondary };
            match self
                .with_retry(source.name(), "measurements", || source.measurements(point))
                .await
            {
                Lookup::Found(raw) => {
                    if !raw.is_empty() {
                        any_data = true;
                    }
                    merged.fill_from(&raw, provenance, &mut fields);
                }
                Lookup::Unavailable(u) => failures.push(format!("{}: {}", source.name(), u.reason)),
            }
        }

        if !any_data {
            let reason = if failures.is_empty() {
                "no environmental sources configured".to_string()
            } else {
                failures.join("; ")
            };
            return Err(SuitabilityError::DataUnavailable {
                lat: point.lat,
                lon: point.lon,
                reason,
            });
        }
        if !merged.is_complete() {
            debug!(
                "Snapshot at ({:.5}, {:.5}) incomplete after {} sources; filling from defaults",
                point.lat,
                point.lon,
                self.sources.len()
            );
        }

        Ok(EnvironmentalSnapshot::from_measurements(point, &merged, &fields, &self.defaults))
    }

    /// First trend any source can supply, with its provenance
    pub async fn weather_trend(&self, point: GeoPoint) -> Option<(WeatherTrend, Provenance)> {
        for (i, source) in self.sources.iter().enumerate() {
            let provenance = if i == 0 { Provenance::Primary } else { Provenance::Secondary };
            if let Lookup::Found(trend) = self
                .with_retry(source.name(), "weather_trend", || source.weather_trend(point))
                .await
            {
                return Some((trend, provenance));
            }
        }
        None
    }

    /// Snapshot with the weather trend attached
    pub async fn snapshot_with_trend(&self, point: GeoPoint) -> Result<EnvironmentalSnapshot> {
        let snapshot = self.snapshot(point).await?;
        Ok(match self.weather_trend(point).await {
            Some((trend, provenance)) => snapshot.with_trend(Some(trend), provenance),
            None => snapshot.with_trend(None, Provenance::Default),
        })
    }

    pub async fn close(&self) {
        for source in &self.sources {
            source.close().await;
        }
        info!("Closed {} environmental sources", self.sources.len());
    }

    async fn with_retry<'s, T, F>(&self, source: &str, what: &'static str, mut call: F) -> Lookup<T>
    where
        F: FnMut() -> BoxFuture<'s, Lookup<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match timeout(self.retry.call_timeout(), call()).await {
                Ok(lookup) => lookup,
                Err(_) => Lookup::Unavailable(Unavailable::transient(format!(
                    "timed out after {} ms",
                    self.retry.call_timeout_ms
                ))),
            };

            match outcome {
                Lookup::Found(value) => return Lookup::Found(value),
                Lookup::Unavailable(u) if u.transient && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "{} {} attempt {}/{} failed: {}; retrying in {:?}",
                        source, what, attempt, max_attempts, u.reason, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Lookup::Unavailable(u) => {
                    warn!("{} {} unavailable: {}", source, what, u.reason);
                    return Lookup::Unavailable(u);
                }
            }
        }
    }
}

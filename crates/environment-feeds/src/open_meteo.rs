//! Open-Meteo weather and elevation source
//!
//! Uses Open-Meteo (free, no API key) for:
//! - current temperature (°F), wind speed (mph) and wind direction
//! - 48 h hourly wind and sea-level pressure, summarised into a trend
//! - elevation at a 3×3 stencil, reduced to slope and aspect
//!
//! # Usage
//!
//! ```rust,ignore
//! let source = OpenMeteoSource::new(OpenMeteoConfig::default())?;
//! let chain = SourceChain::from_config(&config).with_source(source);
//! ```

use crate::terrain::{horn_terrain, ElevationStencil, TerrainDerivation};
use crate::trend::{summarize_trend, HourlySeries, TREND_HORIZON_H};
use crate::{FeedError, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use site_suitability::{EnvironmentSource, GeoPoint, Lookup, RawMeasurements, Unavailable, WeatherTrend};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

const SERVICE: &str = "Open-Meteo";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMeteoConfig {
    pub forecast_url: String,
    pub elevation_url: String,
    /// Cache TTL in seconds (default: 300 = 5 minutes)
    pub cache_ttl_sec: u64,
    /// Request timeout in seconds
    pub timeout_sec: u64,
    /// Spacing of the elevation stencil (m)
    pub stencil_cell_m: f64,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            elevation_url: "https://api.open-meteo.com/v1/elevation".to_string(),
            cache_ttl_sec: 300,
            timeout_sec: 10,
            stencil_cell_m: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ForecastResponse {
    current: CurrentBlock,
    #[serde(default)]
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Clone, Deserialize)]
struct CurrentBlock {
    #[serde(default)]
    temperature_2m: Option<f64>,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
    #[serde(default)]
    wind_direction_10m: Option<f64>,
}

/// Open-Meteo reports gaps as `null`
#[derive(Debug, Clone, Deserialize)]
struct HourlyBlock {
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    wind_direction_10m: Vec<Option<f64>>,
    #[serde(default)]
    pressure_msl: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Vec<f64>,
}

impl ForecastResponse {
    fn measurements(&self) -> RawMeasurements {
        RawMeasurements {
            temperature: self.current.temperature_2m,
            wind_speed: self.current.wind_speed_10m,
            wind_direction_deg: self.current.wind_direction_10m,
            ..Default::default()
        }
    }

    fn hourly_series(&self) -> Option<HourlySeries> {
        let hourly = self.hourly.as_ref()?;
        let values = |v: &[Option<f64>]| v.iter().map(|x| x.unwrap_or(f64::NAN)).collect::<Vec<f64>>();
        Some(HourlySeries {
            wind_direction_deg: values(&hourly.wind_direction_10m),
            wind_speed: values(&hourly.wind_speed_10m),
            pressure_hpa: values(&hourly.pressure_msl),
        })
    }
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Insert after dropping expired entries so the cache only holds live keys
fn insert_pruned<T>(cache: &mut HashMap<String, CacheEntry<T>>, key: String, value: T, ttl: Duration) {
    let now = Instant::now();
    cache.retain(|_, entry| entry.expires_at > now);
    cache.insert(
        key,
        CacheEntry {
            value,
            expires_at: now + ttl,
        },
    );
}

/// Weather is shared across ~1 km cells; terrain is per point
fn weather_key(point: GeoPoint) -> String {
    format!("{:.2},{:.2}", point.lat, point.lon)
}

fn terrain_key(point: GeoPoint) -> String {
    format!("{:.5},{:.5}", point.lat, point.lon)
}

fn forecast_url(base: &str, point: GeoPoint) -> String {
    format!(
        "{}?latitude={:.6}&longitude={:.6}&current=temperature_2m,wind_speed_10m,wind_direction_10m&hourly=wind_speed_10m,wind_direction_10m,pressure_msl&forecast_hours={}&temperature_unit=fahrenheit&wind_speed_unit=mph&timezone=UTC",
        base, point.lat, point.lon, TREND_HORIZON_H
    )
}

fn elevation_url(base: &str, points: &[GeoPoint]) -> String {
    let lats: Vec<String> = points.iter().map(|p| format!("{:.6}", p.lat)).collect();
    let lons: Vec<String> = points.iter().map(|p| format!("{:.6}", p.lon)).collect();
    format!("{}?latitude={}&longitude={}", base, lats.join(","), lons.join(","))
}

/// Live Open-Meteo client with TTL caches
pub struct OpenMeteoSource {
    config: OpenMeteoConfig,
    client: reqwest::Client,
    forecasts: RwLock<HashMap<String, CacheEntry<ForecastResponse>>>,
    terrain: RwLock<HashMap<String, CacheEntry<TerrainDerivation>>>,
}

impl OpenMeteoSource {
    pub fn new(config: OpenMeteoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .map_err(|e| FeedError::Request(e.to_string()))?;

        Ok(Self {
            config,
            client,
            forecasts: RwLock::new(HashMap::new()),
            terrain: RwLock::new(HashMap::new()),
        })
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_sec)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| FeedError::Parse(e.to_string()))
    }

    async fn forecast(&self, point: GeoPoint) -> Result<ForecastResponse> {
        let key = weather_key(point);
        {
            let cache = self.forecasts.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.value.clone());
                }
            }
        }

        let forecast: ForecastResponse = self.get_json(&forecast_url(&self.config.forecast_url, point)).await?;
        debug!("Fetched forecast for {}", key);

        let mut cache = self.forecasts.write().await;
        insert_pruned(&mut cache, key, forecast.clone(), self.ttl());
        Ok(forecast)
    }

    /// Slope and aspect at `point` from a 3×3 elevation stencil
    pub async fn terrain(&self, point: GeoPoint) -> Result<TerrainDerivation> {
        let key = terrain_key(point);
        {
            let cache = self.terrain.read().await;
            if let Some(entry) = cache.get(&key) {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.value);
                }
            }
        }

        let points = ElevationStencil::sample_points(point, self.config.stencil_cell_m);
        let response: ElevationResponse = self.get_json(&elevation_url(&self.config.elevation_url, &points)).await?;
        let stencil = ElevationStencil::from_row_major(&response.elevation, self.config.stencil_cell_m).ok_or_else(
            || FeedError::Parse(format!("expected 9 elevations, got {}", response.elevation.len())),
        )?;
        let derivation = horn_terrain(&stencil)
            .ok_or_else(|| FeedError::Insufficient("elevation stencil has missing values".to_string()))?;

        let mut cache = self.terrain.write().await;
        insert_pruned(&mut cache, key, derivation, self.ttl());
        Ok(derivation)
    }

    /// Cached entries (total, unexpired)
    pub async fn cache_stats(&self) -> (usize, usize) {
        let now = Instant::now();
        let forecasts = self.forecasts.read().await;
        let terrain = self.terrain.read().await;
        let total = forecasts.len() + terrain.len();
        let valid = forecasts.values().filter(|e| e.expires_at > now).count()
            + terrain.values().filter(|e| e.expires_at > now).count();
        (total, valid)
    }

    pub async fn clear_cache(&self) {
        self.forecasts.write().await.clear();
        self.terrain.write().await.clear();
    }

    async fn lookup(&self, point: GeoPoint) -> Lookup<RawMeasurements> {
        let (forecast, terrain) = futures::join!(self.forecast(point), self.terrain(point));

        let mut raw = RawMeasurements::default();
        let mut failures = Vec::new();
        let mut transient = false;

        match forecast {
            Ok(f) => raw = f.measurements(),
            Err(e) => {
                transient |= e.is_transient();
                failures.push(format!("forecast: {}", e));
            }
        }
        match terrain {
            Ok(t) => {
                raw.elevation_m = Some(t.elevation_m);
                raw.slope_deg = Some(t.slope_deg);
                raw.aspect_deg = t.aspect_deg;
            }
            Err(e) => {
                transient |= e.is_transient();
                failures.push(format!("terrain: {}", e));
            }
        }

        if raw.is_empty() {
            let reason = failures.join("; ");
            return Lookup::Unavailable(if transient {
                Unavailable::transient(reason)
            } else {
                Unavailable::permanent(reason)
            });
        }
        if !failures.is_empty() {
            debug!("Partial Open-Meteo data at ({:.5}, {:.5}): {}", point.lat, point.lon, failures.join("; "));
        }
        Lookup::Found(raw)
    }

    async fn trend(&self, point: GeoPoint) -> Lookup<WeatherTrend> {
        let forecast = match self.forecast(point).await {
            Ok(f) => f,
            Err(e) => return Lookup::Unavailable(e.into()),
        };
        let Some(series) = forecast.hourly_series() else {
            return Lookup::Unavailable(Unavailable::permanent("forecast has no hourly block"));
        };
        match summarize_trend(&series) {
            Ok(trend) => Lookup::Found(trend),
            Err(e) => Lookup::Unavailable(e.into()),
        }
    }
}

impl EnvironmentSource for OpenMeteoSource {
    fn name(&self) -> &str {
        "open-meteo"
    }

    fn measurements(&self, point: GeoPoint) -> BoxFuture<'_, Lookup<RawMeasurements>> {
        Box::pin(self.lookup(point))
    }

    fn weather_trend(&self, point: GeoPoint) -> BoxFuture<'_, Lookup<WeatherTrend>> {
        Box::pin(self.trend(point))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let (total, _) = self.cache_stats().await;
            self.clear_cache().await;
            info!("Open-Meteo source closed, dropped {} cached entries", total);
        })
    }
}

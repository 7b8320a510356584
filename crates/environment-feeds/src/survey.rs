//! Field survey layer: canopy samples and disturbance features
//!
//! ```json
//! {
//!   "canopy_samples": [{"lat": 45.30, "lon": -110.70, "coverage": 0.72}],
//!   "disturbance_features": [{"lat": 45.31, "lon": -110.69, "kind": "road"}]
//! }
//! ```

use crate::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use site_suitability::{EnvironmentSource, GeoPoint, Lookup, RawMeasurements, Unavailable};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Canopy samples further than this from a query point are ignored (m)
pub const DEFAULT_CANOPY_RADIUS_M: f64 = 150.0;

fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && lat.is_finite()
}

fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && lon.is_finite()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanopySample {
    pub lat: f64,
    pub lon: f64,
    /// Fraction 0-1
    pub coverage: f64,
}

/// Road, structure, trailhead or other source of human disturbance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceFeature {
    pub lat: f64,
    pub lon: f64,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyData {
    pub canopy_samples: Vec<CanopySample>,
    pub disturbance_features: Vec<DisturbanceFeature>,
}

#[derive(Debug, Deserialize)]
struct RawCanopySample {
    lat: Option<f64>,
    lon: Option<f64>,
    coverage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawDisturbanceFeature {
    lat: Option<f64>,
    lon: Option<f64>,
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSurvey {
    #[serde(default)]
    canopy_samples: Vec<RawCanopySample>,
    #[serde(default)]
    disturbance_features: Vec<RawDisturbanceFeature>,
}

fn valid_point(lat: Option<f64>, lon: Option<f64>) -> Option<(f64, f64)> {
    match (lat, lon) {
        (Some(lat), Some(lon)) if is_valid_latitude(lat) && is_valid_longitude(lon) => Some((lat, lon)),
        _ => None,
    }
}

impl SurveyData {
    /// Load a survey file, skipping entries with missing or invalid values
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading survey from {:?}", path);

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let raw: RawSurvey = serde_json::from_reader(reader)?;

        let mut skipped = 0;
        let mut canopy_samples = Vec::with_capacity(raw.canopy_samples.len());
        for sample in raw.canopy_samples {
            match (valid_point(sample.lat, sample.lon), sample.coverage) {
                (Some((lat, lon)), Some(coverage)) if (0.0..=1.0).contains(&coverage) => {
                    canopy_samples.push(CanopySample { lat, lon, coverage })
                }
                _ => skipped += 1,
            }
        }

        let mut disturbance_features = Vec::with_capacity(raw.disturbance_features.len());
        for feature in raw.disturbance_features {
            match valid_point(feature.lat, feature.lon) {
                Some((lat, lon)) => disturbance_features.push(DisturbanceFeature {
                    lat,
                    lon,
                    kind: feature.kind.unwrap_or_else(|| "unknown".to_string()),
                }),
                None => skipped += 1,
            }
        }

        info!(
            "Loaded {} canopy samples and {} disturbance features ({} skipped for invalid values)",
            canopy_samples.len(),
            disturbance_features.len(),
            skipped
        );

        Ok(Self {
            canopy_samples,
            disturbance_features,
        })
    }

    /// Coverage of the nearest sample within `radius_m`
    pub fn canopy_at(&self, point: GeoPoint, radius_m: f64) -> Option<f64> {
        self.canopy_samples
            .iter()
            .map(|s| (point.distance_m(&GeoPoint::new(s.lat, s.lon)), s.coverage))
            .filter(|(d, _)| *d <= radius_m)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, coverage)| coverage)
    }

    /// Distance to the nearest disturbance feature, with its kind
    pub fn nearest_disturbance(&self, point: GeoPoint) -> Option<(f64, &str)> {
        self.disturbance_features
            .iter()
            .map(|f| (point.distance_m(&GeoPoint::new(f.lat, f.lon)), f.kind.as_str()))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

/// Canopy and disturbance measurements from a loaded survey
pub struct SurveySource {
    data: SurveyData,
    canopy_radius_m: f64,
}

impl SurveySource {
    pub fn new(data: SurveyData) -> Self {
        Self {
            data,
            canopy_radius_m: DEFAULT_CANOPY_RADIUS_M,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(SurveyData::load(path)?))
    }

    pub fn with_canopy_radius(mut self, radius_m: f64) -> Self {
        self.canopy_radius_m = radius_m;
        self
    }

    fn lookup(&self, point: GeoPoint) -> Lookup<RawMeasurements> {
        let canopy = self.data.canopy_at(point, self.canopy_radius_m);
        let disturbance = self.data.nearest_disturbance(point);
        if canopy.is_none() && disturbance.is_none() {
            return Lookup::Unavailable(Unavailable::permanent(format!(
                "no survey coverage at ({:.5}, {:.5})",
                point.lat, point.lon
            )));
        }
        if let Some((distance, kind)) = disturbance {
            debug!("Nearest disturbance to ({:.5}, {:.5}): {} at {:.0} m", point.lat, point.lon, kind, distance);
        }
        Lookup::Found(RawMeasurements {
            canopy_coverage: canopy,
            disturbance_distance_m: disturbance.map(|(d, _)| d),
            ..Default::default()
        })
    }
}

impl EnvironmentSource for SurveySource {
    fn name(&self) -> &str {
        "survey"
    }

    fn measurements(&self, point: GeoPoint) -> BoxFuture<'_, Lookup<RawMeasurements>> {
        Box::pin(futures::future::ready(self.lookup(point)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn survey() -> SurveyData {
        SurveyData {
            canopy_samples: vec![
                CanopySample {
                    lat: 45.300,
                    lon: -110.700,
                    coverage: 0.8,
                },
                CanopySample {
                    lat: 45.302,
                    lon: -110.700,
                    coverage: 0.3,
                },
            ],
            disturbance_features: vec![DisturbanceFeature {
                lat: 45.310,
                lon: -110.700,
                kind: "road".to_string(),
            }],
        }
    }

    #[test]
    fn test_load_skips_invalid() {
        let json = r#"{
            "canopy_samples": [
                {"lat": 45.3, "lon": -110.7, "coverage": 0.7},
                {"lat": 95.0, "lon": -110.7, "coverage": 0.7},
                {"lat": 45.3, "lon": -110.7, "coverage": 1.7},
                {"lon": -110.7, "coverage": 0.5}
            ],
            "disturbance_features": [
                {"lat": 45.31, "lon": -110.7, "kind": "road"},
                {"lat": 45.31, "lon": 200.0, "kind": "cabin"},
                {"lat": 45.32, "lon": -110.71}
            ]
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let data = SurveyData::load(file.path()).unwrap();
        assert_eq!(data.canopy_samples.len(), 1);
        assert_eq!(data.disturbance_features.len(), 2);
        assert_eq!(data.disturbance_features[1].kind, "unknown");
    }

    #[test]
    fn test_nearest_canopy_within_radius() {
        let data = survey();
        assert_eq!(data.canopy_at(GeoPoint::new(45.3001, -110.7), 150.0), Some(0.8));
        assert_eq!(data.canopy_at(GeoPoint::new(45.3019, -110.7), 150.0), Some(0.3));
        assert_eq!(data.canopy_at(GeoPoint::new(45.4, -110.7), 150.0), None);
    }

    #[test]
    fn test_disturbance_distance() {
        let survey = survey();
        let (d, kind) = survey.nearest_disturbance(GeoPoint::new(45.300, -110.700)).unwrap();
        assert!((d - 1_112.0).abs() < 5.0, "distance {}", d);
        assert_eq!(kind, "road");
    }

    #[tokio::test]
    async fn test_source_fields() {
        let source = SurveySource::new(survey());
        let raw = source.measurements(GeoPoint::new(45.300, -110.700)).await.found().unwrap();
        assert_eq!(raw.canopy_coverage, Some(0.8));
        assert!(raw.disturbance_distance_m.is_some());
        assert!(raw.slope_deg.is_none());

        let empty = SurveySource::new(SurveyData::default());
        assert!(!empty.measurements(GeoPoint::new(0.0, 0.0)).await.is_found());
    }
}

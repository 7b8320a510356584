//! Environmental Data Sources
//!
//! Concrete [`EnvironmentSource`](site_suitability::EnvironmentSource)
//! implementations for the habitat site engine:
//!
//! - [`OpenMeteoSource`]: current wind and temperature, a 48 h wind/pressure
//!   trend, and slope/aspect from an elevation stencil
//! - [`SurveySource`]: canopy samples and disturbance features from a local
//!   JSON survey
//!
//! Both are plain values with their own lifecycle; construct them, hand them to
//! a `SourceChain`, and close the chain when done.

use site_suitability::Unavailable;
use thiserror::Error;

pub mod open_meteo;
pub mod survey;
pub mod terrain;
pub mod trend;

pub use open_meteo::{OpenMeteoConfig, OpenMeteoSource};
pub use survey::{CanopySample, DisturbanceFeature, SurveyData, SurveySource};
pub use terrain::{horn_terrain, ElevationStencil, TerrainDerivation};
pub use trend::{classify_pressure, summarize_trend, HourlySeries};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Insufficient data: {0}")]
    Insufficient(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeedError {
    /// Rate limits, server errors and network failures are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<FeedError> for Unavailable {
    fn from(e: FeedError) -> Self {
        if e.is_transient() {
            Unavailable::transient(e.to_string())
        } else {
            Unavailable::permanent(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

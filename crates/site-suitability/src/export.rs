//! GeoJSON export of site sets

use crate::criteria::Criterion;
use crate::{SiteCandidate, SiteSet};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde_json::json;

fn criterion_key(criterion: Criterion) -> &'static str {
    match criterion {
        Criterion::Canopy => "canopy",
        Criterion::Isolation => "isolation",
        Criterion::Slope => "slope",
        Criterion::Aspect => "aspect",
        Criterion::WindProtection => "wind_protection",
        Criterion::Thermal => "thermal",
    }
}

fn candidate_feature(candidate: &SiteCandidate) -> Feature {
    let suitability = &candidate.suitability;
    let mut scores = JsonObject::new();
    let mut rationales = JsonObject::new();
    for (criterion, score) in &suitability.scores {
        scores.insert(criterion_key(*criterion).to_string(), json!(score.score));
        rationales.insert(criterion_key(*criterion).to_string(), json!(score.rationale));
    }

    let mut properties = JsonObject::new();
    properties.insert("role".to_string(), json!(candidate.role.label()));
    properties.insert("search_tier".to_string(), json!(candidate.search_tier));
    properties.insert("bearing_deg".to_string(), json!(candidate.bearing_deg));
    properties.insert("distance_m".to_string(), json!(candidate.distance_m));
    properties.insert("overall_score".to_string(), json!(suitability.overall_score));
    properties.insert("aspect_deg".to_string(), json!(suitability.criteria.aspect_deg));
    properties.insert("slope_deg".to_string(), json!(suitability.criteria.slope_deg));
    properties.insert("scores".to_string(), serde_json::Value::Object(scores));
    properties.insert("rationales".to_string(), serde_json::Value::Object(rationales));
    properties.insert("approximated".to_string(), json!(candidate.approximated));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![
            candidate.location.lon,
            candidate.location.lat,
        ]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// One Point feature per candidate, request metadata as foreign members
pub fn to_feature_collection(set: &SiteSet) -> FeatureCollection {
    let mut metadata = JsonObject::new();
    metadata.insert("request_id".to_string(), json!(set.request_id.to_string()));
    metadata.insert("generated_at".to_string(), json!(set.generated_at));
    metadata.insert("target".to_string(), json!([set.target.lon, set.target.lat]));
    metadata.insert("confidence".to_string(), json!(set.confidence));
    metadata.insert("outcome".to_string(), json!(set.outcome));
    if let Some(reason) = &set.primary_rejection_reason {
        metadata.insert("primary_rejection_reason".to_string(), json!(reason));
    }

    FeatureCollection {
        bbox: None,
        features: set.candidates.iter().map(candidate_feature).collect(),
        foreign_members: Some(metadata),
    }
}

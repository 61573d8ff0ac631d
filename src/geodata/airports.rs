//! Airport text dumps to GeoJSON, centroid grouping and transport point
//! de-duplication.

use super::geojson_io::{feature, feature_collection, property_str};
use crate::core::geometry;
use crate::domain::model::LatLon;
use geojson::{Feature, FeatureCollection, JsonObject, Value};
use serde_json::json;
use std::collections::HashMap;

/// Parses one colon-delimited airport line.
///
/// Fields: `icao:iata:_:name:country:...:lat:lon`. Latitude and longitude are
/// always the last two fields.
pub fn parse_airport_line(line: &str) -> Option<Feature> {
    let line = line.trim();
    if line.is_empty() || !line.contains(':') {
        return None;
    }
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() < 5 {
        return None;
    }

    let lat: f64 = parts[parts.len() - 2].trim().parse().ok()?;
    let lon: f64 = parts[parts.len() - 1].trim().parse().ok()?;
    if lat == 0.0 || lon == 0.0 {
        return None;
    }

    let iata = parts[1].trim();
    let mut properties = JsonObject::new();
    properties.insert("icao".into(), json!(parts[0].trim()));
    properties.insert(
        "iata".into(),
        if iata == "N/A" { serde_json::Value::Null } else { json!(iata) },
    );
    properties.insert("name".into(), json!(parts[3].trim()));
    properties.insert("country".into(), json!(parts[4].trim()));
    properties.insert("type".into(), json!("airport"));

    Some(feature(Value::Point(LatLon::new(lat, lon).to_position()), properties))
}

pub fn parse_airports(text: &str) -> FeatureCollection {
    let features: Vec<Feature> = text.lines().filter_map(parse_airport_line).collect();
    tracing::debug!("Parsed {} airports from {} lines", features.len(), text.lines().count());
    feature_collection(features)
}

/// Groups features by the first non-empty of the given properties, keeping
/// first-seen group order.
fn group_by_first<'a>(
    features: &'a [Feature],
    keys: &[&str],
) -> Vec<(String, Vec<&'a Feature>)> {
    let mut order: Vec<(String, Vec<&Feature>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for f in features {
        let key = keys
            .iter()
            .map(|k| property_str(f, k))
            .find(|v| !v.is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        match index.get(&key) {
            Some(&i) => order[i].1.push(f),
            None => {
                index.insert(key.clone(), order.len());
                order.push((key, vec![f]));
            }
        }
    }
    order
}

/// One point per airport group at the mean of its member points.
pub fn simplify_airports(fc: &FeatureCollection) -> FeatureCollection {
    let mut out = Vec::new();
    for (key, members) in group_by_first(&fc.features, &["iata", "icao", "name"]) {
        let points: Vec<LatLon> = members
            .iter()
            .filter_map(|f| match f.geometry.as_ref().map(|g| &g.value) {
                Some(Value::Point(p)) => LatLon::from_position(p),
                _ => None,
            })
            .collect();
        let Some(center) = geometry::centroid(&points) else {
            continue;
        };

        let first = members[0];
        let mut properties = JsonObject::new();
        properties.insert(
            "name".into(),
            first.property("name").cloned().unwrap_or_else(|| json!(key)),
        );
        properties.insert("iata".into(), first.property("iata").cloned().unwrap_or_default());
        properties.insert("icao".into(), first.property("icao").cloned().unwrap_or_default());
        out.push(feature(Value::Point(center.to_position()), properties));
    }
    tracing::info!("Reduced {} → {} airports", fc.features.len(), out.len());
    feature_collection(out)
}

/// Keeps the first feature of each name group.
pub fn dedupe_transport_points(fc: &FeatureCollection) -> FeatureCollection {
    let features: Vec<Feature> = group_by_first(&fc.features, &["name", "iata", "icao"])
        .into_iter()
        .map(|(_, members)| members[0].clone())
        .collect();
    tracing::info!("Reduced {} → {} transport points", fc.features.len(), features.len());
    feature_collection(features)
}

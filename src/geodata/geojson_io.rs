//! Reading, writing and reprojecting GeoJSON feature collections.

use crate::core::reproject::{self, Crs};
use crate::utils::error::{PrepError, Result};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use std::path::Path;

/// Reads a file that must contain a FeatureCollection.
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path)?;
    parse_feature_collection(&text).map_err(|e| match e {
        PrepError::UnsupportedInput { reason, .. } => PrepError::UnsupportedInput {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        other => Err(PrepError::UnsupportedInput {
            path: String::new(),
            reason: format!("expected a FeatureCollection, found {}", geojson_kind(&other)),
        }),
    }
}

fn geojson_kind(value: &GeoJson) -> &'static str {
    match value {
        GeoJson::Geometry(_) => "a Geometry",
        GeoJson::Feature(_) => "a Feature",
        GeoJson::FeatureCollection(_) => "a FeatureCollection",
    }
}

/// Writes the collection, creating parent directories. Returns the byte size.
pub fn write_feature_collection(path: &Path, fc: &FeatureCollection, pretty: bool) -> Result<u64> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(fc)?
    } else {
        serde_json::to_vec(fc)?
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &bytes)?;
    Ok(bytes.len() as u64)
}

pub fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn feature(value: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// String form of a property: strings as-is, other scalars via JSON, missing
/// or null as `""`.
pub fn property_str(feature: &Feature, key: &str) -> String {
    match feature.property(key) {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn reproject_position(position: &mut [f64], src: Crs, dst: Crs) {
    if let [x, y, ..] = position {
        let (nx, ny) = reproject::transform(src, dst, *x, *y);
        *x = nx;
        *y = ny;
    }
}

fn reproject_value(value: &mut Value, src: Crs, dst: Crs) {
    match value {
        Value::Point(p) => reproject_position(p, src, dst),
        Value::MultiPoint(points) | Value::LineString(points) => {
            points.iter_mut().for_each(|p| reproject_position(p, src, dst))
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines
            .iter_mut()
            .flatten()
            .for_each(|p| reproject_position(p, src, dst)),
        Value::MultiPolygon(polygons) => polygons
            .iter_mut()
            .flatten()
            .flatten()
            .for_each(|p| reproject_position(p, src, dst)),
        Value::GeometryCollection(geometries) => geometries.iter_mut().for_each(|g| {
            g.bbox = None;
            reproject_value(&mut g.value, src, dst)
        }),
    }
}

/// Transforms every geometry in place. Features without geometry pass
/// through; bounding boxes are dropped because they no longer apply.
pub fn reproject_collection(fc: &mut FeatureCollection, src: Crs, dst: Crs) -> usize {
    fc.bbox = None;
    let mut transformed = 0;
    for feature in &mut fc.features {
        feature.bbox = None;
        if let Some(geometry) = feature.geometry.as_mut() {
            geometry.bbox = None;
            reproject_value(&mut geometry.value, src, dst);
            transformed += 1;
        }
    }
    transformed
}

pub fn reproject_file(input: &Path, output: &Path, src: Crs, dst: Crs) -> Result<usize> {
    let mut fc = read_feature_collection(input)?;
    let transformed = reproject_collection(&mut fc, src, dst);
    write_feature_collection(output, &fc, false)?;
    tracing::info!(
        "✅ Reprojected {} of {} features {} -> {} into {}",
        transformed,
        fc.features.len(),
        src,
        dst,
        output.display()
    );
    Ok(transformed)
}

//! Compact road and rail overlays for client-side rendering.

use super::geojson_io::property_str;
use crate::core::geometry;
use geojson::{FeatureCollection, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Filter and simplification settings for one route layer. A layer table in
/// the config file replaces the whole layer, so every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLayerSettings {
    /// Property holding the class, e.g. `highway` or `railway`.
    pub class_property: String,
    pub classes: Vec<String>,
    /// Simplification tolerance in degrees.
    pub tolerance: f64,
    pub max_points: usize,
    pub limit: usize,
}

impl RouteLayerSettings {
    pub fn roads() -> Self {
        Self {
            class_property: "highway".into(),
            classes: ["motorway", "trunk", "primary", "secondary"].map(String::from).to_vec(),
            tolerance: 0.0009,
            max_points: 64,
            limit: 3500,
        }
    }

    pub fn rail() -> Self {
        Self {
            class_property: "railway".into(),
            classes: ["rail", "subway", "light_rail"].map(String::from).to_vec(),
            tolerance: 0.0007,
            max_points: 80,
            limit: 4200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub roads_input: String,
    pub rail_input: String,
    pub output_dir: String,
    pub roads: RouteLayerSettings,
    pub rail: RouteLayerSettings,
    pub station_limit: usize,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            roads_input: "data/osm_derived/gb_major_roads_lite.geojson".into(),
            rail_input: "data/osm_derived/gb_rail_lines_lite.geojson".into(),
            output_dir: "data/transport_static".into(),
            roads: RouteLayerSettings::roads(),
            rail: RouteLayerSettings::rail(),
            station_limit: 2200,
        }
    }
}

/// A simplified line with `[lat, lon]` coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub coords: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlays {
    pub roads: Vec<Route>,
    pub rail: Vec<Route>,
    pub stations: Vec<Station>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlaySources {
    pub roads: String,
    pub rail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayManifest {
    pub roads_routes: usize,
    pub rail_routes: usize,
    pub rail_nodes: usize,
    pub source: OverlaySources,
}

#[derive(Serialize)]
pub struct RoutesFile<'a> {
    pub routes: &'a [Route],
}

#[derive(Serialize)]
pub struct StationsFile<'a> {
    pub stations: &'a [Station],
}

/// GeoJSON `[lon, lat, ..]` positions to `[lat, lon]` pairs; short positions
/// are skipped.
fn latlon_pairs(positions: &[Vec<f64>]) -> Vec<[f64; 2]> {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| [p[1], p[0]])
        .collect()
}

fn lines_of(value: &Value) -> Vec<Vec<[f64; 2]>> {
    match value {
        Value::LineString(line) => vec![latlon_pairs(line)],
        Value::MultiLineString(lines) => lines.iter().map(|l| latlon_pairs(l)).collect(),
        _ => Vec::new(),
    }
}

/// Every kept line of the collection, simplified. Not truncated to the limit.
pub fn build_routes(fc: &FeatureCollection, settings: &RouteLayerSettings) -> Vec<Route> {
    let mut routes = Vec::new();
    for f in &fc.features {
        let class = property_str(f, &settings.class_property).to_lowercase();
        if !settings.classes.contains(&class) {
            continue;
        }
        let Some(geometry) = f.geometry.as_ref() else {
            continue;
        };
        let name = property_str(f, "name").trim().to_string();
        for line in lines_of(&geometry.value) {
            if line.len() < 2 {
                continue;
            }
            let coords = geometry::simplify(&line, settings.tolerance, settings.max_points);
            if coords.len() < 2 {
                continue;
            }
            routes.push(Route {
                name: name.clone(),
                kind: class.clone(),
                coords,
            });
        }
    }
    routes
}

/// Route endpoints as station-like anchors, unique by 5-decimal position.
pub fn derive_stations(routes: &[Route]) -> Vec<Station> {
    let mut seen = HashSet::new();
    let mut stations = Vec::new();
    for route in routes {
        let (Some(first), Some(last)) = (route.coords.first(), route.coords.last()) else {
            continue;
        };
        for &[lat, lon] in [first, last] {
            if seen.insert(format!("{:.5},{:.5}", lat, lon)) {
                stations.push(Station {
                    name: if route.name.is_empty() {
                        "Rail Node".to_string()
                    } else {
                        route.name.clone()
                    },
                    lat,
                    lon,
                });
            }
        }
    }
    stations
}

pub fn build_overlays(
    roads: &FeatureCollection,
    rail: &FeatureCollection,
    settings: &OverlaySettings,
) -> Overlays {
    let mut road_routes = build_routes(roads, &settings.roads);
    road_routes.truncate(settings.roads.limit);

    let mut rail_routes = build_routes(rail, &settings.rail);
    let mut stations = derive_stations(&rail_routes);
    rail_routes.truncate(settings.rail.limit);
    stations.truncate(settings.station_limit);

    Overlays {
        roads: road_routes,
        rail: rail_routes,
        stations,
    }
}

impl Overlays {
    pub fn manifest(&self, source: OverlaySources) -> OverlayManifest {
        OverlayManifest {
            roads_routes: self.roads.len(),
            rail_routes: self.rail.len(),
            rail_nodes: self.stations.len(),
            source,
        }
    }
}

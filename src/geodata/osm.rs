//! Thematic layers (major roads, rail, places) from an OSM PBF extract.
//!
//! The file is read twice: ways and place nodes first, then the coordinates
//! of the nodes those ways reference.

use super::geojson_io::{feature, feature_collection, write_feature_collection};
use crate::core::{geometry, reproject};
use crate::domain::model::LatLon;
use crate::utils::error::Result;
use geojson::{Feature, FeatureCollection, JsonObject, Value};
use osmpbf::{Element, ElementReader};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsmSettings {
    pub output_dir: String,
    /// Line simplification tolerance in metres (British National Grid).
    pub simplify_m: f64,
}

impl Default for OsmSettings {
    fn default() -> Self {
        Self {
            output_dir: "data/osm_derived".into(),
            simplify_m: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Theme {
    MajorRoads,
    RailLines,
    Places,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::MajorRoads, Theme::RailLines, Theme::Places];

    fn tag_key(self) -> &'static str {
        match self {
            Theme::MajorRoads => "highway",
            Theme::RailLines => "railway",
            Theme::Places => "place",
        }
    }

    fn values(self) -> &'static [&'static str] {
        match self {
            Theme::MajorRoads => &[
                "motorway",
                "motorway_link",
                "trunk",
                "trunk_link",
                "primary",
                "primary_link",
                "secondary",
                "secondary_link",
                "tertiary",
                "tertiary_link",
            ],
            Theme::RailLines => &["rail", "subway", "light_rail", "tram"],
            Theme::Places => &["city", "town", "village", "hamlet", "suburb"],
        }
    }

    fn kept_tags(self) -> &'static [&'static str] {
        match self {
            Theme::MajorRoads => &["name", "ref", "highway", "maxspeed"],
            Theme::RailLines => &["name", "operator", "railway"],
            Theme::Places => &["name", "place", "population"],
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Theme::MajorRoads => "gb_major_roads.geojson",
            Theme::RailLines => "gb_rail_lines.geojson",
            Theme::Places => "gb_places.geojson",
        }
    }

    pub fn manifest_key(self) -> &'static str {
        match self {
            Theme::MajorRoads => "major_roads",
            Theme::RailLines => "rail_lines",
            Theme::Places => "places",
        }
    }

    fn matches<'a>(self, tags: &[(&'a str, &'a str)]) -> bool {
        tags.iter()
            .any(|(k, v)| *k == self.tag_key() && self.values().iter().any(|x| x == v))
    }

    fn properties<'a>(self, tags: &[(&'a str, &'a str)]) -> JsonObject {
        tags.iter()
            .filter(|(k, _)| self.kept_tags().iter().any(|x| x == k))
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect()
    }
}

/// Line themes a way belongs to. A way tagged both `highway` and `railway`
/// lands in both layers.
pub fn classify_way(tags: &[(&str, &str)]) -> Vec<Theme> {
    [Theme::MajorRoads, Theme::RailLines]
        .into_iter()
        .filter(|t| t.matches(tags))
        .collect()
}

#[derive(Debug, Clone)]
pub struct PendingWay {
    pub theme: Theme,
    pub properties: JsonObject,
    pub refs: Vec<i64>,
}

#[derive(Debug, Default)]
pub struct OsmScan {
    pub ways: Vec<PendingWay>,
    pub places: Vec<Feature>,
}

impl OsmScan {
    pub fn referenced_nodes(&self) -> HashSet<i64> {
        self.ways.iter().flat_map(|w| w.refs.iter().copied()).collect()
    }

    fn add_node(&mut self, tags: &[(&str, &str)], lat: f64, lon: f64) {
        if Theme::Places.matches(tags) {
            self.places.push(feature(
                Value::Point(LatLon::new(lat, lon).to_position()),
                Theme::Places.properties(tags),
            ));
        }
    }

    fn add_way(&mut self, tags: &[(&str, &str)], refs: Vec<i64>) {
        for theme in classify_way(tags) {
            self.ways.push(PendingWay {
                theme,
                properties: theme.properties(tags),
                refs: refs.clone(),
            });
        }
    }
}

/// First pass: themed ways and place nodes.
pub fn scan(pbf: &Path) -> Result<OsmScan> {
    let mut found = OsmScan::default();
    ElementReader::from_path(pbf)?.for_each(|element| match element {
        Element::Way(way) => {
            let tags: Vec<(&str, &str)> = way.tags().collect();
            if !classify_way(&tags).is_empty() {
                found.add_way(&tags, way.refs().collect());
            }
        }
        Element::Node(node) => {
            let tags: Vec<(&str, &str)> = node.tags().collect();
            found.add_node(&tags, node.lat(), node.lon());
        }
        Element::DenseNode(node) => {
            let tags: Vec<(&str, &str)> = node.tags().collect();
            found.add_node(&tags, node.lat(), node.lon());
        }
        Element::Relation(_) => {}
    })?;
    tracing::info!(
        "Scanned {}: {} themed ways, {} places",
        pbf.display(),
        found.ways.len(),
        found.places.len()
    );
    Ok(found)
}

/// Second pass: coordinates of the wanted nodes.
pub fn resolve_nodes(pbf: &Path, wanted: &HashSet<i64>) -> Result<HashMap<i64, LatLon>> {
    let mut coords = HashMap::with_capacity(wanted.len());
    ElementReader::from_path(pbf)?.for_each(|element| {
        let (id, lat, lon) = match element {
            Element::Node(node) => (node.id(), node.lat(), node.lon()),
            Element::DenseNode(node) => (node.id(), node.lat(), node.lon()),
            _ => return,
        };
        if wanted.contains(&id) {
            coords.insert(id, LatLon::new(lat, lon));
        }
    })?;
    if coords.len() < wanted.len() {
        tracing::warn!(
            "⚠️ {} referenced nodes missing from the extract",
            wanted.len() - coords.len()
        );
    }
    Ok(coords)
}

/// Ramer–Douglas–Peucker in British National Grid metres, keeping the
/// original WGS84 coordinates of the retained vertices.
pub fn simplify_metric(points: &[LatLon], tolerance_m: f64) -> Vec<LatLon> {
    if tolerance_m <= 0.0 || points.len() < 3 {
        return points.to_vec();
    }
    let projected: Vec<[f64; 2]> = points
        .iter()
        .map(|p| {
            let (e, n) = reproject::wgs84_to_bng(p.lat, p.lon);
            [n, e]
        })
        .collect();
    geometry::rdp_indices(&projected, tolerance_m)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

#[derive(Debug)]
pub struct OsmLayers {
    pub major_roads: FeatureCollection,
    pub rail_lines: FeatureCollection,
    pub places: FeatureCollection,
}

impl OsmLayers {
    pub fn layer(&self, theme: Theme) -> &FeatureCollection {
        match theme {
            Theme::MajorRoads => &self.major_roads,
            Theme::RailLines => &self.rail_lines,
            Theme::Places => &self.places,
        }
    }
}

/// Resolves and simplifies the scanned ways. Ways with fewer than two
/// resolvable nodes are dropped.
pub fn build_layers(scan: OsmScan, coords: &HashMap<i64, LatLon>, tolerance_m: f64) -> OsmLayers {
    let mut roads = Vec::new();
    let mut rail = Vec::new();
    for way in scan.ways {
        let points: Vec<LatLon> = way.refs.iter().filter_map(|id| coords.get(id).copied()).collect();
        if points.len() < 2 {
            continue;
        }
        let line = simplify_metric(&points, tolerance_m)
            .into_iter()
            .map(LatLon::to_position)
            .collect();
        let f = feature(Value::LineString(line), way.properties);
        match way.theme {
            Theme::MajorRoads => roads.push(f),
            Theme::RailLines => rail.push(f),
            Theme::Places => {}
        }
    }
    OsmLayers {
        major_roads: feature_collection(roads),
        rail_lines: feature_collection(rail),
        places: feature_collection(scan.places),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    pub features: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsmManifest {
    pub source_pbf: String,
    pub outputs: BTreeMap<String, LayerStats>,
}

pub fn write_layers(layers: &OsmLayers, out_dir: &Path, source_pbf: &str) -> Result<OsmManifest> {
    std::fs::create_dir_all(out_dir)?;
    let mut outputs = BTreeMap::new();
    for theme in Theme::ALL {
        let fc = layers.layer(theme);
        let path = out_dir.join(theme.file_name());
        let bytes = write_feature_collection(&path, fc, false)?;
        tracing::info!("✅ {} features -> {}", fc.features.len(), path.display());
        outputs.insert(
            theme.manifest_key().to_string(),
            LayerStats {
                features: fc.features.len(),
                bytes,
            },
        );
    }
    let manifest = OsmManifest {
        source_pbf: source_pbf.to_string(),
        outputs,
    };
    std::fs::write(out_dir.join("manifest.json"), serde_json::to_vec_pretty(&manifest)?)?;
    Ok(manifest)
}

/// Both passes plus output. Blocking; call from `spawn_blocking` in async code.
pub fn extract_layers(pbf: &Path, settings: &OsmSettings) -> Result<OsmManifest> {
    crate::utils::validation::validate_existing_path("osm.pbf", &pbf.to_string_lossy())?;
    let scan = scan(pbf)?;
    let coords = resolve_nodes(pbf, &scan.referenced_nodes())?;
    let layers = build_layers(scan, &coords, settings.simplify_m);
    write_layers(&layers, Path::new(&settings.output_dir), &pbf.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify_way() {
        assert_eq!(classify_way(&[("highway", "primary_link"), ("name", "A1")]), vec![Theme::MajorRoads]);
        assert_eq!(classify_way(&[("railway", "tram")]), vec![Theme::RailLines]);
        assert!(classify_way(&[("highway", "residential")]).is_empty());
        assert!(classify_way(&[("railway", "abandoned")]).is_empty());
    }

    #[test]
    fn test_kept_tags_only() {
        let props = Theme::MajorRoads.properties(&[
            ("highway", "motorway"),
            ("ref", "M6"),
            ("surface", "asphalt"),
        ]);
        assert_eq!(props.len(), 2);
        assert_eq!(props["ref"], "M6");
    }

    #[test]
    fn test_simplify_metric_drops_small_wiggles() {
        // ~1 m sideways wiggle on a 2 km straight line.
        let points = vec![
            LatLon::new(52.0, -1.0),
            LatLon::new(52.009, -1.000015),
            LatLon::new(52.018, -1.0),
        ];
        assert_eq!(simplify_metric(&points, 25.0), vec![points[0], points[2]]);
        assert_eq!(simplify_metric(&points, 0.0), points);
    }

    #[test]
    fn test_build_and_write_layers() {
        let mut found = OsmScan::default();
        found.add_way(&[("highway", "trunk"), ("name", "A14")], vec![1, 2, 3]);
        found.add_way(&[("railway", "rail")], vec![2, 99]);
        found.add_node(&[("place", "town"), ("name", "Ely"), ("wikidata", "Q1")], 52.4, 0.26);
        found.add_node(&[("amenity", "pub")], 52.4, 0.27);
        assert_eq!(found.referenced_nodes().len(), 4);

        let coords: HashMap<i64, LatLon> = [
            (1, LatLon::new(52.0, 0.0)),
            (2, LatLon::new(52.1, 0.1)),
            (3, LatLon::new(52.2, 0.0)),
        ]
        .into_iter()
        .collect();
        let layers = build_layers(found, &coords, 25.0);
        assert_eq!(layers.major_roads.features.len(), 1);
        assert!(layers.rail_lines.features.is_empty());
        assert_eq!(layers.places.features.len(), 1);

        let dir = TempDir::new().unwrap();
        let manifest = write_layers(&layers, dir.path(), "gb.osm.pbf").unwrap();
        assert_eq!(manifest.outputs["major_roads"].features, 1);
        assert_eq!(manifest.outputs["rail_lines"].features, 0);
        assert!(manifest.outputs["places"].bytes > 0);
        assert!(dir.path().join("gb_rail_lines.geojson").exists());
        assert!(dir.path().join("manifest.json").exists());
    }
}

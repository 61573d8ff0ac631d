use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geodetic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// GeoJSON position order.
    pub fn to_position(self) -> Vec<f64> {
        vec![self.lon, self.lat]
    }

    /// Builds a point from a GeoJSON `[lon, lat, ..]` position.
    pub fn from_position(position: &[f64]) -> Option<Self> {
        match position {
            [lon, lat, ..] => Some(Self::new(*lat, *lon)),
            _ => None,
        }
    }
}

/// One tabular data row keyed by header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub cells: BTreeMap<String, String>,
}

impl Row {
    /// Cell value, or the empty string when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub type_id: String,
    pub type_name: String,
    pub label: String,
    pub properties: BTreeMap<String, String>,
    pub identity_key: String,
    pub source_row: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub type_id: String,
    pub type_name: String,
    pub source: String,
    pub target: String,
    pub properties: BTreeMap<String, String>,
    pub identity_key: String,
    pub source_row: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub template_file: String,
    pub source_type: String,
    pub rows_processed: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Node/edge graph produced by the template runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub metadata: GraphMetadata,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Coordinates stored per postcode in the lookup file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostcodeLocation {
    pub lat: f64,
    pub lon: f64,
}

/// Postcode (uppercase, no whitespace) to location.
pub type PostcodeLookup = BTreeMap<String, PostcodeLocation>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkIndexEntry {
    pub start: usize,
    pub end: usize,
    pub file: String,
    pub rows: usize,
}

/// Number of records a pipeline stage carries, for progress logging.
pub trait RecordCount {
    fn record_count(&self) -> usize;
}

impl<T> RecordCount for Vec<T> {
    fn record_count(&self) -> usize {
        self.len()
    }
}

impl RecordCount for Graph {
    fn record_count(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }
}

impl RecordCount for PostcodeLookup {
    fn record_count(&self) -> usize {
        self.len()
    }
}

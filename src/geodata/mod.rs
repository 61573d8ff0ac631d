//! Geodata extraction and simplification utilities.

pub mod airports;
pub mod companies;
pub mod geojson_io;
pub mod osm;
pub mod overlays;
pub mod postcodes;

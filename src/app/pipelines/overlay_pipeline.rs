use crate::domain::model::RecordCount;
use crate::domain::ports::{Pipeline, Storage};
use crate::geodata::geojson_io::parse_feature_collection;
use crate::geodata::overlays::{
    build_overlays, OverlaySettings, OverlaySources, Overlays, RoutesFile, StationsFile,
};
use crate::utils::error::{PrepError, Result};
use geojson::FeatureCollection;

pub const ROADS_FILE: &str = "roads_core.json";
pub const RAIL_FILE: &str = "rail_core.json";
pub const STATIONS_FILE: &str = "rail_stations_core.json";
pub const MANIFEST_FILE: &str = "manifest.json";

pub struct RouteSources {
    pub roads: FeatureCollection,
    pub rail: FeatureCollection,
}

impl RecordCount for RouteSources {
    fn record_count(&self) -> usize {
        self.roads.features.len() + self.rail.features.len()
    }
}

impl RecordCount for Overlays {
    fn record_count(&self) -> usize {
        self.roads.len() + self.rail.len() + self.stations.len()
    }
}

/// Road and rail GeoJSON to the compact overlay files served to the map.
pub struct OverlayPipeline<S: Storage> {
    storage: S,
    settings: OverlaySettings,
}

impl<S: Storage> OverlayPipeline<S> {
    pub fn new(storage: S, settings: OverlaySettings) -> Self {
        Self { storage, settings }
    }

    async fn read_collection(&self, path: &str) -> Result<FeatureCollection> {
        if !self.storage.exists(path).await {
            return Err(PrepError::NotFound {
                what: path.to_string(),
            });
        }
        let data = self.storage.read_file(path).await?;
        let text = String::from_utf8(data).map_err(|e| PrepError::UnsupportedInput {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        parse_feature_collection(&text)
    }

    fn output(&self, file: &str) -> String {
        format!("{}/{}", self.settings.output_dir.trim_end_matches('/'), file)
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for OverlayPipeline<S> {
    type Extracted = RouteSources;
    type Transformed = Overlays;

    fn name(&self) -> &str {
        "transport-overlays"
    }

    async fn extract(&self) -> Result<RouteSources> {
        Ok(RouteSources {
            roads: self.read_collection(&self.settings.roads_input).await?,
            rail: self.read_collection(&self.settings.rail_input).await?,
        })
    }

    async fn transform(&self, sources: RouteSources) -> Result<Overlays> {
        Ok(build_overlays(&sources.roads, &sources.rail, &self.settings))
    }

    async fn load(&self, overlays: Overlays) -> Result<String> {
        self.storage
            .write_file(
                &self.output(ROADS_FILE),
                &serde_json::to_vec(&RoutesFile { routes: &overlays.roads })?,
            )
            .await?;
        self.storage
            .write_file(
                &self.output(RAIL_FILE),
                &serde_json::to_vec(&RoutesFile { routes: &overlays.rail })?,
            )
            .await?;
        self.storage
            .write_file(
                &self.output(STATIONS_FILE),
                &serde_json::to_vec(&StationsFile {
                    stations: &overlays.stations,
                })?,
            )
            .await?;

        let manifest = overlays.manifest(OverlaySources {
            roads: self.settings.roads_input.clone(),
            rail: self.settings.rail_input.clone(),
        });
        let manifest_path = self.output(MANIFEST_FILE);
        self.storage
            .write_file(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)
            .await?;

        tracing::info!(
            "✅ {} road routes, {} rail routes, {} rail nodes",
            manifest.roads_routes,
            manifest.rail_routes,
            manifest.rail_nodes
        );
        Ok(manifest_path)
    }
}

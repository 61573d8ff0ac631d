use anyhow::Result;
use mapprep::app::pipelines::postcode_pipeline::{read_lookup, write_area_split};
use mapprep::app::pipelines::{CompaniesPipeline, OverlayPipeline, PostcodePipeline};
use mapprep::domain::model::ChunkIndexEntry;
use mapprep::geodata::companies::CompaniesSettings;
use mapprep::geodata::overlays::OverlaySettings;
use mapprep::{EtlEngine, LocalStorage};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn read_json(path: &Path) -> Result<Value> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
}

#[tokio::test]
async fn test_postcode_build_and_split() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let csv_dir = temp_dir.path().join("multi_csv");
    std::fs::create_dir_all(&csv_dir)?;
    std::fs::write(
        csv_dir.join("b.csv"),
        "pcd,lat,long,doterm\nSW1A 1AA,51.501009,-0.141588,\nSW1A 0AA,,,\n",
    )?;
    std::fs::write(
        csv_dir.join("a.csv"),
        "pcd,lat,long,doterm\nBS1 5AH,51.4495,-2.5784,\nBS1 6XX,51.45,-2.58,202001\nB1 1AA,52.48,-1.9,\n",
    )?;
    std::fs::write(csv_dir.join("notes.txt"), "ignored")?;

    let storage = LocalStorage::new(temp_dir.path());
    let engine = EtlEngine::new(PostcodePipeline::new(storage.clone(), &csv_dir, "postcodes.json"));
    engine.run().await?;

    let lookup = read_json(&temp_dir.path().join("postcodes.json"))?;
    let keys: Vec<&String> = lookup.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["B11AA", "BS15AH", "SW1A1AA"]);
    assert_eq!(lookup["SW1A1AA"]["lon"], -0.141588);

    let lookup = read_lookup(&storage, "postcodes.json").await?;
    let prefixes = write_area_split(&storage, &lookup, "postcodes", "postcodes_index.json").await?;
    assert_eq!(prefixes, vec!["B", "BS", "SW"]);
    assert_eq!(
        read_json(&temp_dir.path().join("postcodes_index.json"))?,
        serde_json::json!(["B", "BS", "SW"])
    );
    let bs = read_json(&temp_dir.path().join("postcodes/BS.json"))?;
    assert_eq!(bs.as_object().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_overlay_files_and_manifest() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(
        temp_dir.path().join("roads.geojson"),
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"highway":"motorway","name":"M4"},
             "geometry":{"type":"LineString","coordinates":[[-2.6,51.5],[-2.0,51.5],[-1.0,51.5]]}},
            {"type":"Feature","properties":{"highway":"service"},
             "geometry":{"type":"LineString","coordinates":[[0,50],[1,50]]}}]}"#,
    )?;
    std::fs::write(
        temp_dir.path().join("rail.geojson"),
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"railway":"rail","name":"GWML"},
             "geometry":{"type":"LineString","coordinates":[[-2.58,51.45],[-0.17,51.51]]}},
            {"type":"Feature","properties":{"railway":"rail"},
             "geometry":{"type":"LineString","coordinates":[[-0.17,51.51],[0.1,51.6]]}}]}"#,
    )?;

    let settings = OverlaySettings {
        roads_input: "roads.geojson".into(),
        rail_input: "rail.geojson".into(),
        output_dir: "transport_static".into(),
        ..OverlaySettings::default()
    };
    let engine = EtlEngine::new(OverlayPipeline::new(LocalStorage::new(temp_dir.path()), settings));
    let manifest_path = engine.run().await?;
    assert_eq!(manifest_path, "transport_static/manifest.json");

    let out = temp_dir.path().join("transport_static");
    let manifest = read_json(&out.join("manifest.json"))?;
    assert_eq!(manifest["roads_routes"], 1);
    assert_eq!(manifest["rail_routes"], 2);
    // The shared endpoint is one node.
    assert_eq!(manifest["rail_nodes"], 3);
    assert_eq!(manifest["source"]["roads"], "roads.geojson");

    let roads = read_json(&out.join("roads_core.json"))?;
    assert_eq!(roads["routes"][0]["type"], "motorway");
    assert_eq!(roads["routes"][0]["coords"][0], serde_json::json!([51.5, -2.6]));

    let stations = read_json(&out.join("rail_stations_core.json"))?;
    assert_eq!(stations["stations"][0]["name"], "GWML");
    assert_eq!(stations["stations"][2]["name"], "Rail Node");
    Ok(())
}

#[tokio::test]
async fn test_overlay_missing_input() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = OverlaySettings {
        roads_input: "missing.geojson".into(),
        ..OverlaySettings::default()
    };
    let engine = EtlEngine::new(OverlayPipeline::new(LocalStorage::new(temp_dir.path()), settings));
    let err = engine.run().await.unwrap_err();
    assert!(err.to_string().contains("missing.geojson"));
    Ok(())
}

#[tokio::test]
async fn test_companies_split_resumes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("BasicCompanyData.csv");
    std::fs::write(
        &input,
        "\u{feff}CompanyName, CompanyNumber\nACME LTD,001\nBETA PLC,002\nGAMMA LLP,003\n",
    )?;

    let out_dir = temp_dir.path().join("subsets");
    let index_file = temp_dir.path().join("index.json");
    let settings = CompaniesSettings {
        output_dir: out_dir.to_string_lossy().into_owned(),
        index_file: index_file.to_string_lossy().into_owned(),
        rows_per_file: 2,
        progress_every: 1,
    };

    let storage = LocalStorage::new(temp_dir.path());
    let engine = EtlEngine::new(CompaniesPipeline::new(storage.clone(), &input, settings.clone()));
    engine.run().await?;

    let index: Vec<ChunkIndexEntry> = serde_json::from_slice(&std::fs::read(&index_file)?)?;
    assert_eq!(index.len(), 2);
    assert_eq!((index[1].start, index[1].end, index[1].rows), (2, 2, 1));

    let first = read_json(&out_dir.join("companies_000000_000001.json"))?;
    assert_eq!(first[1]["CompanyName"], "BETA PLC");
    assert_eq!(first[1][" CompanyNumber"], "002");

    // A second run finds every range indexed and rewrites nothing.
    std::fs::remove_file(out_dir.join("companies_000002_000002.json"))?;
    let engine = EtlEngine::new(CompaniesPipeline::new(storage, &input, settings));
    engine.run().await?;
    assert!(!out_dir.join("companies_000002_000002.json").exists());
    let index: Vec<ChunkIndexEntry> = serde_json::from_slice(&std::fs::read(&index_file)?)?;
    assert_eq!(index.len(), 2);
    Ok(())
}

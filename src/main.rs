use clap::{Args, Parser, Subcommand};
use mapprep::adapters::commons::CommonsClient;
use mapprep::adapters::companies_house;
use mapprep::adapters::sketchfab::{self, SketchfabClient};
use mapprep::app::pipelines::postcode_pipeline::{read_lookup, write_area_split};
use mapprep::app::pipelines::{CompaniesPipeline, OverlayPipeline, PostcodePipeline};
use mapprep::config::env;
use mapprep::core::icon_crop;
use mapprep::core::reproject::Crs;
use mapprep::core::template::catalog::{self, SchemaCatalog};
use mapprep::geodata::{airports, geojson_io, osm};
use mapprep::utils::{logger, validation::Validate};
use mapprep::{EtlEngine, LocalStorage, PrepConfig, PrepError, Result};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mapprep")]
#[command(about = "Data-prep utilities for the map front end")]
struct Cli {
    /// TOML configuration file (defaults to ./mapprep.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log CPU and memory usage per phase
    #[arg(long, global = true)]
    monitor: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// i2 specification catalogs and summaries
    #[command(subcommand)]
    I2(I2Command),
    /// Reproject a GeoJSON FeatureCollection
    Reproject {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "EPSG:27700")]
        from: Crs,
        #[arg(long, default_value = "EPSG:4326")]
        to: Crs,
    },
    /// Global airport list to GeoJSON, and centroid simplification
    #[command(subcommand)]
    Airports(AirportsCommand),
    /// Keep the first transport point per name/code
    TransportPoints { input: PathBuf, output: PathBuf },
    /// Static road and rail overlays for the map
    Overlays {
        #[arg(long)]
        roads: Option<String>,
        #[arg(long)]
        rail: Option<String>,
        #[arg(long)]
        out_dir: Option<String>,
    },
    /// Road, rail and place layers from an OSM extract
    Osm {
        #[arg(long)]
        pbf: PathBuf,
        #[arg(long)]
        out: Option<String>,
        /// Simplification tolerance in metres
        #[arg(long)]
        simplify_m: Option<f64>,
    },
    /// Postcode lookup build and per-area split
    #[command(subcommand)]
    Postcodes(PostcodesCommand),
    /// Companies House bulk data and API setup
    #[command(subcommand)]
    Companies(CompaniesCommand),
    /// Search Wikimedia Commons for images
    Commons {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download GLB models from Sketchfab
    #[command(subcommand)]
    Sketchfab(SketchfabCommand),
    /// Crop icons to their visible content on a square canvas
    Icons(IconArgs),
}

#[derive(Subcommand)]
enum I2Command {
    /// Flat entity/link property catalogs from the information-store schema
    Catalog(I2Dirs),
    /// JSON summaries of import specs, formatting rules, match rules and schema
    Summarize(I2Dirs),
}

#[derive(Args)]
struct I2Dirs {
    #[arg(long)]
    base_dir: Option<PathBuf>,
    /// Defaults to `<base-dir>/parsed`
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum AirportsCommand {
    /// Colon-delimited airport list to a FeatureCollection
    Parse { input: PathBuf, output: PathBuf },
    /// One point per airport code at the centroid of its features
    Simplify { input: PathBuf, output: PathBuf },
}

#[derive(Subcommand)]
enum PostcodesCommand {
    Build {
        #[arg(long, default_value = "data/postcode_data/ONSPD_MAY_2025/Data/multi_csv")]
        input_dir: PathBuf,
        #[arg(long, default_value = "data/postcodes.json")]
        output: String,
    },
    Split {
        #[arg(long, default_value = "data/postcodes.json")]
        input: String,
        #[arg(long, default_value = "data/postcodes")]
        out_dir: String,
        #[arg(long, default_value = "data/postcodes_index.json")]
        index: String,
    },
}

#[derive(Subcommand)]
enum CompaniesCommand {
    /// Split the bulk CSV into resumable JSON chunks
    Split {
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<String>,
        #[arg(long)]
        index: Option<String>,
        #[arg(long)]
        rows_per_file: Option<usize>,
    },
    /// Check the API key setup
    Verify {
        #[arg(long)]
        env_file: Option<PathBuf>,
        #[arg(long, default_value = ".gitignore")]
        gitignore: PathBuf,
    },
}

#[derive(Subcommand)]
enum SketchfabCommand {
    /// Download the downloadable results of a search
    Search {
        query: String,
        #[arg(long, default_value_t = 24)]
        count: usize,
        #[arg(long, default_value = "data/vehicles")]
        out_dir: PathBuf,
    },
    /// Download every model of a collection
    Collection {
        uid: String,
        #[arg(long, default_value = "data/vehicles/sketchfab_collection")]
        out_dir: PathBuf,
    },
}

#[derive(Args)]
struct IconArgs {
    /// A PNG file or a directory of PNGs
    input: PathBuf,
    output: PathBuf,
    #[arg(long)]
    alpha_threshold: Option<f32>,
    #[arg(long)]
    margin: Option<u32>,
    #[arg(long)]
    canvas_size: Option<u32>,
    #[arg(long)]
    padding: Option<u32>,
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = PrepConfig::load(cli.config.as_deref())?;
    let storage = LocalStorage::new(".");

    match cli.command {
        Command::I2(command) => {
            let (dirs, summarize) = match command {
                I2Command::Catalog(dirs) => (dirs, false),
                I2Command::Summarize(dirs) => (dirs, true),
            };
            let base_dir = dirs.base_dir.unwrap_or_else(|| config.template.base_path());
            let out_dir = dirs.out_dir.unwrap_or_else(|| base_dir.join("parsed"));

            let written = if summarize {
                catalog::write_summaries(&base_dir, &out_dir)?
            } else {
                let schema = catalog::schema_path(&base_dir);
                if !schema.exists() {
                    return Err(PrepError::NotFound {
                        what: format!("schema file {}", schema.display()),
                    });
                }
                let catalog = SchemaCatalog::from_file(&schema)?;
                tracing::info!(
                    "📊 {} entity types ({} properties), {} link types ({} properties)",
                    catalog.entities.len(),
                    catalog.entity_property_count(),
                    catalog.links.len(),
                    catalog.link_property_count()
                );
                catalog.write(&out_dir)?
            };
            for path in written {
                println!("  {}", path.display());
            }
        }

        Command::Reproject { input, output, from, to } => {
            geojson_io::reproject_file(&input, &output, from, to)?;
        }

        Command::Airports(AirportsCommand::Parse { input, output }) => {
            let text = std::fs::read_to_string(&input)?;
            let fc = airports::parse_airports(&text);
            geojson_io::write_feature_collection(&output, &fc, true)?;
            println!("✅ Written {} airports to {}", fc.features.len(), display(&output));
        }

        Command::Airports(AirportsCommand::Simplify { input, output }) => {
            let fc = geojson_io::read_feature_collection(&input)?;
            let simplified = airports::simplify_airports(&fc);
            geojson_io::write_feature_collection(&output, &simplified, false)?;
            println!("Reduced {} → {}", fc.features.len(), simplified.features.len());
        }

        Command::TransportPoints { input, output } => {
            let fc = geojson_io::read_feature_collection(&input)?;
            let deduped = airports::dedupe_transport_points(&fc);
            geojson_io::write_feature_collection(&output, &deduped, false)?;
            println!("Reduced {} → {}", fc.features.len(), deduped.features.len());
        }

        Command::Overlays { roads, rail, out_dir } => {
            if let Some(roads) = roads {
                config.overlays.roads_input = roads;
            }
            if let Some(rail) = rail {
                config.overlays.rail_input = rail;
            }
            if let Some(out_dir) = out_dir {
                config.overlays.output_dir = out_dir;
            }
            config.validate()?;
            let engine = EtlEngine::new_with_monitoring(
                OverlayPipeline::new(storage, config.overlays.clone()),
                cli.monitor,
            );
            let manifest = engine.run().await?;
            println!("✅ Overlays written, manifest: {}", manifest);
        }

        Command::Osm { pbf, out, simplify_m } => {
            if let Some(out) = out {
                config.osm.output_dir = out;
            }
            if let Some(simplify_m) = simplify_m {
                config.osm.simplify_m = simplify_m;
            }
            config.validate()?;
            let settings = config.osm.clone();
            let manifest = tokio::task::spawn_blocking(move || osm::extract_layers(&pbf, &settings))
                .await
                .map_err(|e| PrepError::processing(format!("OSM task failed: {}", e)))??;
            for (key, stats) in &manifest.outputs {
                println!("  {}: {} features, {} bytes", key, stats.features, stats.bytes);
            }
        }

        Command::Postcodes(PostcodesCommand::Build { input_dir, output }) => {
            let engine = EtlEngine::new_with_monitoring(
                PostcodePipeline::new(storage, input_dir, output),
                cli.monitor,
            );
            let path = engine.run().await?;
            println!("✅ Postcode lookup saved to {}", path);
        }

        Command::Postcodes(PostcodesCommand::Split { input, out_dir, index }) => {
            let lookup = read_lookup(&storage, &input).await?;
            tracing::info!("Loaded {} postcodes, splitting by area prefix", lookup.len());
            let prefixes = write_area_split(&storage, &lookup, &out_dir, &index).await?;
            println!("✅ {} area files written to {}", prefixes.len(), out_dir);
        }

        Command::Companies(CompaniesCommand::Split {
            input,
            out_dir,
            index,
            rows_per_file,
        }) => {
            if let Some(out_dir) = out_dir {
                config.companies.output_dir = out_dir;
            }
            if let Some(index) = index {
                config.companies.index_file = index;
            }
            if let Some(rows) = rows_per_file {
                config.companies.rows_per_file = rows;
            }
            config.validate()?;
            mapprep::utils::validation::validate_existing_path("input", &display(&input))?;
            let engine = EtlEngine::new_with_monitoring(
                CompaniesPipeline::new(storage, input, config.companies.clone()),
                cli.monitor,
            );
            let index = engine.run().await?;
            println!("🎉 Done. Index at {}", index);
        }

        Command::Companies(CompaniesCommand::Verify { env_file, gitignore }) => {
            let env_file = env_file.unwrap_or_else(|| PathBuf::from(&config.server.env_file));
            let report = companies_house::verify(
                &env_file,
                &gitignore,
                &config.server.upstream_base,
                config.http.timeout(),
            )
            .await?;
            println!("{}/{} checks passed", report.passed(), report.checks.len());
            if !report.all_passed() {
                return Err(PrepError::ValidationError {
                    message: "Companies House setup incomplete".to_string(),
                });
            }
        }

        Command::Commons { query, limit, json } => {
            let client = CommonsClient::new(
                config.http.commons_api_url.clone(),
                &config.http.user_agent,
                config.http.timeout(),
            )?;
            let images = client.search_images(&query, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&images)?);
            } else if images.is_empty() {
                println!("No results found for: {}", query);
            } else {
                for image in images {
                    println!("Title: {}\nURL:   {}\n", image.title, image.url);
                }
            }
        }

        Command::Sketchfab(command) => {
            env::load_env_file(Path::new(&config.server.env_file));
            let token = env::required_var(sketchfab::TOKEN_ENV)?;
            let client = SketchfabClient::new(
                config.http.sketchfab_api_url.clone(),
                &token,
                &config.http.user_agent,
                config.http.timeout(),
                config.http.download_delay(),
            )?;
            let (models, out_dir) = match command {
                SketchfabCommand::Search { query, count, out_dir } => {
                    (client.search(&query, count).await?, out_dir)
                }
                SketchfabCommand::Collection { uid, out_dir } => {
                    (client.collection_models(&uid).await?, out_dir)
                }
            };
            tracing::info!("Found {} models", models.len());
            let written = client.download_models(&models, &out_dir).await?;
            println!("✅ Downloaded {} of {} models to {}", written.len(), models.len(), display(&out_dir));
        }

        Command::Icons(args) => {
            let mut options = config.icons;
            if let Some(v) = args.alpha_threshold {
                options.alpha_threshold = v;
            }
            if let Some(v) = args.margin {
                options.margin = v;
            }
            if let Some(v) = args.canvas_size {
                options.canvas_size = v;
            }
            if let Some(v) = args.padding {
                options.padding = v;
            }
            config.icons = options;
            config.validate()?;

            if args.input.is_dir() {
                let written = icon_crop::crop_directory(&args.input, &args.output, &options)?;
                println!("✅ Cropped {} icons", written.len());
            } else {
                icon_crop::crop_file(&args.input, &args.output, &options)?;
                println!("✅ Saved {}", display(&args.output));
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ Failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        std::process::exit(e.exit_code());
    }
}

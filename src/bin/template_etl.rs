use clap::Parser;
use mapprep::app::pipelines::TemplatePipeline;
use mapprep::core::template::catalog::{files_with_extension, SPECS_DIR};
use mapprep::core::template::{ImportTemplate, MatchRuleSet};
use mapprep::utils::validation::{self, Validate};
use mapprep::utils::logger;
use mapprep::{EtlEngine, LocalStorage, PrepConfig, PrepError, Result};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "template-etl")]
#[command(about = "Run an i2 import specification over a CSV/TXT/XLSX file")]
struct Args {
    /// i2 specs directory
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// List available import specifications and exit
    #[arg(long)]
    list_templates: bool,

    /// Template path, or a file name under `<base-dir>/Import Specifications`
    #[arg(long)]
    template: Option<String>,

    /// Input data file
    #[arg(long)]
    input: Option<PathBuf>,

    /// Match rules XML; skipped when the file does not exist
    #[arg(long)]
    matching_file: Option<PathBuf>,

    /// Output JSON path
    #[arg(long)]
    out: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log CPU and memory usage per phase
    #[arg(long)]
    monitor: bool,
}

fn usage_error(message: impl Into<String>) -> PrepError {
    PrepError::ValidationError {
        message: message.into(),
    }
}

/// Template and ETL-config files under the specs directory, sorted.
fn list_templates(base_dir: &Path) -> Result<Vec<PathBuf>> {
    let specs_dir = base_dir.join(SPECS_DIR);
    let mut templates = files_with_extension(&specs_dir, "oimp")?;
    templates.extend(files_with_extension(&specs_dir, "ximp")?);
    templates.sort();
    Ok(templates)
}

fn resolve_template(base_dir: &Path, template: &str) -> Result<PathBuf> {
    let direct = PathBuf::from(template);
    if direct.exists() {
        return Ok(direct);
    }
    let named = base_dir.join(SPECS_DIR).join(template);
    if named.exists() {
        return Ok(named);
    }
    Err(PrepError::NotFound {
        what: format!("template {}", template),
    })
}

async fn run(args: Args) -> Result<()> {
    let config = PrepConfig::load(args.config.as_deref())?;
    config.validate()?;
    let base_dir = args
        .base_dir
        .clone()
        .unwrap_or_else(|| config.template.base_path());

    if args.list_templates {
        let templates = list_templates(&base_dir)?;
        if templates.is_empty() {
            println!("No templates found under {}", base_dir.join(SPECS_DIR).display());
        }
        for path in templates {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let template = args
        .template
        .as_deref()
        .ok_or_else(|| usage_error("--template is required unless --list-templates is used"))?;
    let input = args
        .input
        .clone()
        .ok_or_else(|| usage_error("--input is required unless --list-templates is used"))?;
    validation::validate_existing_path("input", &input.to_string_lossy())?;
    validation::validate_file_extension("input", &input.to_string_lossy(), &["csv", "txt", "tsv", "xlsx"])?;

    let template_path = resolve_template(&base_dir, template)?;
    let template = ImportTemplate::from_file(&template_path)?;
    tracing::info!(
        "📋 Template {}: {} entities, {} links",
        template.file_name,
        template.entities.len(),
        template.links.len()
    );

    let matching_path = match &args.matching_file {
        Some(path) => path.clone(),
        None if args.base_dir.is_some() => base_dir.join(&config.template.matching_file),
        None => config.template.matching_path(),
    };
    let match_rules = if matching_path.exists() {
        let rules = MatchRuleSet::from_file(&matching_path)?;
        tracing::info!("Loaded {} match rules from {}", rules.len(), matching_path.display());
        rules
    } else {
        tracing::debug!("No match rules at {}", matching_path.display());
        MatchRuleSet::default()
    };

    let out = args.out.clone().unwrap_or_else(|| config.template.output.clone());
    validation::validate_file_extension("out", &out, &["json"])?;

    let pipeline = TemplatePipeline::new(LocalStorage::new("."), template, match_rules, input, out);
    let engine = EtlEngine::new_with_monitoring(pipeline, args.monitor);
    let output = engine.run().await?;

    if let Some(meta) = engine.pipeline().last_metadata() {
        println!(
            "✅ {}: {} rows → {} nodes, {} edges",
            meta.template_file, meta.rows_processed, meta.nodes, meta.edges
        );
    }
    println!("📁 Output saved to: {}", output);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    if let Err(e) = run(args).await {
        tracing::error!("❌ Template ETL failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        std::process::exit(e.exit_code());
    }
}

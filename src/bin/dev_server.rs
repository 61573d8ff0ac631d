use clap::Parser;
use mapprep::adapters::companies_house::API_KEY_ENV;
use mapprep::adapters::proxy;
use mapprep::config::env;
use mapprep::utils::{logger, validation::Validate};
use mapprep::{PrepConfig, Result};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dev-server")]
#[command(about = "Static file server with a Companies House proxy under /ch/")]
struct Args {
    /// Port to listen on
    port: Option<u16>,

    /// Directory served for non-proxy paths
    #[arg(long)]
    static_dir: Option<String>,

    /// Env file loaded before reading CH_API_KEY
    #[arg(long)]
    env_file: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON log lines
    #[arg(long)]
    json_logs: bool,
}

async fn run(args: Args) -> Result<()> {
    let mut config = PrepConfig::load(args.config.as_deref())?;
    logger::init_server_logger(args.json_logs || config.server.json_logs);

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(static_dir) = args.static_dir {
        config.server.static_dir = static_dir;
    }
    if let Some(env_file) = args.env_file {
        config.server.env_file = env_file;
    }
    config.validate()?;

    if !env::load_env_file(Path::new(&config.server.env_file)) {
        tracing::warn!(
            "⚠️ No env file at {}; set {} or create one",
            config.server.env_file,
            API_KEY_ENV
        );
    }

    proxy::serve(&config.server, env::optional_var(API_KEY_ENV)).await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("❌ Dev server failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(e.exit_code());
    }
}

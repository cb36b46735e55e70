use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use tiff_ingest_core::{decoder_from_config, logging, Config, LogLevel, Pipeline};

#[derive(Parser)]
#[command(name = "tiff-ingest")]
#[command(about = "Copy every distinct scan into a content-addressed store and record it in a manifest")]
#[command(version)]
struct Cli {
    /// Manifest file to resume from and append to, eg: input.csv
    manifest: PathBuf,

    /// Base directory to scan, eg: ./files
    scan_root: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to a rotating file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Show a progress spinner
    #[arg(long)]
    progress: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), anyhow::Error> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Set up configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Override config with command line arguments
    config.show_progress |= cli.progress;
    config.log_level = match cli.verbose {
        0 => config.log_level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // Initialize logger
    match &cli.log_dir {
        Some(dir) => {
            logging::init_logger(dir, config.log_level.to_level_filter())?;
        }
        None => {
            env_logger::Builder::new()
                .filter_level(config.log_level.to_level_filter())
                .parse_default_env()
                .init();
        }
    }

    info!("args: manifest={} scan_root={}", cli.manifest.display(), cli.scan_root.display());

    if let Err(e) = run(&config, &cli) {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}

fn run(config: &Config, cli: &Cli) -> Result<(), anyhow::Error> {
    // Validate configuration
    config.validate()?;

    let decoder = decoder_from_config(&config.decoder)?;
    let mut pipeline = Pipeline::open(config, &cli.manifest, decoder)?;

    info!("--------- START CUT HERE --------------");
    let summary = pipeline.run(&cli.scan_root)?;
    info!("--------- END CUT HERE --------------");

    println!("{}", summary);
    Ok(())
}

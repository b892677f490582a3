//! gbtim CLI entry point

use clap::{Parser, Subcommand};
use gbtim::{
    commands::{
        cmd_index, cmd_init, cmd_inspect, cmd_list_allocations, cmd_status, cmd_verify,
        print_allocations, print_index_stats, print_record, print_status, print_verify_stats,
    },
    config::Config,
    error::{Error, Result},
    extract::Depth,
    meta::MetaDb,
    progress::LogWriterFactory,
    raw::RawReader,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "gbtim")]
#[command(version, about = "Metadata indexer for GBT intensity-mapping data", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize gbtim configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Index raw instrument files into the metadata store
    Index {
        /// Files or directories to index
        paths: Vec<PathBuf>,

        /// Extraction depth
        #[arg(long, value_enum)]
        depth: Option<Depth>,

        /// Copy-host label recorded for these files (defaults to config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Extract and print a file's metadata without touching the store
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Extraction depth
        #[arg(long, value_enum, default_value = "full")]
        depth: Depth,
    },

    /// Show index status
    Status,

    /// List indexed allocations
    Allocations,

    /// Re-hash this host's copies and flag corruption
    Verify,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Init needs no existing config
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().and_then(|p| p.parent().map(PathBuf::from));
        let config = cmd_init(base_dir, force).await?;
        println!("✓ gbtim initialized");
        println!("  Config: {}", config.paths.config_file.display());
        println!("  Database: {}", config.paths.db_file.display());
        return Ok(());
    }

    // Inspect needs no store either
    if let Commands::Inspect { file, depth } = &cli.command {
        let reader = raw_reader()?;
        let record = cmd_inspect(reader.as_ref(), file, *depth)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            print_record(&record);
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = MetaDb::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Inspect { .. } => unreachable!(),

        Commands::Index { paths, depth, host } => {
            if paths.is_empty() {
                return Err(Error::Config("no input paths given".to_string()));
            }
            let mut config = config;
            if let Some(host) = host {
                config.host = host;
            }
            let depth = depth.unwrap_or(if config.index.full_data {
                Depth::Full
            } else {
                Depth::Header
            });

            let reader = raw_reader()?;
            let stats = cmd_index(&config, &db, reader.as_ref(), &paths, depth).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_index_stats(&stats);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Allocations => {
            let allocations = cmd_list_allocations(&db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&allocations)?);
            } else {
                print_allocations(&allocations);
            }
        }

        Commands::Verify => {
            let stats = cmd_verify(&config, &db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_verify_stats(&stats);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}

#[cfg(feature = "fits")]
fn raw_reader() -> Result<Box<dyn RawReader>> {
    Ok(Box::new(gbtim::raw::FitsReader::new()))
}

#[cfg(not(feature = "fits"))]
fn raw_reader() -> Result<Box<dyn RawReader>> {
    Err(Error::Config(
        "this build cannot decode instrument files; rebuild with --features fits".to_string(),
    ))
}

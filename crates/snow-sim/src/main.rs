//! Snow consensus simulator.
//!
//! Runs an in-memory network of snowball consensus instances until every
//! node has finalized, and reports whether they agreed.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snow_utils::logging::{self, LogLevel};
use tracing::{error, info};

mod config;
mod sim;

use config::SimConfig;

/// Snow consensus simulator CLI
#[derive(Parser)]
#[command(name = "snow-sim")]
#[command(version)]
#[command(about = "Simulates Snow consensus networks", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "snow-sim.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// Seed of the random source
        #[arg(long)]
        seed: Option<u64>,
        /// Number of nodes
        #[arg(long)]
        nodes: Option<usize>,
        /// Number of conflicting colors
        #[arg(long)]
        colors: Option<usize>,
    },
    /// Validate configuration
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        SimConfig::load(&cli.config)?
    } else {
        SimConfig::default()
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    logging::init(&config.logging)?;

    match cli.command {
        Some(Commands::Init { force }) => {
            if cli.config.exists() && !force {
                error!("{:?} already exists; pass --force to overwrite", cli.config);
                std::process::exit(1);
            }
            SimConfig::default().save(&cli.config)?;
            info!("Configuration written to {:?}", cli.config);
        }
        Some(Commands::Validate) => {
            if let Err(e) = config.validate() {
                error!("Configuration invalid: {}", e);
                std::process::exit(1);
            }
            info!("Configuration is valid");
            info!("Parameters: {:?}", config.parameters);
            info!(
                "Network: {} nodes, {} colors",
                config.network.nodes, config.network.colors
            );
        }
        Some(Commands::Run {
            seed,
            nodes,
            colors,
        }) => {
            if let Some(seed) = seed {
                config.network.seed = seed;
            }
            if let Some(nodes) = nodes {
                config.network.nodes = nodes;
            }
            if let Some(colors) = colors {
                config.network.colors = colors;
            }
            simulate(&config)?;
        }
        None => simulate(&config)?,
    }

    Ok(())
}

fn simulate(config: &SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let report = sim::run(config);
    println!("{report}");

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

//! ora-node - run the reconfiguration engine on a simulated sensor node.

use clap::{Parser, Subcommand};
use ora_core::observe::{init_logging, LogFormat, LogLevel};
use ora_core::properties::keys;
use ora_core::NodeConfig;
use ora_sim::{ScenarioConfig, SimNode};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ora-node")]
#[command(version)]
#[command(about = "Self-adaptive transmit-power control on a simulated sensor node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Node configuration file (default: search path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format override (json, pretty, compact)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Scenario file (default: built-in scenario)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Run time in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,

        /// Trigger interval override in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Print metrics in Prometheus text format instead of JSON
        #[arg(long)]
        prometheus: bool,
    },

    /// Validate the node configuration
    Validate,

    /// Show example configuration
    Example,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::load_from(path)?,
        None => NodeConfig::load()?,
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    match cli.command {
        Commands::Example => {
            println!("{}", NodeConfig::example_yaml());
        }
        Commands::Validate => {
            config.validate()?;
            println!("Configuration OK");
        }
        Commands::Run {
            scenario,
            duration,
            interval,
            prometheus,
        } => {
            init_logging(&config.logging);

            let scenario = match scenario {
                Some(path) => ScenarioConfig::load_from(&path)?,
                None => ScenarioConfig::default(),
            };
            if let Some(ms) = interval {
                config
                    .control
                    .properties
                    .insert(keys::TRIGGER_INTERVAL.to_string(), serde_yaml::Value::from(ms));
            }

            let mut node = SimNode::build(&config, &scenario)?;
            node.run_for(Duration::from_secs(duration));
            node.shutdown()?;

            if prometheus {
                print!("{}", node.metrics_prometheus());
            } else {
                println!("{}", serde_json::to_string_pretty(&node.metrics())?);
            }
        }
    }

    Ok(())
}

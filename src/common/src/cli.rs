use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments of the curator binary.
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        help = "Execute the configured actions (may cause data loss); default is a dry run"
    )]
    pub armed: bool,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Run the configured plan (default behavior)
    #[default]
    Run,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use std::path::Path;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments; `RUST_LOG` wins if set.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&Path>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                info!("loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Curator Configuration:");
            println!("======================");
            println!("Provider concurrency: {}", config.provider_concurrency());

            for provider in &config.providers {
                println!(
                    "Provider {:?}: kind {:?}, resource concurrency {}",
                    provider.name,
                    provider.kind,
                    provider.resource_concurrency()
                );
            }
            for resource in &config.resources {
                println!(
                    "Resource {:?}: provider {:?}, {} partition columns",
                    resource.name,
                    resource.provider,
                    resource.columns.len()
                );
            }
            for operation in &config.operations {
                println!(
                    "Operation {:?}: {:?} on {:?}, {} excludes, depends on {:?}",
                    operation.name,
                    operation.action,
                    operation.source,
                    operation.exclude.len(),
                    operation.depends_on
                );
            }
        }
        Ok(())
    }
}

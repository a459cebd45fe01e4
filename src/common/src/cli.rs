use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all convert-qa tools
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that only inspect the configuration
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
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
    use tracing_subscriber::EnvFilter;

    /// Pick the diagnostic level from CLI flags, falling back to the configured one
    pub fn log_level<'a>(args: &CommonArgs, config: &'a Configuration) -> &'a str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            config.logging.level.as_str()
        }
    }

    /// Initialize diagnostic logging on stderr.
    ///
    /// `RUST_LOG` takes precedence over `level`. Records emitted through the
    /// `log` facade are picked up by the subscriber as well.
    pub fn init_logging(level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::debug!("Loading configuration from: {}", path.display());
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
            println!("convert-qa configuration:");
            println!("=========================");
            println!("Table index path: {}", config.archive.index_path);
            println!("Tables directory: {}", config.archive.tables_dir);
            println!("Scrubber chunk size: {} bytes", config.scrubber.chunk_size);
            if config.scrubber.binary_probe_len == 0 {
                println!("Binary guard: disabled");
            } else {
                println!(
                    "Binary guard probe: {} bytes",
                    config.scrubber.binary_probe_len
                );
            }
            println!("Log level: {}", config.logging.level);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::debug!("Validating configuration...");

        if config.archive.index_path.trim().is_empty() {
            anyhow::bail!("Table index path cannot be empty");
        }

        if config.archive.tables_dir.trim().is_empty() {
            anyhow::bail!("Tables directory cannot be empty");
        }

        if config.scrubber.chunk_size == 0 {
            anyhow::bail!("Scrubber chunk size must be greater than zero");
        }

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle the configuration-only subcommands
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Validate => validate_config(config),
        }
    }
}

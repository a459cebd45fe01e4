pub mod clean;
pub mod remove_tables;
pub mod scrub;
pub mod verify;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::ChangeLog;
use common::cli::{CommonArgs, CommonCommands, utils};

/// convert-qa: quality fixes for converted archives
#[derive(Parser)]
#[command(name = "convert-qa", version, about)]
pub struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove empty tables and columns from archives
    CleanEmptyColumns(clean::CleanArgs),
    /// Remove tables by name from an archive
    RemoveTables(remove_tables::RemoveTablesArgs),
    /// Strip control characters from text files
    RemoveControlCharacters(scrub::ScrubArgs),
    /// Check that archives are consistently numbered
    Verify(verify::VerifyArgs),
    #[command(flatten)]
    Common(CommonCommands),
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let config = utils::load_config(self.common.config.as_ref())?;
        utils::init_logging(utils::log_level(&self.common, &config));

        match self.command {
            Commands::CleanEmptyColumns(args) => args.run(&config),
            Commands::RemoveTables(args) => args.run(&config),
            Commands::RemoveControlCharacters(args) => args.run(&config),
            Commands::Verify(args) => args.run(&config),
            Commands::Common(command) => utils::handle_common_command(&command, &config),
        }
    }
}

fn open_change_log(path: &Path) -> anyhow::Result<ChangeLog> {
    ChangeLog::open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

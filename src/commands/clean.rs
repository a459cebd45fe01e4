use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use common::Configuration;
use reindexer::{ArchiveCleaner, ArchiveLayout, CleanupStatus, CommitMetrics};

#[derive(Args)]
pub struct CleanArgs {
    /// Archive root folders
    #[arg(required = true)]
    archives: Vec<PathBuf>,

    /// Write the changes; without it the removals are only reported
    #[arg(long)]
    commit: bool,

    /// Change log to append to
    #[arg(long)]
    log_file: PathBuf,
}

impl CleanArgs {
    pub fn run(&self, config: &Configuration) -> anyhow::Result<()> {
        let mut log = super::open_change_log(&self.log_file)?;
        let metrics = CommitMetrics::new();

        for archive in &self.archives {
            log::info!("Scanning {}", archive.display());
            let layout = ArchiveLayout::with_config(archive, &config.archive);
            let mut cleaner = ArchiveCleaner::new(layout, self.commit, metrics.clone());
            let report = cleaner
                .clean(&mut log)
                .with_context(|| format!("Failed to clean {}", archive.display()))?;

            if report.status == CleanupStatus::ReportOnly {
                log.record(format!(
                    "{}/{} tables and {} columns to remove (use --commit to apply)",
                    report.archive,
                    report.plan.tables_to_remove.len(),
                    report.plan.column_count()
                ))?;
            }
        }

        log.flush()?;
        if self.commit {
            metrics.summary().log();
        }
        Ok(())
    }
}

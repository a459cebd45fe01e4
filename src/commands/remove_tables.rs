use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use common::Configuration;
use reindexer::{
    ArchiveCleaner, ArchiveLayout, CleanupStatus, CommitMetrics, TableIndex, plan_table_removal,
};

#[derive(Args)]
pub struct RemoveTablesArgs {
    /// Archive root folder
    archive: PathBuf,

    /// Display names of the tables to remove, matched case-insensitively
    #[arg(required = true)]
    tables: Vec<String>,

    /// Write the changes; without it the removals are only reported
    #[arg(long)]
    commit: bool,

    /// Change log to append to
    #[arg(long)]
    log_file: PathBuf,
}

impl RemoveTablesArgs {
    pub fn run(&self, config: &Configuration) -> anyhow::Result<()> {
        let mut log = super::open_change_log(&self.log_file)?;
        let layout = ArchiveLayout::with_config(&self.archive, &config.archive);
        let archive = layout.name();

        let index = TableIndex::load(layout.index_path())
            .with_context(|| format!("Failed to read the table index of {archive}"))?;
        let plan = plan_table_removal(&archive, &index, &self.tables, &mut log)?;

        let report = ArchiveCleaner::new(layout, self.commit, CommitMetrics::new())
            .apply(&index, plan, &mut log)
            .with_context(|| format!("Failed to remove tables from {archive}"))?;

        match report.status {
            CleanupStatus::ReportOnly => log.record(format!(
                "{archive}/{} tables to remove (use --commit to apply)",
                report.plan.tables_to_remove.len()
            ))?,
            CleanupStatus::Done => report.metrics.log(),
            CleanupStatus::NoOp => {}
        }

        log.flush()?;
        Ok(())
    }
}

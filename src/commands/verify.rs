use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use common::Configuration;
use reindexer::{ArchiveLayout, verify_archive};

#[derive(Args)]
pub struct VerifyArgs {
    /// Archive root folders
    #[arg(required = true)]
    archives: Vec<PathBuf>,
}

impl VerifyArgs {
    pub fn run(&self, config: &Configuration) -> anyhow::Result<()> {
        let mut inconsistent = 0;

        for archive in &self.archives {
            let layout = ArchiveLayout::with_config(archive, &config.archive);
            let violations = verify_archive(&layout)
                .with_context(|| format!("Failed to verify {}", archive.display()))?;

            if violations.is_empty() {
                println!("{}: ok", layout.name());
                continue;
            }

            inconsistent += 1;
            for violation in &violations {
                println!("{}/{violation}", layout.name());
            }
        }

        if inconsistent > 0 {
            anyhow::bail!("{inconsistent} of {} archives are inconsistent", self.archives.len());
        }
        Ok(())
    }
}

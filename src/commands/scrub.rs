use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use common::Configuration;
use scrubber::{ScrubOptions, Scrubber};

#[derive(Args)]
pub struct ScrubArgs {
    /// Text files to scrub
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Replace the files; without it the control characters are only reported
    #[arg(long)]
    commit: bool,

    /// Keep the original next to the scrubbed file as `<stem>.old.<ext>`
    #[arg(long, requires = "commit")]
    keep: bool,

    /// Change log to append to
    #[arg(long)]
    log_file: PathBuf,
}

impl ScrubArgs {
    pub fn run(&self, config: &Configuration) -> anyhow::Result<()> {
        let mut log = super::open_change_log(&self.log_file)?;
        let options = ScrubOptions::from_config(&config.scrubber)
            .with_commit(self.commit)
            .with_keep(self.keep);
        let scrubber = Scrubber::new(options);

        let mut binary = Vec::new();
        for file in &self.files {
            let report = scrubber
                .scrub(file, &mut log)
                .with_context(|| format!("Failed to scrub {}", file.display()))?;
            if report.is_binary() {
                binary.push(report.file);
            }
        }

        log.flush()?;
        if !binary.is_empty() {
            let names: Vec<String> = binary.iter().map(|f| f.display().to_string()).collect();
            anyhow::bail!("Skipped binary files: {}", names.join(", "));
        }
        Ok(())
    }
}

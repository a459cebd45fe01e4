//! Append-only audit trail of archive and file changes.
//!
//! Every durable decision (removed, moved, skipped, error) is recorded as one
//! line: echoed to the console and appended to the log file with a local
//! timestamp. Progress lines are console-only and are redrawn in place, so the
//! log file stays a complete trail independent of console redraws.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;

use chrono::Local;

enum Sink {
    File(LineWriter<File>),
    Memory(Vec<String>),
}

/// Change log scoped to one CLI invocation
pub struct ChangeLog {
    sink: Sink,
    console: bool,
    progress_width: usize,
}

impl ChangeLog {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            sink: Sink::File(LineWriter::new(file)),
            console: true,
            progress_width: 0,
        })
    }

    /// A change log that keeps entries in memory and stays off the console
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Vec::new()),
            console: false,
            progress_width: 0,
        }
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Record a durable entry
    pub fn record(&mut self, line: impl Display) -> io::Result<()> {
        let line = line.to_string();
        let line = line.trim();

        if self.console {
            self.clear_progress();
            println!("{line}");
        }

        match &mut self.sink {
            Sink::File(file) => {
                let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f");
                writeln!(file, "{timestamp} {line}")
            }
            Sink::Memory(entries) => {
                entries.push(line.to_string());
                Ok(())
            }
        }
    }

    /// Redraw the transient progress line
    pub fn progress(&mut self, line: impl Display) {
        if !self.console {
            return;
        }

        let line = line.to_string();
        let mut stdout = io::stdout().lock();
        let pad = self.progress_width.saturating_sub(line.chars().count());
        let _ = write!(stdout, "\r{line}{}", " ".repeat(pad));
        let _ = stdout.flush();
        self.progress_width = line.chars().count();
    }

    /// Erase the transient progress line, if any
    pub fn clear_progress(&mut self) {
        if !self.console || self.progress_width == 0 {
            return;
        }

        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "\r{}\r", " ".repeat(self.progress_width));
        let _ = stdout.flush();
        self.progress_width = 0;
    }

    /// Entries kept by an in-memory change log
    pub fn entries(&self) -> &[String] {
        match &self.sink {
            Sink::Memory(entries) => entries,
            Sink::File(_) => &[],
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.clear_progress();
        match &mut self.sink {
            Sink::File(file) => file.flush(),
            Sink::Memory(_) => Ok(()),
        }
    }
}

impl Drop for ChangeLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

//! Streaming removal of control bytes from a single file.
//!
//! The file is read in fixed-size chunks. Every control byte is recorded with
//! its absolute offset and dropped. When committing, the surviving bytes go to
//! a hidden temporary sibling that replaces the original only if something was
//! removed. The original is never written to directly.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use common::ChangeLog;
use common::config::ScrubberConfig;

use crate::classifier::{is_control, is_text};
use crate::error::{Result, ScrubError};

#[derive(Debug, Clone)]
pub struct ScrubOptions {
    pub chunk_size: usize,
    /// Prefix inspected by the binary-content guard; 0 disables the guard
    pub binary_probe_len: usize,
    /// Write the scrubbed file
    pub commit: bool,
    /// Keep the original as `<stem>.old<ext>`
    pub keep: bool,
}

impl Default for ScrubOptions {
    fn default() -> Self {
        Self::from_config(&ScrubberConfig::default())
    }
}

impl ScrubOptions {
    pub fn from_config(config: &ScrubberConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            binary_probe_len: config.binary_probe_len,
            commit: false,
            keep: false,
        }
    }

    pub fn with_commit(mut self, commit: bool) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrubOutcome {
    /// Skipped by the binary-content guard
    Binary,
    /// No control bytes found
    Clean { size: u64 },
    /// Control bytes found, and removed from disk when `committed`
    Scrubbed {
        size: u64,
        removed: u64,
        committed: bool,
        preserved: Option<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct ScrubReport {
    pub file: PathBuf,
    pub outcome: ScrubOutcome,
    pub elapsed: Duration,
}

impl ScrubReport {
    pub fn is_binary(&self) -> bool {
        self.outcome == ScrubOutcome::Binary
    }
}

pub struct Scrubber {
    options: ScrubOptions,
}

impl Scrubber {
    pub fn new(options: ScrubOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScrubOptions {
        &self.options
    }

    pub fn scrub(&self, path: &Path, log: &mut ChangeLog) -> Result<ScrubReport> {
        let started = Instant::now();
        let name = file_name(path);

        let mut input = File::open(path).map_err(ScrubError::io(path))?;
        let size = input.metadata().map_err(ScrubError::io(path))?.len();

        if self.options.binary_probe_len > 0
            && is_binary(&mut input, self.options.binary_probe_len).map_err(ScrubError::io(path))?
        {
            tracing::warn!(file = %path.display(), "skipping binary file");
            record(log, format!("{name}/is binary"))?;
            return Ok(ScrubReport {
                file: path.to_path_buf(),
                outcome: ScrubOutcome::Binary,
                elapsed: started.elapsed(),
            });
        }

        let temp = temp_path(path);
        let outcome = match self.scrub_into(path, &temp, &mut input, size, log) {
            Ok(outcome) => outcome,
            Err(err) => {
                discard(&temp);
                return Err(err);
            }
        };

        let elapsed = started.elapsed();
        record(log, format!("{name}/time/{}", format_elapsed(elapsed)))?;
        tracing::info!(
            file = %path.display(),
            size,
            elapsed_ms = elapsed.as_millis() as u64,
            "scrubbed file"
        );

        Ok(ScrubReport {
            file: path.to_path_buf(),
            outcome,
            elapsed,
        })
    }

    fn scrub_into(
        &self,
        path: &Path,
        temp: &Path,
        input: &mut File,
        size: u64,
        log: &mut ChangeLog,
    ) -> Result<ScrubOutcome> {
        let name = file_name(path);

        let mut output = if self.options.commit {
            let file = File::create(temp).map_err(ScrubError::io(temp))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        let removed = self.stream(input, output.as_mut(), path, temp, size, log)?;

        if let Some(output) = output {
            let file = output
                .into_inner()
                .map_err(|err| ScrubError::io(temp)(err.into_error()))?;
            file.sync_all().map_err(ScrubError::io(temp))?;
        }

        if removed == 0 {
            if self.options.commit {
                discard(temp);
            }
            return Ok(ScrubOutcome::Clean { size });
        }

        if !self.options.commit {
            return Ok(ScrubOutcome::Scrubbed {
                size,
                removed,
                committed: false,
                preserved: None,
            });
        }

        let new_size = fs::metadata(temp).map_err(ScrubError::io(temp))?.len();
        let preserved = if self.options.keep {
            let kept = keep_path(path);
            fs::rename(path, &kept).map_err(ScrubError::io(path))?;
            record(log, format!("{name}/preserved {}", file_name(&kept)))?;
            Some(kept)
        } else {
            None
        };

        fs::rename(temp, path).map_err(ScrubError::io(path))?;
        record(log, format!("{name}/saved {new_size}B"))?;
        record(log, format!("{name}/removed {}B", size - new_size))?;

        Ok(ScrubOutcome::Scrubbed {
            size: new_size,
            removed,
            committed: true,
            preserved,
        })
    }

    /// Copy `input` to `output` without control bytes; returns how many were dropped
    fn stream(
        &self,
        input: &mut File,
        mut output: Option<&mut BufWriter<File>>,
        path: &Path,
        temp: &Path,
        size: u64,
        log: &mut ChangeLog,
    ) -> Result<u64> {
        let name = file_name(path);
        let precision = progress_precision(self.options.chunk_size as u64, size);
        let mut buf = vec![0u8; self.options.chunk_size];
        let mut offset: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let read = read_chunk(input, &mut buf).map_err(ScrubError::io(path))?;
            if read == 0 {
                break;
            }
            let chunk = &buf[..read];
            let done = offset + read as u64;
            log.progress(format!(
                "{name}/reading/{:.precision$}%",
                done as f64 / size.max(1) as f64 * 100.0
            ));

            let mut start = 0;
            for (i, byte) in chunk.iter().copied().enumerate() {
                if !is_control(byte) {
                    continue;
                }
                record(log, format!("{name}/{}/{byte:02x}", offset + i as u64))?;
                if let Some(out) = output.as_mut() {
                    out.write_all(&chunk[start..i]).map_err(ScrubError::io(temp))?;
                }
                start = i + 1;
                removed += 1;
            }
            if let Some(out) = output.as_mut() {
                out.write_all(&chunk[start..]).map_err(ScrubError::io(temp))?;
            }

            offset = done;
        }

        log.clear_progress();
        tracing::debug!(file = %path.display(), bytes = offset, removed, "finished reading");
        Ok(removed)
    }
}

/// Whether the first `probe_len` bytes contain anything but text bytes.
///
/// The reader is rewound afterwards.
pub fn is_binary<R: Read + Seek>(reader: &mut R, probe_len: usize) -> std::io::Result<bool> {
    let mut probe = Vec::with_capacity(probe_len);
    reader.by_ref().take(probe_len as u64).read_to_end(&mut probe)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(probe.iter().any(|b| !is_text(*b)))
}

/// Decimal places shown in the progress percentage; grows with the number of
/// chunks in the file
pub fn progress_precision(chunk_size: u64, size: u64) -> usize {
    if chunk_size == 0 || chunk_size >= size {
        return 2;
    }
    let magnitude = (chunk_size as f64 / size as f64).log10().abs().ceil() as i64;
    (magnitude - 2).max(2) as usize
}

/// `H:MM:SS[.ffffff]`
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let micros = elapsed.subsec_micros();
    let clock = format!("{}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60);
    if micros == 0 {
        clock
    } else {
        format!("{clock}.{micros:06}")
    }
}

/// `.<stem>.tmp` next to `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{stem}.tmp"))
}

/// `<stem>.old<ext>` next to `path`
pub fn keep_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.old.{}", ext.to_string_lossy()),
        None => format!("{stem}.old"),
    };
    path.with_file_name(name)
}

fn read_chunk(input: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn discard(temp: &Path) {
    if let Err(err) = fs::remove_file(temp) {
        if err.kind() != ErrorKind::NotFound {
            tracing::warn!(file = %temp.display(), error = %err, "failed to remove temporary file");
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn record(log: &mut ChangeLog, line: String) -> Result<()> {
    log.record(line).map_err(ScrubError::ChangeLog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options(commit: bool) -> ScrubOptions {
        ScrubOptions::default().with_commit(commit)
    }

    fn write(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_removes_control_byte_after_probe() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![b'a'; 6000];
        data[5000] = 0x01;
        let path = write(dir.path(), "data.txt", &data);

        let mut log = ChangeLog::in_memory();
        let report = Scrubber::new(options(true)).scrub(&path, &mut log).unwrap();

        assert_eq!(
            report.outcome,
            ScrubOutcome::Scrubbed {
                size: 5999,
                removed: 1,
                committed: true,
                preserved: None,
            }
        );
        assert_eq!(fs::metadata(&path).unwrap().len(), 5999);
        assert_eq!(log.entries()[0], "data.txt/5000/01");
        assert_eq!(log.entries()[1], "data.txt/saved 5999B");
        assert_eq!(log.entries()[2], "data.txt/removed 1B");
        assert!(log.entries()[3].starts_with("data.txt/time/0:00:00"));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_report_only_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![b'x'; 2000];
        data[1500] = 0x1f;
        let path = write(dir.path(), "data.txt", &data);

        let mut log = ChangeLog::in_memory();
        let report = Scrubber::new(options(false)).scrub(&path, &mut log).unwrap();

        assert!(matches!(
            report.outcome,
            ScrubOutcome::Scrubbed {
                removed: 1,
                committed: false,
                ..
            }
        ));
        assert_eq!(fs::read(&path).unwrap(), data);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_binary_prefix_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "image.bin", b"\x00\x01PNG data");

        let mut log = ChangeLog::in_memory();
        let report = Scrubber::new(options(true)).scrub(&path, &mut log).unwrap();

        assert!(report.is_binary());
        assert_eq!(log.entries(), &["image.bin/is binary".to_string()]);
        assert_eq!(fs::read(&path).unwrap(), b"\x00\x01PNG data");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_disabled_guard_scrubs_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "data.txt", b"\x00abc");

        let mut options = options(true);
        options.binary_probe_len = 0;
        let report = Scrubber::new(options)
            .scrub(&path, &mut ChangeLog::in_memory())
            .unwrap();

        assert!(!report.is_binary());
        assert_eq!(fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_keep_preserves_original() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![b'z'; 3000];
        data[2999] = 0x0b;
        let path = write(dir.path(), "export.csv", &data);

        let mut log = ChangeLog::in_memory();
        let report = Scrubber::new(options(true).with_keep(true))
            .scrub(&path, &mut log)
            .unwrap();

        let kept = dir.path().join("export.old.csv");
        assert!(matches!(
            &report.outcome,
            ScrubOutcome::Scrubbed { preserved: Some(p), .. } if *p == kept
        ));
        assert_eq!(fs::read(&kept).unwrap(), data);
        assert_eq!(fs::metadata(&path).unwrap().len(), 2999);
        assert!(log.entries().contains(&"export.csv/preserved export.old.csv".to_string()));
    }

    #[test]
    fn test_offsets_span_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![b'-'; 2100];
        data[1100] = 0x02;
        data[2099] = 0x03;
        let path = write(dir.path(), "data.txt", &data);

        let mut options = options(true);
        options.chunk_size = 1000;
        let mut log = ChangeLog::in_memory();
        Scrubber::new(options).scrub(&path, &mut log).unwrap();

        assert_eq!(log.entries()[0], "data.txt/1100/02");
        assert_eq!(log.entries()[1], "data.txt/2099/03");
        assert_eq!(fs::read(&path).unwrap(), vec![b'-'; 2098]);
    }

    #[test]
    fn test_clean_file_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "data.txt", b"hello\tworld\r\n");

        let report = Scrubber::new(options(true))
            .scrub(&path, &mut ChangeLog::in_memory())
            .unwrap();

        assert_eq!(report.outcome, ScrubOutcome::Clean { size: 13 });
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.txt", b"");

        let report = Scrubber::new(options(true))
            .scrub(&path, &mut ChangeLog::in_memory())
            .unwrap();

        assert_eq!(report.outcome, ScrubOutcome::Clean { size: 0 });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Scrubber::new(options(true))
            .scrub(&dir.path().join("missing.txt"), &mut ChangeLog::in_memory());
        assert!(matches!(result, Err(ScrubError::Io { .. })));
    }

    #[test]
    fn test_is_binary_rewinds() {
        let mut cursor = Cursor::new(b"abc\x7fdef".to_vec());
        assert!(is_binary(&mut cursor, 1024).unwrap());
        assert_eq!(cursor.position(), 0);

        let mut cursor = Cursor::new(b"abc\x7fdef".to_vec());
        assert!(!is_binary(&mut cursor, 3).unwrap());
    }

    #[test]
    fn test_progress_precision() {
        assert_eq!(progress_precision(1_000_000, 500), 2);
        assert_eq!(progress_precision(1_000_000, 1_000_000), 2);
        assert_eq!(progress_precision(1_000_000, 5_000_000_000), 2);
        assert_eq!(progress_precision(1_000_000, 50_000_000_000), 3);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_elapsed(Duration::from_micros(1_500_000)), "0:00:01.500000");
    }

    #[test]
    fn test_sibling_paths() {
        let path = Path::new("/data/export.csv");
        assert_eq!(temp_path(path), Path::new("/data/.export.tmp"));
        assert_eq!(keep_path(path), Path::new("/data/export.old.csv"));
        assert_eq!(keep_path(Path::new("/data/README")), Path::new("/data/README.old"));
    }
}

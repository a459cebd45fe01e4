//! Commit metrics tracking
//!
//! Counters are shared between clones, so one tracker can follow every archive
//! of a single invocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Metrics for archive commits
#[derive(Debug, Clone)]
pub struct CommitMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    commits_started: AtomicUsize,
    commits_succeeded: AtomicUsize,
    commits_failed: AtomicUsize,
    tables_removed: AtomicUsize,
    columns_removed: AtomicUsize,
    tables_renumbered: AtomicUsize,
    tables_rewritten: AtomicUsize,
    rows_rewritten: AtomicU64,
    bytes_written: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl Default for CommitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                commits_started: AtomicUsize::new(0),
                commits_succeeded: AtomicUsize::new(0),
                commits_failed: AtomicUsize::new(0),
                tables_removed: AtomicUsize::new(0),
                columns_removed: AtomicUsize::new(0),
                tables_renumbered: AtomicUsize::new(0),
                tables_rewritten: AtomicUsize::new(0),
                rows_rewritten: AtomicU64::new(0),
                bytes_written: AtomicU64::new(0),
                total_duration_ms: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_commit_start(&self) {
        self.inner.commits_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_success(&self, duration: Duration) {
        self.inner.commits_succeeded.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_commit_failure(&self) {
        self.inner.commits_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_table_removed(&self) {
        self.inner.tables_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_columns_removed(&self, count: usize) {
        self.inner
            .columns_removed
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record one rewritten table; `renumbered` when its index changed
    pub fn record_table_rewritten(&self, renumbered: bool, rows: u64, bytes: u64) {
        self.inner.tables_rewritten.fetch_add(1, Ordering::Relaxed);
        if renumbered {
            self.inner.tables_renumbered.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.rows_rewritten.fetch_add(rows, Ordering::Relaxed);
        self.inner.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: u64) {
        self.inner.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn commits_started(&self) -> usize {
        self.inner.commits_started.load(Ordering::Relaxed)
    }

    pub fn commits_succeeded(&self) -> usize {
        self.inner.commits_succeeded.load(Ordering::Relaxed)
    }

    pub fn commits_failed(&self) -> usize {
        self.inner.commits_failed.load(Ordering::Relaxed)
    }

    pub fn tables_removed(&self) -> usize {
        self.inner.tables_removed.load(Ordering::Relaxed)
    }

    pub fn columns_removed(&self) -> usize {
        self.inner.columns_removed.load(Ordering::Relaxed)
    }

    pub fn tables_renumbered(&self) -> usize {
        self.inner.tables_renumbered.load(Ordering::Relaxed)
    }

    pub fn tables_rewritten(&self) -> usize {
        self.inner.tables_rewritten.load(Ordering::Relaxed)
    }

    pub fn rows_rewritten(&self) -> u64 {
        self.inner.rows_rewritten.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written.load(Ordering::Relaxed)
    }

    /// Average duration of successful commits
    pub fn avg_duration_ms(&self) -> f64 {
        let total_ms = self.inner.total_duration_ms.load(Ordering::Relaxed) as f64;
        let commits = self.commits_succeeded() as f64;

        if commits > 0.0 {
            total_ms / commits
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            commits_started: self.commits_started(),
            commits_succeeded: self.commits_succeeded(),
            commits_failed: self.commits_failed(),
            tables_removed: self.tables_removed(),
            columns_removed: self.columns_removed(),
            tables_renumbered: self.tables_renumbered(),
            tables_rewritten: self.tables_rewritten(),
            rows_rewritten: self.rows_rewritten(),
            bytes_written: self.bytes_written(),
            avg_duration_ms: self.avg_duration_ms(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub commits_started: usize,
    pub commits_succeeded: usize,
    pub commits_failed: usize,
    pub tables_removed: usize,
    pub columns_removed: usize,
    pub tables_renumbered: usize,
    pub tables_rewritten: usize,
    pub rows_rewritten: u64,
    pub bytes_written: u64,
    pub avg_duration_ms: f64,
}

impl MetricsSummary {
    fn format_mb(bytes: u64) -> String {
        format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
    }

    pub fn log(&self) {
        log::info!("=== Commit Metrics Summary ===");
        log::info!(
            "Commits: {} started, {} succeeded, {} failed",
            self.commits_started,
            self.commits_succeeded,
            self.commits_failed
        );
        log::info!(
            "Removed: {} tables, {} columns",
            self.tables_removed,
            self.columns_removed
        );
        log::info!(
            "Rewritten: {} tables ({} renumbered), {} rows, {} MB",
            self.tables_rewritten,
            self.tables_renumbered,
            self.rows_rewritten,
            Self::format_mb(self.bytes_written)
        );
        log::info!("Average commit duration: {:.2}ms", self.avg_duration_ms);
    }
}

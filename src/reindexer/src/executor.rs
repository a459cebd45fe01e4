//! Cleanup execution
//!
//! Drives one archive through `Scanning -> PlanBuilt -> (NoOp | Committing) ->
//! Done | Failed`. Nothing on disk changes unless the cleaner was created in
//! commit mode; otherwise the plan is only reported.

use std::fmt;

use common::ChangeLog;

use crate::commit::ArchiveCommitter;
use crate::error::Result;
use crate::layout::ArchiveLayout;
use crate::metrics::{CommitMetrics, MetricsSummary};
use crate::model::TableIndex;
use crate::planner::{CleanupPlanner, RemovalPlan, TableScan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPhase {
    Idle,
    Scanning,
    PlanBuilt,
    NoOp,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for CleanupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanupPhase::Idle => "idle",
            CleanupPhase::Scanning => "scanning",
            CleanupPhase::PlanBuilt => "plan built",
            CleanupPhase::NoOp => "no-op",
            CleanupPhase::Committing => "committing",
            CleanupPhase::Done => "done",
            CleanupPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStatus {
    /// A plan was built but not applied
    ReportOnly,
    /// Nothing to remove
    NoOp,
    /// The plan was committed
    Done,
}

#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub archive: String,
    pub status: CleanupStatus,
    pub plan: RemovalPlan,
    /// Per-table scan results; empty when the plan was supplied by the caller
    pub scans: Vec<TableScan>,
    /// Metrics of the tracker this cleaner reports to, taken when the run ended
    pub metrics: MetricsSummary,
}

pub struct ArchiveCleaner {
    layout: ArchiveLayout,
    commit: bool,
    metrics: CommitMetrics,
    phase: CleanupPhase,
}

impl ArchiveCleaner {
    pub fn new(layout: ArchiveLayout, commit: bool, metrics: CommitMetrics) -> Self {
        Self {
            layout,
            commit,
            metrics,
            phase: CleanupPhase::Idle,
        }
    }

    pub fn phase(&self) -> CleanupPhase {
        self.phase
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    pub fn metrics(&self) -> &CommitMetrics {
        &self.metrics
    }

    /// Scan every table for empty columns and remove them when committing
    pub fn clean(&mut self, log: &mut ChangeLog) -> Result<CleanupReport> {
        self.transition(CleanupPhase::Scanning);

        let scanned = TableIndex::load(self.layout.index_path()).and_then(|index| {
            let scans = CleanupPlanner::new(&self.layout).scan(&index, log)?;
            Ok((index, scans))
        });
        let (index, scans) = match scanned {
            Ok(scanned) => scanned,
            Err(err) => {
                self.transition(CleanupPhase::Failed);
                return Err(err);
            }
        };

        let plan = RemovalPlan::from_scans(&scans);
        self.transition(CleanupPhase::PlanBuilt);
        self.finish(&index, plan, scans, log)
    }

    /// Apply a plan built elsewhere against `index`
    pub fn apply(
        &mut self,
        index: &TableIndex,
        plan: RemovalPlan,
        log: &mut ChangeLog,
    ) -> Result<CleanupReport> {
        self.transition(CleanupPhase::PlanBuilt);
        self.finish(index, plan, Vec::new(), log)
    }

    fn finish(
        &mut self,
        index: &TableIndex,
        plan: RemovalPlan,
        scans: Vec<TableScan>,
        log: &mut ChangeLog,
    ) -> Result<CleanupReport> {
        let archive = self.layout.name();

        let status = if plan.is_empty() {
            self.transition(CleanupPhase::NoOp);
            log::info!("{archive}: nothing to remove");
            CleanupStatus::NoOp
        } else if !self.commit {
            log::info!(
                "{archive}: {} tables and {} columns would be removed (report only)",
                plan.tables_to_remove.len(),
                plan.column_count()
            );
            CleanupStatus::ReportOnly
        } else {
            self.transition(CleanupPhase::Committing);
            let committed = ArchiveCommitter::new(&self.layout, index, self.metrics.clone())
                .commit(&plan, log);
            if let Err(err) = committed {
                self.transition(CleanupPhase::Failed);
                return Err(err);
            }
            self.transition(CleanupPhase::Done);
            CleanupStatus::Done
        };

        Ok(CleanupReport {
            archive,
            status,
            plan,
            scans,
            metrics: self.metrics.summary(),
        })
    }

    fn transition(&mut self, next: CleanupPhase) {
        log::debug!("{}: {} -> {}", self.layout.name(), self.phase, next);
        self.phase = next;
    }
}

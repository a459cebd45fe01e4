//! Archive reindexing
//!
//! Finds empty columns and tables in an archive and removes them while keeping
//! the table index, the row data and the schemas consistent under contiguous
//! `table<N>` / `c<M>` numbering.
//!
//! - [`scanner`] streams row data to find columns without any present value
//! - [`planner`] turns scans (or a list of table names) into a [`RemovalPlan`]
//! - [`renumber`] computes positions after removal
//! - [`rewriter`] rewrites the index, row data and schema of a table
//! - [`commit`] applies a plan to the files of an archive
//! - [`executor`] drives one archive from scan to commit

pub mod commit;
pub mod document;
pub mod error;
pub mod executor;
pub mod layout;
pub mod metrics;
pub mod model;
pub mod planner;
pub mod renumber;
pub mod rewriter;
pub mod rows;
pub mod scanner;
pub mod verify;

pub use commit::ArchiveCommitter;
pub use error::{ReindexError, Result};
pub use executor::{ArchiveCleaner, CleanupPhase, CleanupReport, CleanupStatus};
pub use layout::ArchiveLayout;
pub use metrics::{CommitMetrics, MetricsSummary};
pub use model::{ColumnId, TableDescriptor, TableIndex};
pub use planner::{CleanupPlanner, RemovalPlan, TableScan, TableVerdict, plan_table_removal};
pub use renumber::{Renumbering, new_index};
pub use scanner::{ScanCompletion, ScanOutcome, scan_table};
pub use verify::{Violation, verify_archive};

//! Removal planning
//!
//! Scans every table of an archive and classifies it as unchanged, fully empty
//! or partially empty. Planning is read-only and can be repeated freely; the
//! resulting [`RemovalPlan`] is only acted upon by the committer.

use std::collections::{BTreeMap, BTreeSet};

use common::ChangeLog;

use crate::error::Result;
use crate::layout::ArchiveLayout;
use crate::model::{ColumnId, TableDescriptor, TableIndex};
use crate::renumber::Renumbering;
use crate::scanner::{ScanOutcome, scan_table};

/// Tables and columns to delete in one commit, in original numbering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    pub tables_to_remove: BTreeSet<u32>,
    pub columns_to_remove: BTreeMap<u32, BTreeSet<ColumnId>>,
}

impl RemovalPlan {
    pub fn remove_table(&mut self, index: u32) {
        self.tables_to_remove.insert(index);
    }

    pub fn remove_columns(&mut self, table: u32, columns: impl IntoIterator<Item = ColumnId>) {
        let entry = self.columns_to_remove.entry(table).or_default();
        entry.extend(columns);
        if entry.is_empty() {
            self.columns_to_remove.remove(&table);
        }
    }

    /// Columns removed from a surviving table; ignored for removed tables
    pub fn removed_columns(&self, table: u32) -> Option<&BTreeSet<ColumnId>> {
        if self.tables_to_remove.contains(&table) {
            return None;
        }
        self.columns_to_remove.get(&table).filter(|c| !c.is_empty())
    }

    pub fn table_renumbering(&self) -> Renumbering {
        Renumbering::new(self.tables_to_remove.clone())
    }

    pub fn column_renumbering(&self, table: u32) -> Renumbering {
        self.removed_columns(table)
            .map(|columns| columns.iter().map(|c| c.number()).collect())
            .unwrap_or_default()
    }

    /// Number of columns removed from surviving tables
    pub fn column_count(&self) -> usize {
        self.columns_to_remove
            .keys()
            .filter_map(|table| self.removed_columns(*table))
            .map(BTreeSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables_to_remove.is_empty() && self.column_count() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableVerdict {
    Unchanged,
    /// Every column is empty, the table goes
    Empty,
    /// Some columns are empty and go
    EmptyColumns(BTreeSet<ColumnId>),
}

#[derive(Debug, Clone)]
pub struct TableScan {
    pub table: u32,
    pub verdict: TableVerdict,
    pub outcome: ScanOutcome,
}

impl TableScan {
    fn classify(table: &TableDescriptor, outcome: ScanOutcome) -> Self {
        let verdict = if outcome.empty_columns.len() == table.columns.len() {
            TableVerdict::Empty
        } else if outcome.empty_columns.is_empty() {
            TableVerdict::Unchanged
        } else {
            TableVerdict::EmptyColumns(outcome.empty_columns.clone())
        };

        Self {
            table: table.index,
            verdict,
            outcome,
        }
    }
}

impl RemovalPlan {
    pub fn from_scans<'a>(scans: impl IntoIterator<Item = &'a TableScan>) -> Self {
        let mut plan = Self::default();
        for scan in scans {
            match &scan.verdict {
                TableVerdict::Unchanged => {}
                TableVerdict::Empty => plan.remove_table(scan.table),
                TableVerdict::EmptyColumns(columns) => {
                    plan.remove_columns(scan.table, columns.iter().copied())
                }
            }
        }
        plan
    }
}

/// Builds removal plans for one archive
pub struct CleanupPlanner<'a> {
    layout: &'a ArchiveLayout,
}

impl<'a> CleanupPlanner<'a> {
    pub fn new(layout: &'a ArchiveLayout) -> Self {
        Self { layout }
    }

    /// Scan every table of `index` and record what is empty
    pub fn scan(&self, index: &TableIndex, log: &mut ChangeLog) -> Result<Vec<TableScan>> {
        let archive = self.layout.name();
        let mut scans = Vec::with_capacity(index.tables.len());

        for table in &index.tables {
            log.progress(format!("{archive}/{}/{}...", table.folder, table.name));

            let outcome = scan_table(&self.layout.rows_path(table.index), table.column_ids())?;
            let scan = TableScan::classify(table, outcome);

            match &scan.verdict {
                TableVerdict::Unchanged => log.clear_progress(),
                TableVerdict::Empty => {
                    log.record(format!("{archive}/{}/{}/empty", table.folder, table.name))?;
                }
                TableVerdict::EmptyColumns(columns) => {
                    for column in table.columns.iter().filter(|c| columns.contains(&c.id)) {
                        log.record(format!(
                            "{archive}/{}/{}/{}/{}/empty",
                            table.folder, table.name, column.id, column.name
                        ))?;
                    }
                }
            }

            scans.push(scan);
        }

        log::debug!(
            "Planning for {archive} complete: scanned {} tables",
            scans.len()
        );

        Ok(scans)
    }

    pub fn plan(&self, index: &TableIndex, log: &mut ChangeLog) -> Result<RemovalPlan> {
        let scans = self.scan(index, log)?;
        Ok(RemovalPlan::from_scans(&scans))
    }
}

/// Plan the removal of tables selected by display name (case-insensitive).
///
/// Names that match no table are recorded as `not found`.
pub fn plan_table_removal(
    archive: &str,
    index: &TableIndex,
    names: &[String],
    log: &mut ChangeLog,
) -> Result<RemovalPlan> {
    let mut plan = RemovalPlan::default();

    for name in names {
        match index.table_by_name(name) {
            Some(table) => {
                log.record(format!("{archive}/{}/{}/selected", table.folder, table.name))?;
                plan.remove_table(table.index);
            }
            None => log.record(format!("{archive}/-------/{}/not found", name.to_lowercase()))?,
        }
    }

    Ok(plan)
}

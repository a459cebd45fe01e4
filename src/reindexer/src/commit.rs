//! Archive commit
//!
//! Applies a [`RemovalPlan`] to the files of one archive. Work happens in a
//! fixed order: removed table folders are deleted, the index is rewritten once,
//! then surviving tables are rewritten and moved from the lowest original index
//! to the highest. Indices only ever decrease, so a folder is never moved into
//! a slot that a later table still occupies.
//!
//! There is no rollback. Any failure after the first change surfaces as
//! [`ReindexError::CommitInterrupted`].

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use common::ChangeLog;

use crate::error::{ReindexError, Result};
use crate::layout::ArchiveLayout;
use crate::metrics::CommitMetrics;
use crate::model::{TableDescriptor, TableIndex, table_folder};
use crate::planner::RemovalPlan;
use crate::rewriter::{IndexRewriter, RowCursor, RowRewriter, SchemaRewriter, replace};

pub struct ArchiveCommitter<'a> {
    layout: &'a ArchiveLayout,
    index: &'a TableIndex,
    metrics: CommitMetrics,
}

impl<'a> ArchiveCommitter<'a> {
    /// `index` must be the index the plan was built from
    pub fn new(layout: &'a ArchiveLayout, index: &'a TableIndex, metrics: CommitMetrics) -> Self {
        Self {
            layout,
            index,
            metrics,
        }
    }

    pub fn commit(&self, plan: &RemovalPlan, log: &mut ChangeLog) -> Result<()> {
        let archive = self.layout.name();
        let started = Instant::now();
        self.metrics.record_commit_start();

        log::info!(
            "Committing {archive}: removing {} tables and {} columns",
            plan.tables_to_remove.len(),
            plan.column_count()
        );

        let mut touched = false;
        match self.apply(plan, log, &archive, &mut touched) {
            Ok(()) => {
                self.metrics.record_commit_success(started.elapsed());
                log.record(format!(
                    "{archive}/{} tables and {} columns removed",
                    plan.tables_to_remove.len(),
                    plan.column_count()
                ))?;
                Ok(())
            }
            Err(source) if !touched => {
                self.metrics.record_commit_failure();
                log.clear_progress();
                log::error!("Commit of {archive} failed before any change: {source}");
                Err(source)
            }
            Err(source) => {
                self.metrics.record_commit_failure();
                log.clear_progress();
                log::error!("Commit of {archive} failed: {source}");

                let entries = [
                    format!("ERROR: {source}"),
                    format!(
                        "ERROR: The operation was interrupted before all changes could be written. Archive {archive} is likely corrupted."
                    ),
                ];
                for entry in entries {
                    if let Err(err) = log.record(entry) {
                        log::error!("Failed to write change log: {err}");
                    }
                }

                Err(ReindexError::CommitInterrupted {
                    archive,
                    source: Box::new(source),
                })
            }
        }
    }

    /// `touched` is set before the first change to the archive itself.
    /// Hidden temporary files do not count.
    fn apply(
        &self,
        plan: &RemovalPlan,
        log: &mut ChangeLog,
        archive: &str,
        touched: &mut bool,
    ) -> Result<()> {
        // Prepare the index first so malformed input fails before anything is deleted
        let index_temp = IndexRewriter::new(plan).rewrite_file(self.layout.index_path())?;

        for &index in &plan.tables_to_remove {
            *touched = true;
            self.remove_table(index, log, archive)?;
        }

        self.metrics.record_bytes_written(file_size(&index_temp)?);
        *touched = true;
        replace(&index_temp, self.layout.index_path())?;
        log::debug!("Rewrote {}", self.layout.index_path().display());

        let renumbering = plan.table_renumbering();
        let mut tables: Vec<&TableDescriptor> = self.index.tables.iter().collect();
        tables.sort_by_key(|table| table.index);

        for table in tables {
            let Some(new_index) = renumbering.new_index(table.index) else {
                continue;
            };
            if new_index == table.index && plan.removed_columns(table.index).is_none() {
                continue;
            }
            self.rewrite_table(table, new_index, plan, log, archive, touched)?;
        }

        Ok(())
    }

    fn remove_table(&self, index: u32, log: &mut ChangeLog, archive: &str) -> Result<()> {
        let folder = table_folder(index);
        let name = self
            .index
            .table(index)
            .map(|table| table.name.as_str())
            .unwrap_or_default();

        log.progress(format!("{archive}/{folder}/{name}/removing..."));
        match fs::remove_dir_all(self.layout.table_dir(index)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!("{archive}/{folder} was already gone");
            }
            Err(err) => return Err(err.into()),
        }

        log.record(format!("{archive}/{folder}/{name}/removed"))?;
        self.metrics.record_table_removed();
        Ok(())
    }

    fn rewrite_table(
        &self,
        table: &TableDescriptor,
        new_index: u32,
        plan: &RemovalPlan,
        log: &mut ChangeLog,
        archive: &str,
        touched: &mut bool,
    ) -> Result<()> {
        let prefix = format!("{archive}/{}/{}", table.folder, table.name);
        let columns = plan.column_renumbering(table.index);
        let new_folder = table_folder(new_index);

        log.progress(format!("{prefix}/rewriting..."));

        let old_dir = self.layout.table_dir(table.index);
        let new_dir = self.layout.table_dir(new_index);
        let rows_path = self.layout.rows_path(table.index);
        let schema_path = self.layout.schema_path(table.index);

        if new_index != table.index && new_dir.exists() {
            return Err(ReindexError::SlotOccupied { path: new_dir });
        }

        let mut cursor = RowCursor::default();
        let rows_temp = RowRewriter::new(columns.clone(), new_index, table.columns.len() as u32)
            .rewrite_file(&rows_path, &mut cursor)?;
        let schema_temp = SchemaRewriter::new(columns.clone(), new_index).rewrite_file(&schema_path)?;
        let bytes = file_size(&rows_temp)? + file_size(&schema_temp)?;

        *touched = true;
        fs::remove_file(&rows_path)?;
        fs::remove_file(&schema_path)?;
        replace(&rows_temp, &old_dir.join(format!("{new_folder}.xml")))?;
        replace(&schema_temp, &old_dir.join(format!("{new_folder}.xsd")))?;

        if new_index != table.index {
            fs::rename(&old_dir, &new_dir)?;
        }

        for column in table.columns.iter().filter(|c| columns.is_removed(c.id.number())) {
            log.record(format!("{prefix}/{}/{}/removed", column.id, column.name))?;
        }
        if new_index != table.index {
            log.record(format!("{prefix}/moved to {new_folder}"))?;
        }

        log::debug!(
            "Rewrote {prefix}: {} rows, {} cells dropped, {bytes} bytes",
            cursor.rows,
            cursor.cells_dropped
        );
        self.metrics
            .record_columns_removed(columns.removed().len());
        self.metrics
            .record_table_rewritten(new_index != table.index, cursor.rows, bytes);
        Ok(())
    }
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnId;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<siardDiark xmlns="http://www.sa.dk/xmlns/diark/1.0">
  <tables>
    <table>
      <name>A</name>
      <folder>table1</folder>
      <columns>
        <column><name>id</name><columnID>c1</columnID><type>INTEGER</type><nullable>false</nullable></column>
        <column><name>gone</name><columnID>c2</columnID><type>INTEGER</type><nullable>true</nullable></column>
      </columns>
    </table>
    <table>
      <name>B</name>
      <folder>table2</folder>
      <columns>
        <column><name>id</name><columnID>c1</columnID><type>INTEGER</type><nullable>false</nullable></column>
      </columns>
    </table>
  </tables>
</siardDiark>
"#;

    fn rows(index: u32, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<table xsi:schemaLocation="http://www.sa.dk/xmlns/siard/1.0/schema0/table{index}.xsd ./table{index}.xsd" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns="http://www.sa.dk/xmlns/siard/1.0/schema0/table{index}.xsd">
{body}
</table>
"#
        )
    }

    fn schema(index: u32, columns: u32) -> String {
        let elements: String = (1..=columns)
            .map(|c| format!("\n      <xs:element name=\"c{c}\" type=\"xs:string\"/>"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns="http://www.sa.dk/xmlns/siard/1.0/schema0/table{index}.xsd" xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="http://www.sa.dk/xmlns/siard/1.0/schema0/table{index}.xsd">
  <xs:complexType name="rowType">
    <xs:sequence>{elements}
    </xs:sequence>
  </xs:complexType>
</xs:schema>
"#
        )
    }

    fn archive(dir: &Path) -> ArchiveLayout {
        let layout = ArchiveLayout::new(dir.join("AVID.TEST.1"));
        fs::create_dir_all(layout.index_path().parent().unwrap()).unwrap();
        fs::write(layout.index_path(), INDEX).unwrap();
        for (index, columns, body) in [
            (1, 2, "<row><c1>1</c1><c2/></row>"),
            (2, 1, "<row><c1>7</c1></row>"),
        ] {
            fs::create_dir_all(layout.table_dir(index)).unwrap();
            fs::write(layout.rows_path(index), rows(index, body)).unwrap();
            fs::write(layout.schema_path(index), schema(index, columns)).unwrap();
        }
        layout
    }

    #[test]
    fn test_commit_removes_columns_and_moves_tables() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path());
        let index = TableIndex::load(layout.index_path()).unwrap();

        let mut plan = RemovalPlan::default();
        plan.remove_table(1);
        plan.remove_columns(1, [ColumnId(2)]);

        let metrics = CommitMetrics::new();
        let mut log = ChangeLog::in_memory();
        ArchiveCommitter::new(&layout, &index, metrics.clone())
            .commit(&plan, &mut log)
            .unwrap();

        let rewritten = TableIndex::load(layout.index_path()).unwrap();
        assert_eq!(rewritten.tables.len(), 1);
        assert_eq!(rewritten.tables[0].name, "B");
        assert!(layout.rows_path(1).exists());
        assert!(!layout.table_dir(2).exists());
        assert!(
            fs::read_to_string(layout.rows_path(1))
                .unwrap()
                .contains("schema0/table1.xsd ./table1.xsd")
        );

        assert_eq!(
            log.entries(),
            &[
                "AVID.TEST.1/table1/A/removed".to_string(),
                "AVID.TEST.1/table2/B/moved to table1".to_string(),
                "AVID.TEST.1/1 tables and 0 columns removed".to_string(),
            ]
        );
        assert_eq!(metrics.tables_removed(), 1);
        assert_eq!(metrics.tables_renumbered(), 1);
        assert_eq!(metrics.commits_succeeded(), 1);
    }

    #[test]
    fn test_commit_removes_columns_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path());
        let index = TableIndex::load(layout.index_path()).unwrap();

        let mut plan = RemovalPlan::default();
        plan.remove_columns(1, [ColumnId(2)]);

        let mut log = ChangeLog::in_memory();
        ArchiveCommitter::new(&layout, &index, CommitMetrics::new())
            .commit(&plan, &mut log)
            .unwrap();

        let data = fs::read_to_string(layout.rows_path(1)).unwrap();
        assert!(data.contains("<row><c1>1</c1></row>"));
        assert!(!fs::read_to_string(layout.schema_path(1)).unwrap().contains("\"c2\""));
        assert!(!layout.table_dir(1).join(".table1.xml").exists());
        assert_eq!(
            log.entries()[0],
            "AVID.TEST.1/table1/A/c2/gone/removed".to_string()
        );
    }

    #[test]
    fn test_failed_rewrite_interrupts_commit() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path());
        let index = TableIndex::load(layout.index_path()).unwrap();
        fs::create_dir(layout.table_dir(2).join(".table2.xml")).unwrap();

        let mut plan = RemovalPlan::default();
        plan.remove_table(1);

        let metrics = CommitMetrics::new();
        let mut log = ChangeLog::in_memory();
        let err = ArchiveCommitter::new(&layout, &index, metrics.clone())
            .commit(&plan, &mut log)
            .unwrap_err();

        assert!(err.is_commit_interrupted());
        assert!(log.entries().last().unwrap().contains("AVID.TEST.1 is likely corrupted"));
        assert_eq!(metrics.commits_failed(), 1);
        // No rollback: the index is already rewritten, table2 not yet moved
        assert_eq!(TableIndex::read(layout.index_path()).unwrap().tables.len(), 1);
        assert!(layout.rows_path(2).exists());
    }

    #[test]
    fn test_occupied_slot_interrupts_commit() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path());

        // An index listing table1 and table3, with a stray table2 folder on disk
        let mut index = TableIndex::load(layout.index_path()).unwrap();
        index.tables[1].index = 3;
        index.tables[1].folder = table_folder(3);
        fs::create_dir_all(layout.table_dir(3)).unwrap();
        fs::write(layout.rows_path(3), rows(3, "<row><c1>7</c1></row>")).unwrap();
        fs::write(layout.schema_path(3), schema(3, 1)).unwrap();

        let mut plan = RemovalPlan::default();
        plan.remove_table(1);

        let mut log = ChangeLog::in_memory();
        let err = ArchiveCommitter::new(&layout, &index, CommitMetrics::new())
            .commit(&plan, &mut log)
            .unwrap_err();

        match err {
            ReindexError::CommitInterrupted { source, .. } => {
                assert!(matches!(*source, ReindexError::SlotOccupied { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        // The guard trips before table3 is rewritten
        assert!(layout.rows_path(3).exists());
        assert!(layout.schema_path(3).exists());
        assert!(!layout.table_dir(3).join("table2.xml").exists());
        assert!(!layout.table_dir(3).join(".table3.xml").exists());
    }

    #[test]
    fn test_malformed_index_fails_before_any_change() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path());
        let index = TableIndex::load(layout.index_path()).unwrap();
        fs::write(layout.index_path(), "<catalog/>").unwrap();

        let mut plan = RemovalPlan::default();
        plan.remove_table(2);
        plan.remove_columns(1, [ColumnId(2)]);

        let metrics = CommitMetrics::new();
        let mut log = ChangeLog::in_memory();
        let err = ArchiveCommitter::new(&layout, &index, metrics.clone())
            .commit(&plan, &mut log)
            .unwrap_err();

        assert!(matches!(err, ReindexError::Malformed { .. }));
        assert!(log.entries().is_empty());
        assert_eq!(metrics.commits_failed(), 1);
        assert!(layout.table_dir(2).exists());
        assert!(fs::read_to_string(layout.rows_path(1)).unwrap().contains("<c2/>"));
    }
}

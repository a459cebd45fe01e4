//! Archive consistency checks
//!
//! Read-only. Reports every departure from contiguous numbering and every
//! disagreement between the index, the schemas and the row data.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::document::Document;
use crate::error::{ReindexError, Result};
use crate::layout::ArchiveLayout;
use crate::model::{ColumnId, TableDescriptor, TableIndex, parse_table_folder};
use crate::rewriter::{retarget_table_tokens, schema_columns};
use crate::rows::RowReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Archive-relative location, e.g. `table2/table2.xsd`
    pub location: String,
    pub reason: String,
}

impl Violation {
    fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.reason)
    }
}

/// Check the archive at `layout`; an empty result means it is consistent.
///
/// Only an unreadable index is an error. Problems with individual tables are
/// reported as violations.
pub fn verify_archive(layout: &ArchiveLayout) -> Result<Vec<Violation>> {
    let index = TableIndex::read(layout.index_path())?;
    let mut violations: Vec<Violation> = index
        .numbering_violations()
        .into_iter()
        .map(|reason| Violation::new("index", reason))
        .collect();

    for table in &index.tables {
        if let Err(err) = verify_table(layout, table, &mut violations) {
            violations.push(Violation::new(&table.folder, err.to_string()));
        }
    }

    verify_folders(layout, &index, &mut violations)?;

    log::debug!(
        "Verified {}: {} tables, {} violations",
        layout.name(),
        index.tables.len(),
        violations.len()
    );
    Ok(violations)
}

fn verify_table(
    layout: &ArchiveLayout,
    table: &TableDescriptor,
    violations: &mut Vec<Violation>,
) -> Result<()> {
    let folder = &table.folder;
    if !layout.table_dir(table.index).is_dir() {
        violations.push(Violation::new(folder, "table folder is missing"));
        return Ok(());
    }

    let declared: Vec<String> = table.column_ids().map(|id| id.to_string()).collect();

    let schema_path = layout.schema_path(table.index);
    let location = format!("{folder}/{folder}.xsd");
    if schema_path.is_file() {
        let document = Document::read(&schema_path)?;
        let columns = schema_columns(&document)?;
        if columns != declared {
            violations.push(Violation::new(
                &location,
                format!("declares {columns:?} but the index lists {declared:?}"),
            ));
        }
        if let Some(root) = document.root() {
            for name in ["xmlns", "targetNamespace"] {
                let value = root.attribute(name)?.unwrap_or_default();
                if !names_table(&value, table.index) {
                    violations.push(Violation::new(
                        &location,
                        format!("{name} {value:?} does not name {folder}"),
                    ));
                }
            }
        }
    } else {
        violations.push(Violation::new(&location, "schema file is missing"));
    }

    let rows_path = layout.rows_path(table.index);
    let location = format!("{folder}/{folder}.xml");
    if rows_path.is_file() {
        verify_rows(&rows_path, table, &location, violations)?;
    } else {
        violations.push(Violation::new(&location, "row-data file is missing"));
    }

    Ok(())
}

fn verify_rows(
    path: &Path,
    table: &TableDescriptor,
    location: &str,
    violations: &mut Vec<Violation>,
) -> Result<()> {
    let mut reader = RowReader::open(path)?;
    let column_count = table.columns.len() as u32;

    let mut named = false;
    for attr in reader.container().attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        if retarget_table_tokens(&value, table.index).is_some() {
            named = true;
            if !names_table(&value, table.index) {
                violations.push(Violation::new(
                    location,
                    format!("container refers to {value:?}"),
                ));
            }
        }
    }
    if !named {
        violations.push(Violation::new(location, "container does not name its table"));
    }

    while let Some(row) = reader.next_row()? {
        let mut previous: Option<ColumnId> = None;
        for cell in &row.cells {
            if cell.column.number() > column_count {
                violations.push(Violation::new(
                    location,
                    format!("row {} has undeclared {}", reader.rows_read(), cell.column),
                ));
                return Ok(());
            }
            if previous.is_some_and(|p| p >= cell.column) {
                violations.push(Violation::new(
                    location,
                    format!("row {} has {} out of order", reader.rows_read(), cell.column),
                ));
                return Ok(());
            }
            previous = Some(cell.column);
        }
    }

    Ok(())
}

/// Folders under the tables directory that the index does not list
fn verify_folders(
    layout: &ArchiveLayout,
    index: &TableIndex,
    violations: &mut Vec<Violation>,
) -> Result<()> {
    let entries = match fs::read_dir(layout.tables_dir()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if !index.tables.is_empty() {
                violations.push(Violation::new("tables", "tables directory is missing"));
            }
            return Ok(());
        }
        Err(err) => return Err(ReindexError::Io(err)),
    };

    let mut unexpected = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(number) = parse_table_folder(&name) {
            if index.table(number).is_none() {
                unexpected.push((number, name));
            }
        }
    }
    unexpected.sort();

    for (_, name) in unexpected {
        violations.push(Violation::new(name, "folder is not listed in the index"));
    }
    Ok(())
}

/// Every table token in `value` names the table at `index`
fn names_table(value: &str, index: u32) -> bool {
    retarget_table_tokens(value, index).as_deref() == Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<siardDiark><tables>
<table><name>T</name><folder>table1</folder><columns>
<column><name>a</name><columnID>c1</columnID></column>
<column><name>b</name><columnID>c2</columnID></column>
</columns></table>
</tables></siardDiark>"#;

    const SCHEMA: &str = r#"<xs:schema xmlns="urn:table1.xsd" xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:table1.xsd">
<xs:complexType name="rowType"><xs:sequence>
<xs:element name="c1" type="xs:integer"/>
<xs:element name="c2" type="xs:integer"/>
</xs:sequence></xs:complexType>
</xs:schema>"#;

    fn archive(dir: &Path, rows: &str, schema: &str) -> ArchiveLayout {
        let layout = ArchiveLayout::new(dir.join("archive"));
        fs::create_dir_all(layout.index_path().parent().unwrap()).unwrap();
        fs::create_dir_all(layout.table_dir(1)).unwrap();
        fs::write(layout.index_path(), INDEX).unwrap();
        fs::write(
            layout.rows_path(1),
            format!(r#"<table xmlns="urn:table1.xsd">{rows}</table>"#),
        )
        .unwrap();
        fs::write(layout.schema_path(1), schema).unwrap();
        layout
    }

    #[test]
    fn test_consistent_archive() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path(), "<row><c1>1</c1><c2>2</c2></row><row/>", SCHEMA);

        assert_eq!(verify_archive(&layout).unwrap(), Vec::new());
    }

    #[test]
    fn test_schema_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        let schema = SCHEMA.replace("name=\"c2\"", "name=\"c3\"");
        let layout = archive(dir.path(), "", &schema);

        let violations = verify_archive(&layout).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].location, "table1/table1.xsd");
    }

    #[test]
    fn test_stale_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let schema = SCHEMA.replace("targetNamespace=\"urn:table1.xsd\"", "targetNamespace=\"urn:table4.xsd\"");
        let layout = archive(dir.path(), "", &schema);

        let violations = verify_archive(&layout).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].reason.starts_with("targetNamespace"));
    }

    #[test]
    fn test_row_order_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path(), "<row><c2>1</c2><c1>2</c1></row>", SCHEMA);
        let violations = verify_archive(&layout).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].reason.contains("out of order"));

        let layout = archive(dir.path(), "<row><c1>1</c1><c3>2</c3></row>", SCHEMA);
        let violations = verify_archive(&layout).unwrap();
        assert!(violations[0].reason.contains("undeclared c3"));
    }

    #[test]
    fn test_missing_and_unexpected_folders() {
        let dir = tempfile::tempdir().unwrap();
        let layout = archive(dir.path(), "", SCHEMA);
        fs::rename(layout.table_dir(1), layout.table_dir(2)).unwrap();

        let violations = verify_archive(&layout).unwrap();
        let rendered: Vec<String> = violations.iter().map(Violation::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "table1: table folder is missing".to_string(),
                "table2: folder is not listed in the index".to_string(),
            ]
        );
    }
}

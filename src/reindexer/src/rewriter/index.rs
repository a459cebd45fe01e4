//! Table index rewriting
//!
//! The index document is small and is rewritten in memory. Only `<folder>`,
//! `<columnID>` and the dropped `<table>`/`<column>` entries change; every
//! other element and attribute is written back as read.

use std::path::{Path, PathBuf};

use crate::document::{Document, Element};
use crate::error::{ReindexError, Result};
use crate::model::{ColumnId, TableIndex, parse_table_folder, table_folder};
use crate::planner::RemovalPlan;
use crate::rewriter::write_temp;

/// The index as it reads after `plan` is committed
pub fn renumber_index(index: &TableIndex, plan: &RemovalPlan) -> TableIndex {
    let renumbering = plan.table_renumbering();

    let tables = index
        .tables
        .iter()
        .filter_map(|table| {
            let new_index = renumbering.new_index(table.index)?;
            let columns = plan.column_renumbering(table.index);

            let mut table = table.clone();
            table.columns = table
                .columns
                .into_iter()
                .filter_map(|mut column| {
                    column.id = ColumnId(columns.new_index(column.id.number())?);
                    Some(column)
                })
                .collect();
            table.index = new_index;
            table.folder = table_folder(new_index);
            Some(table)
        })
        .collect();

    TableIndex { tables }
}

pub struct IndexRewriter<'a> {
    plan: &'a RemovalPlan,
}

impl<'a> IndexRewriter<'a> {
    pub fn new(plan: &'a RemovalPlan) -> Self {
        Self { plan }
    }

    /// Apply the plan to a parsed index document
    pub fn rewrite(&self, document: &mut Document) -> Result<()> {
        let path = document.path().to_path_buf();
        let root = document.require_root_mut("siardDiark")?;
        let tables = root
            .child_mut("tables")
            .ok_or_else(|| ReindexError::malformed(&path, "index has no <tables> element"))?;

        let renumbering = self.plan.table_renumbering();
        tables.retain_elements(|table| {
            if !table.is("table") {
                return Ok(true);
            }
            Ok(!renumbering.is_removed(table_index(table, &path)?))
        })?;

        for table in tables.elements_mut().filter(|e| e.is("table")) {
            let index = table_index(table, &path)?;
            if let Some(new_index) = renumbering.new_index(index) {
                if new_index != index {
                    if let Some(folder) = table.child_mut("folder") {
                        folder.set_text(&table_folder(new_index));
                    }
                }
            }

            if self.plan.removed_columns(index).is_some() {
                self.rewrite_columns(table, index, &path)?;
            }
        }

        Ok(())
    }

    fn rewrite_columns(&self, table: &mut Element, index: u32, path: &Path) -> Result<()> {
        let renumbering = self.plan.column_renumbering(index);
        let Some(columns) = table.child_mut("columns") else {
            return Err(ReindexError::malformed(
                path,
                format!("{} has no <columns> element", table_folder(index)),
            ));
        };

        columns.retain_elements(|column| {
            if !column.is("column") {
                return Ok(true);
            }
            Ok(!renumbering.is_removed(column_id(column, path)?.number()))
        })?;

        for column in columns.elements_mut().filter(|e| e.is("column")) {
            let id = column_id(column, path)?;
            let Some(new_id) = renumbering.new_index(id.number()) else {
                continue;
            };
            if new_id != id.number() {
                if let Some(element) = column.child_mut("columnID") {
                    element.set_text(&ColumnId(new_id).to_string());
                }
            }
        }

        Ok(())
    }

    /// Rewrite the index file at `path` into its temporary sibling
    pub fn rewrite_file(&self, path: &Path) -> Result<PathBuf> {
        let mut document = Document::read(path)?;
        self.rewrite(&mut document)?;
        write_temp(path, |out| document.write(out))
    }
}

fn table_index(table: &Element, path: &Path) -> Result<u32> {
    let folder = match table.child("folder") {
        Some(folder) => folder.text()?,
        None => return Err(ReindexError::malformed(path, "table without <folder>")),
    };
    parse_table_folder(folder.trim()).ok_or_else(|| {
        ReindexError::malformed(path, format!("invalid table folder {:?}", folder.trim()))
    })
}

fn column_id(column: &Element, path: &Path) -> Result<ColumnId> {
    let id = match column.child("columnID") {
        Some(id) => id.text()?,
        None => return Err(ReindexError::malformed(path, "column without <columnID>")),
    };
    ColumnId::parse(id.trim())
        .ok_or_else(|| ReindexError::malformed(path, format!("invalid columnID {:?}", id.trim())))
}

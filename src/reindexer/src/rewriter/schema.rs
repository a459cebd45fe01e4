//! Table schema rewriting
//!
//! The column elements of a table schema are the `xs:element` children of the
//! sequence inside its first top-level complex type. Their `name` attributes
//! mirror the column IDs of the index.

use std::path::{Path, PathBuf};

use crate::document::{Document, Element};
use crate::error::{ReindexError, Result};
use crate::model::ColumnId;
use crate::renumber::Renumbering;
use crate::rewriter::{retarget_table_tokens, write_temp};

/// Attributes that must name the table folder
const NAMESPACE_ATTRIBUTES: [&str; 2] = ["xmlns", "targetNamespace"];

#[derive(Debug, Clone)]
pub struct SchemaRewriter {
    columns: Renumbering,
    new_index: u32,
}

impl SchemaRewriter {
    pub fn new(columns: Renumbering, new_index: u32) -> Self {
        Self { columns, new_index }
    }

    pub fn rewrite(&self, document: &mut Document) -> Result<()> {
        let path = document.path().to_path_buf();
        let root = document.require_root_mut("schema")?;

        for name in NAMESPACE_ATTRIBUTES {
            let value = root.attribute(name)?.ok_or_else(|| {
                ReindexError::malformed(&path, format!("schema has no {name} attribute"))
            })?;
            let value = retarget_table_tokens(&value, self.new_index).ok_or_else(|| {
                ReindexError::malformed(&path, format!("schema {name} does not name its table"))
            })?;
            root.set_attribute(name, &value)?;
        }

        if self.columns.is_identity() {
            return Ok(());
        }

        let sequence = column_sequence_mut(root, &path)?;
        sequence.retain_elements(|element| {
            if !element.is("element") {
                return Ok(true);
            }
            Ok(!self.columns.is_removed(element_column(element, &path)?.number()))
        })?;

        for element in sequence.elements_mut().filter(|e| e.is("element")) {
            let id = element_column(element, &path)?;
            let Some(new_number) = self.columns.new_index(id.number()) else {
                continue;
            };
            if new_number != id.number() {
                element.set_attribute("name", &ColumnId(new_number).to_string())?;
            }
        }

        Ok(())
    }

    /// Rewrite the schema file at `path` into its temporary sibling
    pub fn rewrite_file(&self, path: &Path) -> Result<PathBuf> {
        let mut document = Document::read(path)?;
        self.rewrite(&mut document)?;
        write_temp(path, |out| document.write(out))
    }
}

/// Names of the column elements declared by a schema, in order
pub fn schema_columns(document: &Document) -> Result<Vec<String>> {
    let path = document.path();
    let root = match document.root() {
        Some(root) if root.is("schema") => root,
        _ => return Err(ReindexError::malformed(path, "expected <schema> root element")),
    };
    let sequence = root
        .child("complexType")
        .and_then(|complex| complex.child("sequence"))
        .ok_or_else(|| ReindexError::malformed(path, "schema declares no column sequence"))?;

    let mut names = Vec::new();
    for element in sequence.elements().filter(|e| e.is("element")) {
        let name = element
            .attribute("name")?
            .ok_or_else(|| ReindexError::malformed(path, "column element without a name"))?;
        names.push(name);
    }
    Ok(names)
}

fn column_sequence_mut<'a>(root: &'a mut Element, path: &Path) -> Result<&'a mut Element> {
    root.child_mut("complexType")
        .and_then(|complex| complex.child_mut("sequence"))
        .ok_or_else(|| ReindexError::malformed(path, "schema declares no column sequence"))
}

fn element_column(element: &Element, path: &Path) -> Result<ColumnId> {
    let name = element.attribute("name")?.unwrap_or_default();
    ColumnId::parse(&name)
        .ok_or_else(|| ReindexError::malformed(path, format!("invalid column element {name:?}")))
}

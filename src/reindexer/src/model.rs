//! Archive table index model.
//!
//! The index is read fresh from disk at the start of every operation. Only the
//! fields the reindexer needs are modelled; the index rewriter streams the
//! original document and preserves everything else verbatim.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{ReindexError, Result};

const TABLE_PREFIX: &str = "table";

/// Folder name of the table at `index`, e.g. `table3`
pub fn table_folder(index: u32) -> String {
    format!("{TABLE_PREFIX}{index}")
}

/// Parse a `table<N>` folder name
pub fn parse_table_folder(folder: &str) -> Option<u32> {
    parse_numbered(folder, TABLE_PREFIX)
}

fn parse_numbered(value: &str, prefix: &str) -> Option<u32> {
    let digits = value.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|n| *n > 0)
}

/// Positional column identifier (`c1`, `c2`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnId(pub u32);

impl ColumnId {
    pub fn parse(value: &str) -> Option<Self> {
        parse_numbered(value, "c").map(ColumnId)
    }

    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub id: ColumnId,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: String,
    /// Names of the key columns
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// 1-based table index, taken from the folder name
    pub index: u32,
    pub name: String,
    pub folder: String,
    pub description: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    /// `None` when the table declares no primary key
    pub primary_key: Option<PrimaryKey>,
    /// Advisory row count
    pub rows: Option<u64>,
}

impl TableDescriptor {
    pub fn column(&self, id: ColumnId) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_ids(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().map(|c| c.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableIndex {
    /// Tables in document order
    pub tables: Vec<TableDescriptor>,
}

impl TableIndex {
    /// Read the index and check its numbering
    pub fn load(path: &Path) -> Result<Self> {
        let index = Self::read(path)?;
        if let Some(violation) = index.numbering_violations().into_iter().next() {
            return Err(ReindexError::malformed(path, violation));
        }
        Ok(index)
    }

    /// Read the index without checking that numbering is contiguous
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file), path)
    }

    pub fn parse<R: BufRead>(source: R, path: &Path) -> Result<Self> {
        IndexParser::new(path).parse(source)
    }

    pub fn table(&self, index: u32) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.index == index)
    }

    /// Find a table by display name, ignoring case
    pub fn table_by_name(&self, name: &str) -> Option<&TableDescriptor> {
        let name = name.to_lowercase();
        self.tables.iter().find(|t| t.name.to_lowercase() == name)
    }

    /// Describe every way the numbering departs from `table1..tableK` and
    /// `c1..cM` per table
    pub fn numbering_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for (position, table) in self.tables.iter().enumerate() {
            let expected = position as u32 + 1;
            if table.index != expected {
                violations.push(format!(
                    "table {} is listed as {} but expected {}",
                    table.name,
                    table.folder,
                    table_folder(expected)
                ));
            }

            for (position, column) in table.columns.iter().enumerate() {
                let expected = ColumnId(position as u32 + 1);
                if column.id != expected {
                    violations.push(format!(
                        "{}: column {} has id {} but expected {}",
                        table.folder, column.name, column.id, expected
                    ));
                }
            }
        }

        violations
    }
}

#[derive(Default)]
struct ColumnBuilder {
    id: Option<String>,
    name: String,
    data_type: String,
    nullable: bool,
    description: Option<String>,
}

#[derive(Default)]
struct TableBuilder {
    name: String,
    folder: Option<String>,
    description: Option<String>,
    columns: Vec<ColumnDescriptor>,
    primary_key: Option<PrimaryKey>,
    rows: Option<String>,
}

/// Position of the current element within the index document
enum Slot {
    Table,
    TableField(String),
    Column,
    ColumnField(String),
    PrimaryKey,
    PrimaryKeyField(String),
    Other,
}

struct IndexParser {
    path: PathBuf,
    root: Option<String>,
    stack: Vec<String>,
    text: String,
    table: Option<TableBuilder>,
    column: Option<ColumnBuilder>,
    tables: Vec<TableDescriptor>,
}

impl IndexParser {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            root: None,
            stack: Vec::new(),
            text: String::new(),
            table: None,
            column: None,
            tables: Vec::new(),
        }
    }

    fn parse<R: BufRead>(mut self, source: R) -> Result<TableIndex> {
        let mut reader = Reader::from_reader(source);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    self.open(name);
                }
                Event::Empty(start) => {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    self.open(name);
                    self.close()?;
                }
                Event::Text(text) => self.text.push_str(&text.unescape()?),
                Event::CData(data) => self.text.push_str(&String::from_utf8_lossy(&data)),
                Event::End(_) => self.close()?,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if self.root.as_deref() != Some("siardDiark") {
            return Err(ReindexError::malformed(&self.path, "not a table index"));
        }

        Ok(TableIndex {
            tables: self.tables,
        })
    }

    fn slot(&self) -> Slot {
        let names: Vec<&str> = self.stack.iter().map(String::as_str).collect();
        match names.as_slice() {
            [_, "tables", "table"] => Slot::Table,
            [_, "tables", "table", "columns", "column"] => Slot::Column,
            [_, "tables", "table", "columns", "column", field] => {
                Slot::ColumnField(field.to_string())
            }
            [_, "tables", "table", "primaryKey"] => Slot::PrimaryKey,
            [_, "tables", "table", "primaryKey", field] => Slot::PrimaryKeyField(field.to_string()),
            [_, "tables", "table", field] => Slot::TableField(field.to_string()),
            _ => Slot::Other,
        }
    }

    fn open(&mut self, name: String) {
        if self.root.is_none() {
            self.root = Some(name.clone());
        }
        self.text.clear();
        self.stack.push(name);

        match self.slot() {
            Slot::Table => self.table = Some(TableBuilder::default()),
            Slot::Column => self.column = Some(ColumnBuilder::default()),
            Slot::PrimaryKey => {
                if let Some(table) = self.table.as_mut() {
                    table.primary_key = Some(PrimaryKey {
                        name: String::new(),
                        columns: Vec::new(),
                    });
                }
            }
            _ => {}
        }
    }

    fn close(&mut self) -> Result<()> {
        let text = std::mem::take(&mut self.text).trim().to_string();

        match self.slot() {
            Slot::Table => self.finish_table()?,
            Slot::Column => self.finish_column()?,
            Slot::ColumnField(field) => {
                if let Some(column) = self.column.as_mut() {
                    match field.as_str() {
                        "columnID" => column.id = Some(text),
                        "name" => column.name = text,
                        "type" => column.data_type = text,
                        "nullable" => column.nullable = text.eq_ignore_ascii_case("true"),
                        "description" => column.description = Some(text),
                        _ => {}
                    }
                }
            }
            Slot::PrimaryKeyField(field) => {
                if let Some(key) = self.table.as_mut().and_then(|t| t.primary_key.as_mut()) {
                    match field.as_str() {
                        "name" => key.name = text,
                        "column" => key.columns.push(text),
                        _ => {}
                    }
                }
            }
            Slot::TableField(field) => {
                if let Some(table) = self.table.as_mut() {
                    match field.as_str() {
                        "name" => table.name = text,
                        "folder" => table.folder = Some(text),
                        "description" => table.description = Some(text),
                        "rows" => table.rows = Some(text),
                        _ => {}
                    }
                }
            }
            Slot::PrimaryKey | Slot::Other => {}
        }

        self.stack.pop();
        Ok(())
    }

    fn finish_column(&mut self) -> Result<()> {
        let Some(column) = self.column.take() else {
            return Ok(());
        };
        let raw_id = column.id.unwrap_or_default();
        let id = ColumnId::parse(&raw_id).ok_or_else(|| {
            ReindexError::malformed(
                &self.path,
                format!("column {} has invalid columnID {raw_id:?}", column.name),
            )
        })?;

        if let Some(table) = self.table.as_mut() {
            table.columns.push(ColumnDescriptor {
                id,
                name: column.name,
                data_type: column.data_type,
                nullable: column.nullable,
                description: column.description,
            });
        }
        Ok(())
    }

    fn finish_table(&mut self) -> Result<()> {
        let Some(table) = self.table.take() else {
            return Ok(());
        };
        let folder = table.folder.ok_or_else(|| {
            ReindexError::malformed(&self.path, format!("table {} has no folder", table.name))
        })?;
        let index = parse_table_folder(&folder).ok_or_else(|| {
            ReindexError::malformed(
                &self.path,
                format!("table {} has invalid folder {folder:?}", table.name),
            )
        })?;
        let rows = match table.rows {
            Some(rows) => Some(rows.parse().map_err(|_| {
                ReindexError::malformed(&self.path, format!("{folder}: invalid row count {rows:?}"))
            })?),
            None => None,
        };

        self.tables.push(TableDescriptor {
            index,
            name: table.name,
            folder,
            description: table.description,
            columns: table.columns,
            primary_key: table.primary_key,
            rows,
        });
        Ok(())
    }
}

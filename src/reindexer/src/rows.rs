//! Streaming access to a table's row-data file.
//!
//! Rows are materialized one at a time as an ordered list of cells, so memory
//! use does not depend on the size of the file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::document::local;
use crate::error::{ReindexError, Result};
use crate::model::ColumnId;

const READ_BUFFER: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// Explicit `xsi:nil="true"` marker
    Null,
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub column: ColumnId,
    pub value: CellValue,
}

impl Cell {
    /// A value is present when it is neither null nor blank
    pub fn is_present(&self) -> bool {
        match &self.value {
            CellValue::Null => false,
            CellValue::Text(text) => !text.trim().is_empty(),
        }
    }
}

/// One row, cells in document order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    pub cells: Vec<Cell>,
}

pub struct RowReader<R: BufRead> {
    reader: Reader<R>,
    path: PathBuf,
    container: BytesStart<'static>,
    finished: bool,
    rows_read: u64,
}

impl RowReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::with_capacity(READ_BUFFER, file), path)
    }
}

impl<R: BufRead> RowReader<R> {
    /// Position the reader just inside the `<table>` container
    pub fn new(source: R, path: &Path) -> Result<Self> {
        let mut reader = Reader::from_reader(source);
        let mut buf = Vec::new();

        let (container, finished) = loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(start) => break (start.into_owned(), false),
                Event::Empty(start) => break (start.into_owned(), true),
                Event::Text(text) if is_blank(&text) => {}
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => return Err(ReindexError::malformed(path, "empty row-data file")),
                _ => {
                    return Err(ReindexError::malformed(
                        path,
                        "unexpected content before the table element",
                    ));
                }
            }
            buf.clear();
        };

        if local(container.name().as_ref()) != b"table" {
            return Err(ReindexError::malformed(
                path,
                "row data must be wrapped in a <table> element",
            ));
        }

        Ok(Self {
            reader,
            path: path.to_path_buf(),
            container,
            finished,
            rows_read: 0,
        })
    }

    /// Start tag of the `<table>` container, attributes included
    pub fn container(&self) -> &BytesStart<'static> {
        &self.container
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Read the next row, or `None` once the container is closed
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = Vec::new();
        loop {
            match self.reader.read_event_into(&mut buf)? {
                Event::Start(start) if local(start.name().as_ref()) == b"row" => {
                    let row = self.read_row_body()?;
                    self.rows_read += 1;
                    return Ok(Some(row));
                }
                Event::Empty(start) if local(start.name().as_ref()) == b"row" => {
                    self.rows_read += 1;
                    return Ok(Some(Row::default()));
                }
                Event::End(_) => {
                    self.finished = true;
                    return Ok(None);
                }
                Event::Text(text) if is_blank(&text) => {}
                Event::Comment(_) | Event::PI(_) => {}
                Event::Eof => return Err(self.malformed("unexpected end of file inside <table>")),
                _ => {
                    return Err(self.malformed(format!(
                        "unexpected content after row {}",
                        self.rows_read
                    )));
                }
            }
            buf.clear();
        }
    }

    fn read_row_body(&mut self) -> Result<Row> {
        let mut row = Row::default();
        let mut buf = Vec::new();

        loop {
            match self.reader.read_event_into(&mut buf)? {
                Event::Start(start) => {
                    let column = self.column_id(&start)?;
                    let nil = is_nil(&start)?;
                    let text = self.read_cell_text(column)?;
                    let value = if nil {
                        CellValue::Null
                    } else {
                        CellValue::Text(text)
                    };
                    row.cells.push(Cell { column, value });
                }
                Event::Empty(start) => {
                    let column = self.column_id(&start)?;
                    let value = if is_nil(&start)? {
                        CellValue::Null
                    } else {
                        CellValue::Text(String::new())
                    };
                    row.cells.push(Cell { column, value });
                }
                Event::End(_) => return Ok(row),
                Event::Text(text) if is_blank(&text) => {}
                Event::Comment(_) | Event::PI(_) => {}
                Event::Eof => return Err(self.malformed("unexpected end of file inside <row>")),
                _ => {
                    return Err(self.malformed(format!(
                        "unexpected content in row {}",
                        self.rows_read + 1
                    )));
                }
            }
            buf.clear();
        }
    }

    fn read_cell_text(&mut self, column: ColumnId) -> Result<String> {
        let mut text = String::new();
        let mut buf = Vec::new();

        loop {
            match self.reader.read_event_into(&mut buf)? {
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(data) => text.push_str(&String::from_utf8_lossy(&data)),
                Event::End(_) => return Ok(text),
                Event::Comment(_) | Event::PI(_) => {}
                Event::Eof => return Err(self.malformed("unexpected end of file inside a cell")),
                _ => {
                    return Err(self.malformed(format!(
                        "nested element in {column} of row {}",
                        self.rows_read + 1
                    )));
                }
            }
            buf.clear();
        }
    }

    fn column_id(&self, start: &BytesStart<'_>) -> Result<ColumnId> {
        let name = start.name();
        let name = String::from_utf8_lossy(local(name.as_ref()));
        ColumnId::parse(&name).ok_or_else(|| {
            self.malformed(format!(
                "invalid column element <{name}> in row {}",
                self.rows_read + 1
            ))
        })
    }

    fn malformed(&self, reason: impl Into<String>) -> ReindexError {
        ReindexError::malformed(&self.path, reason)
    }
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(|b| b.is_ascii_whitespace())
}

fn is_nil(start: &BytesStart<'_>) -> Result<bool> {
    for attr in start.attributes() {
        let attr = attr?;
        if local(attr.key.as_ref()) == b"nil" {
            let value = attr.unescape_value()?;
            return Ok(value.trim() == "true" || value.trim() == "1");
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROWS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<table xsi:schemaLocation="http://www.sa.dk/xmlns/siard/1.0/schema0/table1.xsd ./table1.xsd" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns="http://www.sa.dk/xmlns/siard/1.0/schema0/table1.xsd">
  <row>
    <c1>1</c1>
    <c2 xsi:nil="true"/>
    <c3>fish &amp; chips</c3>
  </row>
  <row><c1>2</c1><c2></c2><c3> </c3></row>
  <row/>
</table>
"#;

    fn reader(xml: &str) -> RowReader<&[u8]> {
        RowReader::new(xml.as_bytes(), Path::new("table1.xml")).unwrap()
    }

    fn text(column: u32, value: &str) -> Cell {
        Cell {
            column: ColumnId(column),
            value: CellValue::Text(value.to_string()),
        }
    }

    #[test]
    fn test_reads_rows_in_order() {
        let mut rows = reader(ROWS);

        let first = rows.next_row().unwrap().unwrap();
        assert_eq!(
            first.cells,
            vec![
                text(1, "1"),
                Cell {
                    column: ColumnId(2),
                    value: CellValue::Null
                },
                text(3, "fish & chips"),
            ]
        );

        let second = rows.next_row().unwrap().unwrap();
        assert_eq!(second.cells, vec![text(1, "2"), text(2, ""), text(3, " ")]);

        let third = rows.next_row().unwrap().unwrap();
        assert!(third.cells.is_empty());

        assert_eq!(rows.next_row().unwrap(), None);
        assert_eq!(rows.next_row().unwrap(), None);
        assert_eq!(rows.rows_read(), 3);
    }

    #[test]
    fn test_presence() {
        let mut rows = reader(ROWS);
        let first = rows.next_row().unwrap().unwrap();
        let present: Vec<bool> = first.cells.iter().map(Cell::is_present).collect();
        assert_eq!(present, vec![true, false, true]);

        // Whitespace-only text is as absent as the empty string
        let second = rows.next_row().unwrap().unwrap();
        let present: Vec<bool> = second.cells.iter().map(Cell::is_present).collect();
        assert_eq!(present, vec![true, false, false]);
    }

    #[test]
    fn test_empty_container() {
        let mut rows = reader("<?xml version=\"1.0\"?>\n<table xmlns=\"urn:table2\"/>");
        assert_eq!(rows.next_row().unwrap(), None);
    }

    #[test]
    fn test_container_attributes_are_kept() {
        let rows = reader(ROWS);
        let xmlns = rows
            .container()
            .try_get_attribute("xmlns")
            .unwrap()
            .unwrap();
        assert!(String::from_utf8_lossy(&xmlns.value).ends_with("table1.xsd"));
    }

    #[test]
    fn test_nested_cell_content_is_malformed() {
        let mut rows = reader("<table><row><c1><b>x</b></c1></row></table>");
        assert!(matches!(
            rows.next_row(),
            Err(ReindexError::Malformed { .. })
        ));
    }

    #[test]
    fn test_invalid_column_name_is_malformed() {
        let mut rows = reader("<table><row><name>x</name></row></table>");
        assert!(matches!(
            rows.next_row(),
            Err(ReindexError::Malformed { .. })
        ));
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let mut rows = reader("<table><row><c1>x</c1></row>");
        assert!(rows.next_row().unwrap().is_some());
        assert!(rows.next_row().is_err());
    }

    #[test]
    fn test_wrong_container_is_malformed() {
        let result = RowReader::new("<rows/>".as_bytes(), Path::new("t.xml"));
        assert!(matches!(result, Err(ReindexError::Malformed { .. })));
    }
}

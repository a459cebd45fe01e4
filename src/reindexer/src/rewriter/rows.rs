//! Streaming rewrite of a table's row-data file.
//!
//! Rows are read one at a time and re-serialized with removed cells dropped,
//! surviving cells renumbered and the container retargeted at the new table
//! folder. Memory use does not grow with the file.

use std::borrow::Cow;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use quick_xml::Writer;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;

use crate::error::{ReindexError, Result};
use crate::model::ColumnId;
use crate::renumber::Renumbering;
use crate::rewriter::{retarget_table_tokens, write_temp};
use crate::rows::{CellValue, Row, RowReader};

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Progress of one rewrite, updated once per row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCursor {
    pub rows: u64,
    pub cells_written: u64,
    pub cells_dropped: u64,
}

#[derive(Debug, Clone)]
pub struct RowRewriter {
    columns: Renumbering,
    new_index: u32,
    column_count: u32,
}

impl RowRewriter {
    /// `column_count` is the number of columns the table declares before the
    /// removal; cells beyond it are rejected.
    pub fn new(columns: Renumbering, new_index: u32, column_count: u32) -> Self {
        Self {
            columns,
            new_index,
            column_count,
        }
    }

    pub fn rewrite<R: BufRead, W: Write>(
        &self,
        reader: &mut RowReader<R>,
        sink: W,
        cursor: &mut RowCursor,
    ) -> Result<()> {
        let mut writer = Writer::new(sink);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Text(BytesText::new("\n")))?;

        let container = self.container(reader.container(), reader.path())?;
        let end = container.to_end().into_owned();
        writer.write_event(Event::Start(container))?;

        while let Some(row) = reader.next_row()? {
            writer.write_event(Event::Text(BytesText::new("\n")))?;
            self.write_row(&mut writer, &row, reader.path(), cursor)?;
        }

        writer.write_event(Event::Text(BytesText::new("\n")))?;
        writer.write_event(Event::End(end))?;
        writer.write_event(Event::Text(BytesText::new("\n")))?;
        writer.into_inner().flush()?;
        Ok(())
    }

    /// Rewrite the row-data file at `path` into its temporary sibling
    pub fn rewrite_file(&self, path: &Path, cursor: &mut RowCursor) -> Result<PathBuf> {
        let mut reader = RowReader::open(path)?;
        write_temp(path, |out| self.rewrite(&mut reader, out, cursor))
    }

    fn write_row<W: Write>(
        &self,
        writer: &mut Writer<W>,
        row: &Row,
        path: &Path,
        cursor: &mut RowCursor,
    ) -> Result<()> {
        cursor.rows += 1;
        writer.write_event(Event::Start(BytesStart::new("row")))?;

        for cell in &row.cells {
            let number = cell.column.number();
            if number > self.column_count {
                return Err(ReindexError::malformed(
                    path,
                    format!(
                        "row {} references {} but the table has {} columns",
                        cursor.rows, cell.column, self.column_count
                    ),
                ));
            }
            let Some(new_number) = self.columns.new_index(number) else {
                cursor.cells_dropped += 1;
                continue;
            };

            let name = ColumnId(new_number).to_string();
            match &cell.value {
                CellValue::Null => {
                    let mut start = BytesStart::new(name.as_str());
                    start.push_attribute(("xsi:nil", "true"));
                    writer.write_event(Event::Empty(start))?;
                }
                CellValue::Text(text) => {
                    writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
                    writer.write_event(Event::Text(BytesText::new(text)))?;
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            cursor.cells_written += 1;
        }

        writer.write_event(Event::End(BytesEnd::new("row")))?;
        Ok(())
    }

    /// Copy of the original container with every table token retargeted
    fn container(&self, original: &BytesStart<'_>, path: &Path) -> Result<BytesStart<'static>> {
        let name = String::from_utf8_lossy(original.name().as_ref()).into_owned();
        let mut start = BytesStart::new(name);
        let mut retargeted = false;
        let mut declares_xsi = false;

        for attr in original.attributes() {
            let attr = attr?;
            let key = attr.key.as_ref().to_vec();
            declares_xsi |= key == b"xmlns:xsi";

            let value = attr.unescape_value()?;
            match retarget_table_tokens(&value, self.new_index) {
                Some(value) => {
                    let key = String::from_utf8_lossy(&key).into_owned();
                    start.push_attribute((key.as_str(), value.as_str()));
                    retargeted = true;
                }
                None => start.push_attribute(Attribute {
                    key: QName(key.as_slice()),
                    value: Cow::Borrowed(attr.value.as_ref()),
                }),
            }
        }

        if !retargeted {
            return Err(ReindexError::malformed(
                path,
                "table container does not name its table folder",
            ));
        }
        if !declares_xsi {
            start.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
        }

        Ok(start)
    }
}

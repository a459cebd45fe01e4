//! Emptiness scanning of row-data files.
//!
//! A single forward pass tracks which declared columns have not yet shown a
//! present value. The pass stops as soon as no column can still turn out
//! empty, since the remaining rows cannot change the result.

use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::Path;

use crate::error::Result;
use crate::model::ColumnId;
use crate::rows::{Row, RowReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCompletion {
    /// Every row was read
    Exhausted,
    /// Stopped once no column could still be empty
    StoppedEarly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Declared columns for which no row supplied a present value
    pub empty_columns: BTreeSet<ColumnId>,
    pub rows_scanned: u64,
    pub completion: ScanCompletion,
}

/// Running candidate set of possibly-empty columns
#[derive(Debug, Clone)]
pub struct EmptinessScanner {
    candidates: BTreeSet<ColumnId>,
    rows: u64,
}

impl EmptinessScanner {
    pub fn new(columns: impl IntoIterator<Item = ColumnId>) -> Self {
        Self {
            candidates: columns.into_iter().collect(),
            rows: 0,
        }
    }

    /// Drop every candidate that has a present value in `row`
    pub fn observe(&mut self, row: &Row) {
        self.rows += 1;
        for cell in &row.cells {
            if cell.is_present() {
                self.candidates.remove(&cell.column);
            }
        }
    }

    /// No column can still turn out empty
    pub fn is_settled(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn finish(self, completion: ScanCompletion) -> ScanOutcome {
        ScanOutcome {
            empty_columns: self.candidates,
            rows_scanned: self.rows,
            completion,
        }
    }
}

pub fn scan_rows<R: BufRead>(
    reader: &mut RowReader<R>,
    columns: impl IntoIterator<Item = ColumnId>,
) -> Result<ScanOutcome> {
    let mut scanner = EmptinessScanner::new(columns);

    while !scanner.is_settled() {
        match reader.next_row()? {
            Some(row) => scanner.observe(&row),
            None => return Ok(scanner.finish(ScanCompletion::Exhausted)),
        }
    }

    Ok(scanner.finish(ScanCompletion::StoppedEarly))
}

/// Scan the row-data file at `path` for columns without any present value
pub fn scan_table(
    path: &Path,
    columns: impl IntoIterator<Item = ColumnId>,
) -> Result<ScanOutcome> {
    let mut reader = RowReader::open(path)?;
    let outcome = scan_rows(&mut reader, columns)?;

    log::debug!(
        "Scanned {} rows of {}: {} empty columns ({:?})",
        outcome.rows_scanned,
        path.display(),
        outcome.empty_columns.len(),
        outcome.completion
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(n: u32) -> Vec<ColumnId> {
        (1..=n).map(ColumnId).collect()
    }

    fn ids(items: &[u32]) -> BTreeSet<ColumnId> {
        items.iter().copied().map(ColumnId).collect()
    }

    fn scan(xml: &str, n: u32) -> ScanOutcome {
        let mut reader = RowReader::new(xml.as_bytes(), Path::new("t.xml")).unwrap();
        scan_rows(&mut reader, columns(n)).unwrap()
    }

    #[test]
    fn test_zero_rows_reports_every_column() {
        let outcome = scan("<table></table>", 3);

        assert_eq!(outcome.empty_columns, ids(&[1, 2, 3]));
        assert_eq!(outcome.rows_scanned, 0);
        assert_eq!(outcome.completion, ScanCompletion::Exhausted);
    }

    #[test]
    fn test_null_and_empty_string_count_as_absent() {
        let xml = r#"<table xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <row><c1>a</c1><c2 xsi:nil="true"/><c3></c3></row>
  <row><c1>b</c1><c2/></row>
</table>"#;
        let outcome = scan(xml, 3);

        assert_eq!(outcome.empty_columns, ids(&[2, 3]));
        assert_eq!(outcome.rows_scanned, 2);
        assert_eq!(outcome.completion, ScanCompletion::Exhausted);
    }

    #[test]
    fn test_whitespace_only_column_is_empty() {
        let xml = "<table><row><c1>a</c1><c2>   </c2></row><row><c1>b</c1><c2>\n</c2></row></table>";
        let outcome = scan(xml, 2);

        assert_eq!(outcome.empty_columns, ids(&[2]));
        assert_eq!(outcome.rows_scanned, 2);
    }

    #[test]
    fn test_padded_value_is_present() {
        let outcome = scan("<table><row><c1>  x  </c1></row></table>", 1);
        assert!(outcome.empty_columns.is_empty());
    }

    #[test]
    fn test_stops_once_every_column_has_a_value() {
        // The third row is malformed but never read
        let xml = "<table><row><c1>a</c1></row><row><c2>b</c2></row><row><oops/></row></table>";
        let outcome = scan(xml, 2);

        assert!(outcome.empty_columns.is_empty());
        assert_eq!(outcome.rows_scanned, 2);
        assert_eq!(outcome.completion, ScanCompletion::StoppedEarly);
    }

    #[test]
    fn test_undeclared_cells_do_not_affect_candidates() {
        let outcome = scan("<table><row><c1>x</c1><c9>y</c9></row></table>", 2);
        assert_eq!(outcome.empty_columns, ids(&[2]));
    }

    #[test]
    fn test_repeat_scan_is_stable() {
        let xml = "<table><row><c1>x</c1><c2/></row></table>";
        assert_eq!(scan(xml, 2), scan(xml, 2));
    }
}

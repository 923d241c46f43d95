//! In-memory workbook access on top of calamine.
//!
//! The container format (xlsx, xlsm, xlsb, xls, ods) is detected from the
//! bytes. Rows are visited sheet by sheet in document order.

use std::io::Cursor;

use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Reader, Sheets};
use tracing::warn;

use crate::error::WorkbookError;
use crate::validator::COLUMN_COUNT;

/// A row that could not be materialised into cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDefect {
    /// The whole worksheet failed to decode.
    UnreadableSheet { sheet: String },
    /// A significant cell holds a spreadsheet error value (`#VALUE!`, `#REF!`, ...).
    CellError { row: usize, column: usize },
}

pub struct Workbook {
    sheets: Sheets<Cursor<Bytes>>,
}

impl Workbook {
    /// Open a workbook from a fully buffered upload.
    pub fn open(bytes: Bytes) -> Result<Self, WorkbookError> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| WorkbookError::Unreadable(e.to_string()))?;
        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    /// Visit every row of every sheet in document order.
    ///
    /// A sheet that fails to decode is reported once as
    /// [`RowDefect::UnreadableSheet`] and the scan moves on.
    pub fn for_each_row<F>(&mut self, mut visit: F)
    where
        F: FnMut(Result<&[Data], RowDefect>),
    {
        for sheet in self.sheet_names() {
            let range = match self.sheets.worksheet_range(&sheet) {
                Ok(range) => range,
                Err(e) => {
                    warn!(sheet = %sheet, error = %e, "worksheet could not be decoded");
                    visit(Err(RowDefect::UnreadableSheet { sheet }));
                    continue;
                }
            };
            // Ranges start at the first used cell. Blank rows above it are
            // still rows of the sheet, and cells keep their absolute column.
            let (first_row, first_col) = range
                .start()
                .map(|(r, c)| (r as usize, c as usize))
                .unwrap_or((0, 0));
            for index in 0..first_row {
                visit(materialize(index, &[]));
            }
            let mut padded = Vec::new();
            for (index, row) in range.rows().enumerate() {
                let row = if first_col == 0 {
                    row
                } else {
                    padded.clear();
                    padded.resize(first_col, Data::Empty);
                    padded.extend_from_slice(row);
                    padded.as_slice()
                };
                visit(materialize(first_row + index, row));
            }
        }
    }
}

/// Reject rows whose significant cells carry error values instead of data.
pub(crate) fn materialize(index: usize, row: &[Data]) -> Result<&[Data], RowDefect> {
    match row
        .iter()
        .take(COLUMN_COUNT)
        .position(|cell| matches!(cell, Data::Error(_)))
    {
        Some(column) => Err(RowDefect::CellError { row: index, column }),
        None => Ok(row),
    }
}

//! SheetsApi trait definition

use async_trait::async_trait;

use super::{CellValue, SheetData, SheetsError};

/// Access to one spreadsheet document
///
/// Sheets are addressed by title. Row numbers are 1-based, the header being
/// row 1.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Titles of all sheets in the document
    async fn sheet_titles(&self) -> Result<Vec<String>, SheetsError>;

    /// Copy sheet `source` as a new sheet named `title`
    async fn duplicate_sheet(&self, source: &str, title: &str) -> Result<(), SheetsError>;

    /// Clear every data row, keeping the header row
    async fn clear_sheet(&self, title: &str) -> Result<(), SheetsError>;

    /// Header and all data rows, as displayed
    async fn load_rows(&self, title: &str) -> Result<SheetData, SheetsError>;

    /// Append rows after the last data row, in one call
    async fn append_rows(&self, title: &str, rows: Vec<Vec<CellValue>>) -> Result<(), SheetsError>;

    /// Overwrite individual cells of one row; cells are `(column index, value)`
    async fn update_cells(&self, title: &str, row_number: usize, cells: Vec<(usize, CellValue)>)
    -> Result<(), SheetsError>;
}

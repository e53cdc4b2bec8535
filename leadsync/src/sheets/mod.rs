//! Spreadsheet access
//!
//! Provides:
//! - The `SheetsApi` trait used by reconciliation
//! - A Google Sheets v4 implementation
//! - A write throttle decorator
//! - Column and cell types shared with the entry builder

pub mod client;
mod error;
mod google;
mod throttle;
mod types;

pub use client::SheetsApi;
pub use error::SheetsError;
pub use google::GoogleSheetsClient;
pub use throttle::Throttled;
pub use types::{CellValue, Column, ColumnKind, ColumnLayout, Row, SheetData, SheetRow, column_letter};

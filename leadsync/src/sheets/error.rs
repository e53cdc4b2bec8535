//! Spreadsheet error types

use thiserror::Error;

/// Errors that can occur talking to the spreadsheet API
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid spreadsheet API URL: {0}")]
    InvalidUrl(String),

    #[error("Spreadsheet access token not found in environment variable {0}")]
    MissingToken(String),

    #[error("Template sheet '{0}' not found")]
    TemplateMissing(String),

    #[error("Sheet '{0}' not found")]
    SheetMissing(String),
}

impl SheetsError {
    /// Whether the error is a quota rejection
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SheetsError::Api { status: 429, .. })
    }
}

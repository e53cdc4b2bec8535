//! CRM error types

use thiserror::Error;

/// Errors that can occur talking to the CRM API
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("API error {status} fetching {resource}: {message}")]
    Api {
        resource: String,
        status: u16,
        message: String,
    },

    #[error("Network error fetching {resource}: {source}")]
    Network {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid response for {resource}: {source}")]
    Json {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("CRM API key not found in environment variable {0}")]
    MissingApiKey(String),
}

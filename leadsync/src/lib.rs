//! LeadSync - CRM lead to spreadsheet exporter
//!
//! Each cycle pulls recently-arrived leads from the CRM, flattens every lead
//! into one or two spreadsheet rows and reconciles those rows into a sheet per
//! arrival month, cloned from a template sheet on first use.
//!
//! # Core Concepts
//!
//! - **Memoized upstream**: every CRM response is cached with a TTL, so
//!   repeated cycles hit the network only for pages and expired entries
//! - **Bounded retries**: transient failures back off exponentially; exhaustion
//!   aborts the cycle
//! - **Idempotent writes**: rows are matched by business id; a cycle with no
//!   upstream change writes nothing
//!
//! # Modules
//!
//! - [`crm`] - CRM client trait and OkoCRM implementation
//! - [`fetch`] - Cached, retried lead retrieval and filtering
//! - [`entry`] - Lead to row transformation
//! - [`sheets`] - Spreadsheet client trait, Google implementation, throttle
//! - [`reconcile`] - Row diffing and sheet writes
//! - [`cycle`] - One export cycle end to end
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod crm;
pub mod cycle;
pub mod entry;
pub mod fetch;
pub mod reconcile;
pub mod retry;
pub mod sheets;

// Re-export commonly used types
pub use config::Config;
pub use crm::{CrmApi, CrmError, Lead, OkoCrmClient};
pub use cycle::{CycleReport, Exporter};
pub use entry::{Entry, EntryData, TransformOptions};
pub use fetch::{Directory, FetchOptions, LeadFetcher};
pub use reconcile::{Reconciler, SheetReport};
pub use retry::{RetryPolicy, with_retry};
pub use sheets::{GoogleSheetsClient, SheetsApi, SheetsError, Throttled};

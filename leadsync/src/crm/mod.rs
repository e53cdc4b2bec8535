//! CRM client module
//!
//! Types, the `CrmApi` trait and the OkoCRM REST implementation.

pub mod client;
mod error;
mod okocrm;
mod types;

pub use client::CrmApi;
pub use error::CrmError;
pub use okocrm::OkoCrmClient;
pub use types::{Company, Contact, Envelope, Lead, Pipeline, Stage, User};

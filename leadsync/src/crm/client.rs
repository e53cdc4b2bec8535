//! CrmApi trait definition

use async_trait::async_trait;

use super::{CrmError, Lead, Pipeline, Stage, User};

/// Read-only access to the CRM
///
/// Implementations do no caching or retrying of their own; the fetcher
/// layers both on top.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// One page of the lead list (1-indexed); an empty page means the end
    async fn list_leads(&self, page: u32) -> Result<Vec<Lead>, CrmError>;

    /// A single lead with full custom-field detail
    async fn get_lead(&self, id: i64) -> Result<Lead, CrmError>;

    async fn list_users(&self) -> Result<Vec<User>, CrmError>;

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, CrmError>;

    async fn list_stages(&self, pipeline_id: i64) -> Result<Vec<Stage>, CrmError>;
}

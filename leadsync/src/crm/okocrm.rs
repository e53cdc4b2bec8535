//! OkoCRM REST API client
//!
//! Implements the CrmApi trait over the v2 REST API. Every response body is
//! wrapped in `{ "data": ... }`.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{CrmApi, CrmError, Envelope, Lead, Pipeline, Stage, User};
use crate::config::CrmConfig;

/// OkoCRM API client
pub struct OkoCrmClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OkoCrmClient {
    /// Create a client from configuration, reading the API key from the environment
    pub fn from_config(config: &CrmConfig) -> Result<Self, CrmError> {
        debug!(base_url = %config.base_url, "OkoCrmClient::from_config: called");
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| CrmError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(&config.base_url, api_key, Duration::from_millis(config.timeout_ms))
    }

    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, CrmError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("leadsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| CrmError::Network {
                resource: "client".to_string(),
                source,
            })?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// GET `path` and unwrap the `data` envelope
    async fn get<T: DeserializeOwned>(&self, resource: &str, path: &str, query: &[(&str, String)]) -> Result<T, CrmError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, ?query, "OkoCrmClient::get: called");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|source| CrmError::Network {
                resource: resource.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| CrmError::Network {
            resource: resource.to_string(),
            source,
        })?;

        if !status.is_success() {
            debug!(%status, "OkoCrmClient::get: API error");
            return Err(CrmError::Api {
                resource: resource.to_string(),
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|source| CrmError::Json {
            resource: resource.to_string(),
            source,
        })?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl CrmApi for OkoCrmClient {
    async fn list_leads(&self, page: u32) -> Result<Vec<Lead>, CrmError> {
        self.get(&format!("leads page {}", page), "/leads/", &[("page", page.to_string())])
            .await
    }

    async fn get_lead(&self, id: i64) -> Result<Lead, CrmError> {
        self.get(&format!("lead {}", id), &format!("/leads/{}", id), &[]).await
    }

    async fn list_users(&self) -> Result<Vec<User>, CrmError> {
        self.get("users", "/users/", &[]).await
    }

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, CrmError> {
        self.get("pipelines", "/pipelines/", &[]).await
    }

    async fn list_stages(&self, pipeline_id: i64) -> Result<Vec<Stage>, CrmError> {
        self.get(
            &format!("stages of pipeline {}", pipeline_id),
            &format!("/pipelines/stages/{}", pipeline_id),
            &[],
        )
        .await
    }
}

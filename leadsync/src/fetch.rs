//! Cached, retried retrieval of leads and their reference data
//!
//! Every upstream call goes through the memo cache first and, on a miss,
//! through the backoff wrapper. Retry exhaustion aborts the whole cycle.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use eyre::{Context, Result, eyre};
use memostore::MemoStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::Config;
use crate::crm::{CrmApi, CrmError, Lead, Pipeline, Stage, User};
use crate::retry::{RetryPolicy, with_retry};

/// Knobs for one fetch pass
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub cache_ttl: Duration,
    pub lookback_days: u32,
    /// `None` pages until an empty page
    pub max_pages: Option<u32>,
    /// Allowlisted stage names as configured
    pub stages: Vec<String>,
    pub timezone: Tz,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            cache_ttl: config.cache.ttl(),
            lookback_days: config.export.lookback_days,
            max_pages: config.export.page_limit(),
            stages: config.export.stages.clone(),
            timezone: config.export.timezone()?,
            retry: config.retry.policy(),
        })
    }
}

/// Reference data used to resolve ids on leads
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub users: Vec<User>,
    pub pipelines: Vec<Pipeline>,
    /// Every stage of every pipeline, keyed by stage id
    pub stages: HashMap<i64, Stage>,
}

impl Directory {
    pub fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn pipeline(&self, id: i64) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.id == id)
    }

    pub fn stage(&self, id: i64) -> Option<&Stage> {
        self.stages.get(&id)
    }
}

/// Pulls leads from the CRM through the cache
pub struct LeadFetcher {
    api: Arc<dyn CrmApi>,
    cache: Arc<MemoStore>,
    options: FetchOptions,
}

impl LeadFetcher {
    pub fn new(api: Arc<dyn CrmApi>, cache: Arc<MemoStore>, options: FetchOptions) -> Self {
        Self { api, cache, options }
    }

    /// Load users, pipelines and every pipeline's stages
    pub async fn load_directory(&self) -> Result<Directory> {
        debug!("LeadFetcher::load_directory: called");
        let users: Vec<User> = self.cached("users", || self.api.list_users()).await?;
        let pipelines: Vec<Pipeline> = self.cached("pipelines", || self.api.list_pipelines()).await?;

        let mut stages = HashMap::new();
        for pipeline in &pipelines {
            let key = format!("pipelines:{}:stages", pipeline.id);
            let pipeline_stages: Vec<Stage> = self.cached(&key, || self.api.list_stages(pipeline.id)).await?;
            for stage in pipeline_stages {
                stages.insert(stage.id, stage);
            }
        }

        info!(
            users = users.len(),
            pipelines = pipelines.len(),
            stages = stages.len(),
            "Loaded CRM directory"
        );
        Ok(Directory {
            users,
            pipelines,
            stages,
        })
    }

    /// Leads in an allowlisted stage that arrived on or after the cutoff,
    /// oldest first, each with full detail
    pub async fn fetch_leads(&self, directory: &Directory, now: DateTime<Utc>) -> Result<Vec<Lead>> {
        let cutoff = cutoff(now, self.options.lookback_days, self.options.timezone)?;
        let listed = self.list_all_leads().await?;
        let mut selected = select_leads(listed, directory, &self.options.stages, cutoff);
        info!(selected = selected.len(), %cutoff, "Selected leads for export");

        selected.sort_by_key(|lead| lead.arrived_stage_at.unwrap_or(i64::MIN));

        let mut detailed = Vec::with_capacity(selected.len());
        for lead in selected {
            let key = format!("lead:{}", lead.id);
            let full: Lead = self.cached(&key, || self.api.get_lead(lead.id)).await?;
            detailed.push(full);
        }
        Ok(detailed)
    }

    async fn list_all_leads(&self) -> Result<Vec<Lead>> {
        let mut leads = Vec::new();
        let mut page = 1u32;
        loop {
            if let Some(limit) = self.options.max_pages
                && page > limit
            {
                debug!(limit, "LeadFetcher::list_all_leads: page ceiling reached");
                break;
            }

            let key = format!("leads:page:{}", page);
            let batch: Vec<Lead> = self.cached(&key, || self.api.list_leads(page)).await?;
            if batch.is_empty() {
                debug!(page, "LeadFetcher::list_all_leads: empty page, stopping");
                break;
            }
            debug!(page, count = batch.len(), "LeadFetcher::list_all_leads: got page");
            leads.extend(batch);
            page += 1;
        }
        info!(total = leads.len(), pages = page - 1, "Listed leads");
        Ok(leads)
    }

    /// Memoized, retried upstream call
    async fn cached<T, F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CrmError>>,
    {
        let policy = self.options.retry;
        self.cache
            .remember(key, self.options.cache_ttl, || async move {
                with_retry(key, &policy, operation).await.map_err(eyre::Report::from)
            })
            .await
            .context(format!("Failed to fetch {}", key))
    }
}

/// Midnight, in `tz`, of the day `lookback_days` before `now`
pub fn cutoff(now: DateTime<Utc>, lookback_days: u32, tz: Tz) -> Result<DateTime<Utc>> {
    let day = now
        .with_timezone(&tz)
        .date_naive()
        .checked_sub_days(Days::new(u64::from(lookback_days)))
        .ok_or_else(|| eyre!("Lookback of {} days reaches before the earliest representable date", lookback_days))?;
    let midnight = day.and_time(NaiveTime::MIN);
    Ok(tz
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight)))
}

fn normalize_stage(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Keep leads whose stage is allowlisted and whose arrival is at or after `cutoff`
pub fn select_leads(leads: Vec<Lead>, directory: &Directory, stages: &[String], cutoff: DateTime<Utc>) -> Vec<Lead> {
    let allowed: HashSet<String> = stages.iter().map(|s| normalize_stage(s)).collect();
    let cutoff_ts = cutoff.timestamp();

    leads
        .into_iter()
        .filter(|lead| {
            let in_stage = directory
                .stage(lead.stages_id)
                .is_some_and(|stage| allowed.contains(&normalize_stage(&stage.name)));
            let recent = lead.arrived_stage_at.is_some_and(|ts| ts >= cutoff_ts);
            in_stage && recent
        })
        .collect()
}

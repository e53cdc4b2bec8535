//! One export cycle: fetch, transform, group by month, reconcile

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use tracing::{debug, info};

use crate::entry::{Entry, TransformOptions, create_entry_from_lead};
use crate::fetch::LeadFetcher;
use crate::reconcile::{Reconciler, SheetReport};
use crate::sheets::Row;

/// Summary of a completed cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Leads that passed the stage and time filters
    pub leads: usize,
    /// Rows derived from those leads, secondary policies included
    pub rows: usize,
    pub sheets: BTreeMap<String, SheetReport>,
}

impl CycleReport {
    pub fn inserted(&self) -> usize {
        self.sheets.values().map(|r| r.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.sheets.values().map(|r| r.updated).sum()
    }

    pub fn unchanged(&self) -> usize {
        self.sheets.values().map(|r| r.unchanged).sum()
    }
}

/// Runs export cycles against one CRM account and one spreadsheet
pub struct Exporter {
    fetcher: LeadFetcher,
    reconciler: Reconciler,
    transform: TransformOptions,
}

impl Exporter {
    pub fn new(fetcher: LeadFetcher, reconciler: Reconciler, transform: TransformOptions) -> Self {
        Self {
            fetcher,
            reconciler,
            transform,
        }
    }

    /// Run one bounded cycle
    ///
    /// Sheets reconciled before a failure keep their writes.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        info!(%now, "Starting export cycle");
        let entries = collect_entries(&self.fetcher, &self.transform, now).await?;
        let groups = group_entries(&entries);
        let rows = groups.values().map(Vec::len).sum();

        let sheets = self
            .reconciler
            .reconcile(&groups)
            .await
            .context("Failed to reconcile spreadsheet")?;

        let report = CycleReport {
            leads: entries.len(),
            rows,
            sheets,
        };
        info!(
            leads = report.leads,
            rows = report.rows,
            inserted = report.inserted(),
            updated = report.updated(),
            "Export cycle complete"
        );
        Ok(report)
    }

    /// Entries the next cycle would export, without touching the spreadsheet
    pub async fn preview(&self, now: DateTime<Utc>) -> Result<Vec<Entry>> {
        collect_entries(&self.fetcher, &self.transform, now).await
    }
}

/// Fetch and transform every exportable lead
pub async fn collect_entries(fetcher: &LeadFetcher, options: &TransformOptions, now: DateTime<Utc>) -> Result<Vec<Entry>> {
    let directory = fetcher
        .load_directory()
        .await
        .context("Failed to load CRM directory")?;
    let leads = fetcher.fetch_leads(&directory, now).await?;
    let entries: Vec<Entry> = leads
        .iter()
        .map(|lead| create_entry_from_lead(lead, &directory, options))
        .collect();
    debug!(entries = entries.len(), "collect_entries: transformed leads");
    Ok(entries)
}

/// Rows per destination sheet, in lead order within each sheet
pub fn group_entries(entries: &[Entry]) -> BTreeMap<String, Vec<Row>> {
    let mut groups: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.sheet.clone()).or_default().extend(entry.rows());
    }
    groups
}

//! Fixed-interval write throttle for any SheetsApi

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{CellValue, SheetData, SheetsApi, SheetsError};

/// Spaces write calls at least `interval` apart; reads pass straight through
///
/// Concurrent writers queue on the slot lock and leave in FIFO order.
pub struct Throttled<S> {
    inner: S,
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl<S: SheetsApi> Throttled<S> {
    pub fn new(inner: S, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn wait_turn(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        if let Some(slot) = *next_slot
            && slot > now
        {
            debug!(wait_ms = (slot - now).as_millis() as u64, "Throttled::wait_turn: sleeping");
            tokio::time::sleep_until(slot).await;
        }
        *next_slot = Some(Instant::now() + self.interval);
    }
}

#[async_trait]
impl<S: SheetsApi> SheetsApi for Throttled<S> {
    async fn sheet_titles(&self) -> Result<Vec<String>, SheetsError> {
        self.inner.sheet_titles().await
    }

    async fn duplicate_sheet(&self, source: &str, title: &str) -> Result<(), SheetsError> {
        self.wait_turn().await;
        self.inner.duplicate_sheet(source, title).await
    }

    async fn clear_sheet(&self, title: &str) -> Result<(), SheetsError> {
        self.wait_turn().await;
        self.inner.clear_sheet(title).await
    }

    async fn load_rows(&self, title: &str) -> Result<SheetData, SheetsError> {
        self.inner.load_rows(title).await
    }

    async fn append_rows(&self, title: &str, rows: Vec<Vec<CellValue>>) -> Result<(), SheetsError> {
        self.wait_turn().await;
        self.inner.append_rows(title, rows).await
    }

    async fn update_cells(
        &self,
        title: &str,
        row_number: usize,
        cells: Vec<(usize, CellValue)>,
    ) -> Result<(), SheetsError> {
        self.wait_turn().await;
        self.inner.update_cells(title, row_number, cells).await
    }
}

use std::sync::Arc;

use crate::error::Result;
use crate::models::{Holding, HoldingInput, HoldingUpdate, SymbolMatch};
use crate::scheduler::RefreshScheduler;
use crate::store::HoldingsStore;

/// Entry point for holdings mutations coming from the UI.
///
/// Calls pass straight through to the store. A successful mutation schedules
/// a refresh so the dashboard picks it up; a failure is reported to the
/// scheduler's subscribers as an error notice and returned to the caller.
pub struct Watchlist {
    store: Arc<dyn HoldingsStore>,
    scheduler: Arc<RefreshScheduler>,
}

impl Watchlist {
    pub fn new(store: Arc<dyn HoldingsStore>, scheduler: Arc<RefreshScheduler>) -> Self {
        Self { store, scheduler }
    }

    pub async fn list(&self) -> Result<Vec<Holding>> {
        let result = self.store.list_all().await;
        self.surface(result)
    }

    pub async fn add(&self, input: HoldingInput) -> Result<Holding> {
        let result = self.store.add(input).await;
        self.after_mutation(result).await
    }

    pub async fn update(&self, ticker: &str, update: HoldingUpdate) -> Result<Holding> {
        let result = self.store.update(ticker, update).await;
        self.after_mutation(result).await
    }

    pub async fn remove(&self, ticker: &str) -> Result<()> {
        let result = self.store.delete(ticker).await;
        self.after_mutation(result).await
    }

    /// Symbol suggestions. Failures are only logged; an empty list is a fine fallback.
    pub async fn search(&self, keyword: &str) -> Vec<SymbolMatch> {
        match self.store.search(keyword).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!("Symbol search for {:?} failed: {}", keyword, e);
                Vec::new()
            }
        }
    }

    async fn after_mutation<T>(&self, result: Result<T>) -> Result<T> {
        let value = self.surface(result)?;
        if !self.scheduler.refresh_now().await {
            tracing::debug!("Refresh already pending");
        }
        Ok(value)
    }

    fn surface<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.scheduler.report_error(e);
        }
        result
    }
}

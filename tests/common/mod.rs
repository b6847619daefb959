#![allow(dead_code)]

use async_trait::async_trait;
use portfolio_tracker::{
    normalize_ticker, Holding, HoldingInput, HoldingUpdate, HoldingsStore, PortfolioSnapshot,
    Quote, QuoteSource, RateLimiter, RefreshScheduler, Result, SchedulerConfig, SchedulerEvent,
    SymbolMatch, TrackerError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::time::Instant;

pub fn holding(ticker: &str, quantity: i64, buy_price: f64, current_price: f64) -> Holding {
    Holding {
        name: format!("{} Inc", ticker),
        ticker: ticker.to_string(),
        quantity,
        buy_price,
        current_price,
    }
}

/// Holdings store kept in memory, with the same conflict/not-found rules as the service.
#[derive(Default)]
pub struct InMemoryStore {
    holdings: Mutex<Vec<Holding>>,
    list_calls: AtomicUsize,
    failing_lists: AtomicUsize,
    hanging_lists: AtomicUsize,
    gate: Option<Semaphore>,
}

impl InMemoryStore {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self {
            holdings: Mutex::new(holdings),
            ..Default::default()
        }
    }

    /// Every `list_all` call waits for a permit from `open_gate`.
    pub fn gated(holdings: Vec<Holding>) -> Self {
        Self {
            holdings: Mutex::new(holdings),
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        }
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn fail_next_lists(&self, count: usize) {
        self.failing_lists.store(count, Ordering::SeqCst);
    }

    /// The next `count` listings never answer.
    pub fn hang_next_lists(&self, count: usize) {
        self.hanging_lists.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Vec<Holding> {
        self.holdings.lock().await.clone()
    }
}

#[async_trait]
impl HoldingsStore for InMemoryStore {
    async fn list_all(&self) -> Result<Vec<Holding>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let hanging = self.hanging_lists.load(Ordering::SeqCst);
        if hanging > 0 {
            self.hanging_lists.store(hanging - 1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        let failing = self.failing_lists.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_lists.store(failing - 1, Ordering::SeqCst);
            return Err(TrackerError::Store {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(self.holdings.lock().await.clone())
    }

    async fn add(&self, input: HoldingInput) -> Result<Holding> {
        let input = input.normalized()?;
        let mut holdings = self.holdings.lock().await;
        if holdings.iter().any(|h| h.ticker == input.ticker) {
            return Err(TrackerError::Conflict(input.ticker));
        }
        let holding = Holding {
            name: input.name,
            ticker: input.ticker,
            quantity: input.quantity,
            buy_price: input.buy_price,
            current_price: input.current_price.unwrap_or(input.buy_price),
        };
        holdings.push(holding.clone());
        Ok(holding)
    }

    async fn update(&self, ticker: &str, update: HoldingUpdate) -> Result<Holding> {
        let ticker = normalize_ticker(ticker)?;
        update.validate()?;
        let mut holdings = self.holdings.lock().await;
        let holding = holdings
            .iter_mut()
            .find(|h| h.ticker == ticker)
            .ok_or_else(|| TrackerError::NotFound(ticker.clone()))?;
        if let Some(name) = update.name {
            holding.name = name;
        }
        if let Some(quantity) = update.quantity {
            holding.quantity = quantity;
        }
        if let Some(price) = update.buy_price {
            holding.buy_price = price;
        }
        if let Some(price) = update.current_price {
            holding.current_price = price;
        }
        Ok(holding.clone())
    }

    async fn delete(&self, ticker: &str) -> Result<()> {
        let ticker = normalize_ticker(ticker)?;
        let mut holdings = self.holdings.lock().await;
        let before = holdings.len();
        holdings.retain(|h| h.ticker != ticker);
        if holdings.len() == before {
            return Err(TrackerError::NotFound(ticker));
        }
        Ok(())
    }

    async fn search(&self, keyword: &str) -> Result<Vec<SymbolMatch>> {
        let keyword = keyword.to_uppercase();
        Ok(self
            .holdings
            .lock()
            .await
            .iter()
            .filter(|h| h.ticker.contains(&keyword))
            .map(|h| SymbolMatch {
                symbol: h.ticker.clone(),
                name: h.name.clone(),
                kind: None,
                region: None,
                currency: None,
            })
            .collect())
    }
}

/// Quote source answering from a fixed table and recording when each call happened.
#[derive(Default)]
pub struct StaticQuotes {
    answers: HashMap<String, Result<Option<Quote>>>,
    hanging: HashSet<String>,
    calls: std::sync::Mutex<Vec<(String, Instant)>>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, ticker: &str, price: f64, change: f64) -> Self {
        let quote = Quote {
            ticker: ticker.to_string(),
            current_price: price,
            daily_change_absolute: change,
            daily_change_percent: change / (price - change) * 100.0,
        };
        self.answers.insert(ticker.to_string(), Ok(Some(quote)));
        self
    }

    pub fn with_error(mut self, ticker: &str, error: TrackerError) -> Self {
        self.answers.insert(ticker.to_string(), Err(error));
        self
    }

    /// Lookups for `ticker` never answer.
    pub fn with_hang(mut self, ticker: &str) -> Self {
        self.hanging.insert(ticker.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn get_quote(&self, ticker: &str) -> Result<Option<Quote>> {
        self.calls
            .lock()
            .unwrap()
            .push((ticker.to_string(), Instant::now()));
        if self.hanging.contains(ticker) {
            std::future::pending::<()>().await;
        }
        self.answers.get(ticker).cloned().unwrap_or(Ok(None))
    }
}

pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        interval: Duration::from_secs(60),
        failure_cooldown: Duration::from_secs(5),
        request_timeout: Duration::from_secs(10),
        error_dismiss_after: Duration::from_secs(5),
        max_concurrent_quotes: 8,
    }
}

pub fn scheduler(
    store: Arc<InMemoryStore>,
    quotes: Arc<StaticQuotes>,
    config: SchedulerConfig,
) -> Arc<RefreshScheduler> {
    let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(1)).unwrap());
    Arc::new(RefreshScheduler::new(store, quotes, limiter, config))
}

/// Wait for the next published snapshot, skipping error events.
pub async fn next_snapshot(
    events: &mut broadcast::Receiver<SchedulerEvent>,
) -> Arc<PortfolioSnapshot> {
    let wait = async {
        loop {
            if let SchedulerEvent::Snapshot(snapshot) = events.recv().await.unwrap() {
                return snapshot;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("no snapshot published")
}

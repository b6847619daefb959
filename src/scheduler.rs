use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};

use crate::error::{ErrorNotice, TrackerError};
use crate::finnhub::QuoteSource;
use crate::models::{Holding, PortfolioSnapshot, Quote};
use crate::portfolio::{aggregate, QuoteMap};
use crate::rate_limiter::RateLimiter;
use crate::store::HoldingsStore;

/// Where the refresh loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleState {
    Idle,
    Fetching,
    Aggregating,
    Published,
    Failed,
}

/// Events delivered to subscribers.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Snapshot(Arc<PortfolioSnapshot>),
    Error(ErrorNotice),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between timer-driven cycles.
    pub interval: Duration,
    /// Pause after a failed holdings listing before returning to idle.
    pub failure_cooldown: Duration,
    /// Upper bound for each holdings or quote call.
    pub request_timeout: Duration,
    /// How long a surfaced error stays visible.
    pub error_dismiss_after: Duration,
    /// Quote requests in flight at once within one cycle.
    pub max_concurrent_quotes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            failure_cooldown: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            error_dismiss_after: Duration::from_secs(5),
            max_concurrent_quotes: 8,
        }
    }
}

struct Shared {
    store: Arc<dyn HoldingsStore>,
    quotes: Arc<dyn QuoteSource>,
    limiter: Arc<RateLimiter>,
    config: SchedulerConfig,
    events: broadcast::Sender<SchedulerEvent>,
    state: watch::Sender<CycleState>,
    latest: watch::Sender<Option<Arc<PortfolioSnapshot>>>,
    published: AtomicU64,
}

struct Running {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    triggers: mpsc::Sender<()>,
}

/// Drives the list → quote → aggregate → publish cycle.
///
/// Cycles run one at a time on a single task. Triggers that arrive while a
/// cycle is running, timer ticks included, collapse into at most one
/// follow-up cycle. The timer restarts from the start of each cycle.
pub struct RefreshScheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<dyn HoldingsStore>,
        quotes: Arc<dyn QuoteSource>,
        limiter: Arc<RateLimiter>,
        config: SchedulerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let (state, _) = watch::channel(CycleState::Idle);
        let (latest, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                store,
                quotes,
                limiter,
                config,
                events,
                state,
                latest,
                published: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    /// Start the loop. The first cycle runs immediately. Returns `false` if
    /// the loop was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (triggers, triggers_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_loop(self.shared.clone(), triggers_rx, shutdown_rx));
        tracing::info!(
            "Refresh scheduler started, interval {:?}",
            self.shared.config.interval
        );

        *running = Some(Running {
            handle,
            shutdown,
            triggers,
        });
        true
    }

    /// Stop the loop and wait for it to exit. An in-flight cycle is dropped
    /// without publishing.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!("Refresh loop ended abnormally: {}", e);
        }
        self.shared.state.send_replace(CycleState::Idle);
        tracing::info!("Refresh scheduler stopped");
    }

    /// Request a cycle as soon as the current one finishes. Returns `false`
    /// when the request was folded into an already pending one or the loop is
    /// not running.
    pub async fn refresh_now(&self) -> bool {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(running) => running.triggers.try_send(()).is_ok(),
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<CycleState> {
        self.shared.state.subscribe()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Option<Arc<PortfolioSnapshot>> {
        self.shared.latest.borrow().clone()
    }

    /// Number of snapshots published so far.
    pub fn published_count(&self) -> u64 {
        self.shared.published.load(Ordering::SeqCst)
    }

    /// Surface an error raised outside the loop (a failed CRUD call) on the
    /// same channel as cycle failures.
    pub fn report_error(&self, error: &TrackerError) -> ErrorNotice {
        self.shared.report(error)
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    mut triggers: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(shared.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => tracing::debug!("Refresh timer fired"),
            Some(()) = triggers.recv() => tracing::debug!("Refresh requested"),
        }

        // A missed tick and a queued request both stand for the same follow-up.
        while triggers.try_recv().is_ok() {}
        ticker.reset();

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = shared.run_cycle() => {}
        }
    }
}

impl Shared {
    async fn run_cycle(&self) {
        self.state.send_replace(CycleState::Fetching);

        let holdings = match timeout(self.config.request_timeout, self.store.list_all()).await {
            Ok(Ok(holdings)) => holdings,
            Ok(Err(e)) => return self.fail(e).await,
            Err(_) => {
                return self
                    .fail(TrackerError::Transport(
                        "listing holdings timed out".to_string(),
                    ))
                    .await
            }
        };

        self.state.send_replace(CycleState::Aggregating);
        let quotes = self.fetch_quotes(&holdings).await;
        let snapshot = Arc::new(aggregate(&holdings, &quotes, Utc::now()));

        tracing::info!(
            "Portfolio value {:.2} ({} holdings, {:+.2}% today)",
            snapshot.total_value,
            snapshot.holding_count,
            snapshot.daily_change_percent
        );
        self.latest.send_replace(Some(snapshot.clone()));
        self.published.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(SchedulerEvent::Snapshot(snapshot));
        self.state.send_replace(CycleState::Published);
        self.state.send_replace(CycleState::Idle);
    }

    /// Request one quote per distinct ticker. A failed lookup becomes `None`.
    async fn fetch_quotes(&self, holdings: &[Holding]) -> QuoteMap {
        let tickers: BTreeSet<String> = holdings.iter().map(|h| h.ticker.to_uppercase()).collect();

        stream::iter(tickers)
            .map(|ticker| async move {
                let quote = self.fetch_quote(&ticker).await;
                (ticker, quote)
            })
            .buffer_unordered(self.config.max_concurrent_quotes.max(1))
            .collect()
            .await
    }

    async fn fetch_quote(&self, ticker: &str) -> Option<Quote> {
        let result = self
            .limiter
            .schedule(|| timeout(self.config.request_timeout, self.quotes.get_quote(ticker)))
            .await;

        match result {
            Ok(Ok(quote)) => quote,
            Ok(Err(e)) => {
                tracing::warn!("Keeping last price for {}: {}", ticker, e);
                None
            }
            Err(_) => {
                tracing::warn!("Keeping last price for {}: quote request timed out", ticker);
                None
            }
        }
    }

    async fn fail(&self, error: TrackerError) {
        self.state.send_replace(CycleState::Failed);
        self.report(&error);
        tokio::time::sleep(self.config.failure_cooldown).await;
        self.state.send_replace(CycleState::Idle);
    }

    fn report(&self, error: &TrackerError) -> ErrorNotice {
        tracing::error!("{}", error);
        let notice = ErrorNotice::new(error, self.config.error_dismiss_after);
        let _ = self.events.send(SchedulerEvent::Error(notice.clone()));
        notice
    }
}

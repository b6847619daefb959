use std::sync::Arc;

use portfolio_tracker::auth::Session;
use portfolio_tracker::config::Config;
use portfolio_tracker::{
    FinnhubClient, HttpHoldingsStore, PortfolioSnapshot, RateLimiter, RefreshScheduler,
    SchedulerEvent, TrackerError, Watchlist,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set the log level based on the first argument
    let args: Vec<String> = std::env::args().collect();
    let mut log_level = Level::INFO;
    if args.len() >= 2 {
        log_level = match args[1].as_str() {
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_max_level(log_level)
        .init();

    tracing::info!("Log level set to: {}", log_level);

    let config = Config::from_env()?;

    let mut session = Session::new();
    let user = match (&config.email, &config.password) {
        (Some(email), Some(password)) => session.login(email, password)?,
        _ => {
            tracing::error!("Set TRACKER_EMAIL and TRACKER_PASSWORD to log in");
            return Err(TrackerError::Unauthorized.into());
        }
    };
    tracing::info!("Logged in as {}", user.name);

    let store = Arc::new(HttpHoldingsStore::new(
        &config.holdings_api_url,
        config.request_timeout,
    )?);
    let quotes = Arc::new(FinnhubClient::new(
        &config.finnhub_api_url,
        &config.finnhub_api_key,
        config.request_timeout,
    )?);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_window)?);
    let scheduler = Arc::new(RefreshScheduler::new(
        store.clone(),
        quotes,
        limiter,
        config.scheduler(),
    ));
    let watchlist = Watchlist::new(store, scheduler.clone());
    let mut events = scheduler.subscribe();

    if let Ok(holdings) = watchlist.list().await {
        tracing::info!("Watching {} holdings", holdings.len());
    }

    scheduler.start().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(SchedulerEvent::Snapshot(snapshot)) => log_snapshot(&snapshot),
                Ok(SchedulerEvent::Error(notice)) => {
                    tracing::warn!("{} (hidden after {:?})", notice.message, notice.dismiss_after)
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} scheduler events", skipped)
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    scheduler.stop().await;
    session.logout();

    Ok(())
}

fn log_snapshot(snapshot: &PortfolioSnapshot) {
    tracing::info!(
        "Total value: ${:.2} | Daily change: {:+.2} ({:+.2}%) | Total gain/loss: {:+.2} | Stocks: {}",
        snapshot.total_value,
        snapshot.daily_change_absolute,
        snapshot.daily_change_percent,
        snapshot.total_gain_loss,
        snapshot.holding_count
    );
    for item in &snapshot.per_holding_breakdown {
        tracing::info!(
            "  {:<8} {:>6} x {:>10.2} = {:>12.2} ({:>5.1}%){}",
            item.ticker,
            item.quantity,
            item.current_price,
            item.value,
            item.allocation_percent,
            if item.quoted { "" } else { " [last known price]" }
        );
    }
}

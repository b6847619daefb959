use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, TrackerError};

/// Fixed-window limiter shared by every outbound quote request.
///
/// At most `capacity` tasks are admitted per `window`. A caller that finds the
/// budget exhausted suspends until the window ends, then opens a new window
/// and proceeds. Waiters are admitted in arrival order because the state lock
/// is a fair async mutex held across the wait.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
    issued: u32,
    started: Option<Instant>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(TrackerError::Validation(
                "rate limit capacity must be at least 1".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TrackerError::Validation(
                "rate limit window must be longer than zero".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            window,
            state: Mutex::new(WindowState::default()),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a slot in the current window and consume it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let start = match state.started {
            Some(start) if now.duration_since(start) < self.window => start,
            _ => {
                state.started = Some(now);
                state.issued = 0;
                now
            }
        };

        if state.issued >= self.capacity {
            let resume_at = start + self.window;
            tracing::debug!(
                "Rate limit of {} per {:?} reached, waiting {:?}",
                self.capacity,
                self.window,
                resume_at.saturating_duration_since(now)
            );
            tokio::time::sleep_until(resume_at).await;
            state.started = Some(Instant::now());
            state.issued = 0;
        }

        state.issued += 1;
    }

    /// Run `task` once the budget allows it. The task's output, including any
    /// error, is returned unchanged; a failed task still counts against the budget.
    pub async fn schedule<F, Fut, R>(&self, task: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        self.acquire().await;
        task().await
    }

    /// Tasks admitted in the current window.
    pub async fn issued(&self) -> u32 {
        let state = self.state.lock().await;
        match state.started {
            Some(start) if start.elapsed() < self.window => state.issued,
            _ => 0,
        }
    }
}

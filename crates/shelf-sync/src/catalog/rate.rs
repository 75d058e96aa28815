//! Process-wide request log that spaces catalog calls to at most
//! `max_requests` per sliding window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CatalogSettings;

/// Sliding-window request log.
#[derive(Debug)]
pub struct RequestLog {
    sent: Mutex<VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl RequestLog {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        RequestLog {
            sent: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub fn from_settings(settings: &CatalogSettings) -> Self {
        Self::new(settings.requests_per_window, settings.window())
    }

    /// Waits until another request fits in the window, then records it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let now = Instant::now();
                let mut sent = self.sent.lock().unwrap_or_else(|p| p.into_inner());

                while sent.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
                    sent.pop_front();
                }

                if sent.len() < self.max_requests {
                    sent.push_back(now);
                    return;
                }

                match sent.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "Catalog rate window full");
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests recorded in the current window.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

fn shared_slot() -> &'static Mutex<Option<Arc<RequestLog>>> {
    static SHARED: OnceLock<Mutex<Option<Arc<RequestLog>>>> = OnceLock::new();
    SHARED.get_or_init(|| Mutex::new(None))
}

/// The process-wide request log, created from `settings` on first use.
pub fn shared_request_log(settings: &CatalogSettings) -> Arc<RequestLog> {
    let mut slot = shared_slot().lock().unwrap_or_else(|p| p.into_inner());
    Arc::clone(slot.get_or_insert_with(|| Arc::new(RequestLog::from_settings(settings))))
}

/// Drops the process-wide request log.
pub fn reset_shared_request_log() {
    *shared_slot().lock().unwrap_or_else(|p| p.into_inner()) = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_request_waits_for_window() {
        let log = RequestLog::new(10, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..10 {
            log.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(log.in_flight(), 10);

        log.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1) && waited < Duration::from_millis(1010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let log = RequestLog::new(2, Duration::from_millis(100));
        log.acquire().await;
        tokio::time::advance(Duration::from_millis(60)).await;
        log.acquire().await;

        let start = Instant::now();
        log.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(40) && waited < Duration::from_millis(50));
    }
}

use std::{future::Future, time::Duration};

use log::{debug, warn};
use tokio::{
    sync::{Mutex, Semaphore},
    time::Instant,
};

use crate::{
    sources::PricingError,
    types::{Quote, QuoteResult},
};

pub const QUEUE_CONCURRENCY: usize = 1;
pub const QUEUE_INTERVAL_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuePolicy {
    pub concurrency: usize,
    pub interval: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            concurrency: QUEUE_CONCURRENCY,
            interval: Duration::from_millis(QUEUE_INTERVAL_MS),
        }
    }
}

/// Paces every request sent to the price provider.
///
/// At most `concurrency` tasks run at once and two dispatches are always at
/// least `interval` apart. Waiting tasks are served in submission order.
pub struct RateLimitedQueue {
    policy: QueuePolicy,
    slots: Semaphore,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimitedQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            slots: Semaphore::new(policy.concurrency.max(1)),
            last_dispatch: Mutex::new(None),
            policy,
        }
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    async fn wait_for_dispatch(&self) {
        let mut last = self.last_dispatch.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.policy.interval {
                let wait_time = self.policy.interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }

    /// Runs one fetch once the queue lets it through. A failing fetch turns
    /// into a zero price instead of an error.
    pub async fn enqueue<F, Fut>(&self, label: &str, task: F) -> QuoteResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Quote, PricingError>>,
    {
        let _permit = match self.slots.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Pricing queue closed before {} could run: {:?}", label, e);
                return QuoteResult::failed(PricingError::InternalError);
            }
        };

        self.wait_for_dispatch().await;

        match task().await {
            Ok(quote) => QuoteResult::fetched(quote),
            Err(e) => {
                warn!("Failed to fetch price for {}: {}", label, e);
                QuoteResult::failed(e)
            }
        }
    }
}

impl Default for RateLimitedQueue {
    fn default() -> Self {
        Self::new(QueuePolicy::default())
    }
}

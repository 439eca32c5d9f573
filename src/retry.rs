// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Polling and backoff helpers.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Exponential backoff between retries, capped at a maximum delay
#[derive(Clone, Debug)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            delay: initial_delay,
            max_delay,
        }
    }

    /// Backoff used between optimistic-concurrency retries
    pub fn for_conflicts() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_secs(2))
    }

    /// The delay to wait now; the next one doubles
    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (current * 2).min(self.max_delay);
        current
    }

    pub async fn wait(&mut self) {
        sleep(self.next_delay()).await;
    }
}

/// Evaluate `check` every `interval` until it returns true or `timeout` has passed.
///
/// Returns whether the condition was met. The check always runs at least once.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() + interval > deadline {
            return false;
        }
        sleep(interval).await;
    }
}

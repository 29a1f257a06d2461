//! Minimum inter-request spacing for fetch requests.
//!
//! This module provides the [`Throttle`] struct which enforces a minimum
//! delay between the starts of consecutive network calls made through one
//! [`FetchClient`](super::FetchClient), preventing the origin from blocking
//! the crawl due to excessive request rates.
//!
//! The clock is shared across all requests made through one client, not
//! tracked per URL: throttling is a property of the remote endpoint, and
//! the harvester only ever talks to one.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Shared-clock throttle for fetch requests.
///
/// The first acquisition proceeds immediately; every later acquisition
/// waits until at least `min_interval` has elapsed since the start of the
/// previous network call. Cache hits bypass the throttle entirely (they
/// never call [`acquire`](Throttle::acquire)).
#[derive(Debug)]
pub struct Throttle {
    /// Minimum time between the starts of consecutive network calls.
    min_interval: Duration,

    /// Start time of the last network call.
    /// `None` until the first call; protected for atomic read-update.
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Creates a throttle with the given minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Creates a throttle that applies no delay.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns the configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Blocks until the minimum interval since the previous network call
    /// has elapsed, then marks the current instant as the new call start.
    ///
    /// The lock is held across the sleep so that concurrent callers (should
    /// a future caller parallelize sessions) still observe one shared clock.
    pub async fn acquire(&self) {
        let mut last_request = self.last_request.lock().await;

        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval.saturating_sub(elapsed);
                debug!(delay_ms = delay.as_millis(), "throttling request");
                tokio::time::sleep(delay).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}

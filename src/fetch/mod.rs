//! Throttled, retrying, disk-caching HTTP fetch layer.
//!
//! This module provides the network boundary for the harvester. Every
//! request goes through one [`FetchClient`], which enforces a minimum
//! spacing between network calls, retries transient failures with
//! exponential backoff, and serves repeated requests from a
//! content-addressed disk cache.
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::fetch::{FetchClient, FetchConfig, FetchRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FetchClient::new(FetchConfig::default())?;
//! let content = client
//!     .fetch(FetchRequest::get("https://example.com/archive.php"))
//!     .await?;
//! println!("{} chars", content.as_text().map_or(0, str::len));
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod error;
mod retry;
mod throttle;

pub use cache::{HttpCache, fingerprint};
pub use client::{
    Content, DEFAULT_CACHE_DIR, FetchClient, FetchConfig, FetchExchange, FetchRequest,
};
pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after,
};
pub use throttle::Throttle;

// Note: no module-local Result alias here; signatures spell out
// `Result<T, FetchError>` explicitly.

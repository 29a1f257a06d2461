//! HTTP client wrapper for fetching archive pages.
//!
//! This module provides the `FetchClient` struct which layers throttling,
//! retry with exponential backoff, and a content-addressed disk cache over
//! a pooled `reqwest` client.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method};
use tracing::{debug, instrument, warn};

use super::FetchError;
use super::cache::{HttpCache, fingerprint};
use super::retry::{RetryDecision, RetryPolicy, classify_error, parse_retry_after};
use super::throttle::Throttle;

/// Default cache directory for raw response bodies.
pub const DEFAULT_CACHE_DIR: &str = ".cache/http";

/// Default minimum spacing between network calls (1 second).
const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// Default per-call timeout (20 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("harvester/", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`FetchClient`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whether responses are cached on disk.
    pub cache_enabled: bool,
    /// Directory for cache entries.
    pub cache_dir: PathBuf,
    /// Minimum spacing between network calls.
    pub throttle: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            throttle: DEFAULT_THROTTLE,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Decoded response content.
///
/// Bodies declared as JSON are parsed; everything else is returned as text.
/// Cached bodies re-decode the same way: JSON if they parse, else text.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Parsed JSON body.
    Json(serde_json::Value),
    /// Plain text body (typically HTML).
    Text(String),
}

impl Content {
    /// Returns the text body, or None for JSON content.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    /// Returns the parsed JSON body, or None for text content.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// A single request through the [`FetchClient`].
///
/// Form and query pairs keep their insertion order on the wire (the archive
/// expects its interleaved field layout verbatim); only the cache
/// fingerprint canonicalizes ordering.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cache_key: Option<String>,
}

impl FetchRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
            cache_key: None,
        }
    }

    /// Sets the query pairs.
    #[must_use]
    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    /// Sets the form body pairs (sent urlencoded, order preserved).
    #[must_use]
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.form = pairs;
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the derived cache fingerprint with an explicit key.
    #[must_use]
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Returns the URL this request targets.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the cache key: the explicit key verbatim, else the derived
    /// fingerprint over URL + canonically ordered query and form pairs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.cache_key
            .clone()
            .unwrap_or_else(|| fingerprint(&self.url, &self.query, &self.form))
    }
}

/// Raw view of a completed fetch: status, decoded content, and the encoded
/// request body that was sent (None for GET bodies and cache hits).
#[derive(Debug, Clone)]
pub struct FetchExchange {
    /// HTTP status code (cache hits report 200).
    pub status: u16,
    /// Decoded response content.
    pub content: Content,
    /// Urlencoded form body as sent, when the request carried one.
    pub request_body: Option<String>,
}

/// HTTP client with throttling, retries, and disk caching.
///
/// This client is designed to be created once and reused for the whole
/// crawl, taking advantage of connection pooling and a shared throttle
/// clock. Cookies are kept because the archive couples its session id to
/// the cookie jar.
#[derive(Debug)]
pub struct FetchClient {
    http: Client,
    cache: Option<HttpCache>,
    throttle: Throttle,
    retry_policy: RetryPolicy,
}

impl FetchClient {
    /// Creates a fetch client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cache`] if the cache directory cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration. This should never happen in practice.
    #[allow(clippy::expect_used)]
    #[instrument(skip(config), fields(cache_enabled = config.cache_enabled))]
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");

        let cache = if config.cache_enabled {
            Some(HttpCache::open(&config.cache_dir)?)
        } else {
            None
        };

        debug!(
            throttle_ms = config.throttle.as_millis(),
            max_attempts = config.retry.max_attempts(),
            "creating fetch client"
        );

        Ok(Self {
            http,
            cache,
            throttle: Throttle::new(config.throttle),
            retry_policy: config.retry,
        })
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Fetches a request and returns its decoded content.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch_exchange`](Self::fetch_exchange).
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn fetch(&self, request: FetchRequest) -> Result<Content, FetchError> {
        Ok(self.fetch_exchange(request).await?.content)
    }

    /// Fetches a request and returns the full exchange (status, content,
    /// request body).
    ///
    /// Cache hits return immediately without a network call and without
    /// throttling; misses are throttled, retried on transient failures,
    /// and cached on success.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the retry budget is exhausted, on a
    /// non-retryable HTTP status, on an undecodable declared-JSON body, or
    /// on a cache read/write failure.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn fetch_exchange(&self, request: FetchRequest) -> Result<FetchExchange, FetchError> {
        let key = request.fingerprint();

        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.load(&key)? {
                return Ok(FetchExchange {
                    status: 200,
                    content: decode_cached(&bytes),
                    request_body: None,
                });
            }
        }

        self.throttle.acquire().await;

        let (status, content_type, body) = self.request_with_retry(&request).await?;

        if let Some(cache) = &self.cache {
            cache.store(&key, &body)?;
        }

        let content = decode_response(&request.url, content_type.as_deref(), &body)?;
        let request_body = if request.form.is_empty() {
            None
        } else {
            Some(encode_form(&request.form))
        };

        Ok(FetchExchange {
            status,
            content,
            request_body,
        })
    }

    /// Removes the cache entry for `key`, forcing the next fetch with that
    /// key back onto the network.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Cache`] if the entry cannot be removed.
    pub fn invalidate(&self, key: &str) -> Result<(), FetchError> {
        match &self.cache {
            Some(cache) => cache.invalidate(key),
            None => Ok(()),
        }
    }

    /// Issues the request, retrying transient failures per the policy.
    ///
    /// Returns the status, the declared content type, and the raw body.
    async fn request_with_retry(
        &self,
        request: &FetchRequest,
    ) -> Result<(u16, Option<String>, Vec<u8>), FetchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match self.send_once(request).await {
                Ok(success) => return Ok(success),
                Err(error) => error,
            };

            match self.retry_policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    let delay = extend_with_retry_after(&error, delay);
                    warn!(
                        url = %request.url,
                        attempt,
                        next_attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %request.url, attempt, reason = %reason, "fetch failed");
                    return Err(error);
                }
            }
        }
    }

    /// Issues the request exactly once and maps failures to [`FetchError`].
    async fn send_once(
        &self,
        request: &FetchRequest,
    ) -> Result<(u16, Option<String>, Vec<u8>), FetchError> {
        let mut builder = self.http.request(request.method.clone(), &request.url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.form.is_empty() {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encode_form(&request.form));
        }

        let response = builder
            .send()
            .await
            .map_err(|error| map_transport_error(&request.url, error))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Err(FetchError::http_status_with_retry_after(
                &request.url,
                status.as_u16(),
                retry_after,
            ));
        }
        if !status.is_success() {
            return Err(FetchError::http_status(&request.url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(&request.url, error))?
            .to_vec();

        Ok((status.as_u16(), content_type, body))
    }
}

/// Maps a reqwest transport failure to a [`FetchError`].
fn map_transport_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}

/// Lengthens a backoff delay to honor a Retry-After header on 429 responses.
fn extend_with_retry_after(error: &FetchError, delay: Duration) -> Duration {
    if let FetchError::HttpStatus {
        status: 429,
        retry_after: Some(value),
        ..
    } = error
    {
        if let Some(requested) = parse_retry_after(value) {
            return delay.max(requested);
        }
    }
    delay
}

/// Decodes a network response body by its declared content type.
fn decode_response(
    url: &str,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Content, FetchError> {
    if content_type.is_some_and(|ct| ct.contains("application/json")) {
        let value =
            serde_json::from_slice(body).map_err(|source| FetchError::decode(url, source))?;
        return Ok(Content::Json(value));
    }
    Ok(Content::Text(String::from_utf8_lossy(body).into_owned()))
}

/// Decodes a cached body: JSON if it parses as such, else lossy text.
///
/// The cache stores raw bytes without the original content type, so this
/// mirrors how the body would have decoded when it was first fetched.
fn decode_cached(bytes: &[u8]) -> Content {
    match serde_json::from_slice(bytes) {
        Ok(value) => Content::Json(value),
        Err(_) => Content::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Serializes form pairs urlencoded, preserving insertion order.
fn encode_form(pairs: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

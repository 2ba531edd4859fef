//! Fetch engine orchestrating attempts, retry budgets, and dispatch.
//!
//! This module provides the [`FetchEngine`], which drives one fetch
//! lifecycle per call: build the request, send it, classify the response
//! by content type, and dispatch the body. Transport failures consume the
//! per-URL budget in the engine's [`RetryLedger`] and the attempt is
//! re-issued in an explicit loop; all other failures are terminal.
//!
//! # Call shapes
//!
//! - [`fetch`](FetchEngine::fetch) / [`fetch_text`](FetchEngine::fetch_text)
//!   - awaited to completion by the caller.
//! - [`fetch_detached`](FetchEngine::fetch_detached) - runs on a spawned
//!   task and delivers the payload through the configured callback.
//! - [`fetch_image`](FetchEngine::fetch_image) - decodes the body directly
//!   into an in-memory image, writing nothing to disk.
//!
//! # Example
//!
//! ```no_run
//! use codefetch_core::fetch::{DEFAULT_MAX_RETRIES, FetchEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FetchEngine::new();
//! let page = engine
//!     .fetch_text("https://example.com/login", DEFAULT_MAX_RETRIES)
//!     .await?;
//! println!("{page}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use encoding_rs::Encoding;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::classify::{Classification, classify};
use super::config::FetchConfig;
use super::dispatch::{FetchOutcome, decode_image, decode_text, extension_from_url, save_to_file};
use super::error::FetchError;
use super::ledger::{RetryDecision, RetryLedger};
use crate::headers;

/// Content type sent with POST bodies.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Callback receiving `(payload, source_url)` after a successful fetch.
///
/// The payload is the decoded text or the saved relative filename,
/// depending on classification. Invoked exactly once per successful fetch,
/// on a spawned task, so a slow callback never blocks the fetch lifecycle.
pub type PayloadCallback = Arc<dyn Fn(String, String) + Send + Sync>;

/// Callback receiving `(source_url, reason)` when a detached fetch gives up.
///
/// Optional: when unset, detached failures are logged and dropped.
pub type FailureCallback = Arc<dyn Fn(String, String) + Send + Sync>;

/// Error type for fetch engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configured default encoding label resolves to no known encoding.
    #[error("unknown default encoding label {label:?}")]
    UnknownDefaultEncoding {
        /// The unresolvable label from the configuration.
        label: String,
    },

    /// The underlying HTTP client failed to build.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Which extension a saved binary body gets.
///
/// The awaited path derives it from the request URL; the detached path
/// hard-codes `.jpg`. The asymmetry is load-bearing: downstream captcha
/// consumers key on the `.jpg` suffix for files produced by detached
/// fetches.
#[derive(Debug, Clone, Copy)]
enum ExtensionPolicy {
    FromUrl,
    FixedJpeg,
}

/// Retry-tracked fetch engine.
///
/// Owns one `reqwest::Client` (fixed browser-style headers, 180 s timeout,
/// transparent gzip/deflate decompression, redirect following) and one
/// [`RetryLedger`]. The cookie jar is shared by every request the engine
/// makes, in both directions: outgoing requests attach matching cookies and
/// responses are absorbed into the jar.
///
/// Cloning the engine is cheap and shares the ledger, client, and jar, so
/// detached tasks observe the same retry budgets as awaited calls.
#[derive(Clone)]
pub struct FetchEngine {
    client: Client,
    cookie_jar: Arc<Jar>,
    ledger: Arc<RetryLedger>,
    config: FetchConfig,
    default_encoding: &'static Encoding,
    on_payload: Option<PayloadCallback>,
    on_failure: Option<FailureCallback>,
}

impl Default for FetchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FetchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEngine")
            .field("config", &self.config)
            .field("default_encoding", &self.default_encoding.name())
            .field("has_payload_callback", &self.on_payload.is_some())
            .field("has_failure_callback", &self.on_failure.is_some())
            .finish_non_exhaustive()
    }
}

impl FetchEngine {
    /// Creates an engine with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static default
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_config(FetchConfig::default())
            .expect("failed to build fetch engine with default configuration")
    }

    /// Creates an engine from the given configuration with a fresh cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDefaultEncoding`] when the configured
    /// encoding label is not a known encoding, or
    /// [`EngineError::ClientBuild`] when the HTTP client cannot be built.
    pub fn with_config(config: FetchConfig) -> Result<Self, EngineError> {
        Self::with_config_and_cookie_jar(config, Arc::new(Jar::default()))
    }

    /// Creates an engine from the given configuration and a shared cookie jar.
    ///
    /// Use this when several engines (or an engine and other clients) must
    /// observe the same session cookies.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`with_config`](Self::with_config).
    #[instrument(skip_all, fields(default_encoding = %config.default_encoding))]
    pub fn with_config_and_cookie_jar(
        config: FetchConfig,
        cookie_jar: Arc<Jar>,
    ) -> Result<Self, EngineError> {
        let default_encoding = Encoding::for_label(config.default_encoding.as_bytes())
            .ok_or_else(|| EngineError::UnknownDefaultEncoding {
                label: config.default_encoding.clone(),
            })?;
        let client = build_client(Arc::clone(&cookie_jar), config.timeout_secs)?;
        debug!("fetch engine ready");
        Ok(Self {
            client,
            cookie_jar,
            ledger: Arc::new(RetryLedger::new()),
            config,
            default_encoding,
            on_payload: None,
            on_failure: None,
        })
    }

    /// Sets the callback fired with `(payload, url)` after successful fetches.
    pub fn set_on_payload(&mut self, callback: PayloadCallback) {
        self.on_payload = Some(callback);
    }

    /// Sets the callback fired with `(url, reason)` when a detached fetch
    /// exhausts its retries or hits a terminal error.
    pub fn set_on_failure(&mut self, callback: FailureCallback) {
        self.on_failure = Some(callback);
    }

    /// Replaces the configured POST body for subsequent requests.
    pub fn set_post_body(&mut self, body: Option<String>) {
        self.config.post_body = body;
    }

    /// Returns the shared cookie jar.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.cookie_jar
    }

    /// Returns the engine's retry ledger.
    #[must_use]
    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    /// Returns the engine's configuration.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches `url`, retrying transport failures up to `max_retries` times.
    ///
    /// Text responses decode to [`FetchOutcome::Text`]; binary responses
    /// stream to a dated file path (extension taken from the URL) and yield
    /// [`FetchOutcome::Saved`]. Exhausted retries yield
    /// [`FetchOutcome::Failure`], never an error. When a payload callback
    /// is configured it also fires on success, off this call stack.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` only for non-transport failures: a malformed
    /// URL, an unresolvable declared encoding, or a filesystem failure
    /// while saving. These are not retried.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        max_retries: u32,
    ) -> Result<FetchOutcome, FetchError> {
        info!("starting fetch");
        self.fetch_inner(url, ExtensionPolicy::FromUrl, max_retries)
            .await
    }

    /// Fetches `url` and returns the payload string.
    ///
    /// The payload is the decoded text or the saved relative filename,
    /// depending on content classification; exhausted retries yield an
    /// empty string.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch`](Self::fetch).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str, max_retries: u32) -> Result<String, FetchError> {
        Ok(self
            .fetch(url, max_retries)
            .await?
            .into_payload()
            .unwrap_or_default())
    }

    /// Fetches `url` on a spawned task, delivering the payload via callback.
    ///
    /// The configured payload callback fires at most once, off the
    /// initiating call stack, with no ordering guarantee relative to other
    /// fetches. Binary bodies save with a fixed `.jpg` extension. On
    /// exhausted retries or a terminal error the failure callback fires
    /// when configured; otherwise the failure is logged and dropped.
    ///
    /// The returned handle can be awaited to observe task completion; the
    /// task itself never panics on fetch failure.
    #[instrument(skip(self), fields(url = %url))]
    pub fn fetch_detached(&self, url: &str, max_retries: u32) -> JoinHandle<()> {
        info!("starting detached fetch");
        let engine = self.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            match engine
                .fetch_inner(&url, ExtensionPolicy::FixedJpeg, max_retries)
                .await
            {
                Ok(FetchOutcome::Failure) => {
                    engine.notify_failure(&url, "retry budget exhausted".to_string());
                }
                Ok(_) => {} // payload callback already dispatched
                Err(err) => engine.notify_failure(&url, err.to_string()),
            }
        })
    }

    /// Fetches `url` and decodes the body as an in-memory image.
    ///
    /// No file is written and no callback fires. Exhausted retries yield
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ImageDecode`] when the body is not a decodable
    /// image (not retried), or [`FetchError::InvalidUrl`] for a malformed
    /// URL.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_image(
        &self,
        url: &str,
        max_retries: u32,
    ) -> Result<Option<image::DynamicImage>, FetchError> {
        info!("starting image fetch");
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        self.ledger.ensure(url, max_retries);
        loop {
            let attempt = async {
                let response = self.send(url).await?;
                decode_image(response, url).await
            };
            match attempt.await {
                Ok(decoded) => {
                    info!(url, "image fetch complete");
                    return Ok(Some(decoded));
                }
                Err(err) if err.is_transport() => match self.consume_retry(url, &err) {
                    RetryDecision::Retry { .. } => {}
                    RetryDecision::Exhausted => return Ok(None),
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Shared retry loop for the awaited and detached call shapes.
    async fn fetch_inner(
        &self,
        url: &str,
        extension: ExtensionPolicy,
        max_retries: u32,
    ) -> Result<FetchOutcome, FetchError> {
        // Parse once; an unparseable URL is terminal before any budget is
        // installed.
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        self.ledger.ensure(url, max_retries);
        loop {
            match self.attempt(url, &parsed, extension).await {
                Ok(outcome) => {
                    info!(url, "fetch complete");
                    self.notify_payload(&outcome, url);
                    return Ok(outcome);
                }
                Err(err) if err.is_transport() => match self.consume_retry(url, &err) {
                    RetryDecision::Retry { .. } => {}
                    RetryDecision::Exhausted => return Ok(FetchOutcome::Failure),
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// One attempt: send, classify, dispatch.
    async fn attempt(
        &self,
        url: &str,
        parsed: &Url,
        extension: ExtensionPolicy,
    ) -> Result<FetchOutcome, FetchError> {
        let response = self.send(url).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        match classify(&content_type) {
            Classification::Text => decode_text(response, self.default_encoding, url)
                .await
                .map(FetchOutcome::Text),
            Classification::Binary => {
                let extension = match extension {
                    ExtensionPolicy::FromUrl => extension_from_url(parsed),
                    ExtensionPolicy::FixedJpeg => ".jpg".to_string(),
                };
                save_to_file(
                    response,
                    &self.config.save_dir,
                    &extension,
                    self.config.chunk_size,
                    url,
                )
                .await
                .map(FetchOutcome::Saved)
            }
        }
    }

    /// Sends one request: POST with the configured body when present, GET
    /// otherwise. A status other than 200 OK is a transport failure.
    async fn send(&self, url: &str) -> Result<Response, FetchError> {
        let request = match &self.config.post_body {
            Some(body) => {
                let (encoded, _, _) = self.default_encoding.encode(body);
                self.client
                    .post(url)
                    .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                    .body(encoded.into_owned())
            }
            None => self.client.get(url),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::http_status(url, response.status().as_u16()));
        }
        Ok(response)
    }

    /// Logs a transport failure and consumes one retry from the budget.
    fn consume_retry(&self, url: &str, error: &FetchError) -> RetryDecision {
        warn!(url, error = %error, "transport failure");
        let decision = self.ledger.decrement_and_check(url);
        match decision {
            RetryDecision::Retry { remaining } => debug!(url, remaining, "re-attempting fetch"),
            RetryDecision::Exhausted => warn!(url, "retry budget exhausted, giving up"),
        }
        decision
    }

    /// Fires the payload callback on a spawned task. Empty payloads are
    /// skipped, matching consumer expectations for blank pages.
    fn notify_payload(&self, outcome: &FetchOutcome, url: &str) {
        let Some(callback) = self.on_payload.clone() else {
            return;
        };
        let Some(payload) = outcome.clone().into_payload() else {
            return;
        };
        if payload.is_empty() {
            return;
        }
        let url = url.to_string();
        tokio::spawn(async move { callback(payload, url) });
    }

    /// Fires the failure callback, or logs when none is configured.
    fn notify_failure(&self, url: &str, reason: String) {
        if let Some(callback) = self.on_failure.clone() {
            let url = url.to_string();
            tokio::spawn(async move { callback(url, reason) });
        } else {
            debug!(url, reason, "detached fetch failed; no failure callback configured");
        }
    }
}

fn build_client(cookie_jar: Arc<Jar>, timeout_secs: u64) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static(headers::ACCEPT));
    default_headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(headers::ACCEPT_LANGUAGE),
    );

    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .gzip(true)
        .deflate(true)
        .cookie_provider(cookie_jar)
        .user_agent(headers::BROWSER_USER_AGENT)
        .default_headers(default_headers)
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_default_encoding_is_rejected() {
        let config = FetchConfig {
            default_encoding: "x-martian".to_string(),
            ..FetchConfig::default()
        };
        let result = FetchEngine::with_config(config);
        assert!(matches!(
            result,
            Err(EngineError::UnknownDefaultEncoding { ref label }) if label == "x-martian"
        ));
    }

    #[test]
    fn test_encoding_labels_resolve_case_insensitively() {
        // WHATWG labels are case-insensitive, unlike content-type matching.
        let config = FetchConfig {
            default_encoding: "GBK".to_string(),
            ..FetchConfig::default()
        };
        assert!(FetchEngine::with_config(config).is_ok());
    }

    #[test]
    fn test_clone_shares_ledger() {
        let engine = FetchEngine::new();
        let clone = engine.clone();
        engine.ledger().ensure("http://a", 2);
        assert_eq!(clone.ledger().remaining("http://a"), Some(2));
    }

    #[test]
    fn test_debug_omits_callback_internals() {
        let mut engine = FetchEngine::new();
        engine.set_on_payload(Arc::new(|_, _| {}));
        let rendered = format!("{engine:?}");
        assert!(rendered.contains("has_payload_callback: true"));
        assert!(rendered.contains("has_failure_callback: false"));
    }

    #[test]
    fn test_set_post_body_replaces_config_value() {
        let mut engine = FetchEngine::new();
        assert_eq!(engine.config().post_body, None);
        engine.set_post_body(Some("code=1234".to_string()));
        assert_eq!(engine.config().post_body.as_deref(), Some("code=1234"));
        engine.set_post_body(None);
        assert_eq!(engine.config().post_body, None);
    }
}

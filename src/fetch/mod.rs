//! Retry-tracked fetch engine.
//!
//! This module fetches remote resources (HTML/text pages and binary images)
//! over HTTP with a bounded per-URL retry budget, and dispatches the fetched
//! payload by declared content type:
//!
//! - Text bodies decode to a string (header-declared encoding, else the
//!   configured default)
//! - Binary image bodies stream to a dated `YYYYMMDD/stamp.ext` file path,
//!   or decode directly to an in-memory image for the captcha accessor
//!
//! # Example
//!
//! ```no_run
//! use codefetch_core::fetch::{DEFAULT_MAX_RETRIES, FetchConfig, FetchEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig {
//!     save_dir: "./captchas".into(),
//!     ..FetchConfig::default()
//! };
//! let engine = FetchEngine::with_config(config)?;
//!
//! // Awaited fetch: decoded text or a saved relative filename.
//! let payload = engine
//!     .fetch_text("https://example.com/code.jpg", DEFAULT_MAX_RETRIES)
//!     .await?;
//! println!("{payload}");
//! # Ok(())
//! # }
//! ```

mod classify;
mod config;
mod constants;
mod dispatch;
mod engine;
mod error;
mod ledger;

pub use classify::{Classification, classify};
pub use config::FetchConfig;
pub use constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, REQUEST_TIMEOUT_SECS};
pub use dispatch::FetchOutcome;
pub use engine::{EngineError, FailureCallback, FetchEngine, PayloadCallback};
pub use error::FetchError;
pub use ledger::{RetryDecision, RetryLedger};

// Note: no module-local Result aliases; use `Result<T, FetchError>`
// explicitly in function signatures.

//! Codefetch Core Library
//!
//! This library provides the retry-tracked fetch engine used by scraper and
//! captcha-retrieval clients: bounded automatic retry per URL, shared cookie
//! state across requests, and content-type-based dispatch of response bodies
//! (decode as text, persist to a dated file path, or decode as an in-memory
//! image).
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Retry ledger, content classification, response dispatch,
//!   and the fetch engine itself
//!
//! The underlying HTTP transport (TLS, redirects, decompression) and cookie
//! storage are delegated to `reqwest`; this crate owns the retry budget
//! tracking and the dispatch of fetched payloads.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;

mod headers;

// Re-export commonly used types
pub use fetch::{
    Classification, DEFAULT_MAX_RETRIES, EngineError, FetchConfig, FetchEngine, FetchError,
    FetchOutcome, RetryDecision, RetryLedger, classify,
};

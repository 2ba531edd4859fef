//! Error types for the fetch module.
//!
//! This module defines structured errors for all fetch operations. The key
//! distinction is [`FetchError::is_transport`]: transport-level failures
//! (network, timeout, non-OK status) consume retry budget and are never
//! surfaced to callers as errors, while everything else (decode failures,
//! filesystem failures, malformed URLs) is terminal for the call and
//! propagates immediately.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The response carried a status other than 200 OK.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The response declared a text encoding this crate cannot resolve.
    #[error("unknown text encoding {label:?} declared by {url}")]
    UnknownEncoding {
        /// The URL whose response declared the encoding.
        url: String,
        /// The unresolvable encoding label.
        label: String,
    },

    /// The response body could not be decoded as an image.
    #[error("image decode failed for {url}: {source}")]
    ImageDecode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// File system error while persisting a binary body (create dir, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an unknown-encoding error.
    pub fn unknown_encoding(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self::UnknownEncoding {
            url: url.into(),
            label: label.into(),
        }
    }

    /// Creates an image decode error.
    pub fn image_decode(url: impl Into<String>, source: image::ImageError) -> Self {
        Self::ImageDecode {
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for transport-level failures that consume retry budget.
    ///
    /// A non-OK status is treated identically to a connection failure or a
    /// timeout: the upstream endpoints intermittently serve 404/5xx during
    /// rollover, and those requests succeed when re-issued.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::HttpStatus { .. }
        )
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or `From<std::io::Error>`
// because our error variants require context (url, path) that the source errors
// don't provide. The helper constructor methods (network(), io(), etc.) are the
// correct pattern here as they allow callers to provide necessary context.

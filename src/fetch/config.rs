//! Configuration for the fetch engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_ENCODING_LABEL, REQUEST_TIMEOUT_SECS};

/// Configuration for a [`FetchEngine`](super::FetchEngine).
///
/// Serializable so embedding applications can persist it alongside their
/// own settings. Fields not present in a stored document fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Base directory for binary downloads. Dated subdirectories are
    /// created beneath it.
    pub save_dir: PathBuf,

    /// Optional POST body. When set, requests go out as POST with an
    /// `application/x-www-form-urlencoded` content type; otherwise GET.
    pub post_body: Option<String>,

    /// Default text encoding label (WHATWG name, e.g. `utf-8`, `gbk`) used
    /// when a response declares no encoding. Also encodes the POST body.
    pub default_encoding: String,

    /// Buffer size for streaming binary bodies to disk.
    pub chunk_size: usize,

    /// Total request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("."),
            post_body: None,
            default_encoding: DEFAULT_ENCODING_LABEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

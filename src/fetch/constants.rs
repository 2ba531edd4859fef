//! Constants for the fetch module (timeouts, streaming, retry defaults).

/// Total request timeout (3 minutes). The captcha endpoints this engine was
/// built for are slow under load, so the bound is generous.
pub const REQUEST_TIMEOUT_SECS: u64 = 180;

/// Default buffer size for streaming response bodies to disk (2 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Default per-URL retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default text encoding label used when a response declares none.
pub const DEFAULT_ENCODING_LABEL: &str = "utf-8";

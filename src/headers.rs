//! Fixed request headers for fetch traffic.
//!
//! The scraping targets this engine talks to gate their endpoints on
//! browser-looking requests, so every request carries the same fixed
//! User-Agent, Accept, and Accept-Language values. Single source here so
//! the engine and tests stay consistent.

/// Browser User-Agent sent on every request.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.2; WOW64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/34.0.1847.116 Safari/537.36";

/// Accept header sent on every request.
pub(crate) const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Accept-Language header sent on every request.
pub(crate) const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.8";

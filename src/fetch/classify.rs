//! Content-type classification for response dispatch.
//!
//! A response body is either decoded as text or treated as binary image
//! content (saved to disk or decoded in memory). The split is driven by the
//! declared `Content-Type` header alone; the body is never sniffed.

/// How a response body should be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Decode the body to a string.
    Text,
    /// Persist the body to a dated file path, or decode it as an image.
    Binary,
}

/// Content types dispatched as binary image content.
///
/// Exact, case-sensitive membership: the upstream endpoints send these
/// values verbatim, and a vendor type that merely resembles one of them
/// must still be decoded as text. Variant casings such as `IMAGE/PNG`
/// therefore classify as [`Classification::Text`]; that matches the
/// long-standing behavior downstream scrapers depend on.
const BINARY_CONTENT_TYPES: [&str; 6] = [
    "image/bmp",
    "image/gif",
    "image/jpeg",
    "image/png",
    "image/tiff",
    "application/octet-stream",
];

/// Classifies a declared content type.
///
/// Everything outside the fixed binary allow-list is [`Classification::Text`],
/// including an empty or missing header and parameterized types such as
/// `text/html; charset=utf-8`.
#[must_use]
pub fn classify(content_type: &str) -> Classification {
    if BINARY_CONTENT_TYPES.contains(&content_type) {
        Classification::Binary
    } else {
        Classification::Text
    }
}

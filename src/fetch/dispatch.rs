//! Response dispatch: decode as text, persist to a dated path, or decode
//! as an in-memory image.
//!
//! The engine hands a successfully-received response to exactly one of the
//! dispatchers in this module, chosen by [`classify`](super::classify).
//! Binary bodies are streamed to `<base_dir>/<YYYYMMDD>/<stamp><ext>` in
//! buffered chunks; text bodies are decoded with the header-declared
//! encoding when one is present, else the engine's configured default.
//!
//! Body read errors surface as transport errors (the connection dropped
//! mid-body), so the engine retries them like any other network failure.
//! Decode and filesystem errors are terminal.

use std::path::Path;

use chrono::{Local, Timelike};
use encoding_rs::Encoding;
use futures_util::{Stream, StreamExt};
use reqwest::Response;
use reqwest::header::CONTENT_ENCODING;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;
use url::Url;

use super::error::FetchError;

/// Result of one completed attempt chain (success or exhausted retries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Text body decoded to a string.
    Text(String),
    /// Binary body persisted to disk; holds the `YYYYMMDD/stamp.ext`
    /// filename relative to the configured save directory.
    Saved(String),
    /// Retry budget exhausted without a successful attempt.
    Failure,
}

impl FetchOutcome {
    /// Returns the text or saved-filename payload, or `None` for a failure.
    #[must_use]
    pub fn into_payload(self) -> Option<String> {
        match self {
            Self::Text(payload) | Self::Saved(payload) => Some(payload),
            Self::Failure => None,
        }
    }
}

/// Decodes the full response body to a string.
///
/// A surviving `Content-Encoding` label picks the decoder; reqwest strips
/// the header for the compression codings it decompresses itself, so a
/// leftover label is a charset declaration from servers that misuse the
/// header. An unresolvable label is a terminal decode failure.
pub(crate) async fn decode_text(
    response: Response,
    default_encoding: &'static Encoding,
    url: &str,
) -> Result<String, FetchError> {
    let declared_label = response
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(std::string::ToString::to_string);

    let encoding = match declared_label {
        Some(label) => Encoding::for_label(label.as_bytes())
            .ok_or_else(|| FetchError::unknown_encoding(url, label))?,
        None => default_encoding,
    };

    let bytes = read_body(response, url).await?;
    let (decoded, actual_encoding, _) = encoding.decode(&bytes);
    debug!(url, encoding = actual_encoding.name(), bytes = bytes.len(), "decoded text body");
    Ok(decoded.into_owned())
}

/// Streams the response body to `<base_dir>/<YYYYMMDD>/<stamp><extension>`.
///
/// Creates the dated directory recursively, writes through a buffer of
/// `chunk_size` bytes, and returns the `YYYYMMDD/stamp.ext` filename
/// relative to `base_dir`. Any failure mid-write (transport or filesystem)
/// removes the partial file before the error is returned; a retry attempt
/// gets a fresh timestamped path.
pub(crate) async fn save_to_file(
    response: Response,
    base_dir: &Path,
    extension: &str,
    chunk_size: usize,
    url: &str,
) -> Result<String, FetchError> {
    let (day, stamp) = timestamp_components();
    let relative = format!("{day}/{stamp}{extension}");

    let day_dir = base_dir.join(&day);
    tokio::fs::create_dir_all(&day_dir)
        .await
        .map_err(|e| FetchError::io(day_dir.clone(), e))?;

    let file_path = base_dir.join(&relative);
    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| body_error(e, url)));
    let bytes_written = write_stream(stream, &file_path, chunk_size).await?;

    debug!(url, path = %file_path.display(), bytes = bytes_written, "saved binary body");
    Ok(relative)
}

/// Writes the chunk stream to `file_path`, returning the byte count.
///
/// On any error the file is removed, so no partial download is left
/// behind regardless of whether the chunk source or the writer failed.
async fn write_stream<S, B>(
    stream: S,
    file_path: &Path,
    chunk_size: usize,
) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<B, FetchError>>,
    B: AsRef<[u8]>,
{
    match write_stream_inner(stream, file_path, chunk_size).await {
        Ok(bytes_written) => Ok(bytes_written),
        Err(err) => {
            let _ = tokio::fs::remove_file(file_path).await;
            Err(err)
        }
    }
}

async fn write_stream_inner<S, B>(
    stream: S,
    file_path: &Path,
    chunk_size: usize,
) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<B, FetchError>>,
    B: AsRef<[u8]>,
{
    let file = File::create(file_path)
        .await
        .map_err(|e| FetchError::io(file_path.to_path_buf(), e))?;

    let mut writer = BufWriter::with_capacity(chunk_size.max(1), file);
    let mut bytes_written: u64 = 0;

    tokio::pin!(stream);
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        writer
            .write_all(chunk.as_ref())
            .await
            .map_err(|e| FetchError::io(file_path.to_path_buf(), e))?;
        bytes_written += chunk.as_ref().len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

/// Decodes the full response body as an image. No file is written.
pub(crate) async fn decode_image(
    response: Response,
    url: &str,
) -> Result<image::DynamicImage, FetchError> {
    let bytes = read_body(response, url).await?;
    let decoded =
        image::load_from_memory(&bytes).map_err(|e| FetchError::image_decode(url, e))?;
    debug!(url, bytes = bytes.len(), "decoded image body");
    Ok(decoded)
}

/// Extracts the extension (including the leading dot) from a URL's path.
///
/// Returns an empty string when the final path segment has no extension,
/// mirroring how saved filenames omit the extension for extensionless URLs.
#[must_use]
pub(crate) fn extension_from_url(url: &Url) -> String {
    let last_segment = url.path().rsplit('/').next().unwrap_or("");
    match last_segment.rfind('.') {
        Some(index) if index + 1 < last_segment.len() => last_segment[index..].to_string(),
        _ => String::new(),
    }
}

/// Current local time as (`YYYYMMDD`, `YYYYMMDDHHmmssffff`) components.
///
/// The stamp carries a 4-digit fraction in 100 microsecond units, so
/// concurrent saves collide only at sub-tick resolution.
fn timestamp_components() -> (String, String) {
    let now = Local::now();
    let day = now.format("%Y%m%d").to_string();
    let fraction = (now.nanosecond() % 1_000_000_000) / 100_000;
    let stamp = format!("{}{fraction:04}", now.format("%Y%m%d%H%M%S"));
    (day, stamp)
}

/// Reads the full body, mapping read failures to transport errors.
async fn read_body(response: Response, url: &str) -> Result<Vec<u8>, FetchError> {
    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| body_error(e, url))
}

fn body_error(error: reqwest::Error, url: &str) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Timestamp Tests ====================

    #[test]
    fn test_timestamp_components_shape() {
        let (day, stamp) = timestamp_components();
        assert_eq!(day.len(), 8);
        assert!(day.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(stamp.len(), 18, "14-digit datetime plus 4-digit fraction");
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert!(stamp.starts_with(&day));
    }

    // ==================== Extension Extraction Tests ====================

    #[test]
    fn test_extension_from_url_with_extension() {
        let url = Url::parse("http://example.com/captcha.png").unwrap();
        assert_eq!(extension_from_url(&url), ".png");
    }

    #[test]
    fn test_extension_from_url_without_extension() {
        let url = Url::parse("http://example.com/captcha").unwrap();
        assert_eq!(extension_from_url(&url), "");
    }

    #[test]
    fn test_extension_from_url_dotted_directory() {
        // Only the final segment contributes an extension.
        let url = Url::parse("http://example.com/v1.2/captcha").unwrap();
        assert_eq!(extension_from_url(&url), "");
    }

    #[test]
    fn test_extension_from_url_trailing_slash() {
        let url = Url::parse("http://example.com/images/").unwrap();
        assert_eq!(extension_from_url(&url), "");
    }

    #[test]
    fn test_extension_from_url_multi_dot_takes_last() {
        let url = Url::parse("http://example.com/archive.tar.gz").unwrap();
        assert_eq!(extension_from_url(&url), ".gz");
    }

    #[test]
    fn test_extension_from_url_trailing_dot() {
        let url = Url::parse("http://example.com/file.").unwrap();
        assert_eq!(extension_from_url(&url), "");
    }

    #[test]
    fn test_extension_from_url_ignores_query() {
        let url = Url::parse("http://example.com/code.jpg?session=abc.def").unwrap();
        assert_eq!(extension_from_url(&url), ".jpg");
    }

    // ==================== Streamed Write Tests ====================

    #[tokio::test]
    async fn test_write_stream_persists_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("saved.bin");
        let chunks: Vec<Result<Vec<u8>, FetchError>> =
            vec![Ok(vec![1u8; 64]), Ok(vec![2u8; 32])];

        let bytes_written =
            write_stream(futures_util::stream::iter(chunks), &file_path, 16)
                .await
                .unwrap();

        assert_eq!(bytes_written, 96);
        assert_eq!(std::fs::read(&file_path).unwrap().len(), 96);
    }

    #[tokio::test]
    async fn test_write_stream_removes_partial_file_on_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("partial.bin");
        let chunks: Vec<Result<Vec<u8>, FetchError>> = vec![
            Ok(vec![0u8; 64]),
            Err(FetchError::timeout("http://example.com/code.jpg")),
        ];

        let result =
            write_stream(futures_util::stream::iter(chunks), &file_path, 16).await;

        assert!(matches!(result, Err(FetchError::Timeout { .. })));
        assert!(!file_path.exists(), "partial file must not survive the error");
    }

    #[tokio::test]
    async fn test_write_stream_removes_partial_file_on_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("partial.bin");
        let chunks: Vec<Result<Vec<u8>, FetchError>> = vec![
            Ok(vec![0u8; 64]),
            Err(FetchError::io(
                file_path.clone(),
                std::io::Error::other("disk full"),
            )),
        ];

        let result =
            write_stream(futures_util::stream::iter(chunks), &file_path, 16).await;

        assert!(matches!(result, Err(FetchError::Io { .. })));
        assert!(!file_path.exists(), "partial file must not survive the error");
    }

    // ==================== Outcome Tests ====================

    #[test]
    fn test_outcome_payload_extraction() {
        assert_eq!(
            FetchOutcome::Text("body".into()).into_payload(),
            Some("body".to_string())
        );
        assert_eq!(
            FetchOutcome::Saved("20240101/x.jpg".into()).into_payload(),
            Some("20240101/x.jpg".to_string())
        );
        assert_eq!(FetchOutcome::Failure.into_payload(), None);
    }
}

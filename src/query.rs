//! Query encoding for URL embedding.
//!
//! Free-text queries are percent-encoded once and the encoded form is
//! substituted into both the deep-link and web URL templates. Platform
//! templates differ only in host/path, never in encoding rules.

/// Percent-encode a raw query for safe embedding in a URL.
///
/// Leading/trailing whitespace is trimmed before encoding. Reserved URL
/// characters (space, `&`, `?`, `#`, `/`, `=`) are all escaped.
pub fn encode_query(raw: &str) -> String {
    urlencoding::encode(raw.trim()).into_owned()
}

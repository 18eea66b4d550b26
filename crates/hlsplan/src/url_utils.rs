//! URL helpers for manifest references.
//!
//! Relative references are resolved with plain string rules instead of
//! [`Url::join`]: no dot-segment removal, no percent-decoding, and the base query
//! is never carried over.

use url::Url;

/// Returns true when `reference` already names its own scheme (`http:`, `base64:`, `file:` ...).
pub fn has_scheme(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.len() > 1
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn origin_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Resolve `reference` against `base_url`.
///
/// * `/x/seg.ts` keeps only the scheme, host and port of the base.
/// * `seg.ts` is appended to the directory of the base path; a base path ending
///   in `/` is used as-is.
/// * References that carry a scheme are returned untouched, as are references
///   against a base that does not parse.
pub fn combine(base_url: &str, reference: &str) -> String {
    if has_scheme(reference) {
        return reference.to_string();
    }
    let Ok(base) = Url::parse(base_url) else {
        return reference.to_string();
    };

    let origin = origin_of(&base);
    if reference.starts_with('/') {
        return format!("{origin}{reference}");
    }

    let path = base.path();
    if path.ends_with('/') {
        return format!("{origin}{path}{reference}");
    }
    let dir = match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => path,
    };
    format!("{origin}{dir}/{reference}")
}

/// Directory URL of `url`: the query is dropped, then everything after the last
/// `/` (the slash itself is kept).
pub fn base_of(url: &str) -> String {
    let without_query = match url.rfind('?') {
        Some(idx) => &url[..idx],
        None => url,
    };
    match without_query.rfind('/') {
        Some(idx) => without_query[..=idx].to_string(),
        None => without_query.to_string(),
    }
}

/// Query string of `url` without the leading `?`, if any.
pub fn query_of(url: &str) -> Option<&str> {
    url.split_once('?').map(|(_, query)| query)
}

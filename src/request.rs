//! Outbound request construction
//!
//! Pure functions that turn the configured templates plus a lookup key into
//! the pieces of an HTTP request: final URL, optional body payload, and header
//! map. No I/O happens here; the [`crate::fetch`] module executes the result.
//!
//! Templates use a single substitution point: every occurrence of the literal
//! `{key}` placeholder is replaced with the lookup key.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

/// Placeholder replaced by the lookup key in query and body templates.
pub const KEY_PLACEHOLDER: &str = "{key}";

/// Builds the request URL from the base URL and optional query template.
///
/// Without a template the base URL is returned unchanged. With one, the
/// rendered template is appended after `?`, or after `&` when the base URL
/// already carries a query string.
///
/// # Examples
///
/// ```
/// use fetchdns::request::build_url;
///
/// let url = build_url("https://svc/ip/", Some("name={key}"), "host1");
/// assert_eq!(url, "https://svc/ip/?name=host1");
///
/// let url = build_url("https://svc/ip?v=4", Some("name={key}"), "host1");
/// assert_eq!(url, "https://svc/ip?v=4&name=host1");
/// ```
pub fn build_url(base_url: &str, query_template: Option<&str>, key: &str) -> String {
    let template = match query_template {
        Some(t) if !t.is_empty() => t,
        _ => return base_url.to_string(),
    };

    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}",
        base_url,
        separator,
        template.replace(KEY_PLACEHOLDER, key)
    )
}

/// Renders the request body template, or returns `None` when no body is
/// configured.
pub fn build_body(body_template: Option<&str>, key: &str) -> Option<String> {
    match body_template {
        Some(t) if !t.is_empty() => Some(t.replace(KEY_PLACEHOLDER, key)),
        _ => None,
    }
}

/// Builds a header map from `"Name: Value"` specs.
///
/// Each spec is split on its first colon and both sides are trimmed. Later
/// duplicate names overwrite earlier ones. Specs without a colon, and specs
/// the HTTP layer rejects as invalid names or values, are skipped with a
/// warning.
pub fn build_headers(specs: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for spec in specs {
        let Some((name, value)) = spec.split_once(':') else {
            warn!("skipping malformed header spec without colon: {}", spec);
            continue;
        };
        let name = match HeaderName::from_bytes(name.trim().as_bytes()) {
            Ok(n) => n,
            Err(e) => {
                warn!("skipping header with invalid name {:?}: {}", name.trim(), e);
                continue;
            }
        };
        let value = match HeaderValue::from_str(value.trim()) {
            Ok(v) => v,
            Err(e) => {
                warn!("skipping header {} with invalid value: {}", name, e);
                continue;
            }
        };
        headers.insert(name, value);
    }
    headers
}

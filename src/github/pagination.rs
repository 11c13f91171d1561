//! Link-header navigation for paginated GitHub collections.
//!
//! GitHub paginates collection endpoints with an RFC 5988 `Link` header:
//!
//! ```text
//! <https://api.github.com/app/installations?page=2>; rel="next",
//! <https://api.github.com/app/installations?page=5>; rel="last"
//! ```
//!
//! Callers keep requesting the `next` target until the header no longer
//! offers one.

use http::HeaderMap;
use http::header::LINK;
use url::Url;

/// Upper bound on pages followed for a single collection.
///
/// Guards against a server that keeps returning a `next` link forever.
pub const MAX_PAGES: usize = 100;

/// Returns the `rel="next"` target of the response's `Link` header.
///
/// # Example
///
/// ```
/// use butler::github::pagination::next_link;
/// use http::{HeaderMap, HeaderValue, header::LINK};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(
///     LINK,
///     HeaderValue::from_static("<https://api.github.com/x?page=2>; rel=\"next\""),
/// );
/// let next = next_link(&headers).expect("next link present");
/// assert_eq!(next.as_str(), "https://api.github.com/x?page=2");
/// ```
#[must_use]
pub fn next_link(headers: &HeaderMap) -> Option<Url> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(parse_next_entry)
}

fn parse_next_entry(entry: &str) -> Option<Url> {
    let mut parts = entry.split(';');
    let target = parts.next()?.trim();
    let is_next = parts.any(|param| {
        param
            .trim()
            .strip_prefix("rel=")
            .map(|rel| rel.trim_matches('"'))
            .is_some_and(|rel| rel.split_whitespace().any(|kind| kind == "next"))
    });
    if !is_next {
        return None;
    }
    let raw = target.strip_prefix('<')?.strip_suffix('>')?;
    Url::parse(raw).ok()
}

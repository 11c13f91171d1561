//! Rate limit information from GitHub API responses.
//!
//! Every authenticated response carries `X-RateLimit-*` headers. Sessions read
//! them after each call so quota exhaustion on one installation is visible in
//! telemetry before requests start failing.

use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderMap;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Rate limit information extracted from GitHub API response headers.
///
/// # Example
///
/// ```
/// use butler::github::rate_limit::RateLimitInfo;
///
/// let info = RateLimitInfo::new(5000, 4999, 1700000000);
/// assert!(!info.is_exhausted());
/// assert_eq!(info.remaining(), 4999);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed in the current window.
    limit: u32,
    /// Remaining requests in the current window.
    remaining: u32,
    /// Unix timestamp when the rate limit resets.
    reset_at: u64,
}

impl RateLimitInfo {
    /// Creates a new rate limit info instance.
    #[must_use]
    pub const fn new(limit: u32, remaining: u32, reset_at: u64) -> Self {
        Self {
            limit,
            remaining,
            reset_at,
        }
    }

    /// Reads the rate limit headers from a response.
    ///
    /// Returns `None` unless both the limit and remaining headers are present
    /// and numeric. A missing reset header is recorded as zero.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = numeric_header(headers, LIMIT_HEADER)?;
        let remaining = numeric_header(headers, REMAINING_HEADER)?;
        let reset_at = numeric_header(headers, RESET_HEADER).unwrap_or(0);
        Some(Self::new(limit, remaining, reset_at))
    }

    /// Returns the maximum requests allowed in the current window.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the remaining requests in the current window.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns the Unix timestamp when the rate limit resets.
    #[must_use]
    pub const fn reset_at(&self) -> u64 {
        self.reset_at
    }

    /// Returns true if the rate limit has been exhausted.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Calculates seconds until the rate limit resets.
    ///
    /// Returns 0 if the reset time has already passed or if the system time
    /// cannot be determined.
    #[must_use]
    pub fn seconds_until_reset(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0);

        self.reset_at.saturating_sub(now)
    }
}

fn numeric_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue};
    use rstest::rstest;

    use super::RateLimitInfo;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[rstest]
    fn reads_all_three_headers() {
        let info = RateLimitInfo::from_headers(&headers(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "1700000000"),
        ]))
        .expect("headers should parse");

        assert_eq!(info, RateLimitInfo::new(5000, 0, 1_700_000_000));
        assert!(info.is_exhausted(), "zero remaining should be exhausted");
    }

    #[rstest]
    #[case::missing_remaining(&[("x-ratelimit-limit", "5000")])]
    #[case::non_numeric(&[("x-ratelimit-limit", "lots"), ("x-ratelimit-remaining", "3")])]
    fn incomplete_headers_yield_none(#[case] pairs: &[(&'static str, &'static str)]) {
        assert_eq!(RateLimitInfo::from_headers(&headers(pairs)), None);
    }

    #[test]
    fn seconds_until_reset_returns_zero_when_reset_has_passed() {
        let info = RateLimitInfo::new(5000, 0, 0);
        assert_eq!(info.seconds_until_reset(), 0);
    }
}

//! Helpers shared by the HTTP-based adapters

use erpgate_core::ErpError;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Map a transport failure to the error taxonomy
pub(crate) fn transport_error(context: &str, err: reqwest::Error) -> ErpError {
    if err.is_timeout() {
        ErpError::Timeout(format!("{}: {}", context, err))
    } else if err.is_decode() {
        ErpError::Backend(format!("{}: invalid response body: {}", context, err))
    } else {
        ErpError::Connection(format!("{}: {}", context, err))
    }
}

/// Seconds from a `Retry-After` header, when it carries a delay
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Shorten a response body for error messages
pub(crate) fn snippet(body: &str) -> &str {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(retry_after(&headers), Some(30));
    }

    #[test]
    fn test_retry_after_http_date_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_snippet_is_char_safe() {
        let body = "ü".repeat(300);
        assert_eq!(snippet(&body).chars().count(), 200);
        assert_eq!(snippet("short"), "short");
    }
}

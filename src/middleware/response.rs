//! Terminal responses for rejected requests.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Response;

use crate::error::Rejection;

/// Quota left for the caller on this route.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Configured capacity.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Whole seconds until the next refill.
pub const X_RATELIMIT_RETRY_AFTER: HeaderName = HeaderName::from_static("x-ratelimit-retry-after");

/// Build the response for `rejection` with an empty body.
pub fn rejection_response<B: Default>(rejection: &Rejection) -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = rejection.status();
    insert_headers(response.headers_mut(), rejection);
    response
}

fn insert_headers(headers: &mut HeaderMap, rejection: &Rejection) {
    if let Rejection::QuotaExceeded {
        limit,
        remaining,
        retry_after,
    } = rejection
    {
        if let Some(limit) = limit {
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(*limit));
        }
        if let Some(remaining) = remaining {
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(*remaining));
        }
        headers.insert(X_RATELIMIT_RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::time::Duration;

    #[test]
    fn test_unauthorized_has_no_headers() {
        let response: Response<String> = rejection_response(&Rejection::Unauthorized);

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().is_empty());
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_leaking_bucket_headers() {
        let response: Response<String> = rejection_response(&Rejection::QuotaExceeded {
            limit: Some(2),
            remaining: None,
            retry_after: Duration::from_secs(60),
        });

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[&X_RATELIMIT_LIMIT], "2");
        assert_eq!(response.headers()[&X_RATELIMIT_RETRY_AFTER], "60");
        assert!(!response.headers().contains_key(&X_RATELIMIT_REMAINING));
    }

    #[test]
    fn test_token_bucket_headers() {
        let response: Response<String> = rejection_response(&Rejection::QuotaExceeded {
            limit: None,
            remaining: Some(0),
            retry_after: Duration::from_secs(2),
        });

        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "0");
        assert_eq!(response.headers()[&X_RATELIMIT_RETRY_AFTER], "2");
        assert!(!response.headers().contains_key(&X_RATELIMIT_LIMIT));
    }

    #[test]
    fn test_retry_after_truncates_to_whole_seconds() {
        let response: Response<String> = rejection_response(&Rejection::QuotaExceeded {
            limit: Some(1),
            remaining: None,
            retry_after: Duration::from_millis(1999),
        });

        assert_eq!(response.headers()[&X_RATELIMIT_RETRY_AFTER], "1");
    }

    #[test]
    fn test_unconfigured_route_is_internal_error() {
        let response: Response<String> =
            rejection_response(&Rejection::UnconfiguredRoute { route: "/baz".to_string() });

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

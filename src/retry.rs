//! Response classification and retry backoff.
//!
//! After each send attempt the transport loop asks [`classify`] what to do
//! next, and [`retry_delay`] how long to wait before resending.

use crate::options::RequestOptions;
use http::{HeaderMap, StatusCode};
use rand::Rng;
use std::time::{Duration, SystemTime};

/// Maximum number of redirects followed for one logical call.
pub const MAX_REDIRECTS: u32 = 20;

/// Header carrying the current retry count on every attempt.
pub const RETRY_COUNT_HEADER: &str = "x-stainless-retry-count";

/// Server hint that overrides status-based retry classification.
pub const SHOULD_RETRY_HEADER: &str = "x-should-retry";

/// What the transport loop does with the outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A `2xx` response: hand it to the decoder.
    Success,
    /// A `3xx` response: follow `Location`.
    Redirect,
    /// A retriable failure with retry budget left.
    Retry,
    /// A terminal failure.
    Fail,
}

/// Returns `true` for statuses worth resending: 408, 409, 429 and 5xx.
///
/// # Examples
///
/// ```
/// use restcore::retry::is_retriable_status;
/// use http::StatusCode;
///
/// assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
/// assert!(is_retriable_status(StatusCode::BAD_GATEWAY));
/// assert!(!is_retriable_status(StatusCode::UNAUTHORIZED));
/// ```
pub fn is_retriable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 429) || status.is_server_error()
}

/// Decides whether another attempt is warranted.
///
/// `response` is `None` when the transport produced no response at all. The
/// retry budget is checked first; then an explicit `x-should-retry` header
/// wins over the status code.
pub fn should_retry(
    response: Option<(StatusCode, &HeaderMap)>,
    retry_count: u32,
    max_retries: u32,
) -> bool {
    if retry_count >= max_retries {
        return false;
    }
    let Some((status, headers)) = response else {
        return true;
    };
    match headers
        .get(SHOULD_RETRY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some("true") => true,
        Some("false") => false,
        _ => is_retriable_status(status),
    }
}

/// Classifies a received response.
pub fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    retry_count: u32,
    max_retries: u32,
) -> Action {
    if status.is_redirection() {
        Action::Redirect
    } else if status.as_u16() >= 400 {
        if should_retry(Some((status, headers)), retry_count, max_retries) {
            Action::Retry
        } else {
            Action::Fail
        }
    } else {
        Action::Success
    }
}

/// Computes how long to wait before the next attempt.
///
/// A `Retry-After` header on the failed response wins; otherwise the delay
/// is [`backoff`] with a fresh jitter factor in `[0.75, 1.0]`.
pub fn retry_delay(
    headers: Option<&HeaderMap>,
    retry_count: u32,
    options: &RequestOptions,
) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }
    let jitter = 1.0 - 0.25 * rand::thread_rng().gen_range(0.0..1.0);
    backoff(
        options.initial_retry_delay,
        options.max_retry_delay,
        retry_count,
        jitter,
    )
}

/// `clamp(initial × retry_count² × jitter, 0, max)`.
///
/// Growth is quadratic, and the first retry (`retry_count == 0`) is
/// immediate.
///
/// # Examples
///
/// ```
/// use restcore::retry::backoff;
/// use std::time::Duration;
///
/// let initial = Duration::from_millis(500);
/// let max = Duration::from_secs(8);
///
/// assert_eq!(backoff(initial, max, 0, 1.0), Duration::ZERO);
/// assert_eq!(backoff(initial, max, 2, 1.0), Duration::from_secs(2));
/// assert_eq!(backoff(initial, max, 10, 0.75), max);
/// ```
pub fn backoff(initial: Duration, max: Duration, retry_count: u32, jitter: f64) -> Duration {
    let squared = f64::from(retry_count).powi(2);
    let seconds = initial.as_secs_f64() * squared * jitter;
    let seconds = seconds.clamp(0.0, max.as_secs_f64());
    Duration::try_from_secs_f64(seconds).unwrap_or(max)
}

/// Parses `Retry-After` as delay-seconds or as an HTTP date.
///
/// Dates in the past yield a zero delay. Unparseable values yield `None`.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?.trim();

    if let Ok(seconds) = header.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let date = httpdate::parse_http_date(header).ok()?;
    Some(
        date.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_status_classification_table() {
        let empty = HeaderMap::new();
        for code in [408, 409, 429, 500, 503] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify(status, &empty, 0, 2), Action::Retry, "{code}");
        }
        for code in [400, 401, 403, 404, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify(status, &empty, 0, 2), Action::Fail, "{code}");
        }
        for code in 200..300 {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify(status, &empty, 0, 2), Action::Success, "{code}");
        }
        for code in 300..400 {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify(status, &empty, 0, 2), Action::Redirect, "{code}");
        }
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let empty = HeaderMap::new();
        assert_eq!(
            classify(StatusCode::SERVICE_UNAVAILABLE, &empty, 2, 2),
            Action::Fail
        );
        assert!(!should_retry(None, 0, 0));
        assert!(should_retry(None, 0, 1));
    }

    #[test]
    fn test_should_retry_header_overrides_status() {
        let yes = headers(&[("x-should-retry", "true")]);
        let no = headers(&[("x-should-retry", "false")]);
        assert!(should_retry(Some((StatusCode::BAD_REQUEST, &yes)), 0, 1));
        assert!(!should_retry(Some((StatusCode::INTERNAL_SERVER_ERROR, &no)), 0, 1));
        assert!(!should_retry(Some((StatusCode::BAD_REQUEST, &yes)), 1, 1));
    }

    #[test]
    fn test_retry_after_seconds_wins() {
        let options = RequestOptions::default();
        let retry_after = headers(&[("retry-after", "5")]);
        for retry_count in [0, 1, 7] {
            assert_eq!(
                retry_delay(Some(&retry_after), retry_count, &options),
                Duration::from_secs(5)
            );
        }
        let fractional = headers(&[("retry-after", "1.5")]);
        assert_eq!(
            retry_delay(Some(&fractional), 0, &options),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_retry_after_http_date() {
        let future = SystemTime::now() + Duration::from_secs(30);
        let date = httpdate::fmt_http_date(future);
        let header = headers(&[("retry-after", date.as_str())]);
        let delay = parse_retry_after(&header).unwrap();
        assert!(delay <= Duration::from_secs(30));
        assert!(delay >= Duration::from_secs(28));

        let past = headers(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        assert_eq!(parse_retry_after(&past), Some(Duration::ZERO));
    }

    #[test]
    fn test_unparseable_retry_after_falls_through() {
        let options = RequestOptions::default();
        let garbage = headers(&[("retry-after", "soon")]);
        assert_eq!(parse_retry_after(&garbage), None);
        assert_eq!(retry_delay(Some(&garbage), 0, &options), Duration::ZERO);
        let negative = headers(&[("retry-after", "-3")]);
        assert_eq!(parse_retry_after(&negative), None);
    }

    #[test]
    fn test_backoff_bounds() {
        let initial = Duration::from_millis(500);
        let max = Duration::from_secs(8);
        let mut previous = Duration::ZERO;
        for retry_count in 0..20 {
            let unjittered = backoff(initial, Duration::MAX, retry_count, 1.0);
            assert!(unjittered >= previous);
            previous = unjittered;

            for jitter in [0.75, 0.9, 1.0] {
                let delay = backoff(initial, max, retry_count, jitter);
                assert!(delay <= max);
            }
        }
        assert_eq!(backoff(initial, max, 1, 0.75), Duration::from_millis(375));
    }

    #[test]
    fn test_jittered_delay_stays_in_range() {
        let options = RequestOptions::default();
        for _ in 0..100 {
            let delay = retry_delay(None, 2, &options);
            assert!(delay >= Duration::from_millis(1500));
            assert!(delay <= Duration::from_secs(2));
        }
    }
}

//! Per-call request options and their resolution against client defaults.

use crate::metadata::HeaderOverrides;
use crate::path::merge_query;
use crate::transport::Transport;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base of the backoff computation.
pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Default cap of the backoff computation.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Fully resolved options governing one logical call.
///
/// Every field has a default; see [`RequestOptions::default`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Deadline handed to the transport for each attempt.
    pub timeout: Duration,
    /// How many times a failed attempt may be resent.
    pub max_retries: u32,
    /// Base delay of the quadratic backoff.
    pub initial_retry_delay: Duration,
    /// Upper bound of the computed backoff.
    pub max_retry_delay: Duration,
    /// Headers applied after every other header layer.
    pub extra_headers: HeaderOverrides,
    /// Query parameters merged over the call's own query.
    pub extra_query_params: Map<String, Value>,
    /// Fields merged into top-level JSON object bodies.
    pub extra_body_params: Map<String, Value>,
    /// Transport overriding the client's for this call.
    pub transport: Option<Arc<dyn Transport>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_retry_delay: DEFAULT_INITIAL_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            extra_headers: HeaderOverrides::new(),
            extra_query_params: Map::new(),
            extra_body_params: Map::new(),
            transport: None,
        }
    }
}

impl RequestOptions {
    /// Resolves `patch` over these options.
    ///
    /// Scalar fields are replaced when set. Extra headers are layered so the
    /// patch wins, extra query parameters are merged recursively, and extra
    /// body fields from the patch replace same-named fields.
    pub fn merged(&self, patch: &PartialRequestOptions) -> RequestOptions {
        let mut resolved = self.clone();
        if let Some(timeout) = patch.timeout {
            resolved.timeout = timeout;
        }
        if let Some(max_retries) = patch.max_retries {
            resolved.max_retries = max_retries;
        }
        if let Some(delay) = patch.initial_retry_delay {
            resolved.initial_retry_delay = delay;
        }
        if let Some(delay) = patch.max_retry_delay {
            resolved.max_retry_delay = delay;
        }
        resolved.extra_headers.extend(&patch.extra_headers);
        merge_query(
            &mut resolved.extra_query_params,
            patch.extra_query_params.clone(),
        );
        for (key, value) in &patch.extra_body_params {
            resolved
                .extra_body_params
                .insert(key.clone(), value.clone());
        }
        if let Some(transport) = &patch.transport {
            resolved.transport = Some(transport.clone());
        }
        resolved
    }
}

/// Call-level options; unset fields fall back to the client's defaults.
///
/// # Examples
///
/// ```
/// use restcore::options::{PartialRequestOptions, RequestOptions};
/// use std::time::Duration;
///
/// let patch = PartialRequestOptions::new()
///     .max_retries(5)
///     .timeout(Duration::from_secs(10));
///
/// let resolved = RequestOptions::default().merged(&patch);
/// assert_eq!(resolved.max_retries, 5);
/// assert_eq!(resolved.timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PartialRequestOptions {
    /// Overrides [`RequestOptions::timeout`].
    pub timeout: Option<Duration>,
    /// Overrides [`RequestOptions::max_retries`].
    pub max_retries: Option<u32>,
    /// Overrides [`RequestOptions::initial_retry_delay`].
    pub initial_retry_delay: Option<Duration>,
    /// Overrides [`RequestOptions::max_retry_delay`].
    pub max_retry_delay: Option<Duration>,
    /// Layered over the client's extra headers.
    pub extra_headers: HeaderOverrides,
    /// Merged over the client's extra query parameters.
    pub extra_query_params: Map<String, Value>,
    /// Merged over the client's extra body fields.
    pub extra_body_params: Map<String, Value>,
    /// Overrides [`RequestOptions::transport`].
    pub transport: Option<Arc<dyn Transport>>,
}

impl PartialRequestOptions {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry cap.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the base backoff delay.
    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = Some(delay);
        self
    }

    /// Sets the backoff cap.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = Some(delay);
        self
    }

    /// Sets the extra header layer.
    pub fn extra_headers(mut self, headers: HeaderOverrides) -> Self {
        self.extra_headers = headers;
        self
    }

    /// Adds one extra query parameter.
    pub fn extra_query_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut single = Map::new();
        single.insert(key.into(), value.into());
        merge_query(&mut self.extra_query_params, single);
        self
    }

    /// Adds one extra top-level body field.
    pub fn extra_body_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_body_params.insert(key.into(), value.into());
        self
    }

    /// Uses `transport` for this call.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = RequestOptions::default();
        assert_eq!(options.max_retries, 2);
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert_eq!(options.initial_retry_delay, Duration::from_millis(500));
        assert_eq!(options.max_retry_delay, Duration::from_secs(8));
        assert!(options.transport.is_none());
    }

    #[test]
    fn test_patch_only_overrides_what_it_sets() {
        let base = RequestOptions {
            max_retries: 7,
            ..RequestOptions::default()
        };
        let resolved = base.merged(&PartialRequestOptions::new().timeout(Duration::from_secs(1)));
        assert_eq!(resolved.max_retries, 7);
        assert_eq!(resolved.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_extra_params_merge() {
        let base = RequestOptions::default().merged(
            &PartialRequestOptions::new()
                .extra_query_param("tag", "a")
                .extra_body_param("source", "client"),
        );
        let resolved = base.merged(
            &PartialRequestOptions::new()
                .extra_query_param("tag", "b")
                .extra_body_param("source", "call"),
        );
        assert_eq!(
            Value::Object(resolved.extra_query_params),
            json!({"tag": ["a", "b"]})
        );
        assert_eq!(resolved.extra_body_params["source"], json!("call"));
    }
}

//! Error types for the request pipeline.
//!
//! Every failure a caller can observe is one of four kinds: the transport
//! never produced a usable response ([`Error::Connection`]), the server answered
//! with a terminal error status ([`Error::Status`]), the body could not be parsed
//! for its declared content type ([`Error::Decode`]), or the decoded payload did
//! not fit its declared shape ([`Error::Validation`]). Retriable conditions are
//! resolved inside the transport loop and never surface on their own.

use http::{HeaderMap, Method, StatusCode};

/// The main error type for API calls.
///
/// Each variant keeps enough context (method, URL, status, raw body) to diagnose
/// a failure without re-running the call with verbose logging.
///
/// # Examples
///
/// ```no_run
/// use restcore::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.get::<serde_json::Value>("/buckets").await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::Status { status, body, .. }) => {
///         eprintln!("HTTP error {}: {}", status, body);
///     }
///     Err(Error::Connection { message, .. }) => eprintln!("No response: {}", message),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No usable response was obtained.
    ///
    /// Covers network failures, DNS errors and timeouts reported by the
    /// transport, as well as protocol violations such as a redirect without a
    /// `Location` header or too many redirects.
    #[error("Connection error for {method} {url}: {message}")]
    Connection {
        /// The method of the attempted request
        method: Method,
        /// The URL of the attempted request
        url: String,
        /// What went wrong
        message: String,
        /// The underlying transport error, if there was one
        source: Option<reqwest::Error>,
    },

    /// The server returned a terminal error status.
    ///
    /// Either the status is not retriable or the retry budget ran out. The full
    /// response is preserved for inspection.
    #[error("HTTP error {status} for {method} {url}: {body}")]
    Status {
        /// The method of the request
        method: Method,
        /// The URL of the final attempt
        url: String,
        /// The HTTP status code
        status: StatusCode,
        /// The response headers
        headers: HeaderMap,
        /// The raw response body
        body: String,
    },

    /// The response body could not be parsed according to its `Content-Type`.
    #[error("Failed to decode response (status {status}): {message}")]
    Decode {
        /// The HTTP status code
        status: StatusCode,
        /// The declared content type, if any
        content_type: Option<String>,
        /// The parser error message
        message: String,
        /// The raw body, when it was read in full
        raw_response: String,
    },

    /// The decoded payload is structurally incompatible with its declared shape.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Invalid configuration was provided, such as a bad header name or a path
    /// template referencing a missing segment.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request body could not be serialized.
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// An invalid URL was provided or produced while joining paths.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Raised by struct converters when a payload cannot populate a declared shape.
///
/// Paths use a `$`-rooted JSONPath-like notation, e.g. `$.items[2].name`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is absent from the payload.
    #[error("missing required field `{path}`")]
    MissingField {
        /// Location of the missing field
        path: String,
    },

    /// A value does not match its declared shape.
    #[error("value at `{path}` is not a valid {expected}")]
    Incompatible {
        /// Location of the offending value
        path: String,
        /// Human readable description of the expected shape
        expected: String,
    },

    /// The coerced value could not be materialized as the requested Rust type.
    #[error("failed to build typed value: {0}")]
    Deserialize(String),
}

impl Error {
    pub(crate) fn connection(
        method: &Method,
        url: &url::Url,
        message: impl Into<String>,
        source: Option<reqwest::Error>,
    ) -> Self {
        Error::Connection {
            method: method.clone(),
            url: url.to_string(),
            message: message.into(),
            source,
        }
    }

    /// Returns `true` if the condition behind this error is one the transport
    /// loop would retry.
    ///
    /// Connection errors count only when the transport failed to exchange the
    /// request. A failure while reading or decompressing a response body that
    /// already arrived is not retried.
    ///
    /// # Examples
    ///
    /// ```
    /// use restcore::Error;
    /// use http::{HeaderMap, Method, StatusCode};
    ///
    /// let err = Error::Status {
    ///     method: Method::GET,
    ///     url: "https://api.example.com/".to_string(),
    ///     status: StatusCode::CONFLICT,
    ///     headers: HeaderMap::new(),
    ///     body: String::new(),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Status {
    ///     method: Method::GET,
    ///     url: "https://api.example.com/".to_string(),
    ///     status: StatusCode::NOT_FOUND,
    ///     headers: HeaderMap::new(),
    ///     body: String::new(),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connection { source, .. } => source
                .as_ref()
                .is_some_and(|e| !(e.is_body() || e.is_decode())),
            Error::Status { status, .. } => crate::retry::is_retriable_status(*status),
            Error::Decode { .. }
            | Error::Validation(_)
            | Error::Configuration(_)
            | Error::Serialization(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns `true` if the transport gave up because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Connection { source: Some(e), .. } if e.is_timeout())
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Status { body, .. } => Some(body),
            Error::Decode { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_is_not_retryable() {
        let url = url::Url::parse("https://api.example.com/a").unwrap();
        let err = Error::connection(&Method::GET, &url, "maximum redirects exceeded", None);
        assert!(!err.is_retryable());
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("maximum redirects exceeded"));
        assert!(err.to_string().contains("https://api.example.com/a"));
    }

    #[test]
    fn test_status_accessors() {
        let err = Error::Status {
            method: Method::POST,
            url: "https://api.example.com/b".to_string(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            headers: HeaderMap::new(),
            body: "{\"error\":\"bad\"}".to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
        assert_eq!(err.raw_response(), Some("{\"error\":\"bad\"}"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_converts() {
        let err: Error = ValidationError::MissingField {
            path: "$.x".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "missing required field `$.x`");
    }
}

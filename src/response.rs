//! Response wrapper that preserves both coerced data and transport details.
//!
//! The [`Response`] type carries the decoded data together with what the
//! transport loop observed getting it: status, headers, the raw body, latency,
//! how many attempts were made and how many redirects were followed.

use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// A successful HTTP response.
///
/// # Type Parameters
///
/// * `T` - The type of the coerced response data
///
/// # Examples
///
/// ```no_run
/// use restcore::Client;
///
/// # async fn example() -> Result<(), restcore::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com/v1/")?
///     .build()?;
///
/// let response = client.get::<serde_json::Value>("stores").await?;
///
/// println!("Status: {}", response.status);
/// println!("Request took {:?} over {} attempts", response.latency, response.attempts);
/// if response.latency > std::time::Duration::from_secs(1) {
///     println!("Slow response body: {}", response.raw_body);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded response data.
    pub data: T,

    /// The raw response body as a string.
    ///
    /// Empty for streamed bodies, which are never buffered.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The total latency of the call, including all retries and redirects.
    pub latency: Duration,

    /// The number of send attempts, counting the first.
    pub attempts: usize,

    /// The number of redirects followed.
    pub redirects: u32,
}

impl<T> Response<T> {
    /// Creates a new `Response` with no redirects.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
            redirects: 0,
        }
    }

    /// Maps the response data to a different type, keeping the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use restcore::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     "42".to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
            redirects: self.redirects,
        }
    }

    /// Like [`Response::map`], for conversions that can fail.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn try_map<U, E, F>(self, f: F) -> Result<Response<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(Response {
            data: f(self.data)?,
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
            redirects: self.redirects,
        })
    }

    /// Returns `true` if the call required retries.
    ///
    /// # Examples
    ///
    /// ```
    /// # use restcore::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     (),
    ///     String::new(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     3,
    /// );
    ///
    /// assert!(response.was_retried());
    /// ```
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use restcore::Response;
    /// # use http::{HeaderMap, StatusCode, HeaderValue};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/json"));
    ///
    /// let response = Response::new(
    ///     (),
    ///     String::new(),
    ///     StatusCode::OK,
    ///     headers,
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// assert_eq!(
    ///     response.header("content-type").unwrap(),
    ///     "application/json"
    /// );
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// A page of a paginated listing.
///
/// Implemented by generated page types, which know where their items and
/// cursors live in the payload.
pub trait Page: Sized {
    /// Builds the page from a decoded response.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not have the page's layout.
    fn from_response(response: Response<Value>) -> crate::Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ValidationError};

    fn response(data: Value) -> Response<Value> {
        Response::new(
            data,
            String::new(),
            StatusCode::OK,
            HeaderMap::new(),
            Duration::ZERO,
            1,
        )
    }

    #[test]
    fn test_try_map_keeps_metadata() {
        let mut original = response(serde_json::json!(3));
        original.redirects = 2;
        let mapped = original
            .try_map(|v| v.as_u64().ok_or("not a number"))
            .unwrap();
        assert_eq!(mapped.data, 3);
        assert_eq!(mapped.redirects, 2);
        assert!(response(Value::Null)
            .try_map(|v| v.as_u64().ok_or("not a number"))
            .is_err());
    }

    struct Names {
        names: Vec<String>,
        has_more: bool,
    }

    impl Page for Names {
        fn from_response(response: Response<Value>) -> crate::Result<Self> {
            let names = crate::coerce::from_value_as::<Vec<String>>(
                &crate::coerce::Shape::List(&crate::coerce::Shape::String),
                response.data["data"].clone(),
            )?;
            Ok(Names {
                names,
                has_more: response.data["has_more"].as_bool().unwrap_or(false),
            })
        }
    }

    #[test]
    fn test_page_from_response() {
        let page = Names::from_response(response(serde_json::json!({
            "data": ["a", "b"],
            "has_more": true
        })))
        .unwrap();
        assert_eq!(page.names, vec!["a", "b"]);
        assert!(page.has_more);

        let err = Names::from_response(response(serde_json::json!({"data": 5}))).err();
        assert!(matches!(
            err,
            Some(Error::Validation(ValidationError::Incompatible { .. }))
        ));
    }
}

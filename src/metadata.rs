//! Request metadata and header override layers.

use crate::body::RequestBody;
use crate::coerce::Model;
use crate::options::PartialRequestOptions;
use crate::path::{merge_query, PathSpec};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::{Map, Value};

/// An ordered list of header assignments, where `None` removes a header.
///
/// Layers are applied on top of each other, so a later layer can both replace
/// and unset headers set by an earlier one. Header names are case-insensitive.
///
/// # Examples
///
/// ```
/// use restcore::metadata::HeaderOverrides;
/// use http::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-trace", "abc".parse().unwrap());
///
/// let mut layer = HeaderOverrides::new();
/// layer.set("Accept", "text/plain").unwrap();
/// layer.remove("X-Trace").unwrap();
/// layer.apply_to(&mut headers);
///
/// assert_eq!(headers["accept"], "text/plain");
/// assert!(headers.get("x-trace").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeaderOverrides {
    entries: Vec<(HeaderName, Option<Vec<HeaderValue>>)>,
}

impl HeaderOverrides {
    /// Creates an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header to a single value.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> crate::Result<()> {
        let name = header_name(name.as_ref())?;
        let value = header_value(value.as_ref())?;
        self.entries.push((name, Some(vec![value])));
        Ok(())
    }

    /// Sets a header to several values, sent as repeated header lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or any value is invalid.
    pub fn set_many<I, S>(&mut self, name: impl AsRef<str>, values: I) -> crate::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = header_name(name.as_ref())?;
        let values = values
            .into_iter()
            .map(|v| header_value(v.as_ref()))
            .collect::<crate::Result<Vec<_>>>()?;
        self.entries.push((name, Some(values)));
        Ok(())
    }

    /// Unsets a header, including one set by a lower-precedence layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name is invalid.
    pub fn remove(&mut self, name: impl AsRef<str>) -> crate::Result<()> {
        let name = header_name(name.as_ref())?;
        self.entries.push((name, None));
        Ok(())
    }

    /// Appends every assignment of `other` after this layer's own.
    pub fn extend(&mut self, other: &HeaderOverrides) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Returns `true` if the layer carries no assignments.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the assignments, in order, to `headers`.
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        for (name, values) in &self.entries {
            headers.remove(name);
            for value in values.iter().flatten() {
                headers.append(name.clone(), value.clone());
            }
        }
    }
}

impl From<HeaderMap> for HeaderOverrides {
    fn from(headers: HeaderMap) -> Self {
        let mut entries: Vec<(HeaderName, Option<Vec<HeaderValue>>)> = Vec::new();
        for name in headers.keys() {
            let values = headers.get_all(name).iter().cloned().collect();
            entries.push((name.clone(), Some(values)));
        }
        Self { entries }
    }
}

pub(crate) fn header_name(name: &str) -> crate::Result<HeaderName> {
    HeaderName::try_from(name)
        .map_err(|e| crate::Error::Configuration(format!("Invalid header name: {}", e)))
}

pub(crate) fn header_value(value: &str) -> crate::Result<HeaderValue> {
    HeaderValue::try_from(value)
        .map_err(|e| crate::Error::Configuration(format!("Invalid header value: {}", e)))
}

/// Everything a generated service method supplies for one call.
///
/// The request body is owned here because one-shot streams cannot be cloned.
#[derive(Debug)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The request path, literal or templated.
    pub path: PathSpec,

    /// Query parameters for this request.
    pub query: Map<String, Value>,

    /// Header assignments for this request.
    pub headers: HeaderOverrides,

    /// The request body.
    pub body: RequestBody,

    /// Options overriding the client's defaults for this call.
    pub options: PartialRequestOptions,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and path.
    pub fn new(method: Method, path: impl Into<PathSpec>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Map::new(),
            headers: HeaderOverrides::new(),
            body: RequestBody::Empty,
            options: PartialRequestOptions::default(),
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> crate::Result<Self> {
        self.headers.set(name, value)?;
        Ok(self)
    }

    /// Unsets a header, including a client default.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name is invalid.
    pub fn without_header(mut self, name: impl AsRef<str>) -> crate::Result<Self> {
        self.headers.remove(name)?;
        Ok(self)
    }

    /// Sets the `Content-Type` the body is encoded as.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a valid header value.
    pub fn with_content_type(self, content_type: impl AsRef<str>) -> crate::Result<Self> {
        self.with_header("content-type", content_type)
    }

    /// Adds a query parameter, merging with an existing one of the same name.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut single = Map::new();
        single.insert(key.into(), value.into());
        merge_query(&mut self.query, single);
        self
    }

    /// Merges several query parameters into the request.
    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        merge_query(&mut self.query, query);
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a typed model as the JSON body, dumped with its wire names.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be serialized.
    pub fn with_model<T: Model>(mut self, model: &T) -> crate::Result<Self> {
        self.body = RequestBody::Json(crate::dump::to_value(model)?);
        Ok(self)
    }

    /// Sets the call-level options.
    pub fn with_options(mut self, options: PartialRequestOptions) -> Self {
        self.options = options;
        self
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_apply_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let mut first = HeaderOverrides::new();
        first.set("X-Tag", "one").unwrap();
        let mut second = HeaderOverrides::new();
        second.set_many("x-tag", ["two", "three"]).unwrap();
        second.remove("ACCEPT").unwrap();

        first.extend(&second);
        first.apply_to(&mut headers);

        let tags: Vec<_> = headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["two", "three"]);
        assert!(headers.get("accept").is_none());
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let result = RequestMetadata::new(Method::GET, "/").with_header("bad header", "x");
        assert!(matches!(result, Err(crate::Error::Configuration(_))));
    }

    #[test]
    fn test_query_params_merge() {
        let metadata = RequestMetadata::new(Method::GET, "/")
            .with_query_param("tag", "a")
            .with_query_param("tag", "b");
        assert_eq!(metadata.query["tag"], serde_json::json!(["a", "b"]));
    }
}

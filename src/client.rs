//! API client: the transport loop and the typed entry points built on it.
//!
//! The [`Client`] type is the entry point generated service methods call.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    coerce::{self, Model, Shape},
    decode::{self, Decoded},
    metadata::{header_name, header_value, RequestMetadata},
    options::RequestOptions,
    path::PathSpec,
    request::{assemble, ClientLayers, NormalizedRequest},
    response::Page,
    retry::{self, Action, MAX_REDIRECTS},
    transport::{default_transport, Transport},
    Error, Response, Result, ValidationError,
};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http::{header, HeaderMap, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// A lazy, single-pass stream of typed items decoded from one response.
pub type ItemStream<T> = BoxStream<'static, Result<T>>;

/// An API client with retries, redirects and shape-driven decoding.
///
/// The client is designed to be reused across many calls. Cloning is cheap:
/// clones share the transport and configuration.
///
/// # Examples
///
/// ```no_run
/// use restcore::coerce::{FieldShape, Model, Shape, StructShape};
/// use restcore::metadata::RequestMetadata;
/// use restcore::path::PathSpec;
/// use restcore::{Client, Response};
/// use http::Method;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Store {
///     id: String,
///     file_count: i64,
/// }
///
/// const STORE: StructShape = StructShape::new(
///     "Store",
///     &[
///         FieldShape::required("id", Shape::String),
///         FieldShape::required("file_count", Shape::Int).wire("fileCount"),
///     ],
/// );
///
/// impl Model for Store {
///     const SHAPE: Shape = Shape::Struct(&STORE);
/// }
///
/// # async fn example() -> Result<(), restcore::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com/v1/")?
///     .auth_header("Authorization", "Bearer sk-test")?
///     .build()?;
///
/// let metadata = RequestMetadata::new(
///     Method::GET,
///     PathSpec::template("stores/%1$s", ["st_123"]),
/// );
/// let store: Response<Store> = client.request(metadata).await?;
/// println!("{} has {} files", store.data.id, store.data.file_count);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    transport: Arc<dyn Transport>,
    base_url: Url,
    default_headers: HeaderMap,
    auth_headers: HeaderMap,
    options: RequestOptions,
}

/// What the transport loop hands to the decoder.
struct Sent {
    method: Method,
    response: reqwest::Response,
    latency: Duration,
    attempts: usize,
    redirects: u32,
}

impl Sent {
    /// Splits into the response metadata and the undecoded body.
    fn split(self) -> (Response<()>, reqwest::Response) {
        let mut response = Response::new(
            (),
            String::new(),
            self.response.status(),
            self.response.headers().clone(),
            self.latency,
            self.attempts,
        );
        response.redirects = self.redirects;
        (response, self.response)
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The base URL every request path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The options every call starts from.
    pub fn options(&self) -> &RequestOptions {
        &self.inner.options
    }

    /// Sends a request and coerces the response into `T`.
    ///
    /// # Errors
    ///
    /// Returns a connection or status error from the transport loop, a
    /// decode error for a malformed body, or a validation error if the body
    /// does not fit `T`'s shape.
    pub async fn request<T: Model>(&self, metadata: RequestMetadata) -> Result<Response<T>> {
        self.request_as(metadata, &T::SHAPE).await
    }

    /// Sends a request and coerces the response into `T` using `shape`.
    ///
    /// For types whose shape cannot be a constant, such as `Vec<Model>`.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        metadata: RequestMetadata,
        shape: &Shape,
    ) -> Result<Response<T>> {
        self.request_value(metadata, shape).await?.try_map(|value| {
            serde_json::from_value(value)
                .map_err(|e| ValidationError::Deserialize(e.to_string()).into())
        })
    }

    /// Sends a request and converts the response against `shape`, leaving it
    /// as JSON.
    ///
    /// Streamed bodies are drained: JSON-Lines and event payloads become a
    /// list, raw bytes a string.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn request_value(
        &self,
        metadata: RequestMetadata,
        shape: &Shape,
    ) -> Result<Response<Value>> {
        let sent = self.send(metadata).await?;
        let status = sent.response.status();
        let method = sent.method.clone();
        let (response, body) = sent.split();
        let (value, raw_body) = decode::decode(&method, body)
            .await?
            .into_value(status)
            .await?;

        let value = coerce::convert(shape, value).inspect_err(|e| {
            tracing::error!(
                error = %e,
                expected = %shape.describe(),
                "Response does not match its declared shape"
            );
        })?;
        Ok(Response {
            raw_body,
            ..response.map(|()| value)
        })
    }

    /// Sends a request whose response is a sequence of `T`.
    ///
    /// JSON-Lines bodies yield one item per line and event streams one item
    /// per event `data` payload, both lazily; a JSON array yields its
    /// elements and any other JSON document a single item. The connection is
    /// released when the stream is exhausted or dropped.
    ///
    /// # Errors
    ///
    /// The call fails like [`Client::request`]; items fail individually with
    /// decode or validation errors. A body that is not JSON fails with a
    /// decode error.
    pub async fn request_stream<T>(&self, metadata: RequestMetadata) -> Result<Response<ItemStream<T>>>
    where
        T: Model + Send + 'static,
    {
        let sent = self.send(metadata).await?;
        let status = sent.response.status();
        let method = sent.method.clone();
        let (response, body) = sent.split();

        let items: ItemStream<T> = match decode::decode(&method, body).await? {
            Decoded::Empty => stream::empty().boxed(),
            Decoded::Json { value, .. } => {
                let values = match value {
                    Value::Array(values) => values,
                    value => vec![value],
                };
                stream::iter(values.into_iter().map(coerce::from_value::<T>)).boxed()
            }
            Decoded::JsonLines(lines) => lines
                .and_then(|value| futures::future::ready(coerce::from_value::<T>(value)))
                .boxed(),
            Decoded::Events(events) => events
                .and_then(move |event| {
                    let item = event
                        .json::<Value>()
                        .map_err(|e| Error::Decode {
                            status,
                            content_type: Some("text/event-stream".to_string()),
                            message: e.to_string(),
                            raw_response: event.data.clone().unwrap_or_default(),
                        })
                        .and_then(coerce::from_value::<T>);
                    futures::future::ready(item)
                })
                .boxed(),
            Decoded::Bytes(_) => {
                return Err(Error::Decode {
                    status,
                    content_type: response.header("content-type").map(str::to_string),
                    message: "response body is not JSON".to_string(),
                    raw_response: String::new(),
                });
            }
        };
        Ok(response.map(|()| items))
    }

    /// Sends a request and returns the decoded body without coercion.
    ///
    /// # Errors
    ///
    /// Returns a connection or status error from the transport loop, or a
    /// decode error for a malformed JSON document.
    pub async fn request_raw(&self, metadata: RequestMetadata) -> Result<Response<Decoded>> {
        let sent = self.send(metadata).await?;
        let method = sent.method.clone();
        let (response, body) = sent.split();
        let decoded = decode::decode(&method, body).await?;
        Ok(response.map(|()| decoded))
    }

    /// Sends a request for one page of a listing.
    ///
    /// # Errors
    ///
    /// See [`Client::request`]; the page type may reject the payload too.
    pub async fn request_page<P: Page>(&self, metadata: RequestMetadata) -> Result<P> {
        let response = self.request_value(metadata, &Shape::Mixed).await?;
        P::from_response(response)
    }

    /// Runs the transport loop for one logical call.
    async fn send(&self, metadata: RequestMetadata) -> Result<Sent> {
        let inner = &self.inner;
        let layers = ClientLayers {
            base_url: &inner.base_url,
            default_headers: &inner.default_headers,
            auth_headers: &inner.auth_headers,
            options: &inner.options,
        };
        let (mut request, options) = assemble(layers, metadata)?;
        let transport = options
            .transport
            .clone()
            .unwrap_or_else(|| inner.transport.clone());

        let start_time = Instant::now();
        let mut attempts = 0usize;
        let mut retry_count = 0u32;
        let mut redirects = 0u32;

        loop {
            attempts += 1;
            let outgoing = request.to_transport(retry_count, &options)?;

            tracing::debug!(
                method = %request.method(),
                url = %request.url(),
                retry_count = retry_count,
                redirects = redirects,
                "Executing HTTP request"
            );

            let response = match transport.send(outgoing).await {
                Ok(response) => response,
                Err(e) => {
                    if retry::should_retry(None, retry_count, options.max_retries) {
                        let delay = retry::retry_delay(None, retry_count, &options);
                        tracing::warn!(
                            error = %e,
                            retry_count = retry_count,
                            delay_ms = delay.as_millis(),
                            "Request failed without a response, retrying after delay"
                        );
                        tokio::time::sleep(delay).await;
                        retry_count += 1;
                        continue;
                    }
                    tracing::error!(
                        error = %e,
                        method = %request.method(),
                        url = %request.url(),
                        attempts = attempts,
                        "Request failed without a response"
                    );
                    return Err(Error::connection(
                        request.method(),
                        request.url(),
                        e.to_string(),
                        Some(e),
                    ));
                }
            };

            let status = response.status();
            match retry::classify(status, response.headers(), retry_count, options.max_retries) {
                Action::Success => {
                    let latency = start_time.elapsed();
                    tracing::info!(
                        status = status.as_u16(),
                        latency_ms = latency.as_millis(),
                        attempts = attempts,
                        redirects = redirects,
                        "Received HTTP response"
                    );
                    return Ok(Sent {
                        method: request.method().clone(),
                        response,
                        latency,
                        attempts,
                        redirects,
                    });
                }
                Action::Redirect => {
                    request =
                        follow_redirect(request, &response, redirects, &self.inner.auth_headers)?;
                    redirects += 1;
                }
                Action::Retry => {
                    let delay = retry::retry_delay(Some(response.headers()), retry_count, &options);
                    tracing::warn!(
                        status = status.as_u16(),
                        retry_count = retry_count,
                        delay_ms = delay.as_millis(),
                        "Retrying request after delay"
                    );
                    drop(response);
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Action::Fail => return Err(status_error(&request, response).await),
            }
        }
    }

    /// Sends a `GET` request and coerces the response into `T`.
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
    /// let stores: restcore::Response<serde_json::Value> = client.get("stores").await?;
    /// println!("{}", stores.data);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<T: Model>(&self, path: impl Into<PathSpec>) -> Result<Response<T>> {
        self.request(RequestMetadata::new(Method::GET, path)).await
    }

    /// Sends a `POST` request with `body` dumped as JSON.
    pub async fn post<B: Model, T: Model>(
        &self,
        path: impl Into<PathSpec>,
        body: &B,
    ) -> Result<Response<T>> {
        self.request(RequestMetadata::new(Method::POST, path).with_model(body)?)
            .await
    }

    /// Sends a `PUT` request with `body` dumped as JSON.
    pub async fn put<B: Model, T: Model>(
        &self,
        path: impl Into<PathSpec>,
        body: &B,
    ) -> Result<Response<T>> {
        self.request(RequestMetadata::new(Method::PUT, path).with_model(body)?)
            .await
    }

    /// Sends a `PATCH` request with `body` dumped as JSON.
    pub async fn patch<B: Model, T: Model>(
        &self,
        path: impl Into<PathSpec>,
        body: &B,
    ) -> Result<Response<T>> {
        self.request(RequestMetadata::new(Method::PATCH, path).with_model(body)?)
            .await
    }

    /// Sends a `DELETE` request.
    pub async fn delete<T: Model>(&self, path: impl Into<PathSpec>) -> Result<Response<T>> {
        self.request(RequestMetadata::new(Method::DELETE, path)).await
    }
}

fn follow_redirect(
    request: NormalizedRequest,
    response: &reqwest::Response,
    redirects: u32,
    auth_headers: &HeaderMap,
) -> Result<NormalizedRequest> {
    if redirects >= MAX_REDIRECTS {
        tracing::error!(url = %request.url(), redirects = redirects, "Too many redirects");
        return Err(Error::connection(
            request.method(),
            request.url(),
            "maximum redirects exceeded",
            None,
        ));
    }
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            Error::connection(
                request.method(),
                request.url(),
                format!("redirect ({}) without a Location header", response.status()),
                None,
            )
        })?;
    let next = request.url().join(location)?;
    tracing::debug!(from = %request.url(), to = %next, "Following redirect");
    Ok(request.redirected(next, auth_headers))
}

async fn status_error(request: &NormalizedRequest, response: reqwest::Response) -> Error {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();

    if status.is_client_error() {
        tracing::error!(status = status.as_u16(), response = %body, "Client error (4xx)");
    } else {
        tracing::warn!(status = status.as_u16(), response = %body, "Server error (5xx)");
    }

    Error::Status {
        method: request.method().clone(),
        url: request.url().to_string(),
        status,
        headers,
        body,
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Every client sends `Accept: application/json` and
/// `Content-Type: application/json` unless overridden.
///
/// # Examples
///
/// ```no_run
/// use restcore::ClientBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), restcore::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com/v1/")?
///     .timeout(Duration::from_secs(30))
///     .max_retries(4)
///     .default_header("User-Agent", "my-app/1.0")?
///     .auth_header("Authorization", "Bearer sk-test")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    auth_headers: HeaderMap,
    options: RequestOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self {
            base_url: None,
            default_headers,
            auth_headers: HeaderMap::new(),
            options: RequestOptions::default(),
            transport: None,
        }
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.default_headers
            .insert(header_name(name.as_ref())?, header_value(value.as_ref())?);
        Ok(self)
    }

    /// Adds a precomputed authentication header.
    ///
    /// Auth headers override default headers of the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn auth_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.auth_headers
            .insert(header_name(name.as_ref())?, header_value(value.as_ref())?);
        Ok(self)
    }

    /// Replaces all authentication headers.
    pub fn auth_headers(mut self, headers: HeaderMap) -> Self {
        self.auth_headers = headers;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Sets how many times a failed attempt may be resent.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = max_retries;
        self
    }

    /// Sets the base delay of the retry backoff.
    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.options.initial_retry_delay = delay;
        self
    }

    /// Sets the cap of the retry backoff.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.options.max_retry_delay = delay;
        self
    }

    /// Sets the transport used to send requests.
    ///
    /// Defaults to a `reqwest` client with automatic redirects disabled.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or the default transport
    /// cannot be built.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("Base URL is required".to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(default_transport()?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                base_url,
                default_headers: self.default_headers,
                auth_headers: self.auth_headers,
                options: self.options,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

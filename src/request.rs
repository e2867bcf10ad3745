//! Assembly of one normalized request from the client and call layers.

use crate::body::{self, EncodedBody, Replay};
use crate::metadata::{header_value, RequestMetadata};
use crate::options::RequestOptions;
use crate::path::{join_uri, merge_query};
use crate::retry::RETRY_COUNT_HEADER;
use crate::{Error, Result};
use http::{header, HeaderMap, Method};
use url::Url;

/// The client-level layers a request is assembled from.
#[derive(Debug, Clone, Copy)]
pub struct ClientLayers<'a> {
    /// Base URL every path is joined onto.
    pub base_url: &'a Url,
    /// Headers sent on every request.
    pub default_headers: &'a HeaderMap,
    /// Precomputed authentication headers.
    pub auth_headers: &'a HeaderMap,
    /// Options every call starts from.
    pub options: &'a RequestOptions,
}

/// A fully merged request, ready to be sent.
///
/// Immutable once built; following a redirect produces a new request through
/// [`NormalizedRequest::redirected`].
#[derive(Debug)]
pub struct NormalizedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: EncodedBody,
}

impl NormalizedRequest {
    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The fully joined URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The merged headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The encoded body.
    pub fn body(&self) -> &EncodedBody {
        &self.body
    }

    /// The same request aimed at `url`, with method and body unchanged.
    ///
    /// When `url` has a different origin, credentials are not carried over:
    /// `Authorization`, `Proxy-Authorization` and `Cookie` are removed along
    /// with every header named in `auth_headers`.
    pub fn redirected(mut self, url: Url, auth_headers: &HeaderMap) -> Self {
        if url.origin() != self.url.origin() {
            for name in [header::AUTHORIZATION, header::PROXY_AUTHORIZATION, header::COOKIE] {
                self.headers.remove(name);
            }
            for name in auth_headers.keys() {
                self.headers.remove(name);
            }
        }
        Self { url, ..self }
    }

    /// Builds the transport request for one attempt.
    ///
    /// Stamps the retry-count header and hands the timeout to the transport.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the body was a one-shot stream consumed
    /// by an earlier attempt.
    pub fn to_transport(&self, retry_count: u32, options: &RequestOptions) -> Result<reqwest::Request> {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        request
            .headers_mut()
            .insert(RETRY_COUNT_HEADER, header_value(&retry_count.to_string())?);
        *request.timeout_mut() = Some(options.timeout);

        match self.body.replay() {
            Replay::Empty => {}
            Replay::Body(body) => *request.body_mut() = Some(body),
            Replay::Consumed => {
                return Err(Error::connection(
                    &self.method,
                    &self.url,
                    "request body cannot be replayed",
                    None,
                ));
            }
        }
        Ok(request)
    }
}

/// Merges every layer into one [`NormalizedRequest`] and its resolved options.
///
/// Headers, in increasing precedence: client defaults, auth headers, call
/// headers, then the resolved options' extra headers. Query parameters: the
/// call's query, then the options' extra query, merged recursively. Call
/// options are resolved over the client's.
///
/// # Errors
///
/// Returns an error if the path template cannot be rendered, the URL cannot
/// be joined, or the body cannot be encoded.
pub fn assemble(
    layers: ClientLayers<'_>,
    metadata: RequestMetadata,
) -> Result<(NormalizedRequest, RequestOptions)> {
    let RequestMetadata {
        method,
        path,
        mut query,
        headers: call_headers,
        body,
        options: patch,
    } = metadata;

    let options = layers.options.merged(&patch);

    let mut headers = layers.default_headers.clone();
    for name in layers.auth_headers.keys() {
        headers.remove(name);
        for value in layers.auth_headers.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    call_headers.apply_to(&mut headers);
    options.extra_headers.apply_to(&mut headers);

    merge_query(&mut query, options.extra_query_params.clone());
    let url = join_uri(layers.base_url, &path.render()?, &query)?;

    let body = body::encode(&mut headers, body, &options.extra_body_params)?;

    Ok((
        NormalizedRequest {
            method,
            url,
            headers,
            body,
        },
        options,
    ))
}

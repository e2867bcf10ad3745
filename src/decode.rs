//! Response body decoding, selected by `Content-Type`.
//!
//! JSON bodies are read in full. JSON-Lines, event streams and opaque bytes
//! are handed back as lazy single-pass streams that own the response: the
//! connection is released when the stream is exhausted or dropped.

use crate::content_type::ContentKind;
use crate::sse::{self, SseStream};
use crate::stream::{self as bytestream, collect, ByteStream};
use crate::{Error, Result};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use http::{Method, StatusCode};
use serde_json::Value;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use url::Url;

/// A decoded response body.
pub enum Decoded {
    /// No body (`204 No Content`).
    Empty,
    /// A single JSON document.
    Json {
        /// The parsed document; an empty body parses as `null`.
        value: Value,
        /// The body as received.
        raw: String,
    },
    /// Newline-delimited JSON values.
    JsonLines(JsonLinesStream),
    /// Server-Sent Events.
    Events(SseStream),
    /// Anything else, as raw chunks.
    Bytes(ByteStream),
}

impl fmt::Debug for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Empty => f.write_str("Empty"),
            Decoded::Json { value, .. } => f.debug_tuple("Json").field(value).finish(),
            Decoded::JsonLines(_) => f.write_str("JsonLines(..)"),
            Decoded::Events(_) => f.write_str("Events(..)"),
            Decoded::Bytes(_) => f.write_str("Bytes(..)"),
        }
    }
}

impl Decoded {
    /// Drains the body into a single JSON value and its raw text.
    ///
    /// JSON-Lines become an array of their values, events an array of their
    /// `data` payloads parsed as JSON, and raw bytes a string.
    ///
    /// `status` is the status of the response the body came from.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while draining a stream.
    pub async fn into_value(self, status: StatusCode) -> Result<(Value, String)> {
        match self {
            Decoded::Empty => Ok((Value::Null, String::new())),
            Decoded::Json { value, raw } => Ok((value, raw)),
            Decoded::JsonLines(lines) => {
                let values: Vec<Value> = lines.try_collect().await?;
                Ok((Value::Array(values), String::new()))
            }
            Decoded::Events(mut events) => {
                let mut values = Vec::new();
                while let Some(event) = events.try_next().await? {
                    values.push(event.json::<Value>().map_err(|e| Error::Decode {
                        status,
                        content_type: Some("text/event-stream".to_string()),
                        message: e.to_string(),
                        raw_response: event.data.clone().unwrap_or_default(),
                    })?);
                }
                Ok((Value::Array(values), String::new()))
            }
            Decoded::Bytes(bytes) => {
                let bytes = collect(bytes).await.map_err(|e| Error::Decode {
                    status,
                    content_type: None,
                    message: format!("failed to read response body: {}", e),
                    raw_response: String::new(),
                })?;
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok((Value::String(text.clone()), text))
            }
        }
    }
}

/// A single-pass stream of JSON values, one per non-blank line.
pub struct JsonLinesStream {
    inner: BoxStream<'static, Result<Value>>,
}

impl Stream for JsonLinesStream {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for JsonLinesStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesStream").finish_non_exhaustive()
    }
}

/// Where a body came from, for error reporting while it is being read.
#[derive(Debug, Clone)]
struct Origin {
    method: Method,
    url: Url,
    status: StatusCode,
    content_type: Option<String>,
}

impl Origin {
    fn read_error(&self, e: io::Error) -> Error {
        Error::connection(
            &self.method,
            &self.url,
            format!("failed to read response body: {}", e),
            None,
        )
    }

    fn parse_error(&self, e: serde_json::Error, raw: String) -> Error {
        Error::Decode {
            status: self.status,
            content_type: self.content_type.clone(),
            message: e.to_string(),
            raw_response: raw,
        }
    }
}

/// Decodes a successful response according to its `Content-Type`.
///
/// # Errors
///
/// Returns [`Error::Decode`] for a malformed JSON document and a connection
/// error if the body cannot be read.
pub async fn decode(method: &Method, response: reqwest::Response) -> Result<Decoded> {
    let origin = Origin {
        method: method.clone(),
        url: response.url().clone(),
        status: response.status(),
        content_type: response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    if origin.status == StatusCode::NO_CONTENT {
        return Ok(Decoded::Empty);
    }

    let kind = origin
        .content_type
        .as_deref()
        .map_or(ContentKind::Other, ContentKind::of);
    tracing::debug!(
        status = origin.status.as_u16(),
        content_type = ?origin.content_type,
        kind = ?kind,
        "Decoding response body"
    );

    match kind {
        ContentKind::Json => {
            let bytes = response.bytes().await.map_err(|e| {
                Error::connection(
                    &origin.method,
                    &origin.url,
                    format!("failed to read response body: {}", e),
                    Some(e),
                )
            })?;
            let raw = String::from_utf8_lossy(&bytes).into_owned();
            if raw.trim().is_empty() {
                return Ok(Decoded::Json {
                    value: Value::Null,
                    raw,
                });
            }
            match serde_json::from_str(&raw) {
                Ok(value) => Ok(Decoded::Json { value, raw }),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        raw_response = %raw,
                        "Failed to parse JSON response"
                    );
                    Err(origin.parse_error(e, raw))
                }
            }
        }
        ContentKind::JsonLines => {
            let lines = bytestream::lines(body_stream(response));
            let inner = lines
                .map(move |line| -> Result<Option<Value>> {
                    let line = line.map_err(|e| origin.read_error(e))?;
                    let text = String::from_utf8_lossy(&line);
                    if text.trim().is_empty() {
                        return Ok(None);
                    }
                    serde_json::from_str::<Value>(&text)
                        .map(Some)
                        .map_err(|e| origin.parse_error(e, text.into_owned()))
                })
                .try_filter_map(|value| futures::future::ready(Ok::<_, Error>(value)))
                .boxed();
            Ok(Decoded::JsonLines(JsonLinesStream { inner }))
        }
        ContentKind::EventStream => {
            let events = sse::events(bytestream::lines(body_stream(response)));
            let inner = events.map_err(move |e| origin.read_error(e)).boxed();
            Ok(Decoded::Events(SseStream::new(inner)))
        }
        ContentKind::Multipart | ContentKind::Other => Ok(Decoded::Bytes(body_stream(response))),
    }
}

fn body_stream(response: reqwest::Response) -> ByteStream {
    bytestream::rechunk(response.bytes_stream().map_err(io::Error::other).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, content_type: Option<&str>, body: &'static str) -> reqwest::Response {
        let mut builder = http::Response::builder().status(status);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        reqwest::Response::from(builder.body(body).unwrap())
    }

    #[tokio::test]
    async fn test_no_content_is_empty() {
        let decoded = decode(&Method::DELETE, response(204, Some("application/json"), ""))
            .await
            .unwrap();
        assert!(matches!(decoded, Decoded::Empty));
    }

    #[tokio::test]
    async fn test_json_and_empty_json() {
        let decoded = decode(&Method::GET, response(200, Some("application/json"), r#"{"a":1}"#))
            .await
            .unwrap();
        let (value, raw) = decoded.into_value(StatusCode::OK).await.unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
        assert_eq!(raw, r#"{"a":1}"#);

        let decoded = decode(&Method::GET, response(200, Some("application/json"), ""))
            .await
            .unwrap();
        assert_eq!(decoded.into_value(StatusCode::OK).await.unwrap().0, Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let err = decode(&Method::GET, response(200, Some("application/json"), "{nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { ref raw_response, .. } if raw_response == "{nope"));
    }

    #[tokio::test]
    async fn test_body_read_failure_is_not_retryable() {
        let chunks: Vec<io::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"{\"a\":")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = reqwest::Body::wrap_stream(futures::stream::iter(chunks));
        let response = http::Response::builder()
            .status(200)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let err = decode(&Method::GET, reqwest::Response::from(response))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { source: Some(_), .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_json_lines_skip_blank_lines() {
        let decoded = decode(
            &Method::GET,
            response(200, Some("application/x-ndjson"), "{\"a\":1}\n\n{\"b\":2}\n"),
        )
        .await
        .unwrap();
        let Decoded::JsonLines(stream) = decoded else {
            panic!("expected JSON-Lines, got {:?}", decoded);
        };
        let values: Vec<Value> = stream.try_collect().await.unwrap();
        assert_eq!(values, vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})]);
    }

    #[tokio::test]
    async fn test_jsonl_content_type_is_not_json() {
        let decoded = decode(&Method::GET, response(200, Some("application/jsonl"), "1\n2\n"))
            .await
            .unwrap();
        assert!(matches!(decoded, Decoded::JsonLines(_)));
    }

    #[tokio::test]
    async fn test_event_stream() {
        let decoded = decode(
            &Method::GET,
            response(200, Some("text/event-stream; charset=utf-8"), "data: {\"n\":1}\n\ndata: {\"n\":2}\n\n"),
        )
        .await
        .unwrap();
        let (value, _) = decoded.into_value(StatusCode::OK).await.unwrap();
        assert_eq!(value, serde_json::json!([{"n": 1}, {"n": 2}]));
    }

    #[tokio::test]
    async fn test_other_content_is_raw_bytes() {
        let decoded = decode(&Method::GET, response(200, Some("text/plain"), "hello"))
            .await
            .unwrap();
        let Decoded::Bytes(stream) = decoded else {
            panic!("expected bytes, got {:?}", decoded);
        };
        assert_eq!(collect(stream).await.unwrap().as_ref(), b"hello");
    }
}

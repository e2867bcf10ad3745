//! Request body encoding.
//!
//! [`encode`] turns a [`RequestBody`] into an [`EncodedBody`] according to the
//! request's declared `Content-Type`. Buffered encodings can be replayed on
//! every retry and redirect; one-shot streams are handed out once.

use crate::content_type::ContentKind;
use crate::multipart::MultipartForm;
use crate::stream::{read_chunks, rechunk, ByteStream};
use crate::{Error, Result};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncRead;

/// A request body as supplied by a service method.
pub enum RequestBody {
    /// No entity body.
    Empty,
    /// A structured value, encoded per the declared content type.
    Json(Value),
    /// A string sent verbatim.
    Text(String),
    /// Raw bytes sent verbatim.
    Bytes(Bytes),
    /// A file or reader streamed in chunks.
    Resource(ByteResource),
    /// An already-encoded stream, passed through unchanged.
    Stream(ByteStream),
    /// Form fields for a `multipart/form-data` body.
    Form(Vec<(String, FormValue)>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RequestBody::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Resource(resource) => f.debug_tuple("Resource").field(resource).finish(),
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
            RequestBody::Form(fields) => f.debug_tuple("Form").field(fields).finish(),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<ByteResource> for RequestBody {
    fn from(resource: ByteResource) -> Self {
        RequestBody::Resource(resource)
    }
}

/// A value inside a multipart form.
#[derive(Debug)]
pub enum FormValue {
    /// Scalars become `text/plain` parts, everything else `application/json`.
    Value(Value),
    /// File contents streamed as their own part.
    Resource(ByteResource),
}

impl From<Value> for FormValue {
    fn from(value: Value) -> Self {
        FormValue::Value(value)
    }
}

impl From<ByteResource> for FormValue {
    fn from(resource: ByteResource) -> Self {
        FormValue::Resource(resource)
    }
}

enum Source {
    Bytes(Bytes),
    File(PathBuf),
    Reader(Mutex<Option<Box<dyn AsyncRead + Send + Unpin>>>),
}

/// Binary content streamed in chunks: an in-memory buffer, a file the encoder
/// opens itself, or a caller-owned reader.
///
/// Files are opened lazily when the body is sent and closed when the stream
/// is exhausted or dropped. Readers can only be sent once.
///
/// # Examples
///
/// ```
/// use restcore::body::ByteResource;
///
/// let upload = ByteResource::from_path("/tmp/report.csv").with_content_type("text/csv");
/// assert_eq!(upload.filename(), Some("report.csv"));
/// ```
pub struct ByteResource {
    source: Source,
    content_type: Option<String>,
    filename: Option<String>,
}

impl ByteResource {
    /// Wraps an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Bytes(bytes.into()),
            content_type: None,
            filename: None,
        }
    }

    /// Streams the file at `path`, named after its last path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            source: Source::File(path),
            content_type: None,
            filename,
        }
    }

    /// Streams a caller-owned reader. The reader is consumed by the first send.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            source: Source::Reader(Mutex::new(Some(Box::new(reader)))),
            content_type: None,
            filename: None,
        }
    }

    /// Sets the part content type used in multipart bodies.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the file name reported in multipart bodies.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// The explicit content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The file name, if any.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Opens a fresh chunked stream over the content.
    ///
    /// Returns `None` when the content was a reader that has already been
    /// consumed.
    pub fn open(&self) -> Option<ByteStream> {
        match &self.source {
            Source::Bytes(bytes) => Some(rechunk(stream::iter(vec![Ok(bytes.clone())]).boxed())),
            Source::File(path) => {
                let path = path.clone();
                Some(
                    stream::once(async move {
                        tokio::fs::File::open(path).await.map(read_chunks)
                    })
                    .try_flatten()
                    .boxed(),
                )
            }
            Source::Reader(slot) => {
                let reader = slot.lock().ok()?.take()?;
                Some(read_chunks(reader))
            }
        }
    }
}

impl fmt::Debug for ByteResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Bytes(bytes) => format!("{} bytes", bytes.len()),
            Source::File(path) => path.display().to_string(),
            Source::Reader(_) => "reader".to_string(),
        };
        f.debug_struct("ByteResource")
            .field("source", &source)
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish()
    }
}

/// A body ready to be attached to each attempt of a request.
pub enum EncodedBody {
    /// No entity body is sent.
    Empty,
    /// A complete buffer, cloned for every attempt.
    Buffered(Bytes),
    /// A resource reopened for every attempt.
    Resource(ByteResource),
    /// A multipart form whose stream is rebuilt for every attempt.
    Multipart(MultipartForm),
    /// A one-shot stream, taken by the first attempt.
    Streaming(Mutex<Option<ByteStream>>),
}

impl fmt::Debug for EncodedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodedBody::Empty => f.write_str("Empty"),
            EncodedBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            EncodedBody::Resource(resource) => f.debug_tuple("Resource").field(resource).finish(),
            EncodedBody::Multipart(form) => f.debug_tuple("Multipart").field(form).finish(),
            EncodedBody::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// The body for one send attempt.
pub enum Replay {
    /// Send no body.
    Empty,
    /// Send this body.
    Body(reqwest::Body),
    /// The body was a one-shot stream already sent by an earlier attempt.
    Consumed,
}

impl EncodedBody {
    /// Produces the body for the next attempt.
    pub fn replay(&self) -> Replay {
        let stream = match self {
            EncodedBody::Empty => return Replay::Empty,
            EncodedBody::Buffered(bytes) => return Replay::Body(reqwest::Body::from(bytes.clone())),
            EncodedBody::Resource(resource) => resource.open(),
            EncodedBody::Multipart(form) => form.stream(),
            EncodedBody::Streaming(slot) => slot.lock().ok().and_then(|mut s| s.take()),
        };
        match stream {
            Some(stream) => Replay::Body(reqwest::Body::wrap_stream(stream)),
            None => Replay::Consumed,
        }
    }

    /// Returns the buffered bytes, if this body is a plain buffer.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            EncodedBody::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Encodes `body` according to the `Content-Type` in `headers`.
///
/// Dispatch, in order: streams pass through; any body under a
/// `multipart/form-data` content type goes through the multipart encoder and
/// the content type gains a `boundary` parameter; objects and lists under a
/// JSON content type become compact UTF-8 JSON with `extra_body` merged into
/// top-level objects; resources stream their content; strings and bytes are
/// sent verbatim; anything else sends no body.
///
/// # Errors
///
/// Returns a serialization error if the JSON encoder fails.
///
/// # Examples
///
/// ```
/// use restcore::body::{encode, RequestBody};
/// use http::HeaderMap;
/// use serde_json::{json, Map};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("content-type", "application/json".parse().unwrap());
///
/// let body = RequestBody::Json(json!({"path": "a/b", "name": "café"}));
/// let encoded = encode(&mut headers, body, &Map::new()).unwrap();
/// assert_eq!(
///     encoded.as_bytes().unwrap().as_ref(),
///     r#"{"path":"a/b","name":"café"}"#.as_bytes()
/// );
/// ```
pub fn encode(
    headers: &mut HeaderMap,
    body: RequestBody,
    extra_body: &Map<String, Value>,
) -> Result<EncodedBody> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let kind = ContentKind::of(&content_type);

    let body = match body {
        RequestBody::Stream(stream) => {
            return Ok(EncodedBody::Streaming(Mutex::new(Some(stream))));
        }
        RequestBody::Json(Value::Object(mut map)) => {
            for (key, value) in extra_body {
                map.insert(key.clone(), value.clone());
            }
            RequestBody::Json(Value::Object(map))
        }
        other => other,
    };

    if kind == ContentKind::Multipart {
        let form = MultipartForm::from_body(body);
        let header = format!("{}; boundary={}", content_type.trim(), form.boundary());
        headers.insert(CONTENT_TYPE, crate::metadata::header_value(&header)?);
        return Ok(EncodedBody::Multipart(form));
    }

    match body {
        RequestBody::Json(value @ (Value::Object(_) | Value::Array(_)))
            if kind == ContentKind::Json =>
        {
            let bytes =
                serde_json::to_vec(&value).map_err(|e| Error::Serialization(e.to_string()))?;
            Ok(EncodedBody::Buffered(Bytes::from(bytes)))
        }
        RequestBody::Resource(resource) => Ok(EncodedBody::Resource(resource)),
        RequestBody::Json(Value::String(text)) | RequestBody::Text(text) => {
            Ok(EncodedBody::Buffered(Bytes::from(text)))
        }
        RequestBody::Bytes(bytes) => Ok(EncodedBody::Buffered(bytes)),
        other => {
            if !matches!(other, RequestBody::Empty) {
                tracing::debug!(
                    content_type = %content_type,
                    body = ?other,
                    "Body has no encoding for this content type; sending none"
                );
            }
            Ok(EncodedBody::Empty)
        }
    }
}

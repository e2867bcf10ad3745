//! Streaming `multipart/form-data` encoder.
//!
//! The encoded body is produced as a lazy stream of chunks; resources are read
//! in [`CHUNK_SIZE`](crate::stream::CHUNK_SIZE) pieces only while the stream is
//! polled, so large uploads are never held in memory. Transports that need a
//! single buffer can drain the stream with [`MultipartForm::into_bytes`], at the
//! cost of materializing the whole body.

use crate::body::{ByteResource, FormValue, RequestBody};
use crate::path::encode_component;
use crate::stream::{collect, ByteStream};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use rand::RngCore;
use serde_json::Value;
use std::io;

/// Number of random bytes behind each boundary.
const BOUNDARY_ENTROPY: usize = 60;

/// Generates a fresh boundary: URL-safe base64 without padding.
pub fn generate_boundary() -> String {
    let mut bytes = [0u8; BOUNDARY_ENTROPY];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug)]
enum PartContent {
    Text(String),
    Json(Value),
    Resource(ByteResource),
}

#[derive(Debug)]
struct Part {
    name: Option<String>,
    content: PartContent,
}

/// A multipart body with a fixed boundary.
///
/// # Examples
///
/// ```
/// use restcore::body::{FormValue, RequestBody};
/// use restcore::multipart::MultipartForm;
/// use serde_json::json;
///
/// # async fn example() -> std::io::Result<()> {
/// let form = MultipartForm::from_body(RequestBody::Form(vec![
///     ("purpose".to_string(), FormValue::Value(json!("fine-tune"))),
/// ]));
/// let body = form.into_bytes().await?;
/// assert!(body.ends_with(b"--\r\n"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartForm {
    /// Builds a form from a request body.
    ///
    /// Objects and form field lists produce one named part per entry; any
    /// other value produces a single unnamed part.
    pub fn from_body(body: RequestBody) -> Self {
        let parts = match body {
            RequestBody::Form(fields) => fields
                .into_iter()
                .map(|(name, value)| Part::named(name, value))
                .collect(),
            RequestBody::Json(Value::Object(map)) => map
                .into_iter()
                .map(|(name, value)| Part::named(name, FormValue::Value(value)))
                .collect(),
            RequestBody::Json(value) => vec![Part::unnamed(content_of(FormValue::Value(value)))],
            RequestBody::Text(text) => vec![Part::unnamed(PartContent::Text(text))],
            RequestBody::Bytes(bytes) => vec![Part::unnamed(PartContent::Resource(
                ByteResource::from_bytes(bytes),
            ))],
            RequestBody::Resource(resource) => {
                vec![Part::unnamed(PartContent::Resource(resource))]
            }
            RequestBody::Empty | RequestBody::Stream(_) => Vec::new(),
        };
        Self {
            boundary: generate_boundary(),
            parts,
        }
    }

    /// The boundary separating parts.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Builds a fresh stream over the encoded form.
    ///
    /// Returns `None` if a part is a reader consumed by an earlier stream.
    pub fn stream(&self) -> Option<ByteStream> {
        let mut segments: Vec<ByteStream> = Vec::with_capacity(self.parts.len() * 3 + 1);

        for part in &self.parts {
            let (content_type, body) = match &part.content {
                PartContent::Text(text) => ("text/plain", once(Bytes::from(text.clone()))),
                PartContent::Json(value) => (
                    "application/json",
                    once(Bytes::from(value.to_string())),
                ),
                PartContent::Resource(resource) => (
                    resource.content_type().unwrap_or("application/octet-stream"),
                    resource.open()?,
                ),
            };

            let mut head = format!("--{}\r\nContent-Disposition: form-data", self.boundary);
            if let Some(name) = &part.name {
                head.push_str(&format!("; name=\"{}\"", encode_component(name)));
            }
            if let PartContent::Resource(resource) = &part.content {
                if let Some(filename) = resource.filename() {
                    head.push_str(&format!("; filename=\"{}\"", encode_component(filename)));
                }
            }
            head.push_str(&format!("\r\nContent-Type: {}\r\n\r\n", content_type));

            segments.push(once(Bytes::from(head)));
            segments.push(body);
            segments.push(once(Bytes::from_static(b"\r\n")));
        }
        segments.push(once(Bytes::from(format!("--{}--\r\n", self.boundary))));

        Some(stream::iter(segments).flatten().boxed())
    }

    /// Drains the whole form into one buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource cannot be read or was already consumed.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        let stream = self
            .stream()
            .ok_or_else(|| io::Error::other("multipart reader already consumed"))?;
        collect(stream).await
    }
}

impl Part {
    fn named(name: String, value: FormValue) -> Self {
        Self {
            name: Some(name),
            content: content_of(value),
        }
    }

    fn unnamed(content: PartContent) -> Self {
        Self {
            name: None,
            content,
        }
    }
}

fn content_of(value: FormValue) -> PartContent {
    match value {
        FormValue::Resource(resource) => PartContent::Resource(resource),
        FormValue::Value(Value::String(text)) => PartContent::Text(text),
        FormValue::Value(Value::Bool(b)) => PartContent::Text(b.to_string()),
        FormValue::Value(Value::Number(n)) => PartContent::Text(n.to_string()),
        FormValue::Value(other) => PartContent::Json(other),
    }
}

fn once(bytes: Bytes) -> ByteStream {
    stream::once(async move { Ok(bytes) }).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn encoded(form: MultipartForm) -> (String, String) {
        let boundary = form.boundary().to_string();
        let bytes = form.into_bytes().await.unwrap();
        (boundary, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_boundary_alphabet_and_uniqueness() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_ne!(a, b);
        assert_eq!(a.len(), 80);
        assert!(!a.contains('='));
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_fields_encode_by_kind() {
        let form = MultipartForm::from_body(RequestBody::Form(vec![
            ("title".to_string(), FormValue::Value(json!("Q3 report"))),
            ("count".to_string(), FormValue::Value(json!(3))),
            ("meta data".to_string(), FormValue::Value(json!({"k": [1, 2]}))),
            (
                "file".to_string(),
                FormValue::Resource(
                    ByteResource::from_bytes(&b"a,b\n"[..]).with_filename("r.csv"),
                ),
            ),
        ]));
        let (b, body) = encoded(form).await;

        let expected = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\nContent-Type: text/plain\r\n\r\nQ3 report\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"count\"\r\nContent-Type: text/plain\r\n\r\n3\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"meta%20data\"\r\nContent-Type: application/json\r\n\r\n{{\"k\":[1,2]}}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"r.csv\"\r\nContent-Type: application/octet-stream\r\n\r\na,b\n\r\n\
             --{b}--\r\n"
        );
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn test_scalar_body_is_single_unnamed_part() {
        let form = MultipartForm::from_body(RequestBody::Text("hello".to_string()));
        let (b, body) = encoded(form).await;
        assert_eq!(
            body,
            format!(
                "--{b}\r\nContent-Disposition: form-data\r\nContent-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n"
            )
        );
    }

    #[tokio::test]
    async fn test_explicit_part_content_type() {
        let resource = ByteResource::from_bytes(&b"{}"[..]).with_content_type("application/x-custom");
        let form = MultipartForm::from_body(RequestBody::Form(vec![(
            "doc".to_string(),
            FormValue::Resource(resource),
        )]));
        let (_, body) = encoded(form).await;
        assert!(body.contains("Content-Type: application/x-custom\r\n\r\n{}\r\n"));
    }

    #[tokio::test]
    async fn test_file_part_streams_from_disk() {
        let path = std::env::temp_dir().join(format!("restcore-{}.bin", generate_boundary()));
        tokio::fs::write(&path, vec![b'#'; 20_000]).await.unwrap();

        let form = MultipartForm::from_body(RequestBody::Form(vec![(
            "upload".to_string(),
            FormValue::Resource(ByteResource::from_path(&path)),
        )]));
        let (_, body) = encoded(form).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(body.matches('#').count(), 20_000);
        assert!(body.contains("filename=\"restcore-"));
    }
}

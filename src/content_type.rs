//! `Content-Type` classification shared by the body encoder and decoder.

use regex::Regex;
use std::sync::LazyLock;

static JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^application/(?:vnd(?:\.[^.]+)*)?json").expect("JSON content-type pattern")
});

static JSON_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^application/(?:x-(?:n|l)djson)|(?:(?:x-)?jsonl)")
        .expect("JSON-Lines content-type pattern")
});

/// How a body with a given `Content-Type` is encoded or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// A single JSON document.
    Json,
    /// Newline-delimited JSON values.
    JsonLines,
    /// Server-Sent Events.
    EventStream,
    /// `multipart/form-data`.
    Multipart,
    /// Anything else, handled as opaque bytes.
    Other,
}

impl ContentKind {
    /// Classifies a `Content-Type` header value.
    ///
    /// # Examples
    ///
    /// ```
    /// use restcore::content_type::ContentKind;
    ///
    /// assert_eq!(ContentKind::of("application/json; charset=utf-8"), ContentKind::Json);
    /// assert_eq!(ContentKind::of("application/vnd.api+json"), ContentKind::Json);
    /// assert_eq!(ContentKind::of("application/x-ndjson"), ContentKind::JsonLines);
    /// assert_eq!(ContentKind::of("application/jsonl"), ContentKind::JsonLines);
    /// assert_eq!(ContentKind::of("text/event-stream"), ContentKind::EventStream);
    /// assert_eq!(ContentKind::of("text/plain"), ContentKind::Other);
    /// ```
    pub fn of(content_type: &str) -> Self {
        let content_type = content_type.trim().to_ascii_lowercase();
        if is_json(&content_type) {
            ContentKind::Json
        } else if JSON_LINES.is_match(&content_type) {
            ContentKind::JsonLines
        } else if content_type.contains("text/event-stream") {
            ContentKind::EventStream
        } else if content_type.starts_with("multipart/form-data") {
            ContentKind::Multipart
        } else {
            ContentKind::Other
        }
    }
}

/// Emulates the `(?!l)` look-ahead the `regex` crate does not support.
fn is_json(content_type: &str) -> bool {
    JSON.find(content_type)
        .is_some_and(|m| !content_type[m.end()..].starts_with('l'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_excludes_json_lines() {
        assert_eq!(ContentKind::of("application/jsonl"), ContentKind::JsonLines);
        assert_eq!(ContentKind::of("application/x-jsonl"), ContentKind::JsonLines);
        assert_eq!(ContentKind::of("application/x-ldjson"), ContentKind::JsonLines);
        assert_eq!(ContentKind::of("application/vnd.github.v3json"), ContentKind::Json);
        assert_eq!(ContentKind::of("Application/JSON"), ContentKind::Json);
    }

    #[test]
    fn test_non_json_types() {
        assert_eq!(ContentKind::of("text/json"), ContentKind::Other);
        assert_eq!(
            ContentKind::of("multipart/form-data; boundary=x"),
            ContentKind::Multipart
        );
        assert_eq!(
            ContentKind::of("text/event-stream; charset=utf-8"),
            ContentKind::EventStream
        );
        assert_eq!(ContentKind::of(""), ContentKind::Other);
    }
}

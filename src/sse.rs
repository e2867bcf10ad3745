//! Server-Sent Events decoding.

use crate::stream::LineStream;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One decoded event. Fields the server never set are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event` field.
    pub event: Option<String>,
    /// All `data` lines of the event, joined with `\n`.
    pub data: Option<String>,
    /// The `id` field.
    pub id: Option<String>,
    /// The `retry` field, in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Parses `data` as JSON. A missing `data` field parses as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(self.data.as_deref().unwrap_or("null"))
    }

    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_none() && self.id.is_none() && self.retry.is_none()
    }
}

/// Line-at-a-time event accumulator.
///
/// # Examples
///
/// ```
/// use restcore::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert_eq!(decoder.push_line("data: foo"), None);
/// assert_eq!(decoder.push_line("data: bar"), None);
/// let event = decoder.push_line("").unwrap();
/// assert_eq!(event.data.as_deref(), Some("foo\nbar"));
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: SseEvent,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line, returning an event when the line completes one.
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.trim_end();
        if line.is_empty() {
            return self.finish();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => match &mut self.pending.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.pending.data = Some(value.to_string()),
            },
            "id" => self.pending.id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.pending.retry = Some(retry);
                }
            }
            _ => {}
        }
        None
    }

    /// Flushes the pending event, if any field of it was set.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.pending);
        (!event.is_empty()).then_some(event)
    }
}

/// Decodes a line stream into events, flushing a trailing event at the end.
pub fn events(lines: LineStream) -> BoxStream<'static, io::Result<SseEvent>> {
    stream::try_unfold(
        (lines.fuse(), SseDecoder::new()),
        |(mut lines, mut decoder)| async move {
            while let Some(line) = lines.try_next().await? {
                if let Some(event) = decoder.push_line(&String::from_utf8_lossy(&line)) {
                    return Ok::<_, io::Error>(Some((event, (lines, decoder))));
                }
            }
            Ok(decoder.finish().map(|event| (event, (lines, decoder))))
        },
    )
    .boxed()
}

/// A single-pass stream of events read from a response body.
///
/// Dropping the stream, exhausted or not, closes the body.
pub struct SseStream {
    inner: BoxStream<'static, crate::Result<SseEvent>>,
}

impl SseStream {
    pub(crate) fn new(inner: BoxStream<'static, crate::Result<SseEvent>>) -> Self {
        Self { inner }
    }
}

impl Stream for SseStream {
    type Item = crate::Result<SseEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for SseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseStream").finish_non_exhaustive()
    }
}

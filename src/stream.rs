//! Lazy byte streams shared by the body encoder and the response decoder.
//!
//! All streams here are single-pass and own whatever they read from, so
//! dropping a stream (exhausted or not) releases the file or connection
//! behind it.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of each read from a file, reader or response body.
pub const CHUNK_SIZE: usize = 8192;

/// A lazy, single-pass sequence of byte chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// A lazy, single-pass sequence of raw lines.
pub type LineStream = BoxStream<'static, io::Result<Vec<u8>>>;

/// Streams `reader` in chunks of at most [`CHUNK_SIZE`] bytes.
pub fn read_chunks<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    stream::try_unfold(reader, |mut reader| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, io::Error>(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), reader)))
    })
    .boxed()
}

/// Splits every chunk of `inner` into pieces of at most [`CHUNK_SIZE`] bytes.
pub fn rechunk(inner: ByteStream) -> ByteStream {
    inner
        .map_ok(|mut chunk| {
            let mut pieces: Vec<io::Result<Bytes>> =
                Vec::with_capacity(chunk.len() / CHUNK_SIZE + 1);
            while chunk.len() > CHUNK_SIZE {
                pieces.push(Ok(chunk.split_to(CHUNK_SIZE)));
            }
            if !chunk.is_empty() {
                pieces.push(Ok(chunk));
            }
            stream::iter(pieces)
        })
        .try_flatten()
        .boxed()
}

/// Splits `inner` on `\n`, yielding each line without its terminator.
///
/// A trailing `\r` is kept; callers normalize whitespace as their format
/// requires. A final line without a newline is still yielded.
pub fn lines(inner: ByteStream) -> LineStream {
    struct State {
        inner: ByteStream,
        buf: Vec<u8>,
        finished: bool,
    }

    let state = State {
        inner,
        buf: Vec::new(),
        finished: false,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buf.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = state.buf.drain(..=pos).collect();
                line.pop();
                return Ok::<_, io::Error>(Some((line, state)));
            }
            if state.finished {
                if state.buf.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut state.buf);
                return Ok(Some((line, state)));
            }
            match state.inner.next().await {
                Some(chunk) => state.buf.extend_from_slice(&chunk?),
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

/// Drains `inner` into a single buffer.
pub async fn collect(mut inner: ByteStream) -> io::Result<Bytes> {
    let mut out = Vec::new();
    while let Some(chunk) = inner.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(out))
}

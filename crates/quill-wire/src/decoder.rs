//! Transport decoder: byte fragments in, protocol events out.
//!
//! Wraps the SSE line parser and lifts each payload into a [`StreamEvent`].
//! Malformed payloads are logged and skipped — a single bad line never
//! aborts the stream. A source that ends without a terminal event yields
//! [`WireError::PrematureClose`].

use std::pin::pin;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

use quill_core::text::truncate_str;

use crate::error::WireError;
use crate::event::{ChatChunk, StreamEvent};
use crate::sse::{SseParserOptions, parse_sse_lines};

/// Decode a chunked byte stream into an ordered sequence of protocol events.
///
/// The returned stream is fused at the terminal event: nothing is yielded
/// after `Done`, even if the source keeps producing bytes. If the source
/// ends (or fails) before `Done`, the last item is an `Err` — the consumer
/// must treat the stream as failed, not silently complete.
///
/// One decoder serves exactly one logical stream; it is not restartable.
pub fn decode_events<S>(
    byte_stream: S,
    options: &SseParserOptions,
) -> impl Stream<Item = Result<StreamEvent, WireError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    let lines = parse_sse_lines(byte_stream, options);

    stream! {
        let mut lines = pin!(lines);

        while let Some(item) = lines.next().await {
            let data = match item {
                Ok(data) => data,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let chunk: ChatChunk = match serde_json::from_str(&data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(
                        error = %e,
                        data_preview = truncate_str(&data, 100),
                        "skipping malformed event payload"
                    );
                    continue;
                }
            };

            let event = chunk.into_event();
            let done = event.is_done();
            yield Ok(event);
            if done {
                return;
            }
        }

        yield Err(WireError::PrematureClose);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! SSE line framing.
//!
//! The generation service streams one event per `\n`-terminated line with a
//! `data: ` field prefix. Chunks arrive at arbitrary granularity: one logical
//! event may be split across fragments, several events may share a fragment,
//! and a multi-byte UTF-8 character may straddle a fragment boundary.
//!
//! The parser therefore buffers raw bytes and only decodes to text once a
//! complete line is available — a split character can never corrupt output.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::error::WireError;

/// Options for the SSE line parser.
#[derive(Clone, Debug, Default)]
pub struct SseParserOptions {
    /// Whether to process buffer content left without a trailing newline
    /// when the stream ends. Default: `false` — only `\n`-terminated lines
    /// are candidate records.
    pub process_remaining_buffer: bool,
}

/// Parse SSE lines from a byte stream and yield `data:` payload strings.
///
/// Yields one `Ok(String)` per data line. Blank lines, comments, non-`data`
/// fields, empty payloads, and `[DONE]` markers are discarded. A read error
/// on the underlying byte source is yielded as `Err` and terminates the
/// stream (the caller treats it as a transport failure, not a completion).
pub fn parse_sse_lines<S>(
    byte_stream: S,
    options: &SseParserOptions,
) -> impl Stream<Item = Result<String, WireError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    let process_remaining = options.process_remaining_buffer;

    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                // Complete line available?
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let line = match std::str::from_utf8(&line_bytes) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(error = %e, "skipping non-UTF-8 SSE line");
                            continue;
                        }
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                // Need more bytes.
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        return Some((Err(WireError::Read(e)), (stream, buffer, true)));
                    }
                    None => {
                        // Source ended — the trailing partial (no newline) is
                        // still a candidate line if configured.
                        if process_remaining && !buffer.is_empty() {
                            let data = match std::str::from_utf8(&buffer) {
                                Ok(s) => extract_sse_data(s.trim()),
                                Err(_) => None,
                            };
                            if let Some(data) = data {
                                buffer.clear();
                                return Some((Ok(data), (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract the payload from one SSE line.
///
/// Returns `Some(payload)` for non-empty data lines; `None` for blank lines,
/// comments, other framing fields, empty payloads, and `[DONE]` markers.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?;
    let data = data.trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(data.to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! # quill-wire
//!
//! Transport layer for the Quill chat core: turns the generation service's
//! chunked SSE byte stream into a well-formed sequence of protocol events.
//!
//! Pipeline: HTTP response bytes → [`sse::parse_sse_lines`] (line framing) →
//! [`decoder::decode_events`] (payload parsing, terminal detection) →
//! `Stream<Result<StreamEvent, WireError>>` consumed by the merge engine.
//!
//! One decoder instance serves exactly one logical stream end to end; a
//! stream that ends without a terminal event fails with
//! [`WireError::PrematureClose`] rather than completing silently.

#![deny(unsafe_code)]

pub mod client;
pub mod decoder;
pub mod error;
pub mod event;
pub mod sse;

pub use client::{ByteSource, ChatClient, ChatRequest, WireMessage};
pub use decoder::decode_events;
pub use error::{WireError, WireResult};
pub use event::{ChatChunk, StreamEvent};
pub use sse::SseParserOptions;

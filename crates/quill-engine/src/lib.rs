//! # quill-engine
//!
//! The streaming merge engine: bridges one dispatched request to one
//! committed message.
//!
//! The engine consumes protocol events from the transport decoder, maintains
//! the single live [`StreamingMessage`](quill_core::messages::StreamingMessage),
//! publishes partial snapshots to observers on every delta, and — at the
//! terminal event — resolves citations and hands the finished
//! [`CommittedMessage`](quill_core::messages::CommittedMessage) to the
//! external conversation store.
//!
//! Lifecycle per request: `Idle → Streaming → Committing → Idle`. One stream
//! at a time per engine; concurrent conversations use independent engines.

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod store;

pub use engine::{EngineConfig, MergeEngine, StreamOutcome};
pub use error::{EngineError, EngineResult};
pub use store::{ConversationStore, MemoryStore, StoreError};

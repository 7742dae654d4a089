//! # quill-core
//!
//! Foundation types for the Quill streaming chat core.
//!
//! This crate provides the shared vocabulary the other Quill crates depend on:
//!
//! - **Branded IDs**: `MessageId`, `ConversationId` as newtypes for type safety
//! - **Messages**: `StreamingMessage` (transient partial view) and
//!   `CommittedMessage` (final, handed to the conversation store)
//! - **Citations**: `CitationRecord` and the session-wide `CitationTable`
//! - **Annotations**: `Node` spans produced by the reference resolver
//! - **Text**: UTF-8-safe truncation helpers for log previews

#![deny(unsafe_code)]

pub mod annotations;
pub mod citations;
pub mod ids;
pub mod messages;
pub mod text;

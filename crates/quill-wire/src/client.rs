//! HTTP dispatch client.
//!
//! Owns request construction only: the caller hands over the message history,
//! the client POSTs it and returns the raw response byte stream for the
//! decoder. It holds no conversation state and knows nothing about how the
//! committed messages are stored.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use quill_core::ids::ConversationId;
use quill_core::messages::{CommittedMessage, Role};
use quill_core::text::truncate_str;

use crate::error::{WireError, WireResult};

/// Boxed byte stream handed to [`decode_events`](crate::decoder::decode_events).
pub type ByteSource = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// One message in the request history, in the service's wire shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message id.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<&CommittedMessage> for WireMessage {
    fn from(message: &CommittedMessage) -> Self {
        Self {
            id: message.id.as_str().to_owned(),
            role: message.role,
            content: message.text.clone(),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// Request payload for the streaming chat endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Full message history, oldest first.
    pub messages: Vec<WireMessage>,

    /// Conversation the request belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Build a request from committed history.
    #[must_use]
    pub fn from_history<'a, I>(history: I) -> Self
    where
        I: IntoIterator<Item = &'a CommittedMessage>,
    {
        Self {
            messages: history.into_iter().map(WireMessage::from).collect(),
            ..Self::default()
        }
    }
}

/// Streaming chat dispatch client.
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a client against a service base URL (no trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client with a shared HTTP connection pool.
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Dispatch a chat request and return the response byte stream.
    ///
    /// A non-success status is mapped to [`WireError::Api`] with the response
    /// body (truncated) as the message.
    pub async fn start_stream(&self, request: &ChatRequest) -> WireResult<ByteSource> {
        let url = format!("{}/api/chat", self.base_url);

        debug!(
            message_count = request.messages.len(),
            conversation_id = request
                .conversation_id
                .as_ref()
                .map_or("-", ConversationId::as_str),
            "dispatching chat request"
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(WireError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "chat request rejected");
            return Err(WireError::Api {
                status: status.as_u16(),
                message: truncate_str(&body, 200).to_owned(),
            });
        }

        Ok(Box::pin(response.bytes_stream()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quill_core::ids::MessageId;

    fn committed(text: &str) -> CommittedMessage {
        CommittedMessage {
            id: MessageId::from("m1"),
            role: Role::User,
            text: text.into(),
            nodes: Vec::new(),
            citations: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            error: false,
        }
    }

    #[test]
    fn wire_message_from_committed() {
        let wire = WireMessage::from(&committed("hello"));
        assert_eq!(wire.id, "m1");
        assert_eq!(wire.role, Role::User);
        assert_eq!(wire.content, "hello");
        assert_eq!(wire.created_at, "2025-01-02T03:04:05+00:00");
    }

    #[test]
    fn request_from_history_preserves_order() {
        let a = committed("first");
        let b = committed("second");
        let request = ChatRequest::from_history([&a, &b]);
        assert_eq!(request.messages[0].content, "first");
        assert_eq!(request.messages[1].content, "second");
    }

    #[test]
    fn request_serialization_skips_unset_options() {
        let request = ChatRequest::from_history(Vec::<&CommittedMessage>::new());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("conversation_id").is_none());
        assert!(json["messages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn conversation_id_serializes_as_plain_string() {
        let request = ChatRequest {
            conversation_id: Some(ConversationId::from("conv-9")),
            ..ChatRequest::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["conversation_id"], "conv-9");
    }

    #[test]
    fn request_serialization_includes_set_options() {
        let request = ChatRequest {
            temperature: Some(0.7),
            max_tokens: Some(1024),
            ..ChatRequest::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn role_serializes_to_wire_strings() {
        let wire = WireMessage {
            id: "x".into(),
            role: Role::Assistant,
            content: String::new(),
            created_at: String::new(),
        };
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}

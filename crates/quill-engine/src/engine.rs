//! The merge engine: folds decoded stream events into one committed message.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures::{Stream, StreamExt};
use quill_core::annotations::Node;
use quill_core::citations::{CitationRecord, CitationTable};
use quill_core::ids::MessageId;
use quill_core::messages::{CommittedMessage, Role, StreamingMessage};
use quill_wire::{StreamEvent, WireError};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::store::ConversationStore;

fn default_failure_notice() -> String {
    "[The connection was interrupted before the response completed.]".to_owned()
}

/// Engine tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Text appended to the partial response when the transport fails
    /// mid-stream. The result is committed as an error-tagged message.
    #[serde(default = "default_failure_notice")]
    pub failure_notice: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_notice: default_failure_notice(),
        }
    }
}

/// How a stream run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Terminal event received; the finished message was committed.
    Committed {
        /// Id of the committed message.
        message_id: MessageId,
    },
    /// Transport failed mid-stream; an error-tagged notice message holding
    /// the partial text was committed in its place.
    Failed {
        /// Id of the committed notice message.
        message_id: MessageId,
    },
    /// Caller cancelled; the partial message was discarded without commit.
    Cancelled,
}

/// Folds one stream of protocol events into one committed message.
///
/// The engine owns the single live [`StreamingMessage`] and publishes cloned
/// snapshots through a watch channel: observers always see the latest partial
/// text, and `None` whenever no stream is active. At most one stream runs at
/// a time; [`run_stream`](Self::run_stream) rejects a second concurrent call
/// synchronously.
pub struct MergeEngine {
    store: Arc<dyn ConversationStore>,
    table: Arc<CitationTable>,
    config: EngineConfig,
    current: watch::Sender<Option<StreamingMessage>>,
    in_flight: AtomicBool,
}

/// Resets engine state when a run ends on any path, including panic unwind.
struct StreamGuard<'a> {
    engine: &'a MergeEngine,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        // send_replace, not send: the value must clear even with no
        // receivers alive, or a later subscriber sees a stale partial.
        let _ = self.engine.current.send_replace(None);
        self.engine.in_flight.store(false, Ordering::Release);
    }
}

impl MergeEngine {
    /// Create an engine with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, table: Arc<CitationTable>) -> Self {
        Self::with_config(store, table, EngineConfig::default())
    }

    /// Create an engine with an explicit configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<dyn ConversationStore>,
        table: Arc<CitationTable>,
        config: EngineConfig,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            store,
            table,
            config,
            current,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Observe the live partial message.
    ///
    /// Holds `Some` from stream start through the last delta, and `None`
    /// whenever the engine is idle.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<StreamingMessage>> {
        self.current.subscribe()
    }

    /// Whether a stream is currently being consumed.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Consume one event stream to completion.
    ///
    /// Publishes an empty partial message immediately, appends each delta in
    /// arrival order, and finishes in one of three ways:
    ///
    /// - terminal event: citations merge into the table, references resolve
    ///   against a fresh snapshot, and the finished message is committed
    ///   ([`StreamOutcome::Committed`]);
    /// - transport error: the partial text plus the configured failure notice
    ///   is committed as an error-tagged message ([`StreamOutcome::Failed`]);
    /// - `cancel` fires: the partial message is discarded, nothing is
    ///   committed ([`StreamOutcome::Cancelled`]).
    ///
    /// Fails fast with [`EngineError::StreamInFlight`] if a stream is already
    /// running, and with [`EngineError::Store`] if the store rejects the
    /// commit.
    pub async fn run_stream<S>(
        &self,
        events: S,
        cancel: &CancellationToken,
    ) -> EngineResult<StreamOutcome>
    where
        S: Stream<Item = Result<StreamEvent, WireError>> + Send,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::StreamInFlight);
        }
        let _guard = StreamGuard { engine: self };

        let mut events = pin!(events);
        let mut message = StreamingMessage::begin(MessageId::new());
        debug!(message_id = %message.id, "stream opened");
        let _ = self.current.send_replace(Some(message.clone()));

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(
                        message_id = %message.id,
                        accumulated = message.text.len(),
                        "stream cancelled; partial message discarded"
                    );
                    return Ok(StreamOutcome::Cancelled);
                }

                event = events.next() => match event {
                    Some(Ok(StreamEvent::Delta { text })) => {
                        message.text.push_str(&text);
                        let _ = self.current.send_replace(Some(message.clone()));
                    }
                    Some(Ok(StreamEvent::Done { message_id, citations })) => {
                        return self.commit_final(message, message_id, citations).await;
                    }
                    Some(Err(error)) => {
                        warn!(%error, "transport failed mid-stream");
                        return self.commit_failure(message).await;
                    }
                    None => {
                        // The decoder reports PrematureClose before ending,
                        // but a foreign stream may just stop.
                        warn!("event stream ended without a terminal event");
                        return self.commit_failure(message).await;
                    }
                },
            }
        }
    }

    async fn commit_final(
        &self,
        message: StreamingMessage,
        wire_id: Option<String>,
        citations: Vec<CitationRecord>,
    ) -> EngineResult<StreamOutcome> {
        self.table.merge(citations.iter().cloned());
        let snapshot = self.table.snapshot();
        let nodes = quill_cite::resolve(&message.text, &snapshot);

        let id = wire_id.map_or(message.id, MessageId::from);
        let committed = CommittedMessage {
            id: id.clone(),
            role: Role::Assistant,
            text: message.text,
            nodes,
            citations,
            created_at: Utc::now(),
            error: false,
        };
        self.store.commit(committed).await?;
        info!(message_id = %id, "message committed");
        Ok(StreamOutcome::Committed { message_id: id })
    }

    /// Commit the partial text with the failure notice appended. The
    /// resolver is intentionally skipped: a truncated body may end inside a
    /// reference and must not be reinterpreted.
    async fn commit_failure(&self, message: StreamingMessage) -> EngineResult<StreamOutcome> {
        let mut text = message.text;
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&self.config.failure_notice);

        let committed = CommittedMessage {
            id: message.id.clone(),
            role: Role::Assistant,
            text: text.clone(),
            nodes: vec![Node::Text { text }],
            citations: Vec::new(),
            created_at: Utc::now(),
            error: true,
        };
        self.store.commit(committed).await?;
        info!(message_id = %message.id, "error notice committed");
        Ok(StreamOutcome::Failed {
            message_id: message.id,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use futures::stream;
    use tokio_stream::wrappers::ReceiverStream;

    fn record(id: &str, title: &str) -> CitationRecord {
        CitationRecord {
            id: id.into(),
            title: title.into(),
            content: format!("{title} body"),
            source: None,
        }
    }

    fn engine() -> (Arc<MergeEngine>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let table = Arc::new(CitationTable::new());
        let engine = Arc::new(MergeEngine::new(store.clone(), table));
        (engine, store)
    }

    fn events(
        items: Vec<Result<StreamEvent, WireError>>,
    ) -> impl Stream<Item = Result<StreamEvent, WireError>> + Send {
        stream::iter(items)
    }

    fn delta(text: &str) -> Result<StreamEvent, WireError> {
        Ok(StreamEvent::Delta { text: text.into() })
    }

    fn done() -> Result<StreamEvent, WireError> {
        Ok(StreamEvent::Done {
            message_id: None,
            citations: Vec::new(),
        })
    }

    // ── happy path ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn deltas_accumulate_in_arrival_order() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();

        let outcome = engine
            .run_stream(events(vec![delta("Hel"), delta("lo"), done()]), &cancel)
            .await
            .unwrap();

        assert_matches!(outcome, StreamOutcome::Committed { .. });
        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Hello");
        assert_eq!(messages[0].role, Role::Assistant);
        assert!(!messages[0].error);
    }

    #[tokio::test]
    async fn terminal_message_id_overrides_streaming_id() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();

        let outcome = engine
            .run_stream(
                events(vec![
                    delta("hi"),
                    Ok(StreamEvent::Done {
                        message_id: Some("srv-42".into()),
                        citations: Vec::new(),
                    }),
                ]),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StreamOutcome::Committed {
                message_id: MessageId::from("srv-42"),
            }
        );
        assert_eq!(store.messages()[0].id.as_str(), "srv-42");
    }

    #[tokio::test]
    async fn terminal_citations_resolve_references() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();

        let outcome = engine
            .run_stream(
                events(vec![
                    delta("See [^1] and [^2]."),
                    Ok(StreamEvent::Done {
                        message_id: None,
                        citations: vec![record("1", "A")],
                    }),
                ]),
                &cancel,
            )
            .await
            .unwrap();

        assert_matches!(outcome, StreamOutcome::Committed { .. });
        let message = &store.messages()[0];
        let resolved: Vec<_> = message.nodes.iter().filter(|n| n.is_citation()).collect();
        assert_eq!(resolved.len(), 1, "only the delivered citation resolves");
        assert_eq!(message.citations, vec![record("1", "A")]);
    }

    #[tokio::test]
    async fn citations_accumulate_across_streams() {
        let store = Arc::new(MemoryStore::new());
        let table = Arc::new(CitationTable::new());
        let engine = MergeEngine::new(store.clone(), table.clone());
        let cancel = CancellationToken::new();

        let _ = engine
            .run_stream(
                events(vec![
                    delta("First [^1]."),
                    Ok(StreamEvent::Done {
                        message_id: None,
                        citations: vec![record("1", "A")],
                    }),
                ]),
                &cancel,
            )
            .await
            .unwrap();

        // Second stream references the id delivered by the first.
        let _ = engine
            .run_stream(events(vec![delta("Again [^1]."), done()]), &cancel)
            .await
            .unwrap();

        assert_eq!(table.len(), 1);
        let second = &store.messages()[1];
        assert!(second.nodes.iter().any(Node::is_citation));
    }

    #[tokio::test]
    async fn engine_is_idle_after_commit() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();

        let first = engine
            .run_stream(events(vec![delta("a"), done()]), &cancel)
            .await
            .unwrap();
        assert!(!engine.is_streaming());
        let second = engine
            .run_stream(events(vec![delta("b"), done()]), &cancel)
            .await
            .unwrap();

        assert_matches!(first, StreamOutcome::Committed { .. });
        assert_matches!(second, StreamOutcome::Committed { .. });
        assert_eq!(store.len(), 2);
    }

    // ── partial view ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn publishes_empty_message_before_first_delta() {
        let (engine, _store) = engine();
        let mut view = engine.subscribe();
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(4);

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_stream(ReceiverStream::new(rx), &cancel).await }
        });

        view.changed().await.unwrap();
        let initial = view.borrow_and_update().clone().unwrap();
        assert_eq!(initial.text, "");
        assert!(initial.active);

        tx.send(done()).await.unwrap();
        let outcome = task.await.unwrap().unwrap();
        assert_matches!(outcome, StreamOutcome::Committed { .. });
    }

    #[tokio::test]
    async fn partial_view_grows_per_delta_and_clears_on_commit() {
        let (engine, _store) = engine();
        let mut view = engine.subscribe();
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(4);

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_stream(ReceiverStream::new(rx), &cancel).await }
        });

        view.changed().await.unwrap(); // initial empty publish

        tx.send(delta("Hel")).await.unwrap();
        view.changed().await.unwrap();
        assert_eq!(view.borrow_and_update().as_ref().unwrap().text, "Hel");

        tx.send(delta("lo")).await.unwrap();
        view.changed().await.unwrap();
        assert_eq!(view.borrow_and_update().as_ref().unwrap().text, "Hello");

        tx.send(done()).await.unwrap();
        let _ = task.await.unwrap().unwrap();
        assert!(view.borrow().is_none(), "view clears once the run ends");
    }

    // ── failure path ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn transport_error_commits_notice_preserving_partial_text() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();

        let outcome = engine
            .run_stream(
                events(vec![delta("half an ans"), Err(WireError::PrematureClose)]),
                &cancel,
            )
            .await
            .unwrap();

        assert_matches!(outcome, StreamOutcome::Failed { .. });
        let message = &store.messages()[0];
        assert!(message.error);
        assert!(message.text.starts_with("half an ans\n\n"));
        assert!(message.text.ends_with(&default_failure_notice()));
        // Truncated text is committed as a single plain span, unresolved.
        assert_eq!(
            message.nodes,
            vec![Node::Text {
                text: message.text.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn error_before_any_delta_commits_bare_notice() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();

        let outcome = engine
            .run_stream(events(vec![Err(WireError::PrematureClose)]), &cancel)
            .await
            .unwrap();

        assert_matches!(outcome, StreamOutcome::Failed { .. });
        assert_eq!(store.messages()[0].text, default_failure_notice());
    }

    #[tokio::test]
    async fn bare_stream_end_is_treated_as_failure() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();

        let outcome = engine
            .run_stream(events(vec![delta("cut")]), &cancel)
            .await
            .unwrap();

        assert_matches!(outcome, StreamOutcome::Failed { .. });
        assert!(store.messages()[0].error);
    }

    #[tokio::test]
    async fn custom_failure_notice_is_used() {
        let store = Arc::new(MemoryStore::new());
        let engine = MergeEngine::with_config(
            store.clone(),
            Arc::new(CitationTable::new()),
            EngineConfig {
                failure_notice: "(connection lost)".into(),
            },
        );
        let cancel = CancellationToken::new();

        let _ = engine
            .run_stream(events(vec![Err(WireError::PrematureClose)]), &cancel)
            .await
            .unwrap();

        assert_eq!(store.messages()[0].text, "(connection lost)");
    }

    // ── cancellation and exclusivity ─────────────────────────────────────

    #[tokio::test]
    async fn cancellation_discards_partial_without_commit() {
        let (engine, store) = engine();
        let mut view = engine.subscribe();
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(4);

        let task = tokio::spawn({
            let engine = engine.clone();
            let cancel = cancel.clone();
            async move { engine.run_stream(ReceiverStream::new(rx), &cancel).await }
        });

        tx.send(delta("partial")).await.unwrap();
        view.changed().await.unwrap();

        cancel.cancel();
        let outcome = task.await.unwrap().unwrap();

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(store.is_empty(), "cancellation must not commit");
        assert!(view.borrow().is_none());
        assert!(!engine.is_streaming());
    }

    #[tokio::test]
    async fn view_clears_even_after_subscriber_drops_mid_stream() {
        let (engine, store) = engine();
        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::channel(4);

        let mut view = engine.subscribe();
        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_stream(ReceiverStream::new(rx), &cancel).await }
        });

        tx.send(delta("partial")).await.unwrap();
        loop {
            view.changed().await.unwrap();
            if view
                .borrow_and_update()
                .as_ref()
                .is_some_and(|m| m.text == "partial")
            {
                break;
            }
        }
        // The only subscriber goes away before the stream finishes.
        drop(view);

        tx.send(done()).await.unwrap();
        let outcome = task.await.unwrap().unwrap();
        assert_matches!(outcome, StreamOutcome::Committed { .. });
        assert_eq!(store.len(), 1);

        // A fresh subscriber on the now-idle engine must see no stale partial.
        assert!(engine.subscribe().borrow().is_none());
        assert!(!engine.is_streaming());
    }

    #[tokio::test]
    async fn second_stream_is_rejected_while_one_runs() {
        let (engine, store) = engine();
        let mut view = engine.subscribe();
        let cancel = CancellationToken::new();
        let (_tx, rx) = tokio::sync::mpsc::channel::<Result<StreamEvent, WireError>>(4);

        let task = tokio::spawn({
            let engine = engine.clone();
            let cancel = cancel.clone();
            async move { engine.run_stream(ReceiverStream::new(rx), &cancel).await }
        });

        // Wait until the first run has actually started.
        view.changed().await.unwrap();

        let rejected = engine.run_stream(events(vec![done()]), &cancel).await;
        assert_matches!(rejected, Err(EngineError::StreamInFlight));

        cancel.cancel();
        assert_eq!(task.await.unwrap().unwrap(), StreamOutcome::Cancelled);

        // Engine is reusable afterwards.
        let fresh = CancellationToken::new();
        let outcome = engine
            .run_stream(events(vec![delta("ok"), done()]), &fresh)
            .await
            .unwrap();
        assert_matches!(outcome, StreamOutcome::Committed { .. });
        assert_eq!(store.len(), 1);
    }
}

//! Event publication.
//!
//! Every outgoing event is decoded against the type registry before it is
//! handed to the sink, so a handler cannot publish a malformed event.
//!
//! Publication happens after the handler's side effect. A failed publish is
//! reported to the dispatcher but nothing is rolled back: an email may have
//! been delivered even though its `mail-sent` event never went out, and a
//! redelivered command will then send it again.

use crate::dispatch::EventMessage;
use crate::registry::{RegistryError, TypeRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event publication errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The event does not conform to a registered schema.
    #[error("event rejected by registry: {0}")]
    Invalid(#[from] RegistryError),

    /// The external publish capability failed.
    #[error("event sink failed: {0}")]
    Sink(String),
}

/// Acknowledgement of a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Name of the published event.
    pub event: String,
    /// When the sink accepted it.
    pub published_at: DateTime<Utc>,
}

/// External publish capability.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes a validated event payload.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Sink`] if the event could not be handed off.
    async fn publish(&self, name: &str, payload: serde_json::Value) -> Result<(), PublishError>;
}

/// An event as handed to a [`ChannelSink`] receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    /// Event name.
    pub name: String,
    /// Validated payload.
    pub payload: serde_json::Value,
}

/// Sink that forwards events into a Tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PublishedEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PublishedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, name: &str, payload: serde_json::Value) -> Result<(), PublishError> {
        self.tx
            .send(PublishedEvent {
                name: name.to_string(),
                payload,
            })
            .map_err(|_| PublishError::Sink("event channel closed".into()))
    }
}

/// Validates and publishes events.
#[derive(Clone)]
pub struct EventEmitter {
    registry: Arc<TypeRegistry>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter over a registry and a sink.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, sink: Arc<dyn EventSink>) -> Self {
        Self { registry, sink }
    }

    /// Validates `event` and publishes it.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Invalid`] if the event does not decode against
    /// its registered type, or [`PublishError::Sink`] if the sink fails.
    pub async fn publish(&self, event: &EventMessage) -> Result<Ack, PublishError> {
        let payload = event.fields().to_json();
        self.registry.decode(event.name(), &payload)?;

        self.sink.publish(event.name(), payload).await?;
        tracing::debug!(event = event.name(), "event published");

        Ok(Ack {
            event: event.name().to_string(),
            published_at: Utc::now(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::{FieldType, MessageSchema, Record};

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        let schema = MessageSchema::new("mail-sent-event", [("id", FieldType::String)]).unwrap();
        registry.register_schema(schema).unwrap();
        registry.register_type("mail-sent", "mail-sent-event").unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn publishes_valid_event() {
        let (sink, mut rx) = ChannelSink::new();
        let emitter = EventEmitter::new(registry(), Arc::new(sink));

        let ack = emitter
            .publish(&EventMessage::new("mail-sent", Record::new().with("id", "42")))
            .await
            .unwrap();

        assert_eq!(ack.event, "mail-sent");
        let published = rx.recv().await.unwrap();
        assert_eq!(published.payload, serde_json::json!({"id": "42"}));
    }

    #[tokio::test]
    async fn rejects_malformed_event_before_sink() {
        let (sink, mut rx) = ChannelSink::new();
        let emitter = EventEmitter::new(registry(), Arc::new(sink));

        let err = emitter
            .publish(&EventMessage::new("mail-sent", Record::new().with("id", 42_i64)))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Invalid(RegistryError::Validation { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejects_unregistered_event() {
        let (sink, _rx) = ChannelSink::new();
        let emitter = EventEmitter::new(registry(), Arc::new(sink));

        let err = emitter
            .publish(&EventMessage::new("mail-bounced", Record::new()))
            .await
            .unwrap_err();
        assert_eq!(err, PublishError::Invalid(RegistryError::UnknownType("mail-bounced".into())));
    }

    #[tokio::test]
    async fn closed_channel_is_a_sink_error() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let emitter = EventEmitter::new(registry(), Arc::new(sink));

        let err = emitter
            .publish(&EventMessage::new("mail-sent", Record::new().with("id", "1")))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Sink(_)));
    }
}

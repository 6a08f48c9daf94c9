//! Command and event messages.

use crate::emitter::{Ack, EventEmitter, PublishError};
use crate::registry::Record;
use serde::{Deserialize, Serialize};

/// A command as delivered by the transport, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCommand {
    /// Message name used for routing.
    pub name: String,
    /// Delivery identifier, unique per command instance.
    pub id: String,
    /// Undecoded payload.
    pub payload: serde_json::Value,
}

impl RawCommand {
    /// Creates a raw command.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            payload,
        }
    }
}

/// A decoded command. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    name: String,
    id: String,
    fields: Record,
}

impl CommandMessage {
    pub(crate) const fn new(name: String, id: String, fields: Record) -> Self {
        Self { name, id, fields }
    }

    /// Returns the message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the delivery identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the decoded payload.
    #[must_use]
    pub const fn fields(&self) -> &Record {
        &self.fields
    }
}

/// An event produced by a handler, published once.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    name: String,
    fields: Record,
}

impl EventMessage {
    /// Creates an event.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Record) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Returns the message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the event payload.
    #[must_use]
    pub const fn fields(&self) -> &Record {
        &self.fields
    }
}

/// What a handler sees while processing one command.
#[derive(Debug)]
pub struct CommandCtx {
    command: CommandMessage,
    emitter: EventEmitter,
}

impl CommandCtx {
    pub(crate) const fn new(command: CommandMessage, emitter: EventEmitter) -> Self {
        Self { command, emitter }
    }

    /// Returns the decoded command.
    #[must_use]
    pub const fn command(&self) -> &CommandMessage {
        &self.command
    }

    /// Publishes an event through the agent's emitter.
    ///
    /// The dispatcher publishes the event a handler returns; use this only
    /// for additional events.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the event does not validate or the sink
    /// refuses it.
    pub async fn send_event(&self, event: &EventMessage) -> Result<Ack, PublishError> {
        self.emitter.publish(event).await
    }
}

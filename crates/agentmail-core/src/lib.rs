//! # agentmail-core
//!
//! Core of the agentmail integration agent.
//!
//! The agent receives `send-mail` commands from a message bus, delivers each
//! one as an email over SMTP and answers with a `mail-sent` event. This
//! crate provides:
//! - **Type registry** - JSON schemas for every message, strict decoding
//! - **Lifecycle** - Connection state machine with ordered subscribers
//! - **Dispatch** - State-gated command routing and event publication
//! - **Mail** - The `send-mail` handler and its SMTP transport
//! - **Resources** - Bundled manifest and schemas
//!
//! ## Example
//!
//! ```ignore
//! use agentmail_core::{AgentCore, AgentServices, AgentState, ChannelSink, EmbeddedResources};
//! use agentmail_core::{MemoryConfig, RawCommand, SmtpTransport};
//! use std::sync::Arc;
//!
//! let (sink, mut events) = ChannelSink::new();
//! let agent = AgentCore::load(&EmbeddedResources, AgentServices {
//!     config: Arc::new(MemoryConfig::with_agent_defaults()),
//!     transport: Arc::new(SmtpTransport::default()),
//!     sink: Arc::new(sink),
//! })?;
//!
//! agent.notify_state(AgentState::Connecting)?;
//! agent.notify_state(AgentState::Connected)?;
//! agent.dispatch(RawCommand::new("send-mail", "42", payload)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod agent;
pub mod config;
pub mod dispatch;
pub mod emitter;
mod error;
pub mod mail;
pub mod registry;
pub mod resources;
pub mod state;

pub use agent::{AgentCore, AgentServices, StartupError};
pub use config::{ConfigStore, DEFAULT_MAILSERVER, MAILSERVER_KEY, MemoryConfig};
pub use dispatch::{
    CommandCtx, CommandDispatcher, CommandHandler, CommandMessage, DispatchError, EventMessage,
    RawCommand, Registration,
};
pub use emitter::{Ack, ChannelSink, EventEmitter, EventSink, PublishError, PublishedEvent};
pub use error::{Error, Result};
pub use mail::{
    MailError, MailSendHandler, MailServerEndpoint, MailSentEvent, MailSession, MailTransport,
    SendMailCommand, SendStep, SmtpTransport, SmtpTransportConfig,
};
pub use registry::{MessageSchema, Record, RegistryError, TypeRegistry, ValidationError, Value};
pub use resources::{AgentManifest, EmbeddedResources, MemoryResources, ResourceLoader};
pub use state::{AgentState, Notification, StateError, StateMachine};

//! State-gated command dispatch.
//!
//! Handlers are registered by message name while the agent is in its
//! activation state. Leaving that state clears every registration; handlers
//! are registered again on the next entry, so a reconnect starts from a
//! clean table.

mod message;

pub use message::{CommandCtx, CommandMessage, EventMessage, RawCommand};

use crate::emitter::{Ack, EventEmitter};
use crate::registry::TypeRegistry;
use crate::state::AgentState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::Instrument;

/// Dispatch errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No handler is registered for this name, or the dispatcher is inactive.
    #[error("no handler for command `{0}`")]
    Unroutable(String),

    /// A handler is already registered for this name.
    #[error("handler already registered for `{0}`")]
    AlreadyRegistered(String),

    /// Handlers can only be registered while active.
    #[error("cannot register `{name}` while {state}")]
    Inactive {
        /// Message name.
        name: String,
        /// Last state the dispatcher saw.
        state: AgentState,
    },

    /// The message name has no registered type.
    #[error("command `{0}` has no registered type")]
    UnknownType(String),
}

/// Processes one decoded command and returns the event announcing the result.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles the command in `ctx`.
    ///
    /// # Errors
    ///
    /// Any error aborts the command; no event is published.
    async fn handle(&self, ctx: &CommandCtx) -> crate::Result<EventMessage>;
}

/// Proof that a handler was registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    name: String,
}

impl Registration {
    /// Returns the message name the handler is bound to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Routes {
    activation: AgentState,
    last_state: AgentState,
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl Routes {
    fn is_active(&self) -> bool {
        self.last_state == self.activation
    }
}

/// Routes commands to handlers and publishes their events.
pub struct CommandDispatcher {
    registry: Arc<TypeRegistry>,
    emitter: EventEmitter,
    routes: Mutex<Routes>,
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.lock();
        f.debug_struct("CommandDispatcher")
            .field("activation", &routes.activation)
            .field("active", &routes.is_active())
            .field("handlers", &routes.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CommandDispatcher {
    /// Creates an inactive dispatcher that activates on
    /// [`AgentState::Connected`].
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, emitter: EventEmitter) -> Self {
        Self {
            registry,
            emitter,
            routes: Mutex::new(Routes {
                activation: AgentState::Connected,
                last_state: AgentState::Disconnected,
                handlers: HashMap::new(),
            }),
        }
    }

    /// Sets the state in which handlers may be registered and commands routed.
    pub fn activate_on(&self, state: AgentState) {
        self.lock().activation = state;
    }

    /// Returns true if the dispatcher is in its activation state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    /// Returns true if a handler is registered for `name`.
    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.lock().handlers.contains_key(name)
    }

    /// Tracks a lifecycle transition. Leaving the activation state drops all
    /// handlers.
    pub fn on_state(&self, state: AgentState) {
        let mut routes = self.lock();
        let was_active = routes.is_active();
        routes.last_state = state;

        if was_active && !routes.is_active() {
            let dropped = routes.handlers.len();
            routes.handlers.clear();
            tracing::info!(%state, dropped, "dispatcher deactivated");
        } else if !was_active && routes.is_active() {
            tracing::info!(%state, "dispatcher activated");
        }
    }

    /// Binds a handler to a registered message type.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Inactive`] outside the activation state,
    /// [`DispatchError::UnknownType`] for unregistered names and
    /// [`DispatchError::AlreadyRegistered`] if the name is taken.
    pub fn register_handler(
        &self,
        name: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Registration, DispatchError> {
        let mut routes = self.lock();
        if !routes.is_active() {
            return Err(DispatchError::Inactive {
                name: name.to_string(),
                state: routes.last_state,
            });
        }
        if !self.registry.contains_type(name) {
            return Err(DispatchError::UnknownType(name.to_string()));
        }
        if routes.handlers.contains_key(name) {
            return Err(DispatchError::AlreadyRegistered(name.to_string()));
        }

        routes.handlers.insert(name.to_string(), handler);
        tracing::debug!(command = name, "handler registered");
        Ok(Registration {
            name: name.to_string(),
        })
    }

    /// Decodes a command, runs its handler and publishes the resulting event.
    ///
    /// The handler is looked up before the payload is decoded, so commands
    /// arriving while inactive are rejected without touching their payload.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unroutable`] if no handler is registered,
    /// a registry error if the payload does not decode, the handler's error,
    /// or a publish error. Nothing is published on any of these paths except
    /// the last, where the handler's side effect has already happened.
    pub async fn dispatch(&self, raw: RawCommand) -> crate::Result<Ack> {
        let span = tracing::info_span!("command", name = %raw.name, id = %raw.id);
        self.route_and_run(raw).instrument(span).await
    }

    async fn route_and_run(&self, raw: RawCommand) -> crate::Result<Ack> {
        let handler = self.route(&raw.name).inspect_err(|e| {
            tracing::warn!(error = %e, "command dropped");
        })?;

        let decoded = self
            .registry
            .decode(&raw.name, &raw.payload)
            .inspect_err(|e| tracing::warn!(error = %e, "command rejected"))?;

        let command = CommandMessage::new(raw.name, raw.id, decoded.into_record());
        let ctx = CommandCtx::new(command, self.emitter.clone());

        let event = handler
            .handle(&ctx)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "command failed"))?;

        let ack = ctx.send_event(&event).await.inspect_err(|e| {
            tracing::error!(
                event = event.name(),
                error = %e,
                "event not published after command completed"
            );
        })?;
        tracing::debug!(event = %ack.event, "command completed");
        Ok(ack)
    }

    fn route(&self, name: &str) -> Result<Arc<dyn CommandHandler>, DispatchError> {
        let routes = self.lock();
        if !routes.is_active() {
            return Err(DispatchError::Unroutable(name.to_string()));
        }
        routes
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::Unroutable(name.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

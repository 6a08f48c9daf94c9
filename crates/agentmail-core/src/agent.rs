//! Agent assembly.
//!
//! [`AgentCore::load`] reads the bundled resources, populates the type
//! registry and wires the lifecycle: the dispatcher follows every state
//! change, and the mail handler is registered each time the agent connects.
//! Loading either completes or fails before any state exists, so the agent
//! never runs with a partially populated registry.

use crate::config::ConfigStore;
use crate::dispatch::{CommandDispatcher, CommandHandler, RawCommand};
use crate::emitter::{Ack, EventEmitter, EventSink};
use crate::mail::{
    MAIL_SENT, MAIL_SENT_SCHEMA, MailSendHandler, MailTransport, SEND_MAIL, SEND_MAIL_SCHEMA,
};
use crate::registry::{MessageSchema, RegistryError, TypeRegistry};
use crate::resources::{
    AgentManifest, MAIL_SENT_SCHEMA_PATH, MANIFEST_PATH, ResourceError, ResourceLoader,
    SEND_MAIL_SCHEMA_PATH,
};
use crate::state::{AgentState, Notification, StateError, StateMachine};
use std::sync::Arc;

const SCHEMA_PATHS: [&str; 2] = [SEND_MAIL_SCHEMA_PATH, MAIL_SENT_SCHEMA_PATH];
const TYPES: [(&str, &str); 2] = [(SEND_MAIL, SEND_MAIL_SCHEMA), (MAIL_SENT, MAIL_SENT_SCHEMA)];

/// Errors that prevent the agent from starting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartupError {
    /// A bundled resource is missing.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The manifest is not valid.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// A schema could not be parsed or registered.
    #[error("failed to load schema {path}: {source}")]
    Schema {
        /// Resource path of the schema.
        path: String,
        /// Underlying error.
        #[source]
        source: RegistryError,
    },

    /// A message type could not be registered.
    #[error("failed to register type {name} (schema {schema}): {source}")]
    Type {
        /// Message name.
        name: String,
        /// Schema it was bound to.
        schema: String,
        /// Underlying error.
        #[source]
        source: RegistryError,
    },
}

/// External capabilities the agent runs on.
#[derive(Clone)]
pub struct AgentServices {
    /// Configuration source.
    pub config: Arc<dyn ConfigStore>,
    /// Mail transport.
    pub transport: Arc<dyn MailTransport>,
    /// Event sink.
    pub sink: Arc<dyn EventSink>,
}

/// A loaded agent: registry, lifecycle and dispatch.
#[derive(Debug)]
pub struct AgentCore {
    manifest: AgentManifest,
    registry: Arc<TypeRegistry>,
    state: Arc<StateMachine>,
    dispatcher: Arc<CommandDispatcher>,
}

impl AgentCore {
    /// Loads resources and wires the agent.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] if the manifest or a schema is missing or
    /// invalid, or if registration fails.
    pub fn load(
        resources: &dyn ResourceLoader,
        services: AgentServices,
    ) -> Result<Self, StartupError> {
        let manifest: AgentManifest = serde_json::from_slice(&resources.load(MANIFEST_PATH)?)
            .map_err(|e| StartupError::Manifest(e.to_string()))?;

        let registry = Arc::new(build_registry(resources)?);
        let emitter = EventEmitter::new(Arc::clone(&registry), services.sink);
        let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&registry), emitter));
        dispatcher.activate_on(AgentState::Connected);

        let state = Arc::new(StateMachine::new());
        let handler: Arc<dyn CommandHandler> =
            Arc::new(MailSendHandler::new(services.config, services.transport));

        // Order matters: the dispatcher must be active before the handler
        // registers on Connected.
        {
            let dispatcher = Arc::clone(&dispatcher);
            state.on_transition(move |current| {
                dispatcher.on_state(current);
                Ok(())
            });
        }
        {
            let dispatcher = Arc::clone(&dispatcher);
            state.on_transition(move |current| {
                if current == AgentState::Connected {
                    dispatcher.register_handler(SEND_MAIL, Arc::clone(&handler))?;
                }
                Ok(())
            });
        }

        tracing::info!(
            agent = %manifest.id,
            version = %manifest.version,
            "agent loaded"
        );

        Ok(Self {
            manifest,
            registry,
            state,
            dispatcher,
        })
    }

    /// Returns the agent manifest.
    #[must_use]
    pub const fn manifest(&self) -> &AgentManifest {
        &self.manifest
    }

    /// Returns the type registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.state.current()
    }

    /// Forwards a lifecycle notification from the transport.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] for disallowed transitions.
    pub fn notify_state(&self, next: AgentState) -> Result<Notification, StateError> {
        self.state.notify(next)
    }

    /// Finishes a shutdown once in-flight commands are done.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] unless the agent is closing.
    pub fn complete_shutdown(&self) -> Result<Notification, StateError> {
        self.state.complete_shutdown()
    }

    /// Dispatches a command.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::dispatch`].
    pub async fn dispatch(&self, command: RawCommand) -> crate::Result<Ack> {
        self.dispatcher.dispatch(command).await
    }
}

fn build_registry(resources: &dyn ResourceLoader) -> Result<TypeRegistry, StartupError> {
    let mut registry = TypeRegistry::new();

    for path in SCHEMA_PATHS {
        let schema_error = |source| StartupError::Schema {
            path: path.to_string(),
            source,
        };
        let schema = MessageSchema::from_json(&resources.load(path)?).map_err(schema_error)?;
        registry.register_schema(schema).map_err(schema_error)?;
    }

    for (name, schema) in TYPES {
        registry
            .register_type(name, schema)
            .map_err(|source| StartupError::Type {
                name: name.to_string(),
                schema: schema.to_string(),
                source,
            })?;
    }

    Ok(registry)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::emitter::ChannelSink;
    use crate::mail::SmtpTransport;
    use crate::resources::{EmbeddedResources, MemoryResources};

    fn services() -> AgentServices {
        let (sink, _rx) = ChannelSink::new();
        AgentServices {
            config: Arc::new(MemoryConfig::with_agent_defaults()),
            transport: Arc::new(SmtpTransport::default()),
            sink: Arc::new(sink),
        }
    }

    #[test]
    fn loads_embedded_resources() {
        let agent = AgentCore::load(&EmbeddedResources, services()).unwrap();
        assert_eq!(agent.manifest().id, "agentmail/agent-mail");
        assert!(agent.registry().contains_type(SEND_MAIL));
        assert!(agent.registry().contains_type(MAIL_SENT));
        assert_eq!(agent.state(), AgentState::Disconnected);
        assert!(!agent.dispatcher().is_active());
    }

    #[test]
    fn missing_schema_fails_startup() {
        let resources = MemoryResources::embedded().without(MAIL_SENT_SCHEMA_PATH);
        let err = AgentCore::load(&resources, services()).unwrap_err();
        assert_eq!(
            err,
            StartupError::Resource(ResourceError::NotFound(MAIL_SENT_SCHEMA_PATH.into()))
        );
    }

    #[test]
    fn malformed_schema_fails_startup() {
        let resources = MemoryResources::embedded().with(SEND_MAIL_SCHEMA_PATH, "{\"name\": 3}");
        let err = AgentCore::load(&resources, services()).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Schema { ref path, .. } if path == SEND_MAIL_SCHEMA_PATH
        ));
    }

    #[test]
    fn schema_under_wrong_name_fails_type_registration() {
        let renamed = br#"{"name": "other-event", "fields": [{"name": "id", "type": "string"}]}"#;
        let resources = MemoryResources::embedded().with(MAIL_SENT_SCHEMA_PATH, renamed.as_slice());
        let err = AgentCore::load(&resources, services()).unwrap_err();
        assert_eq!(
            err,
            StartupError::Type {
                name: MAIL_SENT.into(),
                schema: MAIL_SENT_SCHEMA.into(),
                source: RegistryError::UnknownSchema(MAIL_SENT_SCHEMA.into()),
            }
        );
    }

    #[test]
    fn invalid_manifest_fails_startup() {
        let resources = MemoryResources::embedded().with(MANIFEST_PATH, "[]");
        let err = AgentCore::load(&resources, services()).unwrap_err();
        assert!(matches!(err, StartupError::Manifest(_)));
    }

    #[test]
    fn handler_follows_connection() {
        let agent = AgentCore::load(&EmbeddedResources, services()).unwrap();
        agent.notify_state(AgentState::Connecting).unwrap();
        assert!(!agent.dispatcher().has_handler(SEND_MAIL));

        agent.notify_state(AgentState::Connected).unwrap();
        assert!(agent.dispatcher().has_handler(SEND_MAIL));

        agent.notify_state(AgentState::Disconnected).unwrap();
        assert!(!agent.dispatcher().has_handler(SEND_MAIL));

        agent.notify_state(AgentState::Connecting).unwrap();
        agent.notify_state(AgentState::Connected).unwrap();
        assert!(agent.dispatcher().has_handler(SEND_MAIL));
    }
}

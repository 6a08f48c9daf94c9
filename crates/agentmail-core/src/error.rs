//! Error types for the core library.

use crate::agent::StartupError;
use crate::dispatch::DispatchError;
use crate::emitter::PublishError;
use crate::mail::MailError;
use crate::registry::RegistryError;
use crate::state::StateError;
use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Type registry or payload validation error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Invalid lifecycle transition.
    #[error(transparent)]
    State(#[from] StateError),

    /// Command routing error.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Mail delivery failed.
    #[error(transparent)]
    Mail(#[from] MailError),

    /// Event publication failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The agent could not start.
    #[error(transparent)]
    Startup(#[from] StartupError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

//! Mail transport abstraction.
//!
//! A [`MailTransport`] opens sessions; a [`MailSession`] runs the envelope
//! steps of one message in order. Sessions are single use.

use super::{MailError, MailServerEndpoint};
use async_trait::async_trait;
use std::fmt;

/// A step of the mail transaction, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStep {
    /// Declaring the sender.
    Sender,
    /// Declaring the recipient.
    Recipient,
    /// Opening the message body.
    Data,
    /// Streaming the message body.
    Body,
    /// Terminating the body and waiting for acceptance.
    Finalize,
    /// Ending the session.
    Quit,
}

impl SendStep {
    /// Returns a short description of the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "sender declaration",
            Self::Recipient => "recipient declaration",
            Self::Data => "data start",
            Self::Body => "body transfer",
            Self::Finalize => "message finalization",
            Self::Quit => "session termination",
        }
    }
}

impl fmt::Display for SendStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the session is told about the body before sending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyInfo {
    /// Body length in bytes.
    pub size: usize,
    /// Whether the body contains non-ASCII bytes.
    pub eight_bit: bool,
}

impl BodyInfo {
    /// Describes `content`.
    #[must_use]
    pub fn of(content: &str) -> Self {
        Self {
            size: content.len(),
            eight_bit: !content.is_ascii(),
        }
    }
}

/// Opens mail sessions.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Connects to `endpoint` and returns a session ready for a sender.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Transport`] if the server cannot be reached or
    /// refuses the session.
    async fn connect(
        &self,
        endpoint: &MailServerEndpoint,
    ) -> Result<Box<dyn MailSession>, MailError>;
}

/// One mail transaction on an open connection.
///
/// Steps must be called in order: `mail_from`, `rcpt_to`, `data`,
/// `write_body` (any number of times), `finish`, `quit`.
#[async_trait]
pub trait MailSession: Send {
    /// Declares the sender.
    async fn mail_from(&mut self, from: &str, body: BodyInfo) -> Result<(), MailError>;

    /// Declares the recipient.
    async fn rcpt_to(&mut self, to: &str) -> Result<(), MailError>;

    /// Opens the message body.
    async fn data(&mut self) -> Result<(), MailError>;

    /// Streams a chunk of the body.
    async fn write_body(&mut self, chunk: &[u8]) -> Result<(), MailError>;

    /// Terminates the body; the server accepts or rejects the message.
    async fn finish(&mut self) -> Result<(), MailError>;

    /// Ends the session cleanly.
    async fn quit(&mut self) -> Result<(), MailError>;

    /// Releases the connection after a failed step. Best effort.
    async fn abort(&mut self);
}

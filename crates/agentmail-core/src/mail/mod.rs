//! Mail sending.
//!
//! [`MailSendHandler`] turns a `send-mail` command into one SMTP
//! transaction and answers with a `mail-sent` event once the server has
//! accepted the message. Any failure before that point yields no event.

mod endpoint;
mod message;
mod smtp;
mod transport;

pub use endpoint::{Credentials, MailServerEndpoint, SMTP_PORT, SMTPS_PORT, Security};
pub use message::{
    MAIL_SENT, MAIL_SENT_SCHEMA, MailSentEvent, SEND_MAIL, SEND_MAIL_SCHEMA, SendMailCommand,
};
pub use smtp::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HELO_NAME, DEFAULT_IO_TIMEOUT, SmtpTransport,
    SmtpTransportConfig,
};
pub use transport::{BodyInfo, MailSession, MailTransport, SendStep};

use crate::config::{ConfigStore, DEFAULT_MAILSERVER, MAILSERVER_KEY};
use crate::dispatch::{CommandCtx, CommandHandler, EventMessage};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Body bytes handed to the session per write.
const BODY_CHUNK: usize = 8 * 1024;

/// Why a mail server could not be used.
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    /// Connecting or greeting failed.
    #[error(transparent)]
    Smtp(#[from] agentmail_smtp::Error),

    /// The server did not answer in time.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Mail sending errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The configured server requires credentials; only unauthenticated
    /// relaying is supported.
    #[error("authentication is not supported (mail server URI names user `{username}`)")]
    UnsupportedAuthentication {
        /// User name found in the URI.
        username: String,
    },

    /// The configured mail server URI is unusable.
    #[error("invalid mail server URI `{uri}`: {reason}")]
    InvalidEndpoint {
        /// The URI, with any password removed.
        uri: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The server could not be reached or stopped answering.
    #[error("mail server {endpoint} unavailable: {source}")]
    Transport {
        /// Server location.
        endpoint: String,
        /// Underlying failure.
        #[source]
        source: TransportFailure,
    },

    /// A step of the transaction failed; later steps were not attempted.
    #[error("{step} failed: {source}")]
    ProtocolStep {
        /// Step that failed.
        step: SendStep,
        /// Error reported by the SMTP client.
        #[source]
        source: agentmail_smtp::Error,
    },
}

/// Handles `send-mail` commands.
pub struct MailSendHandler {
    config: Arc<dyn ConfigStore>,
    transport: Arc<dyn MailTransport>,
}

impl fmt::Debug for MailSendHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSendHandler").finish_non_exhaustive()
    }
}

impl MailSendHandler {
    /// Creates a handler that reads the server location from `config`.
    #[must_use]
    pub fn new(config: Arc<dyn ConfigStore>, transport: Arc<dyn MailTransport>) -> Self {
        Self { config, transport }
    }

    /// Resolves the configured mail server.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidEndpoint`] for a malformed URI and
    /// [`MailError::UnsupportedAuthentication`] if it carries a user name.
    pub fn endpoint(&self) -> Result<MailServerEndpoint, MailError> {
        let uri = self.config.get_or(MAILSERVER_KEY, DEFAULT_MAILSERVER);
        let endpoint = MailServerEndpoint::parse(&uri)?;
        if let Some(credentials) = &endpoint.credentials {
            return Err(MailError::UnsupportedAuthentication {
                username: credentials.username.clone(),
            });
        }
        Ok(endpoint)
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns the first failing step; the session is released either way.
    pub async fn send(&self, command: &SendMailCommand) -> Result<(), MailError> {
        let endpoint = self.endpoint()?;
        let mut session = self.transport.connect(&endpoint).await?;

        let result = Self::transfer(session.as_mut(), command).await;
        if let Err(e) = &result {
            tracing::warn!(%endpoint, error = %e, "mail transaction aborted");
            session.abort().await;
        }
        result
    }

    async fn transfer(
        session: &mut dyn MailSession,
        command: &SendMailCommand,
    ) -> Result<(), MailError> {
        session
            .mail_from(&command.from, BodyInfo::of(&command.content))
            .await?;
        session.rcpt_to(&command.to).await?;
        session.data().await?;
        for chunk in command.content.as_bytes().chunks(BODY_CHUNK) {
            session.write_body(chunk).await?;
        }
        session.finish().await?;
        session.quit().await
    }
}

#[async_trait]
impl CommandHandler for MailSendHandler {
    async fn handle(&self, ctx: &CommandCtx) -> crate::Result<EventMessage> {
        let command = SendMailCommand::try_from(ctx.command())?;
        tracing::info!(
            from = %command.from,
            to = %command.to,
            subject = %command.subject,
            "received send-mail command"
        );

        self.send(&command).await?;
        tracing::info!(id = %command.id, to = %command.to, "mail accepted by server");

        Ok(MailSentEvent { id: command.id }.into())
    }
}

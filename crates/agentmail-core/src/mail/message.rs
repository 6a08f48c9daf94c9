//! Typed views of the mail messages.

use crate::dispatch::{CommandMessage, EventMessage};
use crate::registry::{Record, RegistryError};

/// Message name of the send command.
pub const SEND_MAIL: &str = "send-mail";

/// Schema bound to [`SEND_MAIL`].
pub const SEND_MAIL_SCHEMA: &str = "send-mail-command";

/// Message name of the completion event.
pub const MAIL_SENT: &str = "mail-sent";

/// Schema bound to [`MAIL_SENT`].
pub const MAIL_SENT_SCHEMA: &str = "mail-sent-event";

/// Request to send one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMailCommand {
    /// Correlation identifier, echoed in the completion event.
    pub id: String,
    /// Recipient address.
    pub to: String,
    /// Recipient display name. Informational only.
    pub toname: String,
    /// Subject line, used for logging.
    pub subject: String,
    /// Message content, sent as the DATA payload.
    pub content: String,
    /// Sender address.
    pub from: String,
}

impl TryFrom<&CommandMessage> for SendMailCommand {
    type Error = RegistryError;

    fn try_from(message: &CommandMessage) -> Result<Self, Self::Error> {
        let fields = message.fields();
        let field = |name: &str| {
            fields
                .get_str(name)
                .map(str::to_string)
                .map_err(|source| RegistryError::Validation {
                    name: message.name().to_string(),
                    source,
                })
        };

        Ok(Self {
            id: field("id")?,
            to: field("to")?,
            toname: field("toname")?,
            subject: field("subject")?,
            content: field("content")?,
            from: field("from")?,
        })
    }
}

/// Announces that a message was accepted by the mail server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSentEvent {
    /// Identifier of the command that was fulfilled.
    pub id: String,
}

impl From<MailSentEvent> for EventMessage {
    fn from(event: MailSentEvent) -> Self {
        Self::new(MAIL_SENT, Record::new().with("id", event.id))
    }
}

//! Type-state SMTP client.

use super::{DataEncoder, ServerInfo, SmtpStream};
use crate::command::{BodyType, Command};
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, Extension, Reply, ReplyCode};
use std::collections::HashSet;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Data mode; carries the encoder state between body chunks.
#[derive(Debug)]
pub struct Data {
    encoder: DataEncoder,
}

/// Optional MAIL FROM parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailOptions {
    /// Size of the message in bytes, if known.
    pub size: Option<usize>,
    /// Whether the content contains 8-bit data.
    pub eight_bit: bool,
}

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    state: State,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

/// Outcome of a state-changing step: the client in its next state, or the
/// reason it could not get there.
pub type Step<Next, Current> = std::result::Result<Client<Next>, Rejected<Current>>;

/// A step that failed.
///
/// When the server answered with a negative reply (or the step was refused
/// before anything was sent) the connection is still in a known state and
/// the client is handed back, so the caller can still say QUIT. I/O and
/// protocol failures leave nothing to hand back.
#[derive(Debug)]
pub struct Rejected<S> {
    error: Error,
    client: Option<Client<S>>,
}

impl<S> Rejected<S> {
    const fn refused(error: Error, client: Client<S>) -> Self {
        Self {
            error,
            client: Some(client),
        }
    }

    const fn broken(error: Error) -> Self {
        Self {
            error,
            client: None,
        }
    }

    /// Returns why the step failed.
    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.error
    }

    /// Returns true if the connection is still usable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.client.is_some()
    }

    /// Splits into the error and the client, if it survived.
    #[must_use]
    pub fn into_parts(self) -> (Error, Option<Client<S>>) {
        (self.error, self.client)
    }
}

impl<S> From<Rejected<S>> for Error {
    fn from(rejected: Rejected<S>) -> Self {
        rejected.error
    }
}

impl<S> std::fmt::Display for Rejected<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl<S: std::fmt::Debug> std::error::Error for Rejected<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(greeting.into_error());
        }

        // Extract hostname from greeting (first word after code)
        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(%hostname, "SMTP greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            state: Connected,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// Servers that reject EHLO as unknown (500/502) are greeted with HELO
    /// instead and report no extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if both greetings are rejected.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self
            .send_command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        if reply.is_success() {
            // First line is the server's greeting, not an extension
            self.server_info.extensions = reply
                .message
                .iter()
                .skip(1)
                .map(|line| Extension::parse(line))
                .collect();
            return Ok(self);
        }

        if reply.code != ReplyCode::SYNTAX_ERROR && reply.code != ReplyCode::NOT_IMPLEMENTED {
            return Err(reply.into_error());
        }

        tracing::debug!(code = %reply.code, "EHLO refused, falling back to HELO");
        let reply = self
            .send_command(Command::Helo {
                hostname: client_hostname.to_string(),
            })
            .await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        self.server_info.extensions.clear();
        Ok(self)
    }

    /// Starts a mail transaction.
    ///
    /// SIZE and BODY parameters are only sent when the server advertised the
    /// matching extension. A message larger than the advertised SIZE limit is
    /// refused locally before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejected`] holding this client if the message is too large
    /// or MAIL FROM is refused.
    pub async fn mail_from(
        self,
        from: Address,
        options: MailOptions,
    ) -> Step<MailTransaction, Connected> {
        if let (Some(size), Some(limit)) = (options.size, self.server_info.max_message_size()) {
            if size > limit {
                return Err(Rejected::refused(Error::MessageTooLarge { size, limit }, self));
            }
        }

        let size = options.size.filter(|_| self.server_info.advertises_size());
        let body = (options.eight_bit && self.server_info.supports_8bitmime())
            .then_some(BodyType::EightBitMime);

        self.advance(Command::MailFrom { from, body, size }, Reply::is_success, MailTransaction)
            .await
    }
}

impl Client<MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejected`] if the RCPT TO command fails.
    pub async fn rcpt_to(self, to: Address) -> Step<RecipientAdded, MailTransaction> {
        self.advance(Command::RcptTo { to }, Reply::is_success, RecipientAdded)
            .await
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejected`] if the RCPT TO command fails.
    pub async fn rcpt_to(self, to: Address) -> Step<RecipientAdded, RecipientAdded> {
        self.advance(Command::RcptTo { to }, Reply::is_success, RecipientAdded)
            .await
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejected`] if the DATA command is not answered with 354.
    pub async fn data(self) -> Step<Data, RecipientAdded> {
        let data = Data {
            encoder: DataEncoder::new(),
        };
        self.advance(Command::Data, |reply| reply.code == ReplyCode::START_DATA, data)
            .await
    }
}

impl Client<Data> {
    /// Streams a chunk of message content.
    ///
    /// Content should be RFC 5322 formatted. Line endings are normalized to
    /// CRLF and leading dots are byte-stuffed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_body(&mut self, chunk: &[u8]) -> Result<()> {
        let encoded = self.state.encoder.encode(chunk);
        self.stream.write_all(&encoded).await
    }

    /// Terminates the DATA section and waits for the server to accept it.
    ///
    /// Whatever the server answers, the transaction is over: a refused
    /// message hands back a client that is ready for QUIT or a new
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejected`] if the write fails or the server refuses the
    /// message.
    pub async fn finish(mut self) -> Step<Connected, Connected> {
        let terminator = self.state.encoder.finish();
        if let Err(e) = self.stream.write_all(terminator).await {
            return Err(Rejected::broken(e));
        }

        let reply = match read_reply(&mut self.stream).await {
            Ok(reply) => reply,
            Err(e) => return Err(Rejected::broken(e)),
        };
        tracing::debug!(code = %reply.code, "SMTP reply to end of data");

        let client = self.transition(Connected);
        if reply.is_success() {
            Ok(client)
        } else {
            Err(Rejected::refused(reply.into_error(), client))
        }
    }
}

// Common implementation for all states
impl<S> Client<S> {
    fn transition<T>(self, state: T) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            state,
        }
    }

    /// Sends `cmd` and moves to `next` if `accepted` holds for the reply.
    async fn advance<T>(
        mut self,
        cmd: Command,
        accepted: fn(&Reply) -> bool,
        next: T,
    ) -> Step<T, S> {
        match self.send_command(cmd).await {
            Ok(reply) if accepted(&reply) => Ok(self.transition(next)),
            Ok(reply) => Err(Rejected::refused(reply.into_error(), self)),
            Err(e) => Err(Rejected::broken(e)),
        }
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        tracing::debug!(command = cmd.verb(), code = %reply.code, "SMTP reply");
        Ok(reply)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;
        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(reply.into_error());
        }

        Ok(())
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

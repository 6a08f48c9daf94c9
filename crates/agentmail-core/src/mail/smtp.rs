//! SMTP implementation of [`MailTransport`].

use super::transport::{BodyInfo, MailSession, MailTransport, SendStep};
use super::{MailError, MailServerEndpoint, Security, TransportFailure};
use agentmail_smtp::connection::{connect, connect_tls};
use agentmail_smtp::{
    Address, Client, Connected, Data, MailOptions, MailTransaction, RecipientAdded, Rejected,
    SmtpConnection,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Default time allowed to open a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for each protocol exchange.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Default name announced in EHLO.
pub const DEFAULT_HELO_NAME: &str = "localhost";

/// Settings for [`SmtpTransport`].
#[derive(Debug, Clone)]
pub struct SmtpTransportConfig {
    /// Name announced in EHLO/HELO.
    pub helo_name: String,

    /// Time allowed to connect, including the greeting and EHLO.
    pub connect_timeout: Duration,

    /// Time allowed for each step after connecting.
    pub io_timeout: Duration,
}

impl Default for SmtpTransportConfig {
    fn default() -> Self {
        Self {
            helo_name: DEFAULT_HELO_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl SmtpTransportConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.helo_name = name.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-step timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// Sends mail over unauthenticated SMTP.
#[derive(Debug, Clone, Default)]
pub struct SmtpTransport {
    config: SmtpTransportConfig,
}

impl SmtpTransport {
    /// Creates a transport.
    #[must_use]
    pub const fn new(config: SmtpTransportConfig) -> Self {
        Self { config }
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn config(&self) -> &SmtpTransportConfig {
        &self.config
    }

    async fn open(
        &self,
        endpoint: &MailServerEndpoint,
    ) -> agentmail_smtp::Result<Client<Connected>> {
        let stream = match endpoint.security {
            Security::Tls => connect_tls(&endpoint.host, endpoint.port).await?,
            Security::None => connect(&endpoint.host, endpoint.port).await?,
        };
        let client = Client::from_stream(stream).await?;
        client.ehlo(&self.config.helo_name).await
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn connect(
        &self,
        endpoint: &MailServerEndpoint,
    ) -> Result<Box<dyn MailSession>, MailError> {
        let limit = self.config.connect_timeout;
        let client = match tokio::time::timeout(limit, self.open(endpoint)).await {
            Ok(Ok(client)) => client,
            Ok(Err(source)) => {
                return Err(MailError::Transport {
                    endpoint: endpoint.to_string(),
                    source: TransportFailure::Smtp(source),
                });
            }
            Err(_) => {
                return Err(MailError::Transport {
                    endpoint: endpoint.to_string(),
                    source: TransportFailure::TimedOut(limit),
                });
            }
        };

        tracing::debug!(
            %endpoint,
            server = %client.server_info().hostname,
            extensions = client.server_info().extensions.len(),
            "connected to mail server"
        );

        Ok(Box::new(SmtpSession {
            endpoint: endpoint.to_string(),
            io_timeout: self.config.io_timeout,
            stage: Stage::Ready(client),
        }))
    }
}

enum Stage {
    Ready(Client<Connected>),
    Sender(Client<MailTransaction>),
    Recipient(Client<RecipientAdded>),
    Body(Client<Data>),
    Accepted(Client<Connected>),
    Closed,
}

impl Stage {
    const fn name(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Sender(_) => "sender declared",
            Self::Recipient(_) => "recipient declared",
            Self::Body(_) => "in body",
            Self::Accepted(_) => "message accepted",
            Self::Closed => "closed",
        }
    }
}

struct SmtpSession {
    endpoint: String,
    io_timeout: Duration,
    stage: Stage,
}

impl SmtpSession {
    fn take(&mut self) -> Stage {
        std::mem::replace(&mut self.stage, Stage::Closed)
    }

    fn out_of_order(&self, step: SendStep) -> MailError {
        MailError::ProtocolStep {
            step,
            source: agentmail_smtp::Error::Protocol(format!(
                "{step} attempted while session is {}",
                self.stage.name()
            )),
        }
    }

    fn timed_out(&self) -> MailError {
        MailError::Transport {
            endpoint: self.endpoint.clone(),
            source: TransportFailure::TimedOut(self.io_timeout),
        }
    }

    /// Runs one state-changing step under the I/O timeout.
    ///
    /// A client handed back by a refused step is parked with `keep` so that
    /// [`abort`](MailSession::abort) can still send QUIT.
    async fn advance<N, C, F>(
        &mut self,
        step: SendStep,
        fut: F,
        keep: fn(Client<C>) -> Stage,
    ) -> Result<Client<N>, MailError>
    where
        F: Future<Output = Result<Client<N>, Rejected<C>>>,
    {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(rejected)) => {
                let (source, client) = rejected.into_parts();
                if let Some(client) = client {
                    self.stage = keep(client);
                }
                Err(MailError::ProtocolStep { step, source })
            }
            Err(_) => Err(self.timed_out()),
        }
    }
}

/// Runs one step under the I/O timeout.
async fn step<T, F>(endpoint: &str, limit: Duration, at: SendStep, fut: F) -> Result<T, MailError>
where
    F: Future<Output = agentmail_smtp::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(MailError::ProtocolStep { step: at, source }),
        Err(_) => Err(MailError::Transport {
            endpoint: endpoint.to_string(),
            source: TransportFailure::TimedOut(limit),
        }),
    }
}

fn address(raw: &str, at: SendStep) -> Result<Address, MailError> {
    Address::new(raw).map_err(|source| MailError::ProtocolStep { step: at, source })
}

#[async_trait]
impl MailSession for SmtpSession {
    async fn mail_from(&mut self, from: &str, body: BodyInfo) -> Result<(), MailError> {
        let from = address(from, SendStep::Sender)?;
        let client = match self.take() {
            Stage::Ready(client) => client,
            other => {
                self.stage = other;
                return Err(self.out_of_order(SendStep::Sender));
            }
        };

        let options = MailOptions {
            size: Some(body.size),
            eight_bit: body.eight_bit,
        };
        let client = self
            .advance(SendStep::Sender, client.mail_from(from, options), Stage::Ready)
            .await?;
        self.stage = Stage::Sender(client);
        Ok(())
    }

    async fn rcpt_to(&mut self, to: &str) -> Result<(), MailError> {
        let to = address(to, SendStep::Recipient)?;
        let client = match self.take() {
            Stage::Sender(client) => client,
            other => {
                self.stage = other;
                return Err(self.out_of_order(SendStep::Recipient));
            }
        };

        let client = self
            .advance(SendStep::Recipient, client.rcpt_to(to), Stage::Sender)
            .await?;
        self.stage = Stage::Recipient(client);
        Ok(())
    }

    async fn data(&mut self) -> Result<(), MailError> {
        let client = match self.take() {
            Stage::Recipient(client) => client,
            other => {
                self.stage = other;
                return Err(self.out_of_order(SendStep::Data));
            }
        };

        let client = self
            .advance(SendStep::Data, client.data(), Stage::Recipient)
            .await?;
        self.stage = Stage::Body(client);
        Ok(())
    }

    async fn write_body(&mut self, chunk: &[u8]) -> Result<(), MailError> {
        let mut client = match self.take() {
            Stage::Body(client) => client,
            other => {
                self.stage = other;
                return Err(self.out_of_order(SendStep::Body));
            }
        };

        // A failed write leaves the session closed.
        let write = client.write_body(chunk);
        step(&self.endpoint, self.io_timeout, SendStep::Body, write).await?;
        self.stage = Stage::Body(client);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), MailError> {
        let client = match self.take() {
            Stage::Body(client) => client,
            other => {
                self.stage = other;
                return Err(self.out_of_order(SendStep::Finalize));
            }
        };

        let client = self
            .advance(SendStep::Finalize, client.finish(), Stage::Ready)
            .await?;
        self.stage = Stage::Accepted(client);
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), MailError> {
        let client = match self.take() {
            Stage::Accepted(client) | Stage::Ready(client) => client,
            other => {
                self.stage = other;
                return Err(self.out_of_order(SendStep::Quit));
            }
        };

        step(&self.endpoint, self.io_timeout, SendStep::Quit, client.quit()).await
    }

    async fn abort(&mut self) {
        let limit = self.io_timeout;
        let quit = match self.take() {
            Stage::Ready(client) | Stage::Accepted(client) => {
                tokio::time::timeout(limit, client.quit()).await
            }
            Stage::Sender(client) => tokio::time::timeout(limit, client.quit()).await,
            Stage::Recipient(client) => tokio::time::timeout(limit, client.quit()).await,
            // Mid-body there is no clean way out; dropping closes the socket.
            Stage::Body(_) | Stage::Closed => return,
        };
        if !matches!(quit, Ok(Ok(()))) {
            tracing::debug!(endpoint = %self.endpoint, "QUIT after failure did not complete");
        }
    }
}

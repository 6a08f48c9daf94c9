//! Shared fixtures: recording and gated mail transports, the scripted SMTP
//! server and agent construction helpers.

#![allow(dead_code)]

use agentmail_core::mail::{BodyInfo, TransportFailure};
use agentmail_core::{
    AgentCore, AgentServices, AgentState, ChannelSink, EmbeddedResources, EventSink, MailError,
    MailServerEndpoint, MailSession, MailTransport, MemoryConfig, PublishError, PublishedEvent,
    RawCommand, SendStep,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

#[path = "../../../agentmail-smtp/tests/common/mod.rs"]
pub mod scripted;

#[derive(Debug, Default)]
struct Recorded {
    endpoints: Vec<String>,
    log: Vec<String>,
}

/// Transport that records every step instead of talking to a server.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    recorded: Arc<Mutex<Recorded>>,
    refuse_connect: bool,
    fail_at: Option<SendStep>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection attempt fails.
    pub fn refusing() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    /// Sessions fail at `step` with a permanent SMTP error.
    pub fn failing_at(step: SendStep) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.recorded.lock().unwrap().log.clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.recorded.lock().unwrap().endpoints.clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn connect(
        &self,
        endpoint: &MailServerEndpoint,
    ) -> Result<Box<dyn MailSession>, MailError> {
        self.recorded
            .lock()
            .unwrap()
            .endpoints
            .push(endpoint.to_string());
        if self.refuse_connect {
            return Err(MailError::Transport {
                endpoint: endpoint.to_string(),
                source: TransportFailure::Smtp(agentmail_smtp::Error::ConnectionClosed),
            });
        }
        Ok(Box::new(RecordingSession {
            recorded: Arc::clone(&self.recorded),
            fail_at: self.fail_at,
        }))
    }
}

struct RecordingSession {
    recorded: Arc<Mutex<Recorded>>,
    fail_at: Option<SendStep>,
}

impl RecordingSession {
    fn record(&self, step: SendStep, entry: String) -> Result<(), MailError> {
        if self.fail_at == Some(step) {
            return Err(MailError::ProtocolStep {
                step,
                source: agentmail_smtp::Error::smtp_error(550, "5.1.1 rejected"),
            });
        }
        self.recorded.lock().unwrap().log.push(entry);
        Ok(())
    }
}

#[async_trait]
impl MailSession for RecordingSession {
    async fn mail_from(&mut self, from: &str, body: BodyInfo) -> Result<(), MailError> {
        self.record(SendStep::Sender, format!("MAIL {from} size={}", body.size))
    }

    async fn rcpt_to(&mut self, to: &str) -> Result<(), MailError> {
        self.record(SendStep::Recipient, format!("RCPT {to}"))
    }

    async fn data(&mut self) -> Result<(), MailError> {
        self.record(SendStep::Data, "DATA".into())
    }

    async fn write_body(&mut self, chunk: &[u8]) -> Result<(), MailError> {
        let body = String::from_utf8_lossy(chunk);
        self.record(SendStep::Body, format!("BODY {body}"))
    }

    async fn finish(&mut self) -> Result<(), MailError> {
        self.record(SendStep::Finalize, "END".into())
    }

    async fn quit(&mut self) -> Result<(), MailError> {
        self.record(SendStep::Quit, "QUIT".into())
    }

    async fn abort(&mut self) {
        self.recorded.lock().unwrap().log.push("ABORT".into());
    }
}

/// Transport that holds every connection attempt until released.
#[derive(Debug, Clone, Default)]
pub struct GatedTransport {
    inner: RecordingTransport,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedTransport {
    pub fn new(inner: RecordingTransport) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Resolves once a connection attempt is waiting at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the waiting connection attempt through.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl MailTransport for GatedTransport {
    async fn connect(
        &self,
        endpoint: &MailServerEndpoint,
    ) -> Result<Box<dyn MailSession>, MailError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.connect(endpoint).await
    }
}

/// Sink that refuses every event.
#[derive(Debug)]
pub struct RefusingSink;

#[async_trait]
impl EventSink for RefusingSink {
    async fn publish(
        &self,
        _name: &str,
        _payload: serde_json::Value,
    ) -> Result<(), PublishError> {
        Err(PublishError::Sink("bus unavailable".into()))
    }
}

pub struct Harness {
    pub agent: AgentCore,
    pub config: Arc<MemoryConfig>,
    pub events: mpsc::UnboundedReceiver<PublishedEvent>,
}

impl Harness {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        let (sink, events) = ChannelSink::new();
        let config = Arc::new(MemoryConfig::with_agent_defaults());
        let agent = AgentCore::load(
            &EmbeddedResources,
            AgentServices {
                config: config.clone(),
                transport,
                sink: Arc::new(sink),
            },
        )
        .unwrap();
        Self {
            agent,
            config,
            events,
        }
    }

    pub fn connected(transport: Arc<dyn MailTransport>) -> Self {
        let harness = Self::new(transport);
        harness.connect();
        harness
    }

    pub fn connect(&self) {
        self.agent.notify_state(AgentState::Connecting).unwrap();
        self.agent.notify_state(AgentState::Connected).unwrap();
    }

    pub fn published(&mut self) -> Vec<PublishedEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn send_mail(id: &str) -> RawCommand {
    RawCommand::new(
        "send-mail",
        format!("delivery-{id}"),
        json!({
            "id": id,
            "to": "b@x.com",
            "toname": "Bea",
            "subject": "hi",
            "content": "hello",
            "from": "a@x.com",
        }),
    )
}


//! Line-delimited JSON bridge between the host process and the agent.
//!
//! Input lines:
//!
//! ```text
//! {"type": "state", "state": "connected"}
//! {"type": "command", "name": "send-mail", "id": "d-1", "payload": {...}}
//! {"type": "shutdown"}
//! ```
//!
//! Every published event is written as
//! `{"type": "event", "name": "mail-sent", "payload": {...}}`.

use agentmail_core::{AgentCore, AgentState, PublishedEvent, RawCommand};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A message from the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostMessage {
    /// Transport connection state changed.
    State {
        /// New state.
        state: AgentState,
    },
    /// A command to dispatch.
    Command(RawCommand),
    /// Stop once in-flight commands are done.
    Shutdown,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum HostOutput<'a> {
    Event {
        name: &'a str,
        payload: &'a serde_json::Value,
    },
}

/// Runs the bridge until `shutdown` or end of input.
///
/// Commands are dispatched concurrently; a shutdown moves the agent to
/// `closing`, waits for every in-flight command, then closes it.
///
/// # Errors
///
/// Returns an error if reading input or writing an event fails. A failed
/// read still shuts the agent down first.
pub async fn run<R, W>(
    agent: Arc<AgentCore>,
    mut input: R,
    events: mpsc::UnboundedReceiver<PublishedEvent>,
    output: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (stop, stopped) = oneshot::channel();
    let writer = tokio::spawn(write_events(events, output, stopped));
    let mut in_flight = JoinSet::new();
    let mut line = Vec::new();

    let read = loop {
        line.clear();
        match input.read_until(b'\n', &mut line).await {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
        let text = line.trim_ascii();
        if text.is_empty() {
            continue;
        }
        // Invalid UTF-8 fails here like any other malformed line.
        let message = match serde_json::from_slice::<HostMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring malformed host message");
                continue;
            }
        };

        match message {
            HostMessage::State { state } => {
                if let Err(e) = agent.notify_state(state) {
                    warn!(error = %e, "state notification rejected");
                }
            }
            HostMessage::Command(command) => {
                let agent = Arc::clone(&agent);
                in_flight.spawn(async move {
                    // Failures are logged by the dispatcher.
                    let _ = agent.dispatch(command).await;
                });
            }
            HostMessage::Shutdown => break Ok(()),
        }

        // Reap finished commands so the set does not grow without bound.
        while in_flight.try_join_next().is_some() {}
    };

    shutdown(&agent, &mut in_flight).await;

    // Every command has published by now; the writer drains and exits.
    let _ = stop.send(());
    writer.await??;
    read.context("reading host input")
}

async fn shutdown(agent: &AgentCore, in_flight: &mut JoinSet<()>) {
    if let Err(e) = agent.notify_state(AgentState::Closing) {
        warn!(error = %e, "cannot enter closing state");
    }

    info!(pending = in_flight.len(), "waiting for in-flight commands");
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "command task failed");
        }
    }

    match agent.complete_shutdown() {
        Ok(_) => info!("agent closed"),
        Err(e) => warn!(error = %e, "shutdown did not complete"),
    }
}

async fn write_events<W>(
    mut events: mpsc::UnboundedReceiver<PublishedEvent>,
    mut output: W,
    mut stop: oneshot::Receiver<()>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => write_event(&mut output, &event).await?,
            _ = &mut stop => break,
        }
    }

    events.close();
    while let Some(event) = events.recv().await {
        write_event(&mut output, &event).await?;
    }
    Ok(())
}

async fn write_event<W>(output: &mut W, event: &PublishedEvent) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(&HostOutput::Event {
        name: &event.name,
        payload: &event.payload,
    })?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    debug!(event = %event.name, "event written");
    Ok(())
}

//! `agentmail` - sends email for `send-mail` commands.
//!
//! Reads host messages as JSON lines on stdin and writes published events as
//! JSON lines on stdout. Logs go to stderr.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod host;

use agentmail_core::mail::{
    DEFAULT_HELO_NAME, MailServerEndpoint, SmtpTransport, SmtpTransportConfig,
};
use agentmail_core::{
    AgentCore, AgentServices, ChannelSink, DEFAULT_MAILSERVER, EmbeddedResources, MAILSERVER_KEY,
    MemoryConfig,
};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "agentmail=info,agentmail_core=info,agentmail_smtp=info";

/// Command-line options.
#[derive(Debug, Parser)]
#[command(
    name = "agentmail",
    version,
    about = "Sends email for send-mail commands read from stdin"
)]
struct Cli {
    /// Mail server URI: smtp://host[:port] or smtps://host[:port].
    #[arg(long, env = "AGENTMAIL_MAILSERVER", default_value = DEFAULT_MAILSERVER)]
    mailserver: String,

    /// Name announced in EHLO.
    #[arg(long, env = "AGENTMAIL_HELO", default_value = DEFAULT_HELO_NAME)]
    helo: String,

    /// Seconds allowed to connect to the mail server.
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Seconds allowed for each SMTP exchange.
    #[arg(long, default_value_t = 60)]
    io_timeout: u64,
}

impl Cli {
    fn transport_config(&self) -> SmtpTransportConfig {
        SmtpTransportConfig::new()
            .helo_name(self.helo.clone())
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .io_timeout(Duration::from_secs(self.io_timeout))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Arc::new(MemoryConfig::with_agent_defaults());
    config.set(MAILSERVER_KEY, cli.mailserver.clone());
    if let Err(e) = MailServerEndpoint::parse(&cli.mailserver) {
        warn!(error = %e, "mail server URI will be rejected at send time");
    }

    let (sink, events) = ChannelSink::new();
    let agent = AgentCore::load(
        &EmbeddedResources,
        AgentServices {
            config,
            transport: Arc::new(SmtpTransport::new(cli.transport_config())),
            sink: Arc::new(sink),
        },
    )
    .context("failed to load agent")?;

    info!(
        agent = %agent.manifest().name,
        version = %agent.manifest().version,
        "Starting agentmail"
    );

    host::run(
        Arc::new(agent),
        BufReader::new(tokio::io::stdin()),
        events,
        tokio::io::stdout(),
    )
    .await
}

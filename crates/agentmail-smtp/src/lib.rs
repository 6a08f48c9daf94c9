//! # agentmail-smtp
//!
//! A small async SMTP client implementing the unauthenticated subset of
//! RFC 5321 that a relay-facing agent needs.
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of valid
//!   SMTP state transitions
//! - **Envelope commands**: EHLO (with HELO fallback), MAIL FROM, RCPT TO,
//!   DATA, QUIT
//! - **Streaming DATA**: CRLF normalization and dot-stuffing across chunk
//!   boundaries
//! - **TLS support**: Implicit TLS (port 465)
//! - **Extensions**: SIZE and 8BITMIME are honoured on MAIL FROM
//!
//! ## Quick Start
//!
//! ```ignore
//! use agentmail_smtp::{Address, Client, MailOptions};
//! use agentmail_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> agentmail_smtp::Result<()> {
//!     let stream = connect("localhost", 25).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.ehlo("agent.example.com").await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let client = client.mail_from(from, MailOptions::default()).await?;
//!     let client = client.rcpt_to(Address::new("recipient@example.com")?).await?;
//!     let mut client = client.data().await?;
//!
//!     client.write_body(b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!     let client = client.finish().await?;
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── mail_from() ───→ MailTransaction ─── rcpt_to() ───→ RecipientAdded
//! └──────────────┘                                                              │
//!        ↑                                                                      │ data()
//!        └──────────────────────── finish() ──────────── Data ←─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Connection management and type-state client
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Client, Connected, Data, DataEncoder, MailOptions, MailTransaction, RecipientAdded, Rejected,
    ServerInfo, SmtpConnection, Step,
};
pub use error::{Error, Result};
pub use types::{Address, Extension, Reply, ReplyCode};

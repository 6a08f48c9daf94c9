//! SMTP connection management with type-state pattern.

mod client;
mod encoder;
mod stream;

pub use client::{
    Client, Connected, Data, MailOptions, MailTransaction, RecipientAdded, Rejected,
    SmtpConnection, Step,
};
pub use encoder::DataEncoder;
pub use stream::{MAX_REPLY_LINE, SmtpStream, Transport, connect, connect_tls};

use crate::types::Extension;
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions (empty when the server only speaks HELO).
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if 8BITMIME is supported.
    #[must_use]
    pub fn supports_8bitmime(&self) -> bool {
        self.supports(&Extension::EightBitMime)
    }

    /// Returns true if the server advertised SIZE, with or without a limit.
    #[must_use]
    pub fn advertises_size(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns the maximum message size, if advertised.
    ///
    /// A SIZE of zero means "no fixed limit" and is reported as `None`.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(Some(size)) if *size > 0 => Some(*size),
            _ => None,
        })
    }
}

//! SMTP commands and their wire form.

use crate::types::Address;
use std::fmt;

/// Value of the MAIL FROM `BODY` parameter (RFC 6152).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Content with 8-bit bytes.
    EightBitMime,
}

impl BodyType {
    /// Returns the parameter value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EightBitMime => "8BITMIME",
        }
    }
}

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting, used when EHLO is refused
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// BODY parameter
        body: Option<BodyType>,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Returns the command verb, for logging.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        }
    }

    /// Serializes the command line, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }
}

/// Formats the command line without its terminator.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo { hostname } | Self::Ehlo { hostname } => {
                write!(f, "{} {hostname}", self.verb())
            }
            Self::MailFrom { from, body, size } => {
                write!(f, "MAIL FROM:<{}>", from.as_str())?;
                if let Some(body) = body {
                    write!(f, " BODY={}", body.as_str())?;
                }
                if let Some(size) = size {
                    write!(f, " SIZE={size}")?;
                }
                Ok(())
            }
            Self::RcptTo { to } => write!(f, "RCPT TO:<{}>", to.as_str()),
            Self::Data | Self::Quit => f.write_str(self.verb()),
        }
    }
}

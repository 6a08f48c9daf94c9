//! Email address types.

use crate::error::{Error, Result};

/// Email address for the SMTP envelope.
///
/// Only the envelope form (`local@domain`) is accepted; display names belong
/// in the message headers, not in `MAIL FROM`/`RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates an email address (basic validation).
    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        // The address is written verbatim into a command line.
        if addr
            .chars()
            .any(|c| c.is_ascii_control() || c == '<' || c == '>' || c.is_whitespace())
        {
            return Err(Error::InvalidAddress(format!(
                "Address contains forbidden characters: {addr:?}"
            )));
        }

        let parts: Vec<&str> = addr.split('@').collect();
        match parts.as_slice() {
            [local, domain] if !local.is_empty() && !domain.is_empty() => Ok(()),
            [_, _] => Err(Error::InvalidAddress(
                "Local and domain parts cannot be empty".into(),
            )),
            [_] => Err(Error::InvalidAddress("Address must contain @".into())),
            _ => Err(Error::InvalidAddress(
                "Address must have exactly one @".into(),
            )),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! SMTP extension types.

/// SMTP extensions discovered from the EHLO response.
///
/// Only the extensions that change how a message is submitted are
/// distinguished; everything else is kept verbatim for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// PIPELINING - Command pipelining
    Pipelining,
    /// SMTPUTF8 - UTF-8 email addresses
    SmtpUtf8,
    /// Unknown extension
    Unknown(String),
}

impl Extension {
    /// Parses an extension line from EHLO response.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Self::Unknown(line.to_string());
        };

        match keyword.to_uppercase().as_str() {
            "SIZE" => Self::Size(parts.next().and_then(|s| s.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

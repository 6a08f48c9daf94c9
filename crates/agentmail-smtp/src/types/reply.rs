//! SMTP reply types.

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Converts a rejected reply into an [`Error`](crate::Error).
    #[must_use]
    pub fn into_error(self) -> crate::Error {
        crate::Error::smtp_error(self.code.as_u16(), self.message_text())
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Reply codes the client reacts to
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 500 Syntax error, command unrecognized
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 502 Command not implemented
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 552 Exceeded storage allocation
    pub const EXCEEDED_STORAGE: Self = Self(552);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_classes() {
        assert!(ReplyCode::OK.is_success());
        assert!(ReplyCode::CLOSING.is_success());
        assert!(ReplyCode::SERVICE_UNAVAILABLE.is_transient());
        assert!(ReplyCode::MAILBOX_UNAVAILABLE.is_permanent());
        assert!(!ReplyCode::START_DATA.is_success());
        assert!(!ReplyCode::START_DATA.is_permanent());
    }

    #[test]
    fn display() {
        assert_eq!(ReplyCode::OK.to_string(), "250");
        assert_eq!(ReplyCode::SYNTAX_ERROR.to_string(), "500");
    }

    #[test]
    fn message_text_joins_lines() {
        let reply = Reply::new(
            ReplyCode::SERVICE_READY,
            vec!["mx.example.com ESMTP".to_string(), "Ready".to_string()],
        );
        assert_eq!(reply.message_text(), "mx.example.com ESMTP\nReady");
    }

    #[test]
    fn into_error_keeps_code() {
        let reply = Reply::new(ReplyCode::EXCEEDED_STORAGE, vec!["Too big".to_string()]);
        let err = reply.into_error();
        assert!(err.is_permanent());
        assert_eq!(err.to_string(), "SMTP error 552: Too big");
    }
}

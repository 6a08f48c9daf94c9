//! Mail server URI parsing.
//!
//! The URI has the form `smtp://[username@]host[:port][?password=secret]`.
//! `smtps` selects implicit TLS.

use super::MailError;
use std::fmt;
use url::{Host, Url};

/// Default port for `smtp://`.
pub const SMTP_PORT: u16 = 25;

/// Default port for `smtps://`.
pub const SMTPS_PORT: u16 = 465;

/// Connection security of a mail server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Plain TCP.
    None,
    /// TLS from the first byte.
    Tls,
}

/// Login credentials embedded in a mail server URI.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    password: Option<String>,
}

impl Credentials {
    /// Returns the password, if one was given.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A parsed mail server location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServerEndpoint {
    /// Host name or address literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Connection security.
    pub security: Security,
    /// Credentials, if the URI carried a user name.
    pub credentials: Option<Credentials>,
}

impl MailServerEndpoint {
    /// Parses a mail server URI.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidEndpoint`] if the URI is malformed, has no
    /// host, or uses a scheme other than `smtp` or `smtps`.
    pub fn parse(uri: &str) -> Result<Self, MailError> {
        let invalid = |reason: String| MailError::InvalidEndpoint {
            uri: redact(uri),
            reason,
        };

        let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
        let (security, default_port) = match url.scheme() {
            "smtp" => (Security::None, SMTP_PORT),
            "smtps" => (Security::Tls, SMTPS_PORT),
            other => return Err(invalid(format!("unsupported scheme `{other}`"))),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(invalid("missing host".into())),
        };

        let credentials = (!url.username().is_empty()).then(|| Credentials {
            username: url.username().to_string(),
            password: url.password().map(str::to_string).or_else(|| {
                url.query_pairs()
                    .find(|(key, _)| key == "password")
                    .map(|(_, value)| value.into_owned())
            }),
        });

        Ok(Self {
            host,
            port: url.port().unwrap_or(default_port),
            security,
            credentials,
        })
    }

    /// Returns `host:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for MailServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.security {
            Security::None => "smtp",
            Security::Tls => "smtps",
        };
        write!(f, "{scheme}://{}", self.authority())
    }
}

/// Strips credentials from a URI before it goes into an error or log line.
fn redact(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            let _ = url.set_password(None);
            url.set_query(None);
            url.to_string()
        }
        Err(_) => uri.to_string(),
    }
}

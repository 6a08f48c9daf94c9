//! Byte transport under the SMTP client.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

/// Longest reply line accepted, terminator included.
///
/// RFC 5321 caps reply lines at 512 octets; real servers overshoot that in
/// EHLO responses, so the limit is generous.
pub const MAX_REPLY_LINE: u64 = 4096;

/// Anything the client can speak SMTP over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Buffered SMTP stream over TCP, TLS or any other [`Transport`].
pub struct SmtpStream {
    inner: BufReader<Box<dyn Transport>>,
    secure: bool,
}

impl fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpStream")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SmtpStream {
    /// Wraps an already connected transport.
    #[must_use]
    pub fn from_io(io: impl Transport + 'static, secure: bool) -> Self {
        Self {
            inner: BufReader::new(Box::new(io)),
            secure,
        }
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Reads one reply line, without its terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] at end of stream and
    /// [`Error::Protocol`] for lines longer than [`MAX_REPLY_LINE`].
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = (&mut self.inner)
            .take(MAX_REPLY_LINE)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        if !line.ends_with('\n') && read as u64 >= MAX_REPLY_LINE {
            return Err(Error::Protocol(format!(
                "reply line exceeds {MAX_REPLY_LINE} bytes"
            )));
        }
        Ok(line.trim_end().to_string())
    }

    /// Writes and flushes `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let io = self.inner.get_mut();
        io.write_all(data).await?;
        io.flush().await?;
        Ok(())
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let tcp = TcpStream::connect((hostname, port)).await?;
    tcp.set_nodelay(true)?;
    Ok(SmtpStream::from_io(tcp, false))
}

/// Connects to an SMTP server with implicit TLS (port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("invalid TLS server name: {hostname}")))?;

    let tcp = TcpStream::connect((hostname, port)).await?;
    tcp.set_nodelay(true)?;
    let tls = tls_connector().connect(server_name, tcp).await?;
    Ok(SmtpStream::from_io(tls, true))
}

fn tls_connector() -> TlsConnector {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

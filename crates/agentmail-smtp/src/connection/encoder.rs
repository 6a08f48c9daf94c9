//! DATA section encoding.
//!
//! Message content is written in chunks; line endings are normalized to CRLF
//! and lines starting with `.` are byte-stuffed (RFC 5321 section 4.5.2).
//! The encoder keeps enough state to do both across chunk boundaries.

/// Streaming encoder for the DATA section.
#[derive(Debug, Clone)]
pub struct DataEncoder {
    at_line_start: bool,
    last_was_cr: bool,
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataEncoder {
    /// Creates an encoder positioned at the start of the first line.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            at_line_start: true,
            last_was_cr: false,
        }
    }

    /// Encodes one chunk of message content.
    #[must_use]
    pub fn encode(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 32 + 2);
        for &byte in chunk {
            match byte {
                b'\n' => {
                    if !self.last_was_cr {
                        out.push(b'\r');
                    }
                    out.push(b'\n');
                    self.at_line_start = true;
                    self.last_was_cr = false;
                }
                b'\r' => {
                    out.push(b'\r');
                    self.at_line_start = false;
                    self.last_was_cr = true;
                }
                _ => {
                    if self.at_line_start && byte == b'.' {
                        out.push(b'.');
                    }
                    out.push(byte);
                    self.at_line_start = false;
                    self.last_was_cr = false;
                }
            }
        }
        out
    }

    /// Returns the bytes that terminate the DATA section.
    ///
    /// An unterminated last line gets its CRLF before the final `.`.
    #[must_use]
    pub fn finish(&self) -> &'static [u8] {
        match (self.at_line_start, self.last_was_cr) {
            (true, _) => b".\r\n",
            (false, true) => b"\n.\r\n",
            (false, false) => b"\r\n.\r\n",
        }
    }
}

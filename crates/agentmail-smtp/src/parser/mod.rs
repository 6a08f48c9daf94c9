//! SMTP response parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// Every line must carry the same code as the first one.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let code_str = first
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("Reply too short: {first}")))?;
    let code = code_str
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {code_str}")))?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if !line.starts_with(code_str) {
            return Err(Error::Protocol(format!(
                "Reply code changed mid-reply: {line}"
            )));
        }
        match line.len() {
            3 => message.push(String::new()),
            // Skip code and separator (e.g., "250-" or "250 ")
            n if n >= 4 => message.push(line.get(4..).unwrap_or_default().to_string()),
            _ => return Err(Error::Protocol(format!("Malformed reply line: {line}"))),
        }
    }

    Ok(Reply::new(ReplyCode::new(code), message))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation; anything else
/// (a space, or a bare code) ends the reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        Some(b'-') => false,
        Some(_) => true,
        None => line.len() == 3,
    }
}

//! SMTP replies and their incremental framing.

use crate::errors::MailerError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Longest unterminated reply line kept while waiting for its CRLF.
pub const MAX_PENDING_LINE: usize = 4096;

static REPLY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3})(?:([ -])|$)").expect("valid reply line pattern"));

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    pub code: u16,
    /// Raw reply lines without their CRLF, code and separator included.
    pub lines: Vec<String>,
}

impl SmtpResponse {
    /// Reply lines with the leading code and separator removed.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.get(4..).unwrap_or("").trim_end())
    }

    /// Raw reply text, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join(" | "))
    }
}

/// Accumulates received bytes and yields a reply once its final line
/// (`NNN ` rather than `NNN-`) has arrived.
#[derive(Debug, Default)]
pub struct ResponseParser {
    buffer: Vec<u8>,
    lines: Vec<String>,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete reply, or `None` if more bytes are needed.
    pub fn next_response(&mut self) -> Result<Option<SmtpResponse>, MailerError> {
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string();
            if line.trim().is_empty() {
                continue;
            }

            let caps = REPLY_LINE
                .captures(&line)
                .ok_or_else(|| MailerError::MalformedResponse(line.clone()))?;
            let code: u16 = caps[1]
                .parse()
                .map_err(|_| MailerError::MalformedResponse(line.clone()))?;
            let last = caps.get(2).map_or(true, |sep| sep.as_str() == " ");

            self.lines.push(line);
            if last {
                return Ok(Some(SmtpResponse {
                    code,
                    lines: std::mem::take(&mut self.lines),
                }));
            }
        }
        if self.buffer.len() > MAX_PENDING_LINE {
            let preview = String::from_utf8_lossy(&self.buffer[..64]).into_owned();
            return Err(MailerError::MalformedResponse(format!(
                "{preview}... (no line end within {MAX_PENDING_LINE} bytes)"
            )));
        }
        Ok(None)
    }

    /// Drops unread bytes and partial lines, returning how many bytes were
    /// discarded.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len() + self.lines.iter().map(|l| l.len()).sum::<usize>();
        self.buffer.clear();
        self.lines.clear();
        dropped
    }
}

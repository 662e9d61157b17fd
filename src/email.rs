//! Message building: envelope extraction and the RFC 5322 DATA payload.

use crate::errors::MailerError;
use crate::utils::{
    encode_header, encode_mailbox, extract_address, is_valid_envelope_address, normalize_body,
    sanitize_header_value,
};
use std::time::SystemTime;

/// One address or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Recipients::One(address) => std::slice::from_ref(address),
            Recipients::Many(addresses) => addresses,
        }
    }
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::Many(Vec::new())
    }
}

impl From<String> for Recipients {
    fn from(s: String) -> Self {
        Recipients::One(s)
    }
}

impl From<&str> for Recipients {
    fn from(s: &str) -> Self {
        Recipients::One(s.to_string())
    }
}

impl From<Vec<String>> for Recipients {
    fn from(v: Vec<String>) -> Self {
        Recipients::Many(v)
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(v: [&str; N]) -> Self {
        Recipients::Many(v.iter().map(|s| s.to_string()).collect())
    }
}

/// A logical plain-text message.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Header sender, e.g. `Alice <a@example.com>`.
    pub from: String,
    pub to: Recipients,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Overrides the MAIL FROM address derived from `from`.
    #[serde(default)]
    pub envelope_from: Option<String>,
}

impl Message {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<Recipients>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            reply_to: None,
            envelope_from: None,
        }
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn envelope_from(mut self, envelope_from: impl Into<String>) -> Self {
        self.envelope_from = Some(envelope_from.into());
        self
    }
}

/// Bare addresses used for MAIL FROM and RCPT TO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
}

/// A message ready for submission.
#[derive(Debug, Clone)]
pub struct Email {
    pub envelope: Envelope,
    /// Headers, blank line and dot-stuffed CRLF body. The DATA terminator is
    /// not included.
    pub data: String,
}

impl Email {
    /// Validates `message` and renders the payload. No I/O happens here.
    pub fn new(message: &Message) -> Result<Self, MailerError> {
        Self::build(message, SystemTime::now())
    }

    fn build(message: &Message, now: SystemTime) -> Result<Self, MailerError> {
        if message.from.trim().is_empty() {
            return Err(MailerError::MissingAddress("from"));
        }
        let to: Vec<&str> = message
            .to
            .as_slice()
            .iter()
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
            .collect();
        if to.is_empty() {
            return Err(MailerError::MissingAddress("to"));
        }

        let envelope = Envelope {
            from: envelope_address(message.envelope_from.as_deref().unwrap_or(&message.from))?,
            to: to.iter().map(|r| envelope_address(r)).collect::<Result<_, _>>()?,
        };

        let domain = envelope
            .from
            .rsplit_once('@')
            .map(|(_, d)| d)
            .unwrap_or("localhost");

        let mut headers = vec![
            format!("From: {}", encode_mailbox(&message.from)),
            format!(
                "To: {}",
                to.iter().map(|r| encode_mailbox(r)).collect::<Vec<_>>().join(", ")
            ),
        ];
        if let Some(reply_to) = message.reply_to.as_deref().filter(|r| !r.trim().is_empty()) {
            headers.push(format!("Reply-To: {}", encode_mailbox(reply_to)));
        }
        headers.extend([
            format!("Subject: {}", encode_header(&sanitize_header_value(&message.subject))),
            format!("Date: {}", httpdate::fmt_http_date(now)),
            format!("Message-ID: <{}@{}>", uuid::Uuid::new_v4(), domain),
            "MIME-Version: 1.0".to_string(),
            "Content-Type: text/plain; charset=UTF-8".to_string(),
            "Content-Transfer-Encoding: 8bit".to_string(),
        ]);

        let data = format!("{}\r\n\r\n{}", headers.join("\r\n"), normalize_body(&message.text));
        Ok(Self { envelope, data })
    }
}

fn envelope_address(value: &str) -> Result<String, MailerError> {
    let address = extract_address(value);
    if is_valid_envelope_address(&address) {
        Ok(address)
    } else {
        Err(MailerError::InvalidAddress(address))
    }
}

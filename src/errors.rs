//! Error taxonomy for message submission.

use thiserror::Error;

/// Any failure of a `send_mail` call.
///
/// The first failing step aborts the conversation; the session is still
/// closed before the error reaches the caller.
#[derive(Error, Debug)]
pub enum MailerError {
    /// Unusable configuration (missing host, bad port, unparsable flag).
    #[error("invalid SMTP configuration: {0}")]
    Configuration(String),

    /// `from` absent or `to` empty.
    #[error("missing {0} address")]
    MissingAddress(&'static str),

    /// An envelope address that cannot be put on the wire safely.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// DNS, TCP or TLS failure, or the server closed the connection early.
    #[error("SMTP connection failed: {0}")]
    Connection(String),

    #[error("SMTP timeout after {timeout_ms}ms while {during}")]
    Timeout {
        during: &'static str,
        timeout_ms: u64,
    },

    /// Reply code outside the set accepted for `command`.
    #[error("{command} failed: {response}")]
    Protocol {
        command: String,
        code: u16,
        response: String,
    },

    #[error("malformed SMTP reply line: {0:?}")]
    MalformedResponse(String),

    /// TLS is required but the server does not offer STARTTLS.
    #[error("server does not advertise STARTTLS and TLS is required")]
    TlsRequired,

    /// Credentials configured but no usable AUTH mechanism.
    #[error("no supported AUTH mechanism (server offers: {})", .0.join(" "))]
    UnsupportedAuthMethod(Vec<String>),

    /// DATA was accepted with 354 but the message itself was refused.
    #[error("message rejected by server ({code}): {response}")]
    MessageRejected { code: u16, response: String },
}

impl MailerError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            MailerError::Configuration(_) => "CONFIGURATION",
            MailerError::MissingAddress(_) => "MISSING_ADDRESS",
            MailerError::InvalidAddress(_) => "INVALID_ADDRESS",
            MailerError::Connection(_) => "CONNECTION_FAILED",
            MailerError::Timeout { .. } => "TIMEOUT",
            MailerError::Protocol { .. } => "PROTOCOL",
            MailerError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            MailerError::TlsRequired => "TLS_REQUIRED",
            MailerError::UnsupportedAuthMethod(_) => "UNSUPPORTED_AUTH",
            MailerError::MessageRejected { .. } => "MESSAGE_REJECTED",
        }
    }

    /// Whether the error was raised before any network I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MailerError::Configuration(_)
                | MailerError::MissingAddress(_)
                | MailerError::InvalidAddress(_)
        )
    }
}

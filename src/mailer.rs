//! Submission of one message over one SMTP connection.

use crate::auth::{self, AuthMethod};
use crate::capabilities::Capabilities;
use crate::config::SmtpConfig;
use crate::email::{Email, Message};
use crate::errors::MailerError;
use crate::logger::Logger;
use crate::response::SmtpResponse;
use crate::session::SmtpSession;

/// What to do about encryption after the first EHLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPlan {
    /// Implicit TLS or a completed upgrade.
    AlreadySecure,
    /// STARTTLS disabled by configuration.
    Disabled,
    Upgrade,
    /// Not offered and not required: continue in plaintext.
    Unavailable,
    /// Not offered but required.
    Refuse,
}

impl TlsPlan {
    pub fn resolve(secure: bool, config: &SmtpConfig, capabilities: &Capabilities) -> Self {
        if secure {
            TlsPlan::AlreadySecure
        } else if !config.start_tls {
            TlsPlan::Disabled
        } else if capabilities.starttls() {
            TlsPlan::Upgrade
        } else if config.require_tls {
            TlsPlan::Refuse
        } else {
            TlsPlan::Unavailable
        }
    }
}

/// Sends messages with a fixed configuration. Holds no connection state:
/// every [`Mailer::send`] opens and closes its own socket.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Result<Self, MailerError> {
        SmtpConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Submits `message`, returning the server's final 250 reply.
    ///
    /// Validation happens before any I/O. Once connected, QUIT is attempted
    /// and the socket closed on every path before the result is returned.
    pub async fn send(&self, message: &Message) -> Result<SmtpResponse, MailerError> {
        let email = Email::new(message)?;
        self.send_email(&email).await
    }

    /// Submits an already built [`Email`].
    pub async fn send_email(&self, email: &Email) -> Result<SmtpResponse, MailerError> {
        self.config.validate()?;

        let logger = Logger::new(
            self.config.log_level,
            format!("[SmtpClient:{}:{}] ", self.config.host, self.config.port),
        );
        let mut session = SmtpSession::connect(&self.config, logger.clone()).await?;
        let result = converse(&mut session, &self.config, email, &logger).await;
        session.quit().await;

        match &result {
            Ok(response) => logger.info(&format!(
                "Message accepted for {} recipient(s): {}",
                email.envelope.to.len(),
                response
            )),
            Err(e) => logger.error(&format!("Send failed: {e}")),
        }
        result
    }
}

/// Sends one message. Without `config`, settings come from the `SMTP_*`
/// environment variables.
pub async fn send_mail(message: &Message, config: Option<&SmtpConfig>) -> Result<SmtpResponse, MailerError> {
    let email = Email::new(message)?;
    let config = match config {
        Some(config) => config.clone(),
        None => SmtpConfig::from_env()?,
    };
    Mailer::new(config).send_email(&email).await
}

async fn converse(
    session: &mut SmtpSession,
    config: &SmtpConfig,
    email: &Email,
    logger: &Logger,
) -> Result<SmtpResponse, MailerError> {
    session.read_greeting().await?;
    let mut capabilities = hello(session, &config.client_hostname, logger).await?;

    match TlsPlan::resolve(session.is_secure(), config, &capabilities) {
        TlsPlan::AlreadySecure | TlsPlan::Disabled => {}
        TlsPlan::Unavailable => logger.warn("Server does not offer STARTTLS; continuing unencrypted"),
        TlsPlan::Refuse => return Err(MailerError::TlsRequired),
        TlsPlan::Upgrade => {
            session.send_command("STARTTLS", &[220]).await?;
            session.upgrade_to_tls().await?;
            capabilities = hello(session, &config.client_hostname, logger).await?;
        }
    }

    if let Some(credentials) = &config.auth {
        let method = AuthMethod::select(&capabilities);
        auth::authenticate(session, credentials, &method, config.auth_fallback, logger).await?;
    }

    session
        .send_command(&format!("MAIL FROM:<{}>", email.envelope.from), &[250, 251])
        .await?;
    for recipient in &email.envelope.to {
        session
            .send_command(&format!("RCPT TO:<{recipient}>"), &[250, 251, 252])
            .await?;
    }
    session.send_command("DATA", &[354]).await?;
    session.send_data(&email.data).await
}

/// EHLO, falling back to HELO once unless the server is shutting down (421).
async fn hello(session: &mut SmtpSession, client_hostname: &str, logger: &Logger) -> Result<Capabilities, MailerError> {
    match session.send_command(&format!("EHLO {client_hostname}"), &[250]).await {
        Ok(response) => Ok(Capabilities::from_response(&response)),
        Err(MailerError::Protocol { code, .. }) if code != 421 => {
            logger.info(&format!("EHLO rejected with {code}; retrying with HELO"));
            session.send_command(&format!("HELO {client_hostname}"), &[250]).await?;
            Ok(Capabilities::default())
        }
        Err(e) => Err(e),
    }
}

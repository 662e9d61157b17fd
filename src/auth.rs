//! AUTH mechanism selection and the single AUTH exchange.

use crate::capabilities::Capabilities;
use crate::config::Credentials;
use crate::errors::MailerError;
use crate::logger::Logger;
use crate::session::SmtpSession;
use base64::{engine::general_purpose::STANDARD as B64, Engine};

/// How to authenticate, resolved once from the EHLO capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Plain,
    Login,
    /// No AUTH keyword at all. Some relays accept AUTH without advertising it.
    Unadvertised,
    /// AUTH advertised, but with neither PLAIN nor LOGIN.
    Unsupported(Vec<String>),
}

impl AuthMethod {
    pub fn select(capabilities: &Capabilities) -> Self {
        if capabilities.supports_auth("PLAIN") {
            AuthMethod::Plain
        } else if capabilities.supports_auth("LOGIN") {
            AuthMethod::Login
        } else if capabilities.auth.is_empty() {
            AuthMethod::Unadvertised
        } else {
            AuthMethod::Unsupported(capabilities.auth.clone())
        }
    }
}

/// `\0user\0pass`, base64-encoded.
pub fn plain_token(credentials: &Credentials) -> String {
    B64.encode(format!("\u{0}{}\u{0}{}", credentials.user, credentials.pass))
}

/// Performs exactly one AUTH exchange. `fallback` allows a blind
/// `AUTH PLAIN` when the server advertised no mechanism; a reply rejecting
/// that attempt is logged and the submission continues unauthenticated.
pub async fn authenticate(
    session: &mut SmtpSession,
    credentials: &Credentials,
    method: &AuthMethod,
    fallback: bool,
    logger: &Logger,
) -> Result<(), MailerError> {
    match method {
        AuthMethod::Plain => auth_plain(session, credentials).await,
        AuthMethod::Login => auth_login(session, credentials).await,
        AuthMethod::Unadvertised if fallback => {
            logger.warn("Server advertised no AUTH mechanism; trying AUTH PLAIN anyway");
            match auth_plain(session, credentials).await {
                Err(MailerError::Protocol { code, .. }) => {
                    logger.warn(&format!("Blind AUTH PLAIN rejected with {code}; continuing unauthenticated"));
                    Ok(())
                }
                other => other,
            }
        }
        AuthMethod::Unadvertised => Err(MailerError::UnsupportedAuthMethod(Vec::new())),
        AuthMethod::Unsupported(offered) => Err(MailerError::UnsupportedAuthMethod(offered.clone())),
    }
}

// 503: already authenticated or not required.
async fn auth_plain(session: &mut SmtpSession, credentials: &Credentials) -> Result<(), MailerError> {
    let command = format!("AUTH PLAIN {}", plain_token(credentials));
    session.send_secret(&command, "AUTH PLAIN ***", &[235, 503]).await?;
    Ok(())
}

async fn auth_login(session: &mut SmtpSession, credentials: &Credentials) -> Result<(), MailerError> {
    let response = session.send_command("AUTH LOGIN", &[334, 503]).await?;
    if response.code == 503 {
        return Ok(());
    }
    session
        .send_secret(&B64.encode(&credentials.user), "AUTH LOGIN <user>", &[334])
        .await?;
    session
        .send_secret(&B64.encode(&credentials.pass), "AUTH LOGIN <password>", &[235])
        .await?;
    Ok(())
}

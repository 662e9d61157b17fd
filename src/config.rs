//! Connection and authentication settings, loadable from `SMTP_*` variables.

use crate::errors::MailerError;
use crate::logger::LogLevel;
use std::fmt;

const DEFAULT_SUBMISSION_PORT: u16 = 587;
const DEFAULT_IMPLICIT_TLS_PORT: u16 = 465;
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// SMTP credentials.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

/// Settings for one submission. Cloned into each call; never shared mutably.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// The connection starts as TLS (implicit TLS, usually port 465).
    #[serde(default)]
    pub secure: bool,
    /// Attempt STARTTLS when not already secure.
    #[serde(default = "default_true")]
    pub start_tls: bool,
    /// Fail instead of continuing unencrypted when STARTTLS is unavailable.
    #[serde(default)]
    pub require_tls: bool,
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub auth: Option<Credentials>,
    #[serde(default = "default_client_hostname")]
    pub client_hostname: String,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Try `AUTH PLAIN` even when the server advertises no AUTH mechanism.
    #[serde(default = "default_true")]
    pub auth_fallback: bool,
}

fn default_port() -> u16 {
    DEFAULT_SUBMISSION_PORT
}
fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// The local host name, or `localhost` when it cannot be determined.
pub fn default_client_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

impl SmtpConfig {
    /// Submission on port 587 with STARTTLS, certificate verification on.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SUBMISSION_PORT,
            secure: false,
            start_tls: true,
            require_tls: false,
            reject_unauthorized: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auth: None,
            client_hostname: default_client_hostname(),
            log_level: LogLevel::default(),
            auth_fallback: true,
        }
    }

    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, MailerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value. Unset and blank values are treated the same.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MailerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get("SMTP_HOST")
            .ok_or_else(|| MailerError::Configuration("SMTP_HOST is not set".into()))?;

        let explicit_secure = get("SMTP_SECURE").map(|v| parse_bool("SMTP_SECURE", &v)).transpose()?;
        let port = match get("SMTP_PORT") {
            Some(v) => v
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| MailerError::Configuration(format!("SMTP_PORT is not a valid port: {v:?}")))?,
            None if explicit_secure == Some(true) => DEFAULT_IMPLICIT_TLS_PORT,
            None => DEFAULT_SUBMISSION_PORT,
        };
        let secure = explicit_secure.unwrap_or(port == DEFAULT_IMPLICIT_TLS_PORT);

        let flag = |key: &str, default: bool| -> Result<bool, MailerError> {
            get(key).map_or(Ok(default), |v| parse_bool(key, &v))
        };
        let start_tls = flag("SMTP_STARTTLS", !secure)?;
        let require_tls = flag("SMTP_REQUIRE_TLS", false)?;
        let reject_unauthorized = flag("SMTP_TLS_REJECT_UNAUTHORIZED", true)?;
        let auth_fallback = flag("SMTP_AUTH_FALLBACK", true)?;

        let timeout_ms = match get("SMTP_TIMEOUT_MS") {
            Some(v) => v
                .parse::<u64>()
                .ok()
                .filter(|t| *t > 0)
                .ok_or_else(|| MailerError::Configuration(format!("SMTP_TIMEOUT_MS is not a positive integer: {v:?}")))?,
            None => DEFAULT_TIMEOUT_MS,
        };

        let auth = get("SMTP_USER").map(|user| Credentials::new(user, lookup("SMTP_PASS").unwrap_or_default()));

        let log_level = match get("SMTP_LOG_LEVEL") {
            Some(v) => v.parse().map_err(MailerError::Configuration)?,
            None => LogLevel::default(),
        };

        Ok(Self {
            host,
            port,
            secure,
            start_tls,
            require_tls,
            reject_unauthorized,
            timeout_ms,
            auth,
            client_hostname: get("SMTP_CLIENT_HOSTNAME").unwrap_or_else(default_client_hostname),
            log_level,
            auth_fallback,
        })
    }

    /// Checks the parts of the configuration `from_lookup` cannot enforce on
    /// hand-built values.
    pub fn validate(&self) -> Result<(), MailerError> {
        if self.host.trim().is_empty() {
            return Err(MailerError::Configuration("host is empty".into()));
        }
        if self.port == 0 {
            return Err(MailerError::Configuration("port must not be 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(MailerError::Configuration("timeout_ms must be positive".into()));
        }
        if self.client_hostname.chars().any(|c| c.is_whitespace() || c.is_control()) || self.client_hostname.is_empty() {
            return Err(MailerError::Configuration(format!(
                "client hostname is not a single token: {:?}",
                self.client_hostname
            )));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, MailerError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(MailerError::Configuration(format!("{key} is not a boolean: {value:?}"))),
    }
}

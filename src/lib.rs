//! Submit one plain-text email over SMTP on a raw TCP or TLS socket.
//!
//! ```no_run
//! # async fn run() -> Result<(), socket_mailer::MailerError> {
//! use socket_mailer::{send_mail, Message, SmtpConfig};
//!
//! let message = Message::new("Site <noreply@example.com>", "owner@example.com", "Contact form", "Hello!");
//! let config = SmtpConfig::new("smtp.example.com");
//! send_mail(&message, Some(&config)).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod capabilities;
pub mod config;
pub mod email;
pub mod errors;
pub mod logger;
pub mod mailer;
pub mod response;
pub mod session;
pub mod tls;
pub mod utils;

// Re-exports
pub use auth::AuthMethod;
pub use capabilities::Capabilities;
pub use config::{Credentials, SmtpConfig};
pub use email::{Email, Envelope, Message, Recipients};
pub use errors::MailerError;
pub use logger::{LogLevel, Logger};
pub use mailer::{send_mail, Mailer, TlsPlan};
pub use response::{ResponseParser, SmtpResponse};
pub use session::SmtpSession;
pub use utils::{encode_header, extract_address, normalize_body, sanitize_header_value};

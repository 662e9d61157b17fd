//! One SMTP connection and its request/response primitives.

use crate::config::SmtpConfig;
use crate::errors::MailerError;
use crate::logger::Logger;
use crate::response::{ResponseParser, SmtpResponse};
use crate::tls;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

const READ_CHUNK: usize = 4096;

enum SmtpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SmtpStream::Plain(s) => s.read(buf).await,
            SmtpStream::Tls(s) => s.read(buf).await,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            SmtpStream::Plain(s) => {
                s.write_all(data).await?;
                s.flush().await
            }
            SmtpStream::Tls(s) => {
                s.write_all(data).await?;
                s.flush().await
            }
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            SmtpStream::Plain(s) => s.shutdown().await,
            SmtpStream::Tls(s) => s.shutdown().await,
        }
    }
}

/// Runs `fut` under the session timeout, mapping I/O failures to
/// `Connection` and expiry to `Timeout`.
async fn within<T, F>(timeout: Duration, during: &'static str, fut: F) -> Result<T, MailerError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(MailerError::Connection(format!("{during}: {e}"))),
        Err(_) => Err(MailerError::Timeout {
            during,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Owns exactly one socket for the lifetime of one submission.
///
/// Commands are strictly sequential: one command, one reply. The socket is
/// released by [`SmtpSession::quit`], which consumes the session.
pub struct SmtpSession {
    stream: Option<SmtpStream>,
    parser: ResponseParser,
    host: String,
    secure: bool,
    reject_unauthorized: bool,
    timeout: Duration,
    logger: Logger,
}

impl SmtpSession {
    /// Opens TCP, then TLS directly when `config.secure` is set.
    pub async fn connect(config: &SmtpConfig, logger: Logger) -> Result<Self, MailerError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let tcp = within(
            timeout,
            "connecting",
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await?;
        if let Err(e) = tcp.set_nodelay(true) {
            logger.debug(&format!("TCP_NODELAY not set: {e}"));
        }

        let mut session = Self {
            stream: Some(SmtpStream::Plain(tcp)),
            parser: ResponseParser::new(),
            host: config.host.clone(),
            secure: false,
            reject_unauthorized: config.reject_unauthorized,
            timeout,
            logger,
        };
        if config.secure {
            session.handshake().await?;
        }
        session.logger.info(if session.secure {
            "Connected (implicit TLS)"
        } else {
            "Connected"
        });
        Ok(session)
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Reads until a complete reply is buffered. A closed or failing socket
    /// is an error, never an empty success.
    pub async fn read_response(&mut self) -> Result<SmtpResponse, MailerError> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(response) = self.parser.next_response()? {
                self.logger.debug(&format!("S: {}", response.text()));
                return Ok(response);
            }
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| MailerError::Connection("connection is closed".into()))?;
            let n = within(self.timeout, "awaiting reply", stream.read(&mut buf)).await?;
            if n == 0 {
                return Err(MailerError::Connection(
                    "server closed the connection while a reply was pending".into(),
                ));
            }
            self.parser.feed(&buf[..n]);
        }
    }

    /// Reads the greeting, which must be 220.
    pub async fn read_greeting(&mut self) -> Result<SmtpResponse, MailerError> {
        let response = self.read_response().await?;
        if response.code != 220 {
            return Err(MailerError::Protocol {
                command: "greeting".into(),
                code: response.code,
                response: response.text(),
            });
        }
        Ok(response)
    }

    /// Writes `command` and reads one reply, failing with `Protocol` unless
    /// its code is in `accepted`.
    pub async fn send_command(&mut self, command: &str, accepted: &[u16]) -> Result<SmtpResponse, MailerError> {
        self.exchange(command, command, accepted).await
    }

    /// Like [`send_command`](Self::send_command), but logs and reports
    /// `shown` instead of the credential-bearing `command`.
    pub async fn send_secret(
        &mut self,
        command: &str,
        shown: &str,
        accepted: &[u16],
    ) -> Result<SmtpResponse, MailerError> {
        self.exchange(command, shown, accepted).await
    }

    async fn exchange(&mut self, command: &str, shown: &str, accepted: &[u16]) -> Result<SmtpResponse, MailerError> {
        self.logger.debug(&format!("C: {shown}"));
        self.write(format!("{command}\r\n").as_bytes()).await?;
        let response = self.read_response().await?;
        if accepted.contains(&response.code) {
            Ok(response)
        } else {
            Err(MailerError::Protocol {
                command: shown.to_string(),
                code: response.code,
                response: response.text(),
            })
        }
    }

    /// Wraps the plaintext socket in TLS after a 220 reply to STARTTLS.
    /// Capabilities must be re-read with a fresh EHLO afterwards.
    pub async fn upgrade_to_tls(&mut self) -> Result<(), MailerError> {
        if self.secure {
            return Err(MailerError::Connection("TLS is already active on this connection".into()));
        }
        let dropped = self.parser.discard();
        if dropped > 0 {
            self.logger
                .warn(&format!("Discarded {dropped} plaintext bytes received before the TLS handshake"));
        }
        self.handshake().await?;
        self.logger.info("Upgraded connection to TLS");
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), MailerError> {
        let connector = tls::connector(self.reject_unauthorized)?;
        let name = tls::server_name(&self.host)?;
        let tcp = match self.stream.take() {
            Some(SmtpStream::Plain(tcp)) => tcp,
            Some(tls @ SmtpStream::Tls(_)) => {
                self.stream = Some(tls);
                return Err(MailerError::Connection("TLS is already active on this connection".into()));
            }
            None => return Err(MailerError::Connection("connection is closed".into())),
        };
        let stream = within(self.timeout, "negotiating TLS", connector.connect(name, tcp)).await?;
        self.stream = Some(SmtpStream::Tls(Box::new(stream)));
        self.secure = true;
        Ok(())
    }

    /// Sends the message data followed by the lone `.` terminator line and
    /// waits for the final reply, which must be 250.
    pub async fn send_data(&mut self, payload: &str) -> Result<SmtpResponse, MailerError> {
        let mut data = String::with_capacity(payload.len() + 5);
        data.push_str(payload);
        if !data.ends_with("\r\n") {
            data.push_str("\r\n");
        }
        data.push_str(".\r\n");

        self.logger.debug(&format!("C: <{} bytes of message data>", payload.len()));
        self.write(data.as_bytes()).await?;

        let response = self.read_response().await?;
        if response.code != 250 {
            return Err(MailerError::MessageRejected {
                code: response.code,
                response: response.text(),
            });
        }
        Ok(response)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), MailerError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MailerError::Connection("connection is closed".into()))?;
        within(self.timeout, "writing", stream.write_all(data)).await
    }

    /// Sends `QUIT` best-effort, then closes the socket. Failures are logged
    /// and swallowed so they never mask an earlier error.
    pub async fn quit(mut self) {
        if self.stream.is_some() {
            self.parser.discard();
            if let Err(e) = self.send_command("QUIT", &[221]).await {
                self.logger.warn(&format!("QUIT failed: {e}"));
            }
        }
        if let Some(mut stream) = self.stream.take() {
            if let Ok(Err(e)) = tokio::time::timeout(self.timeout, stream.shutdown()).await {
                self.logger.debug(&format!("Socket shutdown failed: {e}"));
            }
        }
        self.logger.debug("Connection closed");
    }
}

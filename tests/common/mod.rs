//! Scripted single-connection SMTP server for integration tests.

#![allow(dead_code)]

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use socket_mailer::{LogLevel, SmtpConfig};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// What the fake server does with one received command.
pub enum Reply {
    Send(String),
    Silent,
    Hangup,
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Send(s.to_string())
    }
}

/// How the fake server handles TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTls {
    /// Plaintext only; a 220 to STARTTLS does not upgrade.
    Off,
    /// Upgrade after replying 220 to `STARTTLS`.
    StartTls,
    /// Handshake right after accepting, before the greeting.
    Implicit,
}

#[derive(Debug, Default)]
pub struct Transcript {
    /// Command lines as received, without CRLF.
    pub commands: Vec<String>,
    /// Raw DATA payload lines (still dot-stuffed), joined with CRLF.
    pub data: Option<String>,
    /// The client closed its side of the socket.
    pub client_closed: bool,
    /// Commands received over TLS, by index into `commands`.
    pub secured_from: Option<usize>,
}

impl Transcript {
    pub fn has_command(&self, prefix: &str) -> bool {
        self.commands.iter().any(|c| c.starts_with(prefix))
    }

    pub fn verbs(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|c| c.split([' ', ':']).next().unwrap_or("").to_string())
            .collect()
    }
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Self-signed `localhost` / `127.0.0.1` certificate.
fn acceptor() -> TlsAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
    let der = CertificateDer::from(cert.serialize_der().unwrap());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![der], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

pub struct FakeServer {
    pub port: u16,
    handle: JoinHandle<Transcript>,
}

impl FakeServer {
    /// A plaintext server; see [`FakeServer::start_with`].
    pub async fn start<F>(greeting: Option<&'static str>, respond: F) -> Self
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        Self::start_with(ServerTls::Off, greeting, respond).await
    }

    /// Accepts one connection, sends `greeting` (if any) and answers each
    /// command with `respond`. After a 354 reply the following lines up to
    /// the lone `.` are collected as DATA and `respond(".")` gives the final
    /// reply.
    pub async fn start_with<F>(tls: ServerTls, greeting: Option<&'static str>, mut respond: F) -> Self
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut transcript = Transcript::default();
            let (tcp, _) = listener.accept().await.unwrap();
            let stream: Box<dyn Io> = match tls {
                ServerTls::Implicit => match acceptor().accept(tcp).await {
                    Ok(secured) => {
                        transcript.secured_from = Some(0);
                        Box::new(secured)
                    }
                    Err(_) => return transcript,
                },
                _ => Box::new(tcp),
            };
            let mut stream = BufReader::new(stream);

            if let Some(greeting) = greeting {
                stream.get_mut().write_all(greeting.as_bytes()).await.unwrap();
                stream.get_mut().flush().await.unwrap();
            }

            let mut in_data = false;
            let mut data_lines: Vec<String> = Vec::new();
            loop {
                let mut raw = Vec::new();
                match stream.read_until(b'\n', &mut raw).await {
                    Ok(0) => {
                        transcript.client_closed = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
                let line = String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string();

                let reply = if in_data {
                    if line != "." {
                        data_lines.push(line);
                        continue;
                    }
                    in_data = false;
                    transcript.data = Some(data_lines.join("\r\n"));
                    respond(".")
                } else {
                    transcript.commands.push(line.clone());
                    respond(&line)
                };

                match reply {
                    Reply::Send(text) => {
                        if text.starts_with("354") {
                            in_data = true;
                        }
                        let io = stream.get_mut();
                        if io.write_all(text.as_bytes()).await.is_err() || io.flush().await.is_err() {
                            break;
                        }
                        let upgrade = tls == ServerTls::StartTls
                            && transcript.secured_from.is_none()
                            && line.eq_ignore_ascii_case("STARTTLS")
                            && text.starts_with("220");
                        if upgrade {
                            let plain = stream.into_inner();
                            let secured: Box<dyn Io> = match acceptor().accept(plain).await {
                                Ok(secured) => Box::new(secured),
                                Err(_) => return transcript,
                            };
                            transcript.secured_from = Some(transcript.commands.len());
                            stream = BufReader::new(secured);
                        }
                    }
                    Reply::Silent => {}
                    Reply::Hangup => break,
                }
            }
            transcript
        });

        Self { port, handle }
    }

    pub async fn transcript(self) -> Transcript {
        self.handle.await.unwrap()
    }
}

pub const GREETING: &str = "220 fake.test ESMTP ready\r\n";

/// A cooperative server without STARTTLS or AUTH.
pub fn standard(command: &str) -> Reply {
    let verb = command.split([' ', ':']).next().unwrap_or("").to_ascii_uppercase();
    match verb.as_str() {
        "EHLO" => "250-fake.test greets you\r\n250-8BITMIME\r\n250 SIZE 1000000\r\n".into(),
        "HELO" => "250 fake.test\r\n".into(),
        "MAIL" => "250 2.1.0 OK\r\n".into(),
        "RCPT" => "250 2.1.5 OK\r\n".into(),
        "DATA" => "354 End data with <CR><LF>.<CR><LF>\r\n".into(),
        "." => "250 2.0.0 queued as ABC123\r\n".into(),
        "QUIT" => "221 2.0.0 Bye\r\n".into(),
        _ => "502 5.5.2 Command not recognized\r\n".into(),
    }
}

pub fn config(port: u16) -> SmtpConfig {
    let mut config = SmtpConfig::new("127.0.0.1");
    config.port = port;
    config.timeout_ms = 2_000;
    config.client_hostname = "client.test".into();
    config.log_level = LogLevel::Debug;
    config
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

//! Server capabilities from an EHLO reply.

use crate::response::SmtpResponse;
use regex::Regex;
use std::sync::LazyLock;

static AUTH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^AUTH[ =](.*)$").expect("valid AUTH pattern"));

/// Upper-cased EHLO keywords and AUTH mechanisms.
///
/// An empty `auth` means the server did not say, not that authentication is
/// unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub auth: Vec<String>,
    pub features: Vec<String>,
}

impl Capabilities {
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut caps = Capabilities::default();
        for line in lines {
            let line = line.as_ref();
            let value = line.get(4..).unwrap_or("").trim().to_uppercase();
            if value.is_empty() {
                continue;
            }
            if let Some(m) = AUTH_LINE.captures(&value) {
                for method in m[1].split_whitespace() {
                    if !caps.auth.iter().any(|known| known == method) {
                        caps.auth.push(method.to_string());
                    }
                }
            }
            caps.features.push(value);
        }
        caps
    }

    pub fn from_response(response: &SmtpResponse) -> Self {
        Self::parse(&response.lines)
    }

    /// Whether an EHLO keyword (first token of a line) was advertised.
    pub fn supports(&self, keyword: &str) -> bool {
        self.features
            .iter()
            .any(|f| f.split_whitespace().next().is_some_and(|k| k.eq_ignore_ascii_case(keyword)))
    }

    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.auth.iter().any(|m| m.eq_ignore_ascii_case(mechanism))
    }

    pub fn starttls(&self) -> bool {
        self.supports("STARTTLS")
    }
}

//! Header encoding, address handling and body framing.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use regex::Regex;
use std::sync::LazyLock;

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*[\r\n]+[ \t]*").expect("valid line break pattern"));

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>]*)>").expect("valid angle address pattern"));

static NAMED_MAILBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*<([^<>]*)>$").expect("valid mailbox pattern"));

static ENVELOPE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s<>@]+@[^\s<>@]+$").expect("valid envelope pattern"));

/// Collapses embedded CR/LF runs (and the blanks around them) into a single
/// space so a value can never start a new header line.
pub fn sanitize_header_value(value: &str) -> String {
    LINE_BREAKS.replace_all(value, " ").trim().to_string()
}

/// RFC 2047 header encoding (UTF-8 B). Pure ASCII passes through.
pub fn encode_header(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    format!("=?UTF-8?B?{}?=", B64.encode(text.as_bytes()))
}

/// Encodes a mailbox header value.
///
/// With a `Name <addr>` form only the display name is encoded, since an
/// encoded word may not appear inside the address itself.
pub fn encode_mailbox(value: &str) -> String {
    let value = sanitize_header_value(value);
    let Some(caps) = NAMED_MAILBOX.captures(&value) else {
        return encode_header(&value);
    };
    let name = caps[1].trim().trim_matches('"').trim();
    let address = caps[2].trim();
    if name.is_empty() {
        format!("<{address}>")
    } else if name.is_ascii() {
        if name.contains([',', ';', ':', '"', '(', ')', '<', '>', '@', '[', ']', '\\']) {
            format!("\"{}\" <{address}>", name.replace('\\', "\\\\").replace('"', "\\\""))
        } else {
            format!("{name} <{address}>")
        }
    } else {
        format!("{} <{address}>", encode_header(name))
    }
}

/// Bare envelope address: the content of `<...>` when present, else the
/// trimmed raw value.
pub fn extract_address(value: &str) -> String {
    match ANGLE_ADDRESS.captures(value) {
        Some(caps) => caps[1].trim().to_string(),
        None => value.trim().to_string(),
    }
}

/// An address is only put in MAIL FROM / RCPT TO when it is a single
/// `local@domain` token without whitespace, controls or angle brackets.
pub fn is_valid_envelope_address(address: &str) -> bool {
    !address.chars().any(char::is_control) && ENVELOPE_ADDRESS.is_match(address)
}

/// Converts every line ending to CRLF and dot-stuffs lines starting with `.`.
pub fn normalize_body(text: &str) -> String {
    let unix = text.replace("\r\n", "\n").replace('\r', "\n");
    unix.split('\n')
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

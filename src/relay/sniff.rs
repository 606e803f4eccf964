// Conn Monitor - Request Head Sniffing
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Extracts monitoring details from the first HTTP request head.
//!
//! Only the request line and a handful of headers are inspected; the bytes
//! are forwarded unchanged regardless of what is found.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::registry::RequestDetails;

/// Largest request head buffered for inspection.
pub const MAX_HEAD_LEN: usize = 8 * 1024;

/// Find the end of the head (`\r\n\r\n`) in `buf`.
pub fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Buffers the start of a client stream until a full request head is seen.
#[derive(Debug, Default)]
pub struct HeadSniffer {
    buf: Vec<u8>,
    done: bool,
}

impl HeadSniffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk read from the client.
    ///
    /// Returns the parsed details once, when the head completes. Gives up
    /// silently if the head exceeds [`MAX_HEAD_LEN`] or is not HTTP.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<RequestDetails> {
        if self.done {
            return None;
        }
        let room = MAX_HEAD_LEN.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);

        let details = match head_end(&self.buf) {
            Some(end) => parse_head(&self.buf[..end]),
            None if self.buf.len() >= MAX_HEAD_LEN => None,
            None => return None,
        };
        self.done = true;
        self.buf = Vec::new();
        details
    }
}

/// Parse a request head. Returns `None` if it does not look like HTTP.
pub fn parse_head(head: &[u8]) -> Option<RequestDetails> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");

    // Request line: METHOD SP TARGET SP VERSION
    let request_line = lines.next()?;
    let mut parts = request_line.split(' ');
    let _method = parts.next().filter(|m| !m.is_empty())?;
    let target = parts.next().filter(|t| !t.is_empty())?;
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }

    let mut details = RequestDetails {
        request_target: Some(target.to_string()),
        ..Default::default()
    };

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "user-agent" => details.user_agent = Some(value.to_string()),
            "authorization" => details.account = basic_auth_user(value),
            "x-forwarded-user" | "remote-user" => {
                details.forwarded_user = Some(value.to_string())
            }
            "x-original-uri" => details.original_uri = Some(value.to_string()),
            _ => {}
        }
    }

    Some(details)
}

/// User name from a `Basic` credential, if any.
fn basic_auth_user(value: &str) -> Option<String> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, _password) = decoded.split_once(':')?;
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_end() {
        assert_eq!(head_end(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nbody"), Some(27));
        assert_eq!(head_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
    }

    #[test]
    fn test_parse_head() {
        let head = b"GET /files/movie.mkv HTTP/1.1\r\n\
            Host: example.org\r\n\
            User-Agent: Mozilla/5.0\r\n\
            Authorization: Basic YWxpY2U6c2VjcmV0\r\n\
            X-Forwarded-User: bob\r\n\
            X-Original-URI: /share/movie.mkv\r\n\r\n";
        let details = parse_head(head).unwrap();

        assert_eq!(details.request_target.as_deref(), Some("/files/movie.mkv"));
        assert_eq!(details.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(details.account.as_deref(), Some("alice"));
        assert_eq!(details.forwarded_user.as_deref(), Some("bob"));
        assert_eq!(details.original_uri.as_deref(), Some("/share/movie.mkv"));
    }

    #[test]
    fn test_sniffer_across_chunks() {
        let mut sniffer = HeadSniffer::new();
        assert!(sniffer.feed(b"GET /a.txt HT").is_none());
        assert!(sniffer.feed(b"TP/1.1\r\nUser-Agent: wget\r\n").is_none());
        let details = sniffer.feed(b"\r\nbody bytes").unwrap();
        assert_eq!(details.request_target.as_deref(), Some("/a.txt"));
        assert_eq!(details.user_agent.as_deref(), Some("wget"));

        // Only the first head is reported.
        assert!(sniffer.feed(b"GET /b.txt HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn test_sniffer_gives_up_on_oversized_head() {
        let mut sniffer = HeadSniffer::new();
        assert!(sniffer.feed(&vec![b'a'; MAX_HEAD_LEN + 10]).is_none());
        assert!(sniffer.feed(b"GET / HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn test_non_http_is_ignored() {
        assert!(parse_head(b"\x16\x03\x01\x02\x00\x01\x00").is_none());
        assert!(parse_head(b"SSH-2.0-OpenSSH_9.6\r\n\r\n").is_none());
    }

    #[test]
    fn test_bearer_token_has_no_account() {
        let head = b"GET / HTTP/1.1\r\nAuthorization: Bearer abc.def\r\n\r\n";
        assert_eq!(parse_head(head).unwrap().account, None);
    }

    #[test]
    fn test_malformed_basic_credentials() {
        let head = b"GET / HTTP/1.1\r\nAuthorization: Basic !!!\r\n\r\n";
        assert_eq!(parse_head(head).unwrap().account, None);
        // "nopassword" has no colon separator
        let head = b"GET / HTTP/1.1\r\nAuthorization: Basic bm9wYXNzd29yZA==\r\n\r\n";
        assert_eq!(parse_head(head).unwrap().account, None);
    }
}

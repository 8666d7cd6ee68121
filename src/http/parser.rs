//! Streaming HTTP/1.1 request parser.
//!
//! # Responsibilities
//! - Parse request line, headers, and body from a byte stream
//! - Loop on short reads so a sender trickling bytes is never mistaken for EOF
//! - Classify failures so the session can tell timeouts from malformed input
//!
//! # Design Decisions
//! - Operates on `BufRead` so the per-connection buffer survives keep-alive
//!   exchanges without losing read-ahead bytes
//! - Body length comes solely from `Content-Length`; the header is looked up
//!   case-insensitively and must be a non-negative integer

use std::collections::HashMap;
use std::io::{self, BufRead};

use thiserror::Error;

use crate::http::Request;

/// Errors raised while parsing a request. All variants are fatal to the
/// connection; the session never retries a failed parse.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The request line was missing or blank.
    #[error("empty request line")]
    EmptyRequestLine,

    /// The request line did not contain exactly method, path, and version.
    #[error("invalid request line format: {0}")]
    InvalidRequestLine(String),

    /// The version token did not start with `HTTP/1.1`.
    #[error("invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A header line contained no `:` separator.
    #[error("invalid header format: {0}")]
    InvalidHeader(String),

    /// `Content-Length` was not a non-negative integer.
    #[error("invalid Content-Length value: {0}")]
    InvalidContentLength(String),

    /// The stream ended before the declared body length was satisfied.
    #[error("unexpected end of stream while reading body")]
    UnexpectedEof,

    /// Underlying I/O failure, including read-timeout expiry. The session
    /// inspects the kind to separate idle timeouts from peer resets.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    /// True when the error is the socket read deadline expiring, which the
    /// session treats as a benign idle timeout rather than a bad request.
    pub fn is_timeout(&self) -> bool {
        match self {
            // SO_RCVTIMEO expiry surfaces as WouldBlock on unix and
            // TimedOut on windows.
            ParseError::Io(e) => {
                matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
            }
            _ => false,
        }
    }
}

/// Parse one HTTP/1.1 request from the stream.
///
/// ```text
/// GET /index.html HTTP/1.1
/// Host: www.example.com
/// Content-Length: 13
///
/// Hello, world!
/// ```
pub fn parse<R: BufRead>(reader: &mut R) -> Result<Request, ParseError> {
    let mut request_line = String::new();
    let n = reader.read_line(&mut request_line)?;
    if n == 0 || request_line.trim().is_empty() {
        return Err(ParseError::EmptyRequestLine);
    }

    // Exactly 3 whitespace-separated tokens: METHOD PATH VERSION.
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(ParseError::InvalidRequestLine(
            request_line.trim().to_string(),
        ));
    }

    let method = parts[0].to_ascii_uppercase();
    let path = parts[1].to_string();
    let version = parts[2];
    if !version.starts_with("HTTP/1.1") {
        return Err(ParseError::InvalidVersion(version.to_string()));
    }

    // Headers until a blank line. EOF here ends the header section; a
    // missing body is caught below against Content-Length.
    let mut headers: HashMap<String, String> = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            break;
        }

        let colon = line
            .find(':')
            .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;
        let name = line[..colon].trim().to_string();
        let value = line[colon + 1..].trim().to_string();

        // Last occurrence wins, regardless of the casing it arrived in.
        headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        headers.insert(name, value);
    }

    let mut body = String::new();
    if let Some(raw_len) = header_case_insensitive(&headers, "Content-Length") {
        // usize::from_str rejects negatives and garbage alike.
        let content_length: usize = raw_len
            .parse()
            .map_err(|_| ParseError::InvalidContentLength(raw_len.to_string()))?;

        if content_length > 0 {
            let mut buf = vec![0u8; content_length];
            let mut total_read = 0;
            while total_read < content_length {
                // A single read may return fewer bytes than requested (slow
                // or adversarial sender); keep reading until the declared
                // count is satisfied or the stream genuinely ends.
                let read = reader.read(&mut buf[total_read..])?;
                if read == 0 {
                    return Err(ParseError::UnexpectedEof);
                }
                total_read += read;
            }
            body = String::from_utf8_lossy(&buf).into_owned();
        }
    }

    Ok(Request::new(method, path, headers, body))
}

fn header_case_insensitive<'a>(
    headers: &'a HashMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

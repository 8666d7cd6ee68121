//! Incremental request-completeness detection for the reactor engine.
//!
//! # Responsibilities
//! - Accumulate raw bytes as they arrive from a non-blocking socket
//! - Decide "is this request fully received yet" in O(new bytes) per event
//!
//! # Design Decisions
//! - This is a completeness gate, not a parser: once complete, the buffered
//!   bytes go through the same [`crate::http::parse`] as the blocking engines
//! - The `\r\n\r\n` scan resumes where the previous append left off and the
//!   terminator offset is cached once found
//! - The `Content-Length` header scan runs once over the header bytes
//!   (case-insensitive byte comparison) and the declared length is cached;
//!   a non-numeric value gates as length 0 and is rejected later by the
//!   real parser

const HEADER_TERMINATOR: &[u8; 4] = b"\r\n\r\n";
const CONTENT_LENGTH_PATTERN: &[u8] = b"content-length:";

/// Growable accumulation buffer with cached framing state for one in-flight
/// request.
#[derive(Debug, Default)]
pub struct RequestFramer {
    buf: Vec<u8>,
    /// Resume point for the terminator scan; everything before it is known
    /// terminator-free.
    scan_pos: usize,
    /// Offset of `\r\n\r\n` once found.
    header_end: Option<usize>,
    /// Declared body length once extracted from the header bytes.
    content_length: Option<usize>,
}

impl RequestFramer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(8 * 1024),
            ..Self::default()
        }
    }

    /// Append newly read bytes to the accumulation buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True once the buffer holds a complete request: the header terminator
    /// has been seen and at least `Content-Length` bytes (0 if the header is
    /// absent) follow it.
    pub fn is_complete(&mut self) -> bool {
        let len = self.buf.len();
        if len < HEADER_TERMINATOR.len() {
            return false;
        }

        if self.header_end.is_none() {
            let mut i = self.scan_pos;
            while i + HEADER_TERMINATOR.len() <= len {
                if &self.buf[i..i + HEADER_TERMINATOR.len()] == HEADER_TERMINATOR {
                    self.header_end = Some(i);
                    break;
                }
                i += 1;
            }
            if self.header_end.is_none() {
                // The terminator may straddle the next append: keep the last
                // three bytes in scan range.
                self.scan_pos = len - (HEADER_TERMINATOR.len() - 1);
                return false;
            }
        }

        let header_end = self.header_end.unwrap_or(0);
        let declared = *self
            .content_length
            .get_or_insert_with(|| extract_content_length(&self.buf[..header_end]));

        let body_start = header_end + HEADER_TERMINATOR.len();
        len - body_start >= declared
    }

    /// Hand the accumulated bytes off, resetting the framer.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.scan_pos = 0;
        self.header_end = None;
        self.content_length = None;
        std::mem::take(&mut self.buf)
    }
}

/// Scan header bytes for a `Content-Length:`-shaped header and extract its
/// integer value. Absent or non-numeric values yield 0; the authoritative
/// validation happens in the real parser afterwards.
fn extract_content_length(headers: &[u8]) -> usize {
    let pattern = CONTENT_LENGTH_PATTERN;
    if headers.len() < pattern.len() {
        return 0;
    }

    for i in 0..=headers.len() - pattern.len() {
        let matches = headers[i..i + pattern.len()]
            .iter()
            .zip(pattern)
            .all(|(b, p)| b.eq_ignore_ascii_case(p));
        if !matches {
            continue;
        }

        let mut pos = i + pattern.len();
        while pos < headers.len() && (headers[pos] == b' ' || headers[pos] == b'\t') {
            pos += 1;
        }

        let mut length: usize = 0;
        let mut saw_digit = false;
        while pos < headers.len() && headers[pos].is_ascii_digit() {
            // Saturate on absurd declared lengths instead of overflowing;
            // such a request simply never gates as complete.
            length = length
                .saturating_mul(10)
                .saturating_add(usize::from(headers[pos] - b'0'));
            saw_digit = true;
            pos += 1;
        }
        return if saw_digit { length } else { 0 };
    }

    0
}

//! Parsed HTTP request value type.

use std::collections::HashMap;

/// A parsed HTTP/1.1 request.
///
/// Immutable once constructed. The method is normalized to upper-case by the
/// parser; the path is kept raw (no percent-decoding). Header names preserve
/// their original casing but lookups are case-insensitive, and duplicate
/// names (in any casing) are collapsed last-write-wins at insertion.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

impl Request {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        headers: HashMap<String, String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers,
            body: body.into(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up a header value case-insensitively (RFC 7230: header names
    /// are case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Defensive copy of the header map.
    pub fn headers(&self) -> HashMap<String, String> {
        self.headers.clone()
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Request{{method={}, path={}, headers={}, body_len={}}}",
            self.method,
            self.path,
            self.headers.len(),
            self.body.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Request {
        let mut headers = HashMap::new();
        headers.insert("Host".to_string(), "localhost".to_string());
        headers.insert("Content-Length".to_string(), "5".to_string());
        Request::new("GET", "/index", headers, "hello")
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = sample();
        assert_eq!(req.header("Content-Length"), Some("5"));
        assert_eq!(req.header("content-length"), Some("5"));
        assert_eq!(req.header("CONTENT-LENGTH"), Some("5"));
        assert_eq!(req.header("X-Missing"), None);
    }

    #[test]
    fn headers_returns_defensive_copy() {
        let req = sample();
        let mut copy = req.headers();
        copy.insert("Injected".to_string(), "1".to_string());
        assert_eq!(req.header("Injected"), None);
    }
}

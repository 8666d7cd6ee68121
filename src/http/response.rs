//! HTTP response value type, builder, and serializer.

use std::collections::HashMap;

/// An HTTP/1.1 response.
///
/// Immutable once constructed; "modifying" a response (e.g. attaching a
/// `Connection` header) yields a new value via [`Response::with_header`].
#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    reason_phrase: String,
    headers: HashMap<String, String>,
    body: String,
}

impl Response {
    pub fn new(
        status_code: u16,
        reason_phrase: impl Into<String>,
        headers: HashMap<String, String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            reason_phrase: reason_phrase.into(),
            headers,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason_phrase
    }

    /// Defensive copy of the header map.
    pub fn headers(&self) -> HashMap<String, String> {
        self.headers.clone()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Return a new response with the given header set (replacing any
    /// existing value under the same exact name).
    pub fn with_header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers = self.headers.clone();
        headers.insert(name.into(), value.into());
        Self {
            status_code: self.status_code,
            reason_phrase: self.reason_phrase.clone(),
            headers,
            body: self.body.clone(),
        }
    }

    /// Serialize following the HTTP/1.1 wire format:
    ///
    /// ```text
    /// HTTP/1.1 {status} {reason}\r\n
    /// {Name}: {Value}\r\n
    /// ...
    /// \r\n
    /// {body}
    /// ```
    ///
    /// Header iteration order is not significant.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("HTTP/1.1 ");
        out.push_str(&self.status_code.to_string());
        out.push(' ');
        out.push_str(&self.reason_phrase);
        out.push_str("\r\n");

        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }

        out.push_str("\r\n");
        out.push_str(&self.body);
        out.into_bytes()
    }

    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::builder()
            .status(200, "OK")
            .header("Content-Type", "text/plain")
            .body(body)
            .build()
    }

    pub fn not_found() -> Self {
        Self::builder()
            .status(404, "Not Found")
            .header("Content-Type", "text/plain")
            .body("404 Not Found")
            .build()
    }

    pub fn internal_server_error() -> Self {
        Self::builder()
            .status(500, "Internal Server Error")
            .header("Content-Type", "text/plain")
            .body("500 Internal Server Error")
            .build()
    }

    pub fn service_unavailable() -> Self {
        Self::builder()
            .status(503, "Service Unavailable")
            .header("Content-Type", "text/plain")
            .body("503 Service Unavailable")
            .build()
    }
}

/// Builder for [`Response`] values.
///
/// Setting a non-empty body auto-computes a `Content-Length` header from the
/// body's UTF-8 byte length.
#[derive(Debug)]
pub struct Builder {
    status_code: u16,
    reason_phrase: String,
    headers: HashMap<String, String>,
    body: String,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            status_code: 200,
            reason_phrase: "OK".to_string(),
            headers: HashMap::new(),
            body: String::new(),
        }
    }
}

impl Builder {
    pub fn status(mut self, code: u16, phrase: impl Into<String>) -> Self {
        self.status_code = code;
        self.reason_phrase = phrase.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        if !self.body.is_empty() {
            self.headers.insert(
                "Content-Length".to_string(),
                self.body.len().to_string(),
            );
        }
        self
    }

    pub fn build(self) -> Response {
        Response::new(self.status_code, self.reason_phrase, self.headers, self.body)
    }
}

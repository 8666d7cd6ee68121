//! Per-connection session: the parse → route → respond → keep-alive loop.
//!
//! # Responsibilities
//! - Drive one accepted socket through sequential request/response exchanges
//! - Enforce the idle read timeout before every request
//! - Decide keep-alive vs close before the response bytes are written
//! - Record metrics and emit the one-line request summary
//!
//! # State machine
//! ```text
//! AwaitRequest ──▶ Processing ──▶ Responding ──▶ AwaitRequest (keep-alive)
//!       │                                              │
//!       └──── timeout / parse error / io error ────────┴──▶ Closed
//! ```

use std::io::{BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http::{parse, Request, Response};
use crate::metrics::Metrics;
use crate::routing::Router;

/// Blocking handler for one accepted connection. Used verbatim by the
/// serial, thread-per-connection, and bounded-pool engines; the reactor
/// runs an equivalent split pipeline instead.
#[derive(Clone)]
pub struct ConnectionHandler {
    router: Arc<Router>,
    metrics: Arc<Metrics>,
    idle_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(router: Arc<Router>, metrics: Arc<Metrics>, idle_timeout: Duration) -> Self {
        Self {
            router,
            metrics,
            idle_timeout,
        }
    }

    /// Run the session until the connection closes. Consumes the socket;
    /// every exit path releases it.
    pub fn handle(&self, stream: TcpStream) {
        if let Err(e) = self.run(&stream) {
            tracing::debug!(error = %e, "connection error");
        }
        // Socket drops here on every path.
    }

    fn run(&self, stream: &TcpStream) -> std::io::Result<()> {
        // SO_RCVTIMEO persists, so the deadline applies to every read in
        // the loop, not just the first.
        stream.set_read_timeout(Some(self.idle_timeout))?;

        // One buffered reader for the whole connection: read-ahead bytes
        // must survive across keep-alive exchanges.
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        let mut keep_alive = true;
        while keep_alive {
            let request = match parse(&mut reader) {
                Ok(request) => request,
                Err(e) if e.is_timeout() => {
                    // Benign: the peer just went quiet. No metrics.
                    tracing::debug!("idle timeout, closing connection");
                    break;
                }
                Err(crate::http::ParseError::Io(e)) => {
                    // Peer reset or similar; not a failed request.
                    tracing::debug!(error = %e, "i/o error, closing connection");
                    break;
                }
                Err(e) => {
                    // Malformed input always terminates the connection.
                    tracing::warn!(error = %e, "parse error, closing connection");
                    break;
                }
            };

            self.metrics.on_request_start();
            let start = Instant::now();

            let client_wants_keep_alive = request
                .header("Connection")
                .is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"));

            let response = self.router.route(&request);

            // The close decision is made here, before any bytes go out,
            // because it determines the Connection header value.
            let response = if client_wants_keep_alive {
                response.with_header("Connection", "keep-alive")
            } else {
                keep_alive = false;
                response.with_header("Connection", "close")
            };

            writer.write_all(&response.to_bytes())?;
            writer.flush()?;

            let duration_ms = start.elapsed().as_millis() as u64;
            self.metrics.on_request_end(duration_ms);
            log_request(&request, &response, duration_ms);
        }

        Ok(())
    }
}

fn log_request(request: &Request, response: &Response, duration_ms: u64) {
    tracing::info!(
        method = request.method(),
        path = request.path(),
        status = response.status_code(),
        reason = response.reason_phrase(),
        duration_ms,
        "request handled"
    );
}

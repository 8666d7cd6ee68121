//! Event-driven reactor engine.
//!
//! # Responsibilities
//! - Multiplex accept/read/write readiness on a single mio `Poll` thread
//! - Accumulate request bytes per connection and gate completeness with the
//!   [`RequestFramer`] (never running the full parser on the loop thread)
//! - Offload parse/route/serialize to a worker pool and collect completions
//!   through a concurrent queue drained after a `Waker` wake-up
//!
//! # Design Decisions
//! - All registry mutation happens on the loop thread: workers publish
//!   `(token, result)` completions and wake the poll; the loop stages the
//!   response bytes and switches the connection's interest to WRITABLE.
//!   Interest changes made from a worker would be invisible to a blocked
//!   `poll` until woken anyway, so the wake-up carries the whole hand-off.
//! - The worker pool is sized generously and accepts all offered work; it
//!   has no bounded-rejection policy of its own.
//!
//! # Known gaps (inherited semantics, kept deliberately)
//! - No keep-alive: every response carries `Connection: close` and the
//!   socket closes once the response is flushed.
//! - No per-channel idle timeout: a silent peer holds its slot until it
//!   disconnects.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::http::{parse, ParseError, Request, Response};
use crate::metrics::Metrics;
use crate::routing::Router;
use crate::server::framer::RequestFramer;
use crate::server::pool::{OverloadPolicy, PoolConfig, WorkerPool};
use crate::server::{Engine, EngineError};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
/// Connection tokens start above the reserved ones.
const FIRST_CONNECTION: usize = 2;

const READ_CHUNK: usize = 8 * 1024;
const EVENTS_CAPACITY: usize = 1024;

/// Per-connection context owned exclusively by the loop thread.
struct Connection {
    stream: TcpStream,
    framer: RequestFramer,
    state: ConnState,
    /// Staged outbound bytes plus write cursor, set once a worker finishes.
    response: Vec<u8>,
    written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    /// Accumulating request bytes.
    Reading,
    /// Handed off to a worker; read events are ignored.
    Processing,
    /// Flushing the staged response.
    Writing,
}

/// Unit of work handed to the worker pool: one complete request's bytes.
struct Job {
    token: Token,
    bytes: Vec<u8>,
}

/// Worker -> loop hand-off: staged response bytes or a fatal error.
type Completion = (Token, Result<Vec<u8>, ParseError>);

pub struct ReactorEngine {
    bind_address: String,
    router: Arc<Router>,
    metrics: Arc<Metrics>,
    worker_threads: usize,
    queue_capacity: usize,
    grace: Duration,
    running: Arc<AtomicBool>,
    local_addr: Mutex<Option<SocketAddr>>,
    waker: Mutex<Option<Arc<Waker>>>,
}

impl ReactorEngine {
    pub fn new(
        bind_address: impl Into<String>,
        router: Arc<Router>,
        metrics: Arc<Metrics>,
        worker_threads: usize,
        queue_capacity: usize,
        grace: Duration,
    ) -> Self {
        Self {
            bind_address: bind_address.into(),
            router,
            metrics,
            worker_threads,
            queue_capacity,
            grace,
            running: Arc::new(AtomicBool::new(false)),
            local_addr: Mutex::new(None),
            waker: Mutex::new(None),
        }
    }

    fn build_worker_pool(
        &self,
        completions: Sender<Completion>,
        waker: Arc<Waker>,
    ) -> WorkerPool<Job> {
        let router = Arc::clone(&self.router);
        let metrics = Arc::clone(&self.metrics);
        let config = PoolConfig {
            core_size: self.worker_threads,
            max_size: self.worker_threads,
            queue_capacity: self.queue_capacity,
            overload_policy: OverloadPolicy::Abort,
        };

        WorkerPool::new("reactor", config, move |job: Job| {
            let result = process_request(&router, &metrics, &job.bytes);
            // The loop may already be gone during shutdown; both the send
            // and the wake are best-effort then.
            let _ = completions.send((job.token, result));
            let _ = waker.wake();
        })
    }

    fn event_loop(
        &self,
        poll: &mut Poll,
        listener: &mut TcpListener,
        pool: &WorkerPool<Job>,
        completions: &Receiver<Completion>,
    ) -> Result<(), EngineError> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let mut connections: HashMap<Token, Connection> = HashMap::new();
        let mut next_token = FIRST_CONNECTION;

        while self.running.load(Ordering::Acquire) {
            if let Err(e) = poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(EngineError::EventLoop(e));
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => {
                        accept_ready(poll, listener, &mut connections, &mut next_token);
                    }
                    WAKER => {
                        drain_completions(poll, completions, &mut connections);
                    }
                    token => {
                        if event.is_readable() {
                            read_ready(poll, token, &mut connections, pool);
                        }
                        if event.is_writable() {
                            write_ready(poll, token, &mut connections);
                        }
                    }
                }
            }
        }

        // Remaining connections close when the map drops.
        Ok(())
    }
}

impl Engine for ReactorEngine {
    fn start(&self) -> Result<(), EngineError> {
        let addr: SocketAddr = self
            .bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| EngineError::Bind {
                addr: self.bind_address.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, e),
            })?;
        let mut listener = TcpListener::bind(addr).map_err(|e| EngineError::Bind {
            addr: self.bind_address.clone(),
            source: e,
        })?;
        let local = listener.local_addr()?;

        let mut poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        let (completions_tx, completions_rx) = crossbeam_channel::unbounded::<Completion>();
        let pool = self.build_worker_pool(completions_tx, Arc::clone(&waker));

        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(local);
        *self.waker.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&waker));
        self.running.store(true, Ordering::Release);

        tracing::info!(
            engine = %self.name(),
            address = %local,
            workers = self.worker_threads,
            "server started"
        );

        let result = self.event_loop(&mut poll, &mut listener, &pool, &completions_rx);

        pool.shutdown(self.grace);
        *self.waker.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::info!(engine = %self.name(), "server stopped");
        result
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(waker) = self
            .waker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            let _ = waker.wake();
        }
    }

    fn name(&self) -> String {
        "reactor event-driven server".to_string()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Worker-side pipeline: full parse with the shared codec, route, serialize
/// with `Connection: close`, and record metrics.
fn process_request(
    router: &Router,
    metrics: &Metrics,
    bytes: &[u8],
) -> Result<Vec<u8>, ParseError> {
    let mut reader = bytes;
    let request = parse(&mut reader)?;

    metrics.on_request_start();
    let start = Instant::now();

    let response = router.route(&request).with_header("Connection", "close");
    let out = response.to_bytes();

    let duration_ms = start.elapsed().as_millis() as u64;
    metrics.on_request_end(duration_ms);
    log_request(&request, &response, duration_ms);

    Ok(out)
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

fn accept_ready(
    poll: &Poll,
    listener: &mut TcpListener,
    connections: &mut HashMap<Token, Connection>,
    next_token: &mut usize,
) {
    loop {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                let token = Token(*next_token);
                *next_token += 1;

                if let Err(e) = poll
                    .registry()
                    .register(&mut stream, token, Interest::READABLE)
                {
                    tracing::error!(error = %e, "failed to register accepted connection");
                    continue;
                }
                tracing::debug!(peer = %peer, token = token.0, "accepted connection");
                connections.insert(
                    token,
                    Connection {
                        stream,
                        framer: RequestFramer::new(),
                        state: ConnState::Reading,
                        response: Vec::new(),
                        written: 0,
                    },
                );
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "error accepting connection");
                break;
            }
        }
    }
}

/// Move worker results into their connections and switch interest to
/// WRITABLE. Runs on the loop thread only.
fn drain_completions(
    poll: &Poll,
    completions: &Receiver<Completion>,
    connections: &mut HashMap<Token, Connection>,
) {
    for (token, result) in completions.try_iter() {
        let Some(conn) = connections.get_mut(&token) else {
            // Connection already closed (peer reset mid-processing).
            continue;
        };
        match result {
            Ok(bytes) => {
                conn.response = bytes;
                conn.written = 0;
                conn.state = ConnState::Writing;
                if let Err(e) =
                    poll.registry()
                        .reregister(&mut conn.stream, token, Interest::WRITABLE)
                {
                    tracing::error!(error = %e, "failed to switch connection to writable");
                    close_connection(poll, token, connections);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "worker failed to process request");
                close_connection(poll, token, connections);
            }
        }
    }
}

fn read_ready(
    poll: &Poll,
    token: Token,
    connections: &mut HashMap<Token, Connection>,
    pool: &WorkerPool<Job>,
) {
    let Some(conn) = connections.get_mut(&token) else {
        return;
    };

    let mut buf = [0u8; READ_CHUNK];
    loop {
        match conn.stream.read(&mut buf) {
            Ok(0) => {
                // Peer closed.
                close_connection(poll, token, connections);
                return;
            }
            Ok(n) => conn.framer.extend(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "read error, closing connection");
                close_connection(poll, token, connections);
                return;
            }
        }
    }

    // The completeness gate runs here; the full parse runs on a worker.
    if conn.state == ConnState::Reading && conn.framer.is_complete() {
        conn.state = ConnState::Processing;
        let bytes = conn.framer.take_bytes();
        if pool.submit(Job { token, bytes }).is_err() {
            // Worker queue saturated or shutting down.
            tracing::warn!(token = token.0, "worker pool unavailable, closing connection");
            close_connection(poll, token, connections);
        }
    }
}

fn write_ready(poll: &Poll, token: Token, connections: &mut HashMap<Token, Connection>) {
    let Some(conn) = connections.get_mut(&token) else {
        return;
    };
    if conn.state != ConnState::Writing {
        return;
    }

    while conn.written < conn.response.len() {
        match conn.stream.write(&conn.response[conn.written..]) {
            Ok(n) => conn.written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "write error, closing connection");
                close_connection(poll, token, connections);
                return;
            }
        }
    }

    // Fully flushed: the reactor does not keep connections alive.
    close_connection(poll, token, connections);
}

fn close_connection(poll: &Poll, token: Token, connections: &mut HashMap<Token, Connection>) {
    if let Some(mut conn) = connections.remove(&token) {
        if let Err(e) = poll.registry().deregister(&mut conn.stream) {
            tracing::debug!(error = %e, "failed to deregister connection");
        }
    }
}

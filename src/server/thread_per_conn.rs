//! Thread-per-connection engine.
//!
//! The accept loop spawns one new worker thread per accepted connection,
//! unbounded: no backpressure, thread count scales with concurrent
//! connections.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::server::{nudge_listener, ConnectionHandler, Engine, EngineError};

pub struct ThreadPerConnEngine {
    bind_address: String,
    handler: ConnectionHandler,
    grace: Duration,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPerConnEngine {
    pub fn new(
        bind_address: impl Into<String>,
        handler: ConnectionHandler,
        grace: Duration,
    ) -> Self {
        Self {
            bind_address: bind_address.into(),
            handler,
            grace,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Wait out in-flight connection threads, abandoning any still busy
    /// after the grace period.
    fn drain_workers(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline && handles.iter().any(|h| !h.is_finished()) {
            thread::sleep(Duration::from_millis(10));
        }

        let mut stragglers = 0;
        for handle in handles {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                stragglers += 1;
            }
        }
        if stragglers > 0 {
            tracing::warn!(stragglers, "grace period exceeded; abandoning connection threads");
        }
    }
}

impl Engine for ThreadPerConnEngine {
    fn start(&self) -> Result<(), EngineError> {
        let listener = TcpListener::bind(&self.bind_address).map_err(|e| EngineError::Bind {
            addr: self.bind_address.clone(),
            source: e,
        })?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(addr);
        self.running.store(true, Ordering::Release);

        tracing::info!(engine = %self.name(), address = %addr, "server started");

        while self.running.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    let handler = self.handler.clone();
                    match thread::Builder::new()
                        .name("conn-handler".to_string())
                        .spawn(move || handler.handle(stream))
                    {
                        Ok(handle) => {
                            let mut workers =
                                self.workers.lock().unwrap_or_else(|e| e.into_inner());
                            // Finished handles would otherwise pile up forever.
                            workers.retain(|h| !h.is_finished());
                            workers.push(handle);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to spawn connection thread")
                        }
                    }
                }
                Err(e) => {
                    if self.running.load(Ordering::Acquire) {
                        tracing::error!(error = %e, "error accepting connection");
                    }
                }
            }
        }

        drop(listener);
        self.drain_workers();
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::info!(engine = %self.name(), "server stopped");
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(addr) = *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) {
            nudge_listener(addr);
        }
    }

    fn name(&self) -> String {
        "thread-per-connection server".to_string()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }
}

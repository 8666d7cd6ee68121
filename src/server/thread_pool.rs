//! Bounded-pool engine.
//!
//! The accept loop submits each connection to a fixed-shape worker pool.
//! When the pool rejects a submission, the configured [`OverloadPolicy`]
//! decides: `Abort` answers with a 503 and closes, `CallerRuns` handles the
//! connection on the accept thread itself (throttling the accept rate),
//! `DiscardOldest` evicts the oldest queued connection.

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::http::Response;
use crate::server::pool::{PoolConfig, WorkerPool};
use crate::server::{nudge_listener, ConnectionHandler, Engine, EngineError};

pub struct ThreadPoolEngine {
    bind_address: String,
    handler: ConnectionHandler,
    pool_config: PoolConfig,
    grace: Duration,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    pool: Mutex<Option<Arc<WorkerPool<TcpStream>>>>,
}

impl ThreadPoolEngine {
    pub fn new(
        bind_address: impl Into<String>,
        handler: ConnectionHandler,
        pool_config: PoolConfig,
        grace: Duration,
    ) -> Self {
        Self {
            bind_address: bind_address.into(),
            handler,
            pool_config,
            grace,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            pool: Mutex::new(None),
        }
    }

    /// Abort-policy rejection path: answer the peer with a 503 and close.
    /// This is an expected overload outcome, not an error.
    fn handle_overload(mut stream: TcpStream) {
        let response = Response::service_unavailable().with_header("Connection", "close");
        if let Err(e) = stream
            .write_all(&response.to_bytes())
            .and_then(|()| stream.flush())
        {
            tracing::debug!(error = %e, "failed to send 503 to rejected connection");
        } else {
            tracing::info!("pool saturated, rejected connection with 503");
        }
    }
}

impl Engine for ThreadPoolEngine {
    fn start(&self) -> Result<(), EngineError> {
        let listener = TcpListener::bind(&self.bind_address).map_err(|e| EngineError::Bind {
            addr: self.bind_address.clone(),
            source: e,
        })?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) = Some(addr);

        let handler = self.handler.clone();
        let pool = Arc::new(WorkerPool::new(
            "http",
            self.pool_config.clone(),
            move |stream: TcpStream| handler.handle(stream),
        ));
        *self.pool.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&pool));
        self.running.store(true, Ordering::Release);

        tracing::info!(
            engine = %self.name(),
            address = %addr,
            core_size = self.pool_config.core_size,
            max_size = self.pool_config.max_size,
            queue_capacity = self.pool_config.queue_capacity,
            policy = ?self.pool_config.overload_policy,
            elastic = self.pool_config.is_elastic(),
            "server started"
        );

        while self.running.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, _peer)) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    // CallerRuns and DiscardOldest are absorbed inside the
                    // pool; only Abort (or shutdown) hands the socket back.
                    if let Err(stream) = pool.submit(stream) {
                        Self::handle_overload(stream);
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
        if let Some(pool) = self
            .pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            pool.shutdown(self.grace);
        }
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
        format!(
            "thread-pool server (pool={}-{}, queue={})",
            self.pool_config.core_size, self.pool_config.max_size, self.pool_config.queue_capacity
        )
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }
}

//! Serial single-threaded engine.
//!
//! One thread accepts and fully processes one connection at a time. Under
//! load, new connections simply wait in the OS accept backlog; there is no
//! explicit shedding.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::server::{nudge_listener, ConnectionHandler, Engine, EngineError};

pub struct SingleThreadEngine {
    bind_address: String,
    handler: ConnectionHandler,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl SingleThreadEngine {
    pub fn new(bind_address: impl Into<String>, handler: ConnectionHandler) -> Self {
        Self {
            bind_address: bind_address.into(),
            handler,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
        }
    }
}

impl Engine for SingleThreadEngine {
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
                        break; // stop()'s wake-up connect
                    }
                    self.handler.handle(stream);
                }
                Err(e) => {
                    if self.running.load(Ordering::Acquire) {
                        tracing::error!(error = %e, "error accepting connection");
                    }
                }
            }
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
        "single-threaded server".to_string()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }
}

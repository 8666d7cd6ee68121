//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML config files,
//! and every section has sensible defaults so a config file is optional.

use serde::{Deserialize, Serialize};

pub use crate::server::pool::{OverloadPolicy, PoolConfig};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Bounded-pool engine shape and overload policy.
    pub pool: PoolConfig,

    /// Reactor engine worker pool sizing.
    pub reactor: ReactorConfig,

    /// Shutdown grace period.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Idle timeout for keep-alive connections, in milliseconds. Applied as
    /// the read deadline before every request on an open connection.
    pub idle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { idle_ms: 5_000 }
    }
}

/// Reactor engine worker pool sizing. The reactor pool is sized generously
/// and accepts all offered work; it has no bounded-rejection policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReactorConfig {
    /// Worker threads that run parse/route/serialize off the event loop.
    pub worker_threads: usize,

    /// Completion/submission queue capacity.
    pub queue_capacity: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            worker_threads: cores * 4,
            queue_capacity: 4_096,
        }
    }
}

/// Shutdown grace period configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for workers to drain before abandoning stragglers,
    /// in milliseconds.
    pub grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_ms: 5_000 }
    }
}

//! Concurrency engines.
//!
//! Four engines implement the same [`Engine`] contract over the same
//! request pipeline, differing only in how accepted connections are
//! assigned to execution contexts:
//!
//! | Engine | Scheduling model |
//! |---|---|
//! | [`SingleThreadEngine`] | one thread accepts and handles serially |
//! | [`ThreadPerConnEngine`] | one new thread per accepted connection |
//! | [`ThreadPoolEngine`] | bounded worker pool with an overload policy |
//! | [`ReactorEngine`] | mio event loop + worker offload |

pub mod connection;
pub mod framer;
pub mod pool;
pub mod reactor;
pub mod single_thread;
pub mod thread_per_conn;
pub mod thread_pool;

use std::net::SocketAddr;

use clap::ValueEnum;
use thiserror::Error;

pub use connection::ConnectionHandler;
pub use framer::RequestFramer;
pub use pool::{OverloadPolicy, PoolConfig, WorkerPool};
pub use reactor::ReactorEngine;
pub use single_thread::SingleThreadEngine;
pub use thread_per_conn::ThreadPerConnEngine;
pub use thread_pool::ThreadPoolEngine;

/// Errors raised by engine startup and the accept/event loops. Bind and
/// poll failures are fatal; per-connection errors never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("event loop failure: {0}")]
    EventLoop(#[from] std::io::Error),
}

/// Common contract for all four engines.
///
/// `start` binds the listening endpoint and runs until `stop` is invoked
/// from another thread. `stop` must cause `start` to return, release the
/// listener, and bring owned workers to a halt within the configured grace
/// period.
pub trait Engine: Send + Sync {
    fn start(&self) -> Result<(), EngineError>;

    fn stop(&self);

    /// Human-readable identity for logs and the startup banner.
    fn name(&self) -> String;

    /// The bound address once `start` has bound the listener. `None` until
    /// then. Needed for ephemeral-port deployments (and the stop-side
    /// wake-up connect that unblocks a blocking accept).
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Unblock a listener stuck in `accept` by dialing it once. Used by
/// `stop()` on the blocking engines, whose accept loops re-check the
/// running flag after every accept.
pub(crate) fn nudge_listener(addr: SocketAddr) {
    let target = if addr.ip().is_unspecified() {
        SocketAddr::new(std::net::Ipv4Addr::LOCALHOST.into(), addr.port())
    } else {
        addr
    };
    let _ = std::net::TcpStream::connect_timeout(&target, std::time::Duration::from_millis(200));
}

/// Engine selection, chosen by a single startup argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Serial single-threaded loop.
    Single,
    /// One thread per connection.
    Thread,
    /// Bounded thread pool.
    Pool,
    /// Event-driven reactor.
    Reactor,
}

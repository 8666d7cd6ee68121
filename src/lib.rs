//! httpforge: a from-scratch HTTP/1.1 server with four pluggable
//! concurrency engines.
//!
//! # Architecture
//! ```text
//!                    ┌─────────────┐
//!    TCP bytes ────▶ │ http::parse │ ────▶ Request
//!                    └─────────────┘          │
//!                                             ▼
//!                    ┌─────────────┐   ┌──────────────┐
//!    TCP bytes ◀──── │  Response   │ ◀─│    Router    │
//!                    └─────────────┘   └──────────────┘
//! ```
//!
//! The request pipeline (parse, route, serialize) is shared; the engines in
//! [`server`] differ only in how accepted connections are mapped onto
//! execution contexts:
//!
//! - [`server::SingleThreadEngine`] handles connections serially
//! - [`server::ThreadPerConnEngine`] spawns a thread per connection
//! - [`server::ThreadPoolEngine`] uses a bounded pool with an overload policy
//! - [`server::ReactorEngine`] multiplexes readiness events, offloading work
//!
//! [`metrics::Metrics`] aggregates counters and a rolling latency window
//! across whichever engine is running.

pub mod config;
pub mod http;
pub mod metrics;
pub mod routing;
pub mod server;

pub use config::{load_config, ConfigError, ServerConfig};
pub use http::{parse, ParseError, Request, Response};
pub use metrics::{Metrics, MetricsSnapshot};
pub use routing::Router;
pub use server::{
    Engine, EngineError, EngineKind, OverloadPolicy, PoolConfig, ReactorEngine,
    SingleThreadEngine, ThreadPerConnEngine, ThreadPoolEngine,
};

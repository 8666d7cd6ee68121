//! Server configuration.
//!
//! # Data Flow
//! ```text
//! defaults ──▶ ServerConfig ◀── TOML file (--config)
//!                   │
//!                   ▼
//!            CLI overrides (--port)
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ListenerConfig, PoolConfig, ReactorConfig, ServerConfig, ShutdownConfig, TimeoutConfig,
};

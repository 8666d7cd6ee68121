//! Request routing.
//!
//! # Responsibilities
//! - Store handlers keyed by exact method + path
//! - Dispatch a request to its handler, or produce the default 404
//!
//! # Design Decisions
//! - Exact string match only: no wildcards, no path parameters
//! - Immutable after registration (shared across engines via `Arc` without locks)
//! - `route` is total: it always returns some response

pub mod router;

pub use router::Router;

//! HTTP/1.1 wire codec.
//!
//! # Responsibilities
//! - Parse a raw byte stream into a [`Request`] value
//! - Serialize a [`Response`] value into raw bytes
//! - Defend against slow/partial reads when consuming bodies
//!
//! # Design Decisions
//! - No HTTP library: the codec operates directly on `std::io` streams
//! - Requests and responses are immutable once constructed
//! - UTF-8 throughout, so `Content-Length` always matches encoded byte length

pub mod parser;
pub mod request;
pub mod response;

pub use parser::{parse, ParseError};
pub use request::Request;
pub use response::Response;

//! HTTP/1.1 message framing
//!
//! This module provides the two halves of the framer:
//!
//! - [`builder`]: stateless serializers that turn method/path/status/body
//!   into wire bytes, bounded by the fixed 4096-byte serialization buffer
//! - [`parser`]: an incremental parser that consumes decrypted plaintext in
//!   arrival order and raises structured events (message begin, headers
//!   complete, body chunk, message complete) through a [`parser::ParseSink`]
//!
//! A body is not guaranteed to arrive as one contiguous chunk; the parser
//! emits one body event per arriving segment, so a single logical message
//! may produce several `on_data_received` callbacks.

pub mod builder;
pub mod message;
pub mod parser;

pub use builder::{build_request, build_response, MAX_WIRE_LEN};
pub use message::{Headers, Method, Status, Version};
pub use parser::{Direction, MessageHead, MessageParser, ParseSink};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP framing errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("message of {0} bytes exceeds the {MAX_WIRE_LEN} byte wire buffer")]
    TooLarge(usize),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 64;

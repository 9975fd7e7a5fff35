//! TLS transport for the connection engine
//!
//! [`TlsConfig`] wraps an openssl `SslContext` behind client/server
//! builders; [`TlsSession`] binds one TLS session to one socket and exposes
//! the non-blocking read/write surface the connection state machine drives.
//! Failures are classified the way the engine reports them: want-read and
//! want-write become [`TlsIo::Retry`], everything else becomes a
//! [`TlsFatal`] carrying one of the four classification strings.

pub mod config;
pub mod session;

pub use config::{ClientTlsBuilder, ServerTlsBuilder, TlsConfig};
pub use session::{FatalKind, TlsFatal, TlsIo, TlsSession};

/// Result type for TLS setup operations
pub type Result<T> = std::result::Result<T, TlsError>;

/// TLS setup and handshake errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("openssl error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("handshake failed: {0}")]
    Handshake(String),
}

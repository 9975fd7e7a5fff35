//! evhttps - event-driven TLS HTTP/1.1 endpoints
//!
//! This crate provides a symmetric pair of TLS-secured HTTP/1.1 endpoints:
//! a client that drives one outbound connection and a server that accepts
//! many inbound ones. Both sit on a single-threaded epoll reactor and report
//! everything that happens on a connection through a four-hook callback
//! capability.
//!
//! # Architecture
//!
//! Each [`connection::Connection`] binds one socket, one TLS session and one
//! incremental HTTP parser. The reactor signals readability, the connection
//! decrypts, the parser raises body events, and the application's
//! [`events::ConnectionEvents`] implementation replies through the
//! [`events::ConnectionHandle`] it was given.
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use evhttps::{ConnectionEvents, ConnectionHandle, HttpsClient, Method};
//!
//! struct Hello;
//!
//! impl ConnectionEvents for Hello {
//!     fn on_connected(&self, conn: &ConnectionHandle) {
//!         conn.send_request(Method::Get, "/hello", b"hello,server!").ok();
//!     }
//!     fn on_data_received(&self, _conn: &ConnectionHandle, data: &[u8]) {
//!         println!("reply: {}", String::from_utf8_lossy(data));
//!     }
//! }
//!
//! let client = HttpsClient::connect("localhost", 8443, Rc::new(Hello)).unwrap();
//! client.run().unwrap();
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod events;
pub mod http;
pub mod reactor;
pub mod server;
pub mod tls;

pub use client::HttpsClient;
pub use config::Config;
pub use events::{ConnectionEvents, ConnectionHandle, ConnectionId, SendError};
pub use http::{Method, Status};
pub use reactor::{EventSource, Reactor};
pub use server::HttpsServer;
pub use tls::{TlsConfig, TlsSession};

/// Result type for crate-level setup and run operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level errors
///
/// Setup failures (socket, reactor or TLS context construction) are
/// propagated through this type so an embedding caller can recover; nothing
/// in the crate terminates the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tls(#[from] tls::TlsError),

    #[error(transparent)]
    Http(#[from] http::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

//! Application-facing callback contract
//!
//! [`ConnectionEvents`] is the capability the application implements; every
//! method defaults to a no-op so a caller supplies only the hooks it cares
//! about. All hooks run synchronously on the reactor thread with a
//! [`ConnectionHandle`] as first argument.
//!
//! The handle is deliberately opaque: it exposes an identity for
//! correlation plus the write surface, and holds only weak references, so
//! retaining one past connection teardown degrades to [`SendError::Closed`]
//! instead of touching freed state.

use crate::http::{build_request, build_response, Method, Status};
use crate::tls::{TlsFatal, TlsIo, TlsSession};
use std::cell::RefCell;
use std::fmt;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

/// The four hooks of the connection engine
///
/// Guarantees per connection: `on_connected` at most once and always before
/// any data; `on_data_received` zero or more times, one call per parsed
/// body segment, in byte arrival order; `on_disconnected` at most once,
/// before `on_error` and teardown; `on_error` carries a human-readable
/// classification string.
pub trait ConnectionEvents {
    fn on_connected(&self, _conn: &ConnectionHandle) {}
    fn on_data_received(&self, _conn: &ConnectionHandle, _data: &[u8]) {}
    fn on_disconnected(&self, _conn: &ConnectionHandle) {}
    fn on_error(&self, _conn: &ConnectionHandle, _message: &str) {}
}

/// Opaque connection identity for callback correlation
///
/// Unique among open connections (it is the socket descriptor, which the OS
/// will not reuse while the connection holds it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(RawFd);

impl ConnectionId {
    pub(crate) fn new(fd: RawFd) -> Self {
        ConnectionId(fd)
    }

    pub(crate) fn raw(&self) -> RawFd {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Errors reported by the handle's write path
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,

    /// The transport cannot take the bytes right now. The engine does not
    /// buffer or requeue; the caller decides whether to retry.
    #[error("write would block")]
    WouldBlock,

    #[error(transparent)]
    Http(#[from] crate::http::Error),

    #[error("tls write failed: {0}")]
    Tls(TlsFatal),
}

/// Handle passed to every hook invocation
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tls: Option<Weak<RefCell<TlsSession>>>,
    events: Option<Weak<dyn ConnectionEvents>>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: ConnectionId,
        tls: &Rc<RefCell<TlsSession>>,
        events: &Rc<dyn ConnectionEvents>,
    ) -> Self {
        ConnectionHandle {
            id,
            tls: Some(Rc::downgrade(tls)),
            events: Some(Rc::downgrade(events)),
        }
    }

    /// A handle with no live connection behind it, used to report failures
    /// for sockets that never completed a handshake
    pub(crate) fn detached(id: ConnectionId) -> Self {
        ConnectionHandle {
            id,
            tls: None,
            events: None,
        }
    }

    /// Identity for correlating callbacks of the same connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Encrypt and send raw bytes
    ///
    /// One immediate write attempt: a retryable transport condition comes
    /// back as [`SendError::WouldBlock`], a fatal one additionally raises
    /// `on_error` with its classification before returning.
    pub fn send(&self, data: &[u8]) -> Result<(), SendError> {
        let tls = self
            .tls
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(SendError::Closed)?;
        let outcome = tls.borrow_mut().write(data);
        match outcome {
            Ok(TlsIo::Data(_)) => Ok(()),
            Ok(TlsIo::Retry) => Err(SendError::WouldBlock),
            Err(fatal) => {
                if let Some(events) = self.events.as_ref().and_then(Weak::upgrade) {
                    events.on_error(self, fatal.message());
                }
                Err(SendError::Tls(fatal))
            }
        }
    }

    /// Build and send an HTTP request
    pub fn send_request(&self, method: Method, path: &str, body: &[u8]) -> Result<(), SendError> {
        let wire = build_request(method, path, body)?;
        self.send(&wire)
    }

    /// Build and send an HTTP response
    pub fn send_response(
        &self,
        status: Status,
        reason: &str,
        body: &[u8],
    ) -> Result<(), SendError> {
        let wire = build_response(status, reason, body)?;
        self.send(&wire)
    }

    /// Start an orderly close of this connection
    ///
    /// Sends a close_notify (unless one was already exchanged); the peer's
    /// answer completes the close and drives normal teardown through the
    /// read path.
    pub fn close(&self) {
        if let Some(tls) = self.tls.as_ref().and_then(Weak::upgrade) {
            tls.borrow_mut().orderly_shutdown();
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish()
    }
}

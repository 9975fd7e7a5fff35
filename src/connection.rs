//! Per-connection state machine
//!
//! A [`Connection`] is the aggregate of one socket, one TLS session and one
//! HTTP parser, serving one peer. It is created only after a successful
//! handshake, lives as a registered [`EventSource`], and on each readiness
//! event drives decrypt -> parse -> dispatch without ever blocking the
//! reactor thread.
//!
//! States: ESTABLISHED -> CLOSING -> CLOSED. Teardown runs exactly once; a
//! second readiness event on a closing or closed connection is a no-op.

use crate::events::{ConnectionEvents, ConnectionHandle, ConnectionId};
use crate::http::parser::{Direction, MessageParser, ParseSink};
use crate::reactor::{EventSource, Reactor};
use crate::tls::{FatalKind, TlsIo, TlsSession};
use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::Rc;
use tracing::{debug, error, warn};

/// Read buffer size per readiness event
const READ_BUF_LEN: usize = 4096;

/// Which end of the connection this is
///
/// Only affects which message direction the parser expects and who
/// initiated the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn direction(self) -> Direction {
        match self {
            // A client reads responses, a server reads requests.
            Role::Client => Direction::Response,
            Role::Server => Direction::Request,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Established,
    Closing,
    Closed,
}

/// The per-socket aggregate
pub struct Connection {
    id: ConnectionId,
    state: ConnState,
    tls: Rc<RefCell<TlsSession>>,
    parser: MessageParser,
    events: Rc<dyn ConnectionEvents>,
}

/// Parse sink that forwards body segments to `on_data_received`
struct Dispatch<'a> {
    handle: &'a ConnectionHandle,
    events: &'a dyn ConnectionEvents,
}

impl ParseSink for Dispatch<'_> {
    fn on_body_chunk(&mut self, chunk: &[u8]) {
        self.events.on_data_received(self.handle, chunk);
    }
}

impl Connection {
    /// Promote a completed handshake into a live, registered connection
    ///
    /// Flips the socket to non-blocking, invokes `on_connected`, then takes
    /// the single read registration this connection is allowed.
    pub(crate) fn establish(
        tls: TlsSession,
        role: Role,
        events: Rc<dyn ConnectionEvents>,
        reactor: &Reactor,
    ) -> crate::Result<Rc<RefCell<Connection>>> {
        tls.set_nonblocking(true)?;
        let id = ConnectionId::new(tls.fd());
        debug!("{} established ({:?})", id, role);

        let conn = Rc::new(RefCell::new(Connection {
            id,
            state: ConnState::Established,
            tls: Rc::new(RefCell::new(tls)),
            parser: MessageParser::new(role.direction()),
            events,
        }));

        let (handle, events) = {
            let conn = conn.borrow();
            (conn.handle(), Rc::clone(&conn.events))
        };
        events.on_connected(&handle);

        if let Err(e) = reactor.register_read(conn.clone() as Rc<RefCell<dyn EventSource>>) {
            // on_connected already fired, so the application must also see
            // the connection die before it is discarded.
            let mut conn = conn.borrow_mut();
            conn.state = ConnState::Closed;
            events.on_disconnected(&handle);
            conn.tls.borrow_mut().close();
            return Err(e.into());
        }
        Ok(conn)
    }

    /// The opaque handle given to every hook for this connection
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.id, &self.tls, &self.events)
    }

    /// Tear the connection down exactly once
    ///
    /// `error` is the classification for `on_error`, or None for a clean
    /// peer close which reports only `on_disconnected`.
    fn teardown(&mut self, reactor: &Reactor, error: Option<&str>) {
        if self.state != ConnState::Established {
            return;
        }
        self.state = ConnState::Closing;

        let handle = self.handle();
        self.events.on_disconnected(&handle);
        if let Some(message) = error {
            self.events.on_error(&handle, message);
        }

        if let Err(e) = reactor.deregister(self.id.raw()) {
            debug!("{}: deregister failed: {}", self.id, e);
        }
        self.tls.borrow_mut().close();
        self.state = ConnState::Closed;
        debug!("{} closed", self.id);
    }

    /// Quiet teardown for a bootstrap that is exiting its loop
    ///
    /// No hooks fire: the reactor has already returned and the application
    /// initiated the exit. Skips the close_notify send if one was already
    /// exchanged on the session.
    pub(crate) fn release(&mut self, reactor: &Reactor) {
        if self.state != ConnState::Established {
            return;
        }
        self.state = ConnState::Closing;
        if let Err(e) = reactor.deregister(self.id.raw()) {
            debug!("{}: deregister failed: {}", self.id, e);
        }
        self.tls.borrow_mut().orderly_shutdown();
        self.state = ConnState::Closed;
    }
}

impl EventSource for Connection {
    fn fd(&self) -> RawFd {
        self.id.raw()
    }

    /// Decrypt available bytes and push them through the parser
    ///
    /// Drains the session until it reports retry: OpenSSL may buffer more
    /// plaintext than one read returns, and the socket alone will not
    /// signal readiness for it again.
    fn on_readable(&mut self, reactor: &Reactor) {
        let mut buf = [0u8; READ_BUF_LEN];
        loop {
            if self.state != ConnState::Established {
                return;
            }
            let outcome = self.tls.borrow_mut().read(&mut buf);
            match outcome {
                Ok(TlsIo::Retry) => return,
                Ok(TlsIo::Data(n)) => {
                    debug!("{}: {} plaintext bytes", self.id, n);
                    let handle = self.handle();
                    let events = Rc::clone(&self.events);
                    let mut sink = Dispatch {
                        handle: &handle,
                        events: events.as_ref(),
                    };
                    if let Err(e) = self.parser.feed(&buf[..n], &mut sink) {
                        error!("{}: http parse error: {}", self.id, e);
                        self.teardown(reactor, Some("http protocol error"));
                        return;
                    }
                }
                Err(fatal) => {
                    if fatal.kind() == FatalKind::Closed {
                        debug!("{}: peer closed", self.id);
                        self.teardown(reactor, None);
                    } else {
                        warn!("{}: read failed: {}", self.id, fatal);
                        self.teardown(reactor, Some(fatal.message()));
                    }
                    return;
                }
            }
        }
    }
}

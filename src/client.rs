//! HTTPS client bootstrap
//!
//! One outbound connection for the lifetime of the bootstrap: TCP connect,
//! TLS client handshake, reactor registration, then an event loop that
//! runs until it is stopped or the connection tears itself down. On loop
//! exit the connection is released in an orderly fashion, skipping the
//! close_notify send when the peer already signaled one.

use crate::connection::{Connection, Role};
use crate::events::{ConnectionEvents, ConnectionHandle, ConnectionId};
use crate::reactor::Reactor;
use crate::tls::TlsConfig;
use std::cell::RefCell;
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::rc::Rc;
use tracing::{debug, info};

/// A connected HTTPS client
pub struct HttpsClient {
    reactor: Reactor,
    conn: Rc<RefCell<Connection>>,
}

impl HttpsClient {
    /// Connect to `host:port` and complete the TLS handshake
    ///
    /// On handshake failure the callback set receives exactly one
    /// `on_error` (and never `on_connected`) before the error propagates.
    /// All setup failures are returned, never fatal to the process.
    pub fn connect(
        host: &str,
        port: u16,
        events: Rc<dyn ConnectionEvents>,
    ) -> crate::Result<Self> {
        // A peer may vanish between our write and its read; surface that as
        // an error return, not a signal.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }

        let config = TlsConfig::client().build()?;
        let stream = TcpStream::connect((host, port))?;
        let fd = stream.as_raw_fd();
        debug!("connected to {}:{} (fd {})", host, port, fd);

        let tls = match config.connect(stream) {
            Ok(tls) => tls,
            Err(e) => {
                events.on_error(
                    &ConnectionHandle::detached(ConnectionId::new(fd)),
                    &e.to_string(),
                );
                return Err(e.into());
            }
        };

        let reactor = Reactor::new()?;
        let conn = Connection::establish(tls, Role::Client, events, &reactor)?;
        Ok(HttpsClient { reactor, conn })
    }

    /// Handle for sending on the connection outside of a callback
    pub fn connection(&self) -> ConnectionHandle {
        self.conn.borrow().handle()
    }

    /// The reactor driving this client, e.g. for an explicit stop from a
    /// dispatched callback
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Run the event loop, then shut the connection down
    ///
    /// Returns when the loop is stopped or the connection deregistered
    /// itself after a close or error.
    pub fn run(&self) -> crate::Result<()> {
        self.reactor.run()?;
        info!("client event loop finished");
        self.conn.borrow_mut().release(&self.reactor);
        Ok(())
    }
}

//! HTTPS server accept loop
//!
//! The listener is itself an [`EventSource`]: each readiness event accepts
//! one socket, performs the server-side TLS handshake synchronously inside
//! the accept callback, and promotes the result into a registered
//! [`Connection`] sharing the server's TLS context and callback set.
//! Accept and handshake failures are logged (and reported through
//! `on_error` where a peer socket exists) without stopping the loop.

use crate::connection::{Connection, Role};
use crate::events::{ConnectionEvents, ConnectionHandle, ConnectionId};
use crate::reactor::{EventSource, Reactor};
use crate::tls::{TlsConfig, TlsError};
use socket2::{Domain, Socket, Type};
use std::cell::RefCell;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// Accept queue depth for the listening socket
const BACKLOG: i32 = 10;

struct Acceptor {
    listener: TcpListener,
    tls: TlsConfig,
    events: Rc<dyn ConnectionEvents>,
}

impl EventSource for Acceptor {
    fn fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    fn on_readable(&mut self, reactor: &Reactor) {
        let (stream, peer) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                error!("accept failed: {}", e);
                return;
            }
        };
        debug!("accepted {} (fd {})", peer, stream.as_raw_fd());
        let fd = stream.as_raw_fd();

        // The handshake runs synchronously on a blocking socket; the
        // accepted stream does not inherit the listener's non-blocking
        // mode, but make that explicit.
        if let Err(e) = stream.set_nonblocking(false) {
            warn!("failed to prepare accepted socket: {}", e);
            return;
        }

        let tls = match self.tls.accept(stream) {
            Ok(tls) => tls,
            Err(e) => {
                warn!("tls handshake with {} failed: {}", peer, e);
                self.events.on_error(
                    &ConnectionHandle::detached(ConnectionId::new(fd)),
                    &e.to_string(),
                );
                return;
            }
        };

        // A failed connection setup never brings the listener down.
        if let Err(e) = Connection::establish(tls, Role::Server, Rc::clone(&self.events), reactor)
        {
            warn!("connection setup for {} failed: {}", peer, e);
        }
    }
}

/// A bound, listening HTTPS server
pub struct HttpsServer {
    reactor: Reactor,
    local_addr: SocketAddr,
}

impl HttpsServer {
    /// Bind the listening socket and register it with a fresh reactor
    ///
    /// The TLS context (certificate and key already loaded) and the
    /// callback set are shared read-only by every accepted connection.
    /// Setup failures are returned, never fatal to the process.
    pub fn bind(
        port: u16,
        tls: TlsConfig,
        events: Rc<dyn ConnectionEvents>,
    ) -> crate::Result<Self> {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }

        if !tls.is_server() {
            return Err(TlsError::InvalidConfig(
                "server requires a server-side TLS configuration".to_string(),
            )
            .into());
        }

        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        socket.bind(&addr.into())?;
        socket.listen(BACKLOG)?;

        let listener: TcpListener = socket.into();
        // Readiness can be spurious (e.g. the peer reset before accept);
        // never let accept block the reactor thread.
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("listening on {}", local_addr);

        let reactor = Reactor::new()?;
        let acceptor = Rc::new(RefCell::new(Acceptor {
            listener,
            tls,
            events,
        }));
        reactor.register_read(acceptor as Rc<RefCell<dyn EventSource>>)?;

        Ok(HttpsServer {
            reactor,
            local_addr,
        })
    }

    /// Address the listener is bound to (resolves port 0 requests)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The reactor driving this server
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Accept and serve connections until the reactor is stopped
    pub fn run(&self) -> crate::Result<()> {
        self.reactor.run()?;
        info!("server event loop finished");
        Ok(())
    }
}

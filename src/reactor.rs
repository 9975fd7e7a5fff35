//! Single-threaded epoll reactor
//!
//! The reactor owns an epoll instance and a registry of [`EventSource`]s
//! keyed by socket descriptor. [`Reactor::run`] waits for readiness and
//! dispatches `on_readable` on the same thread, in arrival order; nothing
//! the reactor calls may block. The loop exits when [`Reactor::stop`] is
//! called from inside a dispatch, or when the last source deregisters
//! itself, which is how a client whose only connection closed terminates.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::rc::Rc;
use tracing::trace;

/// A registered handler for socket readiness
///
/// The seam an alternate readiness implementation would also satisfy: a
/// source knows its descriptor and reacts to it becoming readable.
pub trait EventSource {
    /// The socket descriptor this source watches
    fn fd(&self) -> RawFd;

    /// Called by the dispatch loop when the descriptor is readable
    fn on_readable(&mut self, reactor: &Reactor);
}

/// Level-triggered, single-threaded readiness dispatcher
pub struct Reactor {
    epoll: OwnedFd,
    sources: RefCell<HashMap<RawFd, Rc<RefCell<dyn EventSource>>>>,
    stopped: Cell<bool>,
}

impl Reactor {
    /// Create a new reactor
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Reactor {
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
            sources: RefCell::new(HashMap::new()),
            stopped: Cell::new(false),
        })
    }

    /// Register a source for read readiness
    ///
    /// A descriptor can hold at most one registration; a second attempt
    /// fails with the EEXIST the kernel reports.
    pub fn register_read(&self, source: Rc<RefCell<dyn EventSource>>) -> io::Result<()> {
        let fd = source.borrow().fd();
        trace!("register fd {} for read readiness", fd);
        let mut ev = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: fd as u64,
        };
        let rc = unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut ev)
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        self.sources.borrow_mut().insert(fd, source);
        Ok(())
    }

    /// Remove a source's registration
    ///
    /// A no-op for descriptors that are not registered.
    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        if self.sources.borrow_mut().remove(&fd).is_none() {
            return Ok(());
        }
        trace!("deregister fd {}", fd);
        let rc = unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                ptr::null_mut(),
            )
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Number of registered sources
    pub fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    /// Dispatch readiness events until stopped or no sources remain
    pub fn run(&self) -> io::Result<()> {
        self.stopped.set(false);
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; 64];

        loop {
            if self.stopped.get() || self.sources.borrow().is_empty() {
                return Ok(());
            }

            let n = unsafe {
                libc::epoll_wait(
                    self.epoll.as_raw_fd(),
                    events.as_mut_ptr(),
                    events.len() as i32,
                    -1,
                )
            };
            if n == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            for ev in &events[..n as usize] {
                let fd = ev.u64 as RawFd;
                // A source dispatched earlier in this batch may have
                // deregistered this one; look it up fresh.
                let source = self.sources.borrow().get(&fd).cloned();
                if let Some(source) = source {
                    source.borrow_mut().on_readable(self);
                }
                if self.stopped.get() {
                    break;
                }
            }
        }
    }

    /// Ask the dispatch loop to exit after the current iteration
    ///
    /// Immediate, not graceful: pending readiness is abandoned and any
    /// teardown of still-open connections is the caller's responsibility.
    pub fn stop(&self) {
        self.stopped.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    struct ByteSink {
        stream: UnixStream,
        received: Vec<u8>,
        // What to do once a full line arrived
        stop_loop: bool,
    }

    impl ByteSink {
        fn new(stream: UnixStream, stop_loop: bool) -> Self {
            stream.set_nonblocking(true).unwrap();
            ByteSink {
                stream,
                received: Vec::new(),
                stop_loop,
            }
        }
    }

    impl EventSource for ByteSink {
        fn fd(&self) -> RawFd {
            self.stream.as_raw_fd()
        }

        fn on_readable(&mut self, reactor: &Reactor) {
            let mut buf = [0u8; 64];
            match self.stream.read(&mut buf) {
                Ok(0) | Err(_) => {
                    reactor.deregister(self.fd()).unwrap();
                }
                Ok(n) => {
                    self.received.extend_from_slice(&buf[..n]);
                    if self.stop_loop {
                        reactor.stop();
                    } else {
                        reactor.deregister(self.fd()).unwrap();
                    }
                }
            }
        }
    }

    #[test]
    fn test_dispatch_and_stop_from_callback() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let reactor = Reactor::new().unwrap();
        let source = Rc::new(RefCell::new(ByteSink::new(local, true)));
        reactor.register_read(source.clone()).unwrap();

        remote.write_all(b"ready").unwrap();
        reactor.run().unwrap();

        assert_eq!(source.borrow().received, b"ready");
        assert_eq!(reactor.source_count(), 1);
    }

    #[test]
    fn test_run_exits_when_last_source_deregisters() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let reactor = Reactor::new().unwrap();
        let source = Rc::new(RefCell::new(ByteSink::new(local, false)));
        reactor.register_read(source.clone()).unwrap();

        remote.write_all(b"x").unwrap();
        reactor.run().unwrap();

        assert_eq!(reactor.source_count(), 0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let (local, _remote) = UnixStream::pair().unwrap();
        let reactor = Reactor::new().unwrap();
        let source = Rc::new(RefCell::new(ByteSink::new(local, true)));

        reactor.register_read(source.clone()).unwrap();
        assert!(reactor.register_read(source).is_err());
    }

    #[test]
    fn test_deregister_unknown_fd_is_noop() {
        let reactor = Reactor::new().unwrap();
        assert!(reactor.deregister(12345).is_ok());
    }

    #[test]
    fn test_run_with_empty_registry_returns_immediately() {
        let reactor = Reactor::new().unwrap();
        reactor.run().unwrap();
    }
}

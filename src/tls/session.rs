//! TLS session wrapper
//!
//! One [`TlsSession`] owns one TLS session bound to one socket. The
//! handshake runs synchronously on the still-blocking socket; afterwards the
//! bootstrap flips the socket to non-blocking and every read/write reports
//! [`TlsIo::Retry`] instead of waiting. Any other failure is classified into
//! a [`TlsFatal`] before it reaches the connection state machine.

use super::{TlsConfig, TlsError};
use openssl::ssl::{ErrorCode, HandshakeError, ShutdownState, Ssl, SslStream};
use std::fmt;
use std::io;
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, info};

/// Outcome of a non-blocking read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsIo {
    /// The operation moved this many bytes
    Data(usize),
    /// The operation would block; retry on the next readiness event
    Retry,
}

/// Classification of a fatal TLS failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// Malformed TLS record or protocol violation
    Protocol,
    /// OS-level failure underneath the session
    Syscall,
    /// Clean close_notify from the peer
    Closed,
    Unknown,
}

/// A fatal, non-retryable TLS failure
#[derive(Debug)]
pub struct TlsFatal {
    kind: FatalKind,
    detail: String,
}

impl TlsFatal {
    fn new(kind: FatalKind, detail: impl Into<String>) -> Self {
        TlsFatal {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FatalKind {
        self.kind
    }

    /// Human-readable classification string surfaced through `on_error`
    pub fn message(&self) -> &'static str {
        match self.kind {
            FatalKind::Protocol => "ssl library error",
            FatalKind::Syscall => "system call error",
            FatalKind::Closed => "ssl connection closed",
            FatalKind::Unknown => "unknown ssl error",
        }
    }
}

impl fmt::Display for TlsFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.message())
        } else {
            write!(f, "{}: {}", self.message(), self.detail)
        }
    }
}

fn classify(err: &openssl::ssl::Error) -> TlsFatal {
    let kind = match err.code() {
        ErrorCode::SSL => FatalKind::Protocol,
        ErrorCode::SYSCALL => FatalKind::Syscall,
        ErrorCode::ZERO_RETURN => FatalKind::Closed,
        _ => FatalKind::Unknown,
    };
    TlsFatal::new(kind, err.to_string())
}

fn handshake_error<S: fmt::Debug>(err: HandshakeError<S>) -> TlsError {
    match err {
        HandshakeError::SetupFailure(stack) => TlsError::Handshake(stack.to_string()),
        HandshakeError::Failure(mid) => {
            let fatal = classify(mid.error());
            TlsError::Handshake(fatal.to_string())
        }
        HandshakeError::WouldBlock(_) => {
            TlsError::Handshake("handshake would block".to_string())
        }
    }
}

/// One TLS session bound to one socket
pub struct TlsSession {
    stream: SslStream<TcpStream>,
}

impl TlsSession {
    /// Connect as a client: perform the handshake on the stream
    pub fn connect(stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let ssl = Ssl::new(&config.ctx)?;
        let stream = ssl.connect(stream).map_err(handshake_error)?;
        Ok(TlsSession { stream })
    }

    /// Accept as a server: perform the handshake on an accepted stream
    pub fn accept(stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let ssl = Ssl::new(&config.ctx)?;
        let stream = ssl.accept(stream).map_err(handshake_error)?;
        Ok(TlsSession { stream })
    }

    /// Underlying socket descriptor
    pub fn fd(&self) -> RawFd {
        self.stream.get_ref().as_raw_fd()
    }

    /// Switch the underlying socket between blocking and non-blocking
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.stream.get_ref().set_nonblocking(nonblocking)
    }

    /// Decrypt available bytes into `buf`
    ///
    /// Never blocks on a non-blocking socket: a want-read/want-write
    /// condition comes back as [`TlsIo::Retry`]. End of stream, clean or
    /// not, is a classified [`TlsFatal`].
    pub fn read(&mut self, buf: &mut [u8]) -> Result<TlsIo, TlsFatal> {
        match self.stream.ssl_read(buf) {
            Ok(0) => Err(TlsFatal::new(FatalKind::Closed, "")),
            Ok(n) => Ok(TlsIo::Data(n)),
            Err(e) => match e.code() {
                ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => Ok(TlsIo::Retry),
                _ => Err(classify(&e)),
            },
        }
    }

    /// Encrypt and write `buf`
    ///
    /// OpenSSL either writes the whole buffer or reports want-write, so a
    /// `Data(n)` result always covers all of `buf`.
    pub fn write(&mut self, buf: &[u8]) -> Result<TlsIo, TlsFatal> {
        match self.stream.ssl_write(buf) {
            Ok(n) => Ok(TlsIo::Data(n)),
            Err(e) => match e.code() {
                ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => Ok(TlsIo::Retry),
                _ => Err(classify(&e)),
            },
        }
    }

    /// Best-effort close: TLS shutdown, then TCP shutdown
    ///
    /// Used by connection teardown; failures are logged, never fatal.
    pub fn close(&mut self) {
        if let Err(e) = self.stream.shutdown() {
            debug!("tls shutdown during close failed: {}", e);
        }
        if let Err(e) = self.stream.get_ref().shutdown(Shutdown::Both) {
            debug!("tcp shutdown during close failed: {}", e);
        }
    }

    /// Send a close_notify unless one was already exchanged
    ///
    /// The bootstrap exit path calls this so a shutdown the peer already
    /// signaled is not answered with a protocol violation.
    pub fn orderly_shutdown(&mut self) {
        let state = self.stream.get_shutdown();
        if state.intersects(ShutdownState::SENT | ShutdownState::RECEIVED) {
            info!("shutdown request ignored");
            return;
        }
        if let Err(e) = self.stream.shutdown() {
            debug!("tls shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::config::test_cert;
    use std::net::TcpListener;
    use std::thread;

    fn server_config() -> TlsConfig {
        let (cert, key) = test_cert::generate();
        TlsConfig::server()
            .cert_pem(&cert)
            .key_pem(&key)
            .build()
            .unwrap()
    }

    #[test]
    fn test_handshake_and_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = server_config();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut session = config.accept(stream).unwrap();

            let mut buf = [0u8; 16];
            match session.read(&mut buf).unwrap() {
                TlsIo::Data(n) => assert_eq!(&buf[..n], b"ping"),
                other => panic!("unexpected read result: {:?}", other),
            }
            assert!(matches!(session.write(b"pong"), Ok(TlsIo::Data(4))));
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = TlsConfig::client().build().unwrap().connect(stream).unwrap();

        assert!(matches!(session.write(b"ping"), Ok(TlsIo::Data(4))));
        let mut buf = [0u8; 16];
        match session.read(&mut buf).unwrap() {
            TlsIo::Data(n) => assert_eq!(&buf[..n], b"pong"),
            other => panic!("unexpected read result: {:?}", other),
        }

        server.join().unwrap();
    }

    #[test]
    fn test_clean_close_classified_as_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = server_config();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut session = config.accept(stream).unwrap();
            // Orderly close: close_notify goes out before the socket dies.
            session.close();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = TlsConfig::client().build().unwrap().connect(stream).unwrap();

        let mut buf = [0u8; 16];
        let fatal = session.read(&mut buf).unwrap_err();
        assert_eq!(fatal.kind(), FatalKind::Closed);
        assert_eq!(fatal.message(), "ssl connection closed");

        server.join().unwrap();
    }

    #[test]
    fn test_abrupt_close_is_not_clean() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = server_config();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let session = config.accept(stream).unwrap();
            // Drop without close_notify: the peer sees a dirty EOF.
            drop(session);
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = TlsConfig::client().build().unwrap().connect(stream).unwrap();

        let mut buf = [0u8; 16];
        let fatal = session.read(&mut buf).unwrap_err();
        assert_ne!(fatal.kind(), FatalKind::Closed);

        server.join().unwrap();
    }

    #[test]
    fn test_handshake_against_non_tls_peer_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            use std::io::Write;
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"this is not a server hello").unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let err = TlsConfig::client().build().unwrap().connect(stream);
        assert!(matches!(err, Err(TlsError::Handshake(_))));

        server.join().unwrap();
    }

    #[test]
    fn test_nonblocking_read_reports_retry() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = server_config();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut session = config.accept(stream).unwrap();
            // Hold the connection open until the client is done probing.
            let mut buf = [0u8; 4];
            let _ = session.read(&mut buf);
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut session = TlsConfig::client().build().unwrap().connect(stream).unwrap();
        session.set_nonblocking(true).unwrap();

        let mut buf = [0u8; 16];
        assert!(matches!(session.read(&mut buf), Ok(TlsIo::Retry)));

        // Unblock the server's read, then let it exit.
        session.set_nonblocking(false).unwrap();
        assert!(matches!(session.write(b"done"), Ok(TlsIo::Data(4))));
        server.join().unwrap();
    }
}

//! TLS configuration
//!
//! Client and server context builders. All fallible work happens in
//! `build()` so setup failures propagate instead of aborting startup.

use super::{TlsError, TlsSession};
use openssl::pkey::PKey;
use openssl::ssl::{SslContext, SslContextBuilder, SslFiletype, SslMethod, SslVerifyMode};
use openssl::x509::X509;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

/// TLS configuration (immutable after building)
///
/// A server configuration holds the certificate and key and is shared
/// read-only by every connection the accept loop spawns.
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    is_server: bool,
}

impl TlsConfig {
    /// Create a client configuration builder
    pub fn client() -> ClientTlsBuilder {
        ClientTlsBuilder::default()
    }

    /// Create a server configuration builder
    pub fn server() -> ServerTlsBuilder {
        ServerTlsBuilder::default()
    }

    /// Whether this is a server-side configuration
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Perform a client handshake on the stream
    pub fn connect(&self, stream: TcpStream) -> Result<TlsSession, TlsError> {
        if self.is_server {
            return Err(TlsError::InvalidConfig(
                "cannot use a server config for an outbound connection".to_string(),
            ));
        }
        TlsSession::connect(stream, self)
    }

    /// Perform a server handshake on an accepted stream
    pub fn accept(&self, stream: TcpStream) -> Result<TlsSession, TlsError> {
        if !self.is_server {
            return Err(TlsError::InvalidConfig(
                "cannot use a client config to accept connections".to_string(),
            ));
        }
        TlsSession::accept(stream, self)
    }
}

/// Client configuration builder
///
/// Peer verification is off, matching a client that connects to
/// self-signed test endpoints.
#[derive(Default)]
pub struct ClientTlsBuilder {
    verify_peer: bool,
}

impl ClientTlsBuilder {
    /// Enable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Build the client TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        let mut builder = SslContextBuilder::new(SslMethod::tls_client())?;
        builder.set_verify(if self.verify_peer {
            SslVerifyMode::PEER
        } else {
            SslVerifyMode::NONE
        });
        Ok(TlsConfig {
            ctx: builder.build(),
            is_server: false,
        })
    }
}

enum PemSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Server configuration builder
///
/// A certificate is mandatory; the private key defaults to the certificate
/// source, so a single bundle PEM works as well as separate files.
#[derive(Default)]
pub struct ServerTlsBuilder {
    cert: Option<PemSource>,
    key: Option<PemSource>,
}

impl ServerTlsBuilder {
    /// Load the server certificate from a PEM file
    pub fn cert_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cert = Some(PemSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Load the private key from a PEM file
    pub fn key_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.key = Some(PemSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Use an in-memory PEM certificate
    pub fn cert_pem(mut self, pem: &[u8]) -> Self {
        self.cert = Some(PemSource::Bytes(pem.to_vec()));
        self
    }

    /// Use an in-memory PEM private key
    pub fn key_pem(mut self, pem: &[u8]) -> Self {
        self.key = Some(PemSource::Bytes(pem.to_vec()));
        self
    }

    /// Build the server TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        let cert = self.cert.ok_or_else(|| {
            TlsError::InvalidConfig("server configuration requires a certificate".to_string())
        })?;

        let mut builder = SslContextBuilder::new(SslMethod::tls_server())?;

        match &cert {
            PemSource::File(path) => {
                builder
                    .set_certificate_file(path, SslFiletype::PEM)
                    .map_err(|e| {
                        TlsError::Certificate(format!(
                            "failed to load certificate {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
            }
            PemSource::Bytes(pem) => {
                let x509 = X509::from_pem(pem)
                    .map_err(|e| TlsError::Certificate(format!("bad certificate PEM: {}", e)))?;
                builder.set_certificate(&x509)?;
            }
        }

        match self.key.as_ref().unwrap_or(&cert) {
            PemSource::File(path) => {
                builder
                    .set_private_key_file(path, SslFiletype::PEM)
                    .map_err(|e| {
                        TlsError::Certificate(format!(
                            "failed to load private key {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
            }
            PemSource::Bytes(pem) => {
                let key = PKey::private_key_from_pem(pem)
                    .map_err(|e| TlsError::Certificate(format!("bad private key PEM: {}", e)))?;
                builder.set_private_key(&key)?;
            }
        }

        builder.check_private_key()?;

        Ok(TlsConfig {
            ctx: builder.build(),
            is_server: true,
        })
    }
}

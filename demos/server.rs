//! Demo server: greet every client that says hello.
//!
//! Needs a certificate and key; see demos/config.ini for a one-liner that
//! generates a self-signed pair.

use evhttps::{Config, ConnectionEvents, ConnectionHandle, HttpsServer, Status, TlsConfig};
use std::rc::Rc;
use std::str::FromStr;
use tracing::{error, info};

struct Greeter;

impl ConnectionEvents for Greeter {
    fn on_connected(&self, conn: &ConnectionHandle) {
        info!("{} connected", conn.id());
    }

    fn on_data_received(&self, conn: &ConnectionHandle, data: &[u8]) {
        info!(
            "{} received: {}",
            conn.id(),
            String::from_utf8_lossy(data)
        );
        if let Err(e) = conn.send_response(Status::OK, "OK", b"hello,client!") {
            error!("send failed: {}", e);
        }
    }

    fn on_disconnected(&self, conn: &ConnectionHandle) {
        info!("{} disconnected", conn.id());
    }

    fn on_error(&self, conn: &ConnectionHandle, message: &str) {
        error!("{} error: {}", conn.id(), message);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/config.ini".to_string());
    let config = Config::load(&path)?;

    let level = config.get("log", "level").unwrap_or("info");
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from_str(level)?)
        .init();

    let port: u16 = config.get_parsed("ssl", "port")?;
    let tls = TlsConfig::server()
        .cert_file(config.require("ssl", "cert")?)
        .key_file(config.require("ssl", "key")?)
        .build()?;

    let server = HttpsServer::bind(port, tls, Rc::new(Greeter))?;
    server.run()?;
    Ok(())
}

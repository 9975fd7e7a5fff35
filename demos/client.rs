//! Demo client: connect, send one greeting, print the reply, close.
//!
//! Run the server demo first, then:
//!
//! ```text
//! cargo run --example server
//! cargo run --example client
//! ```

use evhttps::{Config, ConnectionEvents, ConnectionHandle, HttpsClient, Method};
use std::rc::Rc;
use std::str::FromStr;
use tracing::{error, info};

struct Hello;

impl ConnectionEvents for Hello {
    fn on_connected(&self, conn: &ConnectionHandle) {
        info!("{} connected, sending greeting", conn.id());
        if let Err(e) = conn.send_request(Method::Get, "/hello", b"hello,server!") {
            error!("send failed: {}", e);
        }
    }

    fn on_data_received(&self, conn: &ConnectionHandle, data: &[u8]) {
        info!(
            "{} received: {}",
            conn.id(),
            String::from_utf8_lossy(data)
        );
        conn.close();
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

    let host = config.require("ssl", "host")?.to_string();
    let port: u16 = config.get_parsed("ssl", "port")?;

    let client = HttpsClient::connect(&host, port, Rc::new(Hello))?;
    client.run()?;
    Ok(())
}

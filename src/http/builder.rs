//! Stateless HTTP message serialization
//!
//! Requests carry a fixed `Host: localhost` and `Connection: keep-alive`;
//! responses carry `Content-Type: text/plain` and `Connection: keep-alive`.
//! Both set `Content-Length` to the exact body byte length. A message whose
//! serialized form would exceed [`MAX_WIRE_LEN`] is rejected with
//! [`Error::TooLarge`]; nothing is ever truncated.

use super::{Error, Method, Result, Status};

/// Fixed serialization buffer size for a single outgoing message
pub const MAX_WIRE_LEN: usize = 4096;

/// Serialize an HTTP/1.1 request
///
/// Wire format:
/// `METHOD PATH HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\nContent-Length: N\r\n\r\n<body>`
pub fn build_request(method: Method, path: &str, body: &[u8]) -> Result<Vec<u8>> {
    let head = format!(
        "{} {} HTTP/1.1\r\n\
         Host: localhost\r\n\
         Connection: keep-alive\r\n\
         Content-Length: {}\r\n\
         \r\n",
        method.as_str(),
        path,
        body.len()
    );
    assemble(head, body)
}

/// Serialize an HTTP/1.1 response
///
/// Wire format:
/// `HTTP/1.1 <code> <text>\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\nContent-Length: N\r\n\r\n<body>`
pub fn build_response(status: Status, reason: &str, body: &[u8]) -> Result<Vec<u8>> {
    let head = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain\r\n\
         Connection: keep-alive\r\n\
         Content-Length: {}\r\n\
         \r\n",
        status.code(),
        reason,
        body.len()
    );
    assemble(head, body)
}

fn assemble(head: String, body: &[u8]) -> Result<Vec<u8>> {
    let total = head.len() + body.len();
    if total > MAX_WIRE_LEN {
        return Err(Error::TooLarge(total));
    }
    let mut wire = Vec::with_capacity(total);
    wire.extend_from_slice(head.as_bytes());
    wire.extend_from_slice(body);
    Ok(wire)
}

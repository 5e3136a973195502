//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol — parsing
//! requests, building responses, and routing methods to the per-connection
//! [`ClientSession`](handler::ClientSession).
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: sessions persist across requests (RFC 2326 §3).
//! - Different methods: OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN.
//! - Session header carries a server-assigned ID (RFC 2326 §12.37).
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve the SDP session description |
//! | SETUP | §10.4 | Negotiate per-track transport |
//! | PLAY | §10.5 | Start media delivery |
//! | PAUSE | §10.6 | Suspend media delivery |
//! | TEARDOWN | §10.7 | Destroy the session and close the connection |
//!
//! Any other method is answered with `405 Method Not Allowed` and the
//! connection is closed.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{ClientSession, REQUEST_BUFFER_SIZE};
pub use request::ParsedRequest;
pub use response::RtspResponse;

/// Locate a header by its literal prefix (e.g. `"Transport: "`) anywhere in
/// the raw request, case-insensitively, and return the rest of that line.
///
/// RTSP headers arrive one per line, so the value ends at the first CR or LF.
pub(crate) fn scan_header<'a>(request: &'a str, prefix: &str) -> Option<&'a str> {
    let bytes = request.as_bytes();
    let pat = prefix.as_bytes();
    if bytes.len() < pat.len() {
        return None;
    }

    let pos = (0..=bytes.len() - pat.len())
        .find(|&i| bytes[i..i + pat.len()].eq_ignore_ascii_case(pat))?;
    // The matched prefix is pure ASCII, so both bounds are char boundaries.
    let rest = &request[pos + pat.len()..];
    let end = rest.find(['\r', '\n']).unwrap_or(rest.len());
    Some(&rest[..end])
}

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::auth::UserDatabase;
use crate::protocol::handler::{ClientSession, REQUEST_BUFFER_SIZE};
use crate::registry::MediaSessionRegistry;
use crate::server::ServerConfig;
use crate::session::Disposition;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly.
/// Each accepted connection gets the next session id and its own thread.
pub fn accept_loop(
    listener: TcpListener,
    registry: MediaSessionRegistry,
    auth_db: Option<Arc<UserDatabase>>,
    config: Arc<ServerConfig>,
    session_counter: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let session_id = session_counter.fetch_add(1, Ordering::SeqCst) + 1;
                let registry = registry.clone();
                let auth_db = auth_db.clone();
                let config = config.clone();
                let running = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, session_id, registry, auth_db, config, running);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP control connection with its own lifecycle.
///
/// Field order matters: the session drops before the socket, so stream
/// tokens are reclaimed before the peer can observe EOF.
struct Connection {
    session: ClientSession,
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    fn handle(
        stream: TcpStream,
        session_id: u32,
        registry: MediaSessionRegistry,
        auth_db: Option<Arc<UserDatabase>>,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };
        let server_addr = match stream.local_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, session_id, "client connected");

        let session = ClientSession::new(
            session_id,
            peer_addr,
            server_addr,
            registry,
            auth_db,
            config,
        );
        let mut conn = Connection {
            session,
            stream,
            peer_addr,
        };

        let reason = conn.run(&running);

        // Dropping the connection drops the ClientSession, which returns
        // every issued stream token to its subsession.
        tracing::info!(peer_addr = %conn.peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        let mut buffer = vec![0u8; REQUEST_BUFFER_SIZE];

        while running.load(Ordering::SeqCst) {
            let mut total = 0;
            loop {
                if total == buffer.len() {
                    // Command too big: a protocol error, closed silently.
                    return "request exceeded buffer";
                }
                let read = match self.stream.read(&mut buffer[total..]) {
                    Ok(0) => return "connection closed by client",
                    Ok(n) => n,
                    Err(_) => return "read error",
                };
                // Rescan up to three carried bytes so a terminator split
                // across reads is still found.
                let scan_from = total.saturating_sub(3);
                total += read;
                if contains_terminator(&buffer[scan_from..total]) {
                    break;
                }
            }

            let (response, disposition) = self.session.handle_request(&buffer[..total], &self.stream);

            tracing::debug!(
                peer = %self.peer_addr,
                status = response.status_code,
                "response"
            );

            if self.stream.write_all(response.serialize().as_bytes()).is_err() {
                return "write error";
            }
            if disposition == Disposition::Close {
                return "session closed";
            }
        }

        "server shutting down"
    }
}

/// True once the `\r\n\r\n` request terminator appears in the window.
fn contains_terminator(window: &[u8]) -> bool {
    window.windows(4).any(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_found_in_single_read() {
        assert!(contains_terminator(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n"));
        assert!(!contains_terminator(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n"));
    }

    /// Replays the incremental scan the read loop performs, with the
    /// terminator split across reads at every possible point.
    #[test]
    fn terminator_split_across_reads() {
        let request = b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        for split in 1..request.len() {
            let mut buffer: Vec<u8> = Vec::new();
            let mut found = false;
            for chunk in [&request[..split], &request[split..]] {
                let prev = buffer.len();
                buffer.extend_from_slice(chunk);
                let scan_from = prev.saturating_sub(3);
                if contains_terminator(&buffer[scan_from..]) {
                    found = true;
                    break;
                }
            }
            assert!(found, "terminator missed at split {}", split);
        }
    }

    #[test]
    fn terminator_requires_both_crlf_pairs() {
        assert!(!contains_terminator(b"\r\n\n\n"));
        assert!(!contains_terminator(b"\n\n\n\n"));
        assert!(contains_terminator(b"abc\r\n\r\ndef"));
    }
}

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use crate::auth::UserDatabase;
use crate::error::{Result, RtspError};
use crate::media::MediaSession;
use crate::registry::MediaSessionRegistry;
use crate::transport::tcp;

/// IANA default port for RTSP; omitted from advertised URLs.
pub const RTSP_DEFAULT_PORT: u16 = 554;

/// Server-level configuration used by protocol handlers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host advertised in `rtsp://` URLs and `Content-Base:` headers.
    /// When `None`, the connection's local address is used.
    pub public_host: Option<String>,
    /// Honor client-supplied `destination=` transport parameters.
    ///
    /// Off by default: a spoofed destination turns the server into a
    /// traffic reflector. Enable only when every client is trusted.
    pub allow_client_destination: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            allow_client_destination: false,
        }
    }
}

/// RTSP control server.
///
/// Owns the media session registry and the optional user database, accepts
/// control connections, and spawns one [`ClientSession`](crate::protocol::ClientSession)
/// per accepted socket. Media sessions are registered up front or while
/// running; dropping the server destroys every registered session.
///
/// # Usage
///
/// ```no_run
/// use std::sync::Arc;
/// use rtsp_control::Server;
/// # fn media_session() -> Arc<dyn rtsp_control::MediaSession> { unimplemented!() }
///
/// let mut server = Server::new("0.0.0.0:8554");
/// server.add_media_session(media_session()).unwrap();
/// server.start().unwrap();
/// ```
pub struct Server {
    registry: MediaSessionRegistry,
    auth_db: Option<Arc<UserDatabase>>,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
    bind_addr: String,
    session_counter: Arc<AtomicU32>,
}

impl Server {
    /// Create a server with default configuration and no authentication.
    ///
    /// `bind_addr` must be `host:port` with an explicit non-zero port
    /// (e.g. `0.0.0.0:8554`); validation happens in [`start`](Self::start).
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    /// Create a server with custom configuration.
    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            registry: MediaSessionRegistry::new(),
            auth_db: None,
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            session_counter: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Require Digest authentication against `db` for DESCRIBE requests.
    ///
    /// Without a user database, authentication is skipped entirely.
    pub fn set_user_database(&mut self, db: UserDatabase) {
        self.auth_db = Some(Arc::new(db));
    }

    /// Register a media session under its stream name. Replaces and
    /// destroys any session already registered under that name.
    pub fn add_media_session(&self, session: Arc<dyn MediaSession>) -> Result<()> {
        self.registry.add(session)
    }

    /// Remove and return a media session by stream name.
    pub fn remove_media_session(&self, name: &str) -> Option<Arc<dyn MediaSession>> {
        self.registry.remove(name)
    }

    /// The registry of media sessions served by this server.
    pub fn registry(&self) -> &MediaSessionRegistry {
        &self.registry
    }

    /// The URL clients use to reach a stream, for advertising:
    /// `rtsp://<host>/<name>` on the IANA default port 554, else
    /// `rtsp://<host>:<port>/<name>`.
    pub fn rtsp_url(&self, stream_name: &str) -> Result<String> {
        let addr = self.parse_bind_addr()?;
        let host = match &self.config.public_host {
            Some(h) => h.clone(),
            None => addr.ip().to_string(),
        };
        Ok(format_rtsp_url(&host, addr.port(), stream_name))
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let addr = self.parse_bind_addr()?;

        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);

        let registry = self.registry.clone();
        let auth_db = self.auth_db.clone();
        let config = self.config.clone();
        let session_counter = self.session_counter.clone();
        let running = self.running.clone();

        tracing::info!(addr = %self.bind_addr, "RTSP server listening");

        thread::spawn(move || {
            tcp::accept_loop(listener, registry, auth_db, config, session_counter, running);
        });

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn parse_bind_addr(&self) -> Result<SocketAddr> {
        let addr: SocketAddr = self.bind_addr.parse().map_err(|_| {
            RtspError::InvalidBindAddress(format!(
                "expected host:port with explicit port, got {:?}",
                self.bind_addr
            ))
        })?;
        if addr.port() == 0 {
            return Err(RtspError::InvalidBindAddress(
                "port must be explicit (non-zero)".to_string(),
            ));
        }
        Ok(addr)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
        self.registry.clear();
    }
}

pub(crate) fn format_rtsp_url(host: &str, port: u16, stream_name: &str) -> String {
    if port == RTSP_DEFAULT_PORT {
        format!("rtsp://{}/{}", host, stream_name)
    } else {
        format!("rtsp://{}:{}/{}", host, port, stream_name)
    }
}

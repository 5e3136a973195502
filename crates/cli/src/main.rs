use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use rtsp_control::{
    MediaSession, Server, ServerConfig, SetupReply, SetupRequest, StreamToken, Subsession,
    UserDatabase,
};

/// Minimal media source used to exercise the control plane end to end.
///
/// Negotiates transports and logs stream operations without transmitting
/// any media; a real deployment supplies its own `MediaSession`.
struct DemoSubsession {
    track: String,
    next_token: AtomicU64,
}

impl DemoSubsession {
    fn new(track: &str) -> Arc<Self> {
        Arc::new(DemoSubsession {
            track: track.to_string(),
            next_token: AtomicU64::new(0),
        })
    }
}

impl Subsession for DemoSubsession {
    fn track_id(&self) -> &str {
        &self.track
    }

    fn get_stream_parameters(&self, session_id: u32, request: SetupRequest) -> SetupReply {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            session_id,
            track = %self.track,
            client_ip = %request.client_ip,
            client_rtp_port = request.client_rtp_port,
            tcp = request.tcp_socket.is_some(),
            token,
            "stream parameters negotiated"
        );
        SetupReply {
            is_multicast: false,
            destination: request.client_ip,
            server_rtp_port: 6970,
            server_rtcp_port: 6971,
            stream_token: Some(token),
        }
    }

    fn start_stream(&self, session_id: u32, token: StreamToken) {
        tracing::info!(session_id, track = %self.track, token, "start stream");
    }

    fn pause_stream(&self, session_id: u32, token: StreamToken) {
        tracing::info!(session_id, track = %self.track, token, "pause stream");
    }

    fn delete_stream(&self, session_id: u32, token: StreamToken) {
        tracing::info!(session_id, track = %self.track, token, "delete stream");
    }
}

struct DemoMediaSession {
    name: String,
    tracks: Vec<Arc<DemoSubsession>>,
}

impl DemoMediaSession {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(DemoMediaSession {
            name: name.to_string(),
            tracks: vec![DemoSubsession::new("track1")],
        })
    }
}

impl MediaSession for DemoMediaSession {
    fn stream_name(&self) -> &str {
        &self.name
    }

    fn generate_sdp_description(&self) -> Option<String> {
        Some(
            "v=0\r\n\
             o=- 0 0 IN IP4 0.0.0.0\r\n\
             s=Demo Stream\r\n\
             t=0 0\r\n\
             a=sendonly\r\n\
             m=video 0 RTP/AVP 96\r\n\
             a=rtpmap:96 H264/90000\r\n\
             a=control:track1\r\n"
                .to_string(),
        )
    }

    fn subsessions(&self) -> Vec<Arc<dyn Subsession>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn Subsession>)
            .collect()
    }
}

#[derive(Parser)]
#[command(
    name = "rtsp-control-server",
    about = "Standalone RTSP control server with a demo stream"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Stream name the demo media session is registered under
    #[arg(long, default_value = "demo")]
    stream: String,

    /// Host advertised in rtsp:// URLs instead of the bind address
    #[arg(long)]
    public_host: Option<String>,

    /// Require Digest authentication for this username
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Password for --username
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Digest realm label
    #[arg(long, default_value = "RTSP Streaming Server")]
    realm: String,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut server = Server::with_config(
        &args.bind,
        ServerConfig {
            public_host: args.public_host.clone(),
            ..ServerConfig::default()
        },
    );

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        let mut db = UserDatabase::new(&args.realm);
        db.add_user(username, password);
        server.set_user_database(db);
    }

    if let Err(e) = server.add_media_session(DemoMediaSession::new(&args.stream)) {
        eprintln!("Failed to register demo stream: {}", e);
        return;
    }

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    match server.rtsp_url(&args.stream) {
        Ok(url) => println!("Serving {} — press Enter to stop", url),
        Err(_) => println!("RTSP server on {} — press Enter to stop", args.bind),
    }
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    server.stop();
}

//! Collaborator interface between the control plane and the media plane.
//!
//! The control server never touches packetization or RTP/RTCP transmission.
//! It talks to media sources through two traits:
//!
//! - [`MediaSession`] — a named, registrable stream (e.g. `camera1`)
//!   consisting of one or more tracks. Produces the SDP text embedded in
//!   DESCRIBE responses.
//! - [`Subsession`] — one track (audio, video) within a media session.
//!   SETUP hands it the negotiated transport parameters and receives an
//!   opaque [`StreamToken`]; PLAY/PAUSE/TEARDOWN pass that token back.
//!
//! A `(session_id, StreamToken)` pair isolates per-client delivery state
//! inside the subsession implementation. The token's meaning is known only
//! to the subsession that issued it; the control plane stores and returns
//! it, nothing more.

use std::net::{IpAddr, TcpStream};
use std::sync::Arc;

/// Opaque per-client stream handle issued by [`Subsession::get_stream_parameters`].
///
/// Required for every subsequent `start_stream`/`pause_stream`/`delete_stream`
/// call on that stream.
pub type StreamToken = u64;

/// A named media source registrable with the server.
pub trait MediaSession: Send + Sync {
    /// The stream name clients address in `rtsp://host/<name>` URLs.
    fn stream_name(&self) -> &str;

    /// SDP description of the whole session (RFC 4566), or `None` if the
    /// underlying source cannot currently be described (e.g. a missing file).
    fn generate_sdp_description(&self) -> Option<String>;

    /// The session's tracks, in a stable order. The order observed at SETUP
    /// time fixes the order of the client's per-track stream states.
    fn subsessions(&self) -> Vec<Arc<dyn Subsession>>;
}

/// One track of a [`MediaSession`].
pub trait Subsession: Send + Sync {
    /// Track identifier clients address in `rtsp://host/<name>/<track>` URLs.
    fn track_id(&self) -> &str;

    /// Negotiate delivery parameters for one client and allocate its
    /// per-client stream state.
    fn get_stream_parameters(&self, session_id: u32, request: SetupRequest) -> SetupReply;

    /// Begin delivery for the stream identified by `token`.
    fn start_stream(&self, session_id: u32, token: StreamToken);

    /// Suspend delivery for the stream identified by `token`.
    fn pause_stream(&self, session_id: u32, token: StreamToken);

    /// Release all per-client state for the stream identified by `token`.
    fn delete_stream(&self, session_id: u32, token: StreamToken);
}

/// Client-side transport parameters passed to [`Subsession::get_stream_parameters`].
#[derive(Debug)]
pub struct SetupRequest {
    /// Address of the RTSP control connection's peer.
    pub client_ip: IpAddr,
    /// Client's RTP receive port (UDP delivery).
    pub client_rtp_port: u16,
    /// Client's RTCP receive port (UDP delivery).
    pub client_rtcp_port: u16,
    /// The control connection itself, when the client asked for TCP
    /// interleaving; `None` for UDP delivery.
    pub tcp_socket: Option<TcpStream>,
    /// RTP channel id for TCP interleaving (0xFF when not supplied).
    pub rtp_channel_id: u8,
    /// RTCP channel id for TCP interleaving (0xFF when not supplied).
    pub rtcp_channel_id: u8,
    /// Requested delivery address. Unspecified (0.0.0.0) unless the server
    /// was configured to trust client-supplied destinations.
    pub destination: IpAddr,
    /// Multicast TTL for the delivery address.
    pub destination_ttl: u8,
}

/// Server-side parameters returned by [`Subsession::get_stream_parameters`].
#[derive(Debug, Clone)]
pub struct SetupReply {
    /// Whether delivery is multicast. Multicast cannot be combined with TCP
    /// interleaving; SETUP answers `461 Unsupported Transport` in that case.
    pub is_multicast: bool,
    /// Effective delivery address, echoed in the `Transport:` response
    /// header (the client address for unicast, the group for multicast).
    pub destination: IpAddr,
    /// Server's RTP send port.
    pub server_rtp_port: u16,
    /// Server's RTCP port.
    pub server_rtcp_port: u16,
    /// Handle for this client's stream, or `None` if no per-client state
    /// was allocated.
    pub stream_token: Option<StreamToken>,
}

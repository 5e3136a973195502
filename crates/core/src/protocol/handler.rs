use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;

use crate::auth::{DigestAuthenticator, UserDatabase};
use crate::media::{SetupRequest, Subsession};
use crate::protocol::request::ParsedRequest;
use crate::protocol::response::{RtspResponse, ALLOWED_METHODS};
use crate::registry::MediaSessionRegistry;
use crate::server::{format_rtsp_url, ServerConfig};
use crate::session::{Disposition, StreamState, TransportHeader};

/// Size of the per-connection request/response buffer.
///
/// A request that does not terminate within this bound is a protocol error
/// and closes the connection; a DESCRIBE response that would not fit with
/// 200 bytes of headroom is answered with 500 instead.
pub const REQUEST_BUFFER_SIZE: usize = 10_000;

/// Per-connection RTSP state machine.
///
/// One `ClientSession` exists per accepted control connection. It parses
/// each complete request, dispatches by method, and reports a
/// [`Disposition`] telling the connection loop whether to keep reading or
/// close. The session owns the binding to at most one media session and
/// the per-track [`StreamState`] list; dropping the session returns every
/// issued stream token to its subsession.
pub struct ClientSession {
    session_id: u32,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    registry: MediaSessionRegistry,
    auth_db: Option<Arc<UserDatabase>>,
    config: Arc<ServerConfig>,
    media_session: Option<Arc<dyn crate::media::MediaSession>>,
    stream_states: Vec<StreamState>,
    authenticator: DigestAuthenticator,
}

impl ClientSession {
    pub fn new(
        session_id: u32,
        client_addr: SocketAddr,
        server_addr: SocketAddr,
        registry: MediaSessionRegistry,
        auth_db: Option<Arc<UserDatabase>>,
        config: Arc<ServerConfig>,
    ) -> Self {
        ClientSession {
            session_id,
            client_addr,
            server_addr,
            registry,
            auth_db,
            config,
            media_session: None,
            stream_states: Vec::new(),
            authenticator: DigestAuthenticator::new(),
        }
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Parse and dispatch one complete request.
    ///
    /// `socket` is the control connection itself; SETUP hands a clone of it
    /// to the subsession when the client asks for TCP interleaving.
    pub fn handle_request(
        &mut self,
        raw: &[u8],
        socket: &TcpStream,
    ) -> (RtspResponse, Disposition) {
        let request = match ParsedRequest::parse(raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(peer = %self.client_addr, error = %e, "malformed request");
                // CSeq is omitted: it may never have been parsed.
                let response = RtspResponse::bad_request().add_header("Allow", ALLOWED_METHODS);
                return (response, Disposition::Close);
            }
        };

        tracing::debug!(
            peer = %self.client_addr,
            method = %request.method,
            pre_suffix = %request.url_pre_suffix,
            suffix = %request.url_suffix,
            cseq = %request.cseq,
            "request"
        );

        let full_request = String::from_utf8_lossy(raw);
        match request.method.as_str() {
            "OPTIONS" => self.handle_options(&request.cseq),
            "DESCRIBE" => self.handle_describe(&request.cseq, &request.url_suffix, &full_request),
            "SETUP" => self.handle_setup(&request, &full_request, socket),
            "TEARDOWN" | "PLAY" | "PAUSE" => self.handle_within_session(&request),
            _ => {
                tracing::warn!(method = %request.method, cseq = %request.cseq, "method not allowed");
                let response = RtspResponse::method_not_allowed()
                    .add_header("CSeq", &request.cseq)
                    .add_header("Allow", ALLOWED_METHODS);
                (response, Disposition::Close)
            }
        }
    }

    fn handle_options(&self, cseq: &str) -> (RtspResponse, Disposition) {
        tracing::debug!(cseq, "OPTIONS");
        let response = RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", ALLOWED_METHODS);
        (response, Disposition::Keep)
    }

    /// Run Digest verification for a request, if the server has a user
    /// database. Returns the 401 challenge response on failure.
    ///
    /// Every failure installs a fresh nonce before the challenge goes out,
    /// so a replay of the rejected response can never verify.
    fn check_authentication(
        &mut self,
        method: &str,
        cseq: &str,
        full_request: &str,
    ) -> Option<RtspResponse> {
        let db = match &self.auth_db {
            Some(db) => db,
            None => return None,
        };
        if self.authenticator.verify(method, full_request, db) {
            return None;
        }

        self.authenticator.refresh(db.realm());
        tracing::warn!(peer = %self.client_addr, method, "authentication failed, issuing challenge");
        Some(
            RtspResponse::unauthorized()
                .add_header("CSeq", cseq)
                .add_header("WWW-Authenticate", &self.authenticator.challenge()),
        )
    }

    fn handle_describe(
        &mut self,
        cseq: &str,
        url_suffix: &str,
        full_request: &str,
    ) -> (RtspResponse, Disposition) {
        tracing::debug!(cseq, stream = url_suffix, "DESCRIBE");

        if let Some(challenge) = self.check_authentication("DESCRIBE", cseq, full_request) {
            return (challenge, Disposition::Keep);
        }

        let session = match self.registry.lookup(url_suffix) {
            Some(s) => s,
            None => {
                tracing::warn!(stream = url_suffix, "DESCRIBE for unknown stream");
                return (
                    RtspResponse::not_found().add_header("CSeq", cseq),
                    Disposition::Keep,
                );
            }
        };

        let sdp = match session.generate_sdp_description() {
            Some(s) => s,
            None => {
                tracing::warn!(stream = url_suffix, "media session produced no description");
                return (
                    RtspResponse::not_found().add_header("CSeq", cseq),
                    Disposition::Keep,
                );
            }
        };

        let base_url = self.advertised_url(session.stream_name());
        if sdp.len() + base_url.len() > REQUEST_BUFFER_SIZE - 200 {
            tracing::error!(
                stream = url_suffix,
                sdp_len = sdp.len(),
                "description exceeds response buffer"
            );
            return (
                RtspResponse::internal_server_error().add_header("CSeq", cseq),
                Disposition::Keep,
            );
        }

        let response = RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Base", &format!("{}/", base_url))
            .add_header("Content-Type", "application/sdp")
            .with_body(sdp);
        (response, Disposition::Keep)
    }

    fn handle_setup(
        &mut self,
        request: &ParsedRequest,
        full_request: &str,
        socket: &TcpStream,
    ) -> (RtspResponse, Disposition) {
        let cseq = request.cseq.as_str();
        let stream_name = request.url_pre_suffix.as_str();
        let track_id = request.url_suffix.as_str();

        // At most one concurrent media session per connection: a SETUP
        // naming a different stream drops the binding. The old stream
        // states keep their tokens until a new binding reclaims them or
        // the connection goes away.
        if let Some(bound) = &self.media_session {
            if bound.stream_name() != stream_name {
                self.media_session = None;
            }
        }

        if self.media_session.is_none() {
            let session = match self.registry.lookup(stream_name) {
                Some(s) => s,
                None => {
                    tracing::warn!(stream = stream_name, "SETUP for unknown stream");
                    return (
                        RtspResponse::not_found().add_header("CSeq", cseq),
                        Disposition::Keep,
                    );
                }
            };

            self.reclaim_stream_states();
            self.stream_states = session
                .subsessions()
                .into_iter()
                .map(|subsession| StreamState {
                    subsession,
                    token: None,
                })
                .collect();
            self.media_session = Some(session);
        }

        let index = match self
            .stream_states
            .iter()
            .position(|state| state.subsession.track_id() == track_id)
        {
            Some(i) => i,
            None => {
                tracing::warn!(stream = stream_name, track = track_id, "SETUP for unknown track");
                return (
                    RtspResponse::not_found().add_header("CSeq", cseq),
                    Disposition::Keep,
                );
            }
        };

        let transport = TransportHeader::parse(full_request);

        let tcp_socket = if transport.tcp_requested {
            match socket.try_clone() {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::error!(error = %e, "failed to clone control socket for interleaving");
                    return (
                        RtspResponse::internal_server_error().add_header("CSeq", cseq),
                        Disposition::Keep,
                    );
                }
            }
        } else {
            None
        };

        let (destination, destination_ttl) = if self.config.allow_client_destination {
            let requested = transport
                .destination
                .as_deref()
                .and_then(|d| d.parse::<IpAddr>().ok())
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            (requested, transport.ttl)
        } else {
            (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 255)
        };

        let reply = self.stream_states[index].subsession.get_stream_parameters(
            self.session_id,
            SetupRequest {
                client_ip: self.client_addr.ip(),
                client_rtp_port: transport.client_rtp_port,
                client_rtcp_port: transport.client_rtcp_port,
                tcp_socket,
                rtp_channel_id: transport.rtp_channel_id,
                rtcp_channel_id: transport.rtcp_channel_id,
                destination,
                destination_ttl,
            },
        );
        self.stream_states[index].token = reply.stream_token;

        if reply.is_multicast && transport.tcp_requested {
            tracing::warn!(
                stream = stream_name,
                track = track_id,
                "TCP interleaving requested for a multicast stream"
            );
            return (
                RtspResponse::unsupported_transport().add_header("CSeq", cseq),
                Disposition::Keep,
            );
        }

        let transport_reply = if reply.is_multicast {
            format!(
                "RTP/AVP;multicast;destination={};port={};ttl={}",
                reply.destination, reply.server_rtp_port, destination_ttl
            )
        } else if transport.tcp_requested {
            format!(
                "RTP/AVP/TCP;unicast;destination={};interleaved={}-{}",
                reply.destination, transport.rtp_channel_id, transport.rtcp_channel_id
            )
        } else {
            format!(
                "RTP/AVP;unicast;destination={};client_port={}-{};server_port={}-{}",
                reply.destination,
                transport.client_rtp_port,
                transport.client_rtcp_port,
                reply.server_rtp_port,
                reply.server_rtcp_port
            )
        };

        tracing::info!(
            session_id = self.session_id,
            stream = stream_name,
            track = track_id,
            transport = %transport_reply,
            "stream set up"
        );

        let response = RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport_reply)
            .add_header("Session", &self.session_id.to_string());
        (response, Disposition::Keep)
    }

    /// Shared dispatch for TEARDOWN, PLAY, and PAUSE.
    ///
    /// The request is non-aggregated (one track) when the suffix names a
    /// track of the bound stream, aggregated (all tracks) when the URL
    /// names the stream itself.
    fn handle_within_session(&mut self, request: &ParsedRequest) -> (RtspResponse, Disposition) {
        let cseq = request.cseq.as_str();

        let session = match &self.media_session {
            Some(s) => s.clone(),
            None => {
                tracing::warn!(
                    peer = %self.client_addr,
                    method = %request.method,
                    "no stream has been set up on this connection"
                );
                let response = RtspResponse::method_not_allowed()
                    .add_header("CSeq", cseq)
                    .add_header("Allow", ALLOWED_METHODS);
                return (response, Disposition::Close);
            }
        };
        let stream_name = session.stream_name();
        let pre_suffix = request.url_pre_suffix.as_str();
        let suffix = request.url_suffix.as_str();

        let target: Option<Arc<dyn Subsession>> = if !suffix.is_empty() && pre_suffix == stream_name
        {
            // Non-aggregated: the suffix must name a track of the bound stream.
            match self
                .stream_states
                .iter()
                .find(|state| state.subsession.track_id() == suffix)
            {
                Some(state) => Some(state.subsession.clone()),
                None => {
                    tracing::warn!(stream = stream_name, track = suffix, "unknown track");
                    return (
                        RtspResponse::not_found().add_header("CSeq", cseq),
                        Disposition::Keep,
                    );
                }
            }
        } else if suffix == stream_name || (pre_suffix == stream_name && suffix.is_empty()) {
            // Aggregated: the operation applies to every track.
            None
        } else {
            tracing::warn!(
                stream = stream_name,
                pre_suffix,
                suffix,
                "request does not match the bound stream"
            );
            return (
                RtspResponse::not_found().add_header("CSeq", cseq),
                Disposition::Keep,
            );
        };

        let session_header = self.session_id.to_string();
        match request.method.as_str() {
            "TEARDOWN" => {
                tracing::info!(session_id = self.session_id, stream = stream_name, "session torn down");
                let response = RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session_header);
                (response, Disposition::Close)
            }
            "PLAY" => {
                for state in self.matching_states(target.as_ref()) {
                    if let Some(token) = state.token {
                        state.subsession.start_stream(self.session_id, token);
                    }
                }
                tracing::info!(session_id = self.session_id, stream = stream_name, "playing");
                let response = RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session_header);
                (response, Disposition::Keep)
            }
            "PAUSE" => {
                for state in self.matching_states(target.as_ref()) {
                    if let Some(token) = state.token {
                        state.subsession.pause_stream(self.session_id, token);
                    }
                }
                tracing::info!(session_id = self.session_id, stream = stream_name, "paused");
                let response = RtspResponse::ok()
                    .add_header("CSeq", cseq)
                    .add_header("Session", &session_header);
                (response, Disposition::Keep)
            }
            _ => {
                // Unreachable via handle_request's dispatch table.
                let response = RtspResponse::method_not_allowed()
                    .add_header("CSeq", cseq)
                    .add_header("Allow", ALLOWED_METHODS);
                (response, Disposition::Close)
            }
        }
    }

    /// Stream states addressed by an operation: all of them for an
    /// aggregated request, exactly one for a non-aggregated one.
    fn matching_states<'a>(
        &'a self,
        target: Option<&Arc<dyn Subsession>>,
    ) -> impl Iterator<Item = &'a StreamState> + 'a {
        let target = target.cloned();
        self.stream_states.iter().filter(move |state| match &target {
            None => true,
            Some(t) => Arc::ptr_eq(t, &state.subsession),
        })
    }

    /// Return every issued stream token to its subsession and clear the
    /// state list. Safe to call more than once.
    fn reclaim_stream_states(&mut self) {
        for state in &mut self.stream_states {
            if let Some(token) = state.token.take() {
                state.subsession.delete_stream(self.session_id, token);
            }
        }
        self.stream_states.clear();
    }

    fn advertised_url(&self, stream_name: &str) -> String {
        let host = match &self.config.public_host {
            Some(h) => h.clone(),
            None => self.server_addr.ip().to_string(),
        };
        format_rtsp_url(&host, self.server_addr.port(), stream_name)
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        // Every exit path funnels through here, so tokens are released
        // exactly once no matter how the connection ended.
        self.reclaim_stream_states();
    }
}

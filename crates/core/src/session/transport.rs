use crate::protocol::scan_header;

/// Client-side transport parameters from the RTSP `Transport` header
/// (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=6000-6001
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;destination=10.0.0.2;client_port=6000-6001;server_port=6970-6971
/// ```
///
/// Parsing is total: a missing header or unrecognized fields leave the
/// defaults in place, mirroring how deployed servers treat the header.
/// The `destination=` field is recorded but acted on only when the server
/// is configured to trust client-supplied destinations; honoring it
/// blindly turns the server into a traffic reflector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHeader {
    /// Client asked for RTP/RTCP interleaved over the control connection.
    pub tcp_requested: bool,
    /// Client-requested delivery address (dotted IPv4 or hostname).
    pub destination: Option<String>,
    /// Multicast TTL override.
    pub ttl: u8,
    /// Client's RTP receive port (UDP delivery).
    pub client_rtp_port: u16,
    /// Client's RTCP receive port (UDP delivery).
    pub client_rtcp_port: u16,
    /// RTP channel id for TCP interleaving.
    pub rtp_channel_id: u8,
    /// RTCP channel id for TCP interleaving.
    pub rtcp_channel_id: u8,
}

impl Default for TransportHeader {
    fn default() -> Self {
        TransportHeader {
            tcp_requested: false,
            destination: None,
            ttl: 255,
            client_rtp_port: 0,
            client_rtcp_port: 1,
            rtp_channel_id: 0xFF,
            rtcp_channel_id: 0xFF,
        }
    }
}

impl TransportHeader {
    /// Parse the `Transport` header out of a full request.
    ///
    /// The header name is matched case-insensitively; fields are
    /// `;`-separated and unknown fields are ignored silently.
    pub fn parse(request: &str) -> Self {
        let mut header = TransportHeader::default();

        let value = match scan_header(request, "Transport: ") {
            Some(v) => v,
            None => return header,
        };

        for field in value.split(';') {
            let field = field.trim();
            if field == "RTP/AVP/TCP" {
                header.tcp_requested = true;
            } else if let Some(rest) = strip_prefix_ignore_case(field, "destination=") {
                header.destination = Some(rest.to_string());
            } else if let Some(rest) = field.strip_prefix("client_port=") {
                if let Some((p1, p2)) = parse_pair(rest) {
                    header.client_rtp_port = p1;
                    header.client_rtcp_port = p2;
                }
            } else if let Some(rest) = field.strip_prefix("interleaved=") {
                if let Some((c1, c2)) = parse_pair::<u32>(rest) {
                    header.rtp_channel_id = c1 as u8;
                    header.rtcp_channel_id = c2 as u8;
                }
            } else if let Some(rest) = field.strip_prefix("ttl") {
                if let Ok(ttl) = rest.parse::<u32>() {
                    header.ttl = ttl as u8;
                }
            }
        }
        header
    }
}

fn strip_prefix_ignore_case<'a>(field: &'a str, prefix: &str) -> Option<&'a str> {
    let bytes = field.as_bytes();
    let pat = prefix.as_bytes();
    if bytes.len() >= pat.len() && bytes[..pat.len()].eq_ignore_ascii_case(pat) {
        // The matched prefix is pure ASCII, so the split is a char boundary.
        Some(&field[pat.len()..])
    } else {
        None
    }
}

fn parse_pair<T: std::str::FromStr>(s: &str) -> Option<(T, T)> {
    let (a, b) = s.split_once('-')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

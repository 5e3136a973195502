//! Integration tests: wire-level RTSP scenarios against a live listener.
//!
//! Each test starts a server on its own fixed port, connects with a plain
//! TCP client, and verifies the literal responses — including the full
//! Digest authentication round trip.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use md5::{Digest, Md5};
use rtsp_control::{
    MediaSession, Server, SetupReply, SetupRequest, StreamToken, Subsession, UserDatabase,
};

struct TestSubsession {
    track: String,
    multicast: bool,
    next_token: AtomicU64,
    started: AtomicUsize,
    deleted: AtomicUsize,
}

impl TestSubsession {
    fn new(track: &str) -> Arc<Self> {
        Arc::new(TestSubsession {
            track: track.to_string(),
            multicast: false,
            next_token: AtomicU64::new(0),
            started: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
        })
    }

    fn multicast(track: &str) -> Arc<Self> {
        Arc::new(TestSubsession {
            track: track.to_string(),
            multicast: true,
            next_token: AtomicU64::new(0),
            started: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
        })
    }
}

impl Subsession for TestSubsession {
    fn track_id(&self) -> &str {
        &self.track
    }

    fn get_stream_parameters(&self, _session_id: u32, request: SetupRequest) -> SetupReply {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        SetupReply {
            is_multicast: self.multicast,
            destination: if self.multicast {
                "232.0.0.1".parse().unwrap()
            } else {
                request.client_ip
            },
            server_rtp_port: 6970,
            server_rtcp_port: 6971,
            stream_token: Some(token),
        }
    }

    fn start_stream(&self, _session_id: u32, _token: StreamToken) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn pause_stream(&self, _session_id: u32, _token: StreamToken) {}

    fn delete_stream(&self, _session_id: u32, _token: StreamToken) {
        self.deleted.fetch_add(1, Ordering::SeqCst);
    }
}

struct TestMediaSession {
    name: String,
    tracks: Vec<Arc<TestSubsession>>,
}

impl TestMediaSession {
    fn new(name: &str, tracks: Vec<Arc<TestSubsession>>) -> Arc<Self> {
        Arc::new(TestMediaSession {
            name: name.to_string(),
            tracks,
        })
    }
}

impl MediaSession for TestMediaSession {
    fn stream_name(&self) -> &str {
        &self.name
    }

    fn generate_sdp_description(&self) -> Option<String> {
        Some("v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\ns=test\r\nt=0 0\r\nm=video 0 RTP/AVP 96\r\na=control:t0\r\n".to_string())
    }

    fn subsessions(&self) -> Vec<Arc<dyn Subsession>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn Subsession>)
            .collect()
    }
}

fn connect(bind: &str) -> TcpStream {
    let addr = bind.to_socket_addrs().unwrap().next().unwrap();
    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

/// Send one request and read the full response (headers plus
/// Content-Length-delimited body, if any).
fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if len > 0 {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            response.push_str(&String::from_utf8_lossy(&body));
        }
    }

    Ok(response)
}

fn header_value<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    response
        .lines()
        .find(|l| l.to_lowercase().starts_with(&name.to_lowercase()))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim())
}

#[test]
fn options_is_answered_verbatim_and_connection_stays_open() {
    const BIND: &str = "127.0.0.1:28554";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let response = rtsp_request(&mut stream, "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").unwrap();
    assert_eq!(
        response,
        "RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE\r\n\r\n"
    );

    // The connection must survive OPTIONS.
    let again = rtsp_request(&mut stream, "OPTIONS * RTSP/1.0\r\nCSeq: 2\r\n\r\n").unwrap();
    assert!(again.starts_with("RTSP/1.0 200 OK\r\nCSeq: 2\r\n"));

    server.stop();
}

#[test]
fn describe_unknown_stream_is_404() {
    const BIND: &str = "127.0.0.1:28555";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let response = rtsp_request(
        &mut stream,
        "DESCRIBE rtsp://127.0.0.1:28555/none RTSP/1.0\r\nCSeq: 2\r\n\r\n",
    )
    .unwrap();
    assert!(response.starts_with("RTSP/1.0 404 Not Found\r\n"));
    assert!(response.contains("CSeq: 2\r\n"));

    server.stop();
}

#[test]
fn full_setup_play_teardown_lifecycle() {
    const BIND: &str = "127.0.0.1:28556";
    let track = TestSubsession::new("t0");
    let mut server = Server::new(BIND);
    server
        .add_media_session(TestMediaSession::new("s", vec![track.clone()]))
        .unwrap();
    server.start().expect("server start");

    let mut stream = connect(BIND);

    let setup = rtsp_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1:28556/s/t0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=6000-6001\r\n\r\n",
    )
    .unwrap();
    assert!(setup.starts_with("RTSP/1.0 200 OK\r\n"), "{}", setup);
    let transport = header_value(&setup, "transport:").expect("Transport header");
    assert!(transport.contains("client_port=6000-6001"), "{}", transport);
    assert!(transport.contains("server_port=6970-6971"), "{}", transport);
    let session_id = header_value(&setup, "session:").expect("Session header").to_string();
    assert!(!session_id.is_empty());

    let play = rtsp_request(
        &mut stream,
        &format!(
            "PLAY rtsp://127.0.0.1:28556/s RTSP/1.0\r\nCSeq: 4\r\nSession: {}\r\n\r\n",
            session_id
        ),
    )
    .unwrap();
    assert!(play.starts_with("RTSP/1.0 200 OK\r\n"), "{}", play);
    assert!(play.contains(&format!("Session: {}\r\n", session_id)));
    assert_eq!(track.started.load(Ordering::SeqCst), 1);

    let teardown = rtsp_request(
        &mut stream,
        &format!(
            "TEARDOWN rtsp://127.0.0.1:28556/s RTSP/1.0\r\nCSeq: 5\r\nSession: {}\r\n\r\n",
            session_id
        ),
    )
    .unwrap();
    assert!(teardown.starts_with("RTSP/1.0 200 OK\r\n"), "{}", teardown);

    // The server closes the connection after TEARDOWN and reclaims the
    // stream token.
    let mut probe = [0u8; 1];
    assert_eq!(stream.read(&mut probe).unwrap_or(0), 0);
    assert_eq!(track.deleted.load(Ordering::SeqCst), 1);

    server.stop();
}

#[test]
fn setup_tcp_interleaved_echoes_channel_ids() {
    const BIND: &str = "127.0.0.1:28557";
    let mut server = Server::new(BIND);
    server
        .add_media_session(TestMediaSession::new("s", vec![TestSubsession::new("t0")]))
        .unwrap();
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let setup = rtsp_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1:28557/s/t0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
    )
    .unwrap();
    assert!(setup.starts_with("RTSP/1.0 200 OK\r\n"), "{}", setup);
    assert_eq!(
        header_value(&setup, "transport:"),
        Some("RTP/AVP/TCP;unicast;destination=127.0.0.1;interleaved=0-1")
    );

    server.stop();
}

#[test]
fn setup_multicast_over_tcp_is_461() {
    const BIND: &str = "127.0.0.1:28558";
    let mut server = Server::new(BIND);
    server
        .add_media_session(TestMediaSession::new("s", vec![TestSubsession::multicast("t0")]))
        .unwrap();
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let setup = rtsp_request(
        &mut stream,
        "SETUP rtsp://127.0.0.1:28558/s/t0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
    )
    .unwrap();
    assert!(setup.starts_with("RTSP/1.0 461 Unsupported Transport\r\n"), "{}", setup);
    assert!(setup.contains("CSeq: 3\r\n"));

    server.stop();
}

#[test]
fn digest_challenge_then_authorized_describe() {
    const BIND: &str = "127.0.0.1:28559";
    let mut server = Server::new(BIND);
    let mut db = UserDatabase::new("R");
    db.add_user("alice", "pw");
    server.set_user_database(db);
    server
        .add_media_session(TestMediaSession::new("s", vec![TestSubsession::new("t0")]))
        .unwrap();
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let describe = "DESCRIBE rtsp://127.0.0.1:28559/s RTSP/1.0\r\nCSeq: 2\r\n\r\n";

    let challenge = rtsp_request(&mut stream, describe).unwrap();
    assert!(challenge.starts_with("RTSP/1.0 401 Unauthorized\r\n"), "{}", challenge);
    let www = header_value(&challenge, "www-authenticate:").expect("challenge header");
    assert!(www.contains("realm=\"R\""), "{}", www);
    let nonce = extract_quoted(www, "nonce=\"");

    // Every rejection must rotate the nonce.
    let second = rtsp_request(&mut stream, describe).unwrap();
    let second_nonce = extract_quoted(
        header_value(&second, "www-authenticate:").expect("second challenge"),
        "nonce=\"",
    );
    assert_ne!(nonce, second_nonce);

    // Answer the outstanding challenge with the RFC 2617 MD5 chain.
    let uri = "rtsp://127.0.0.1:28559/s";
    let ha1 = format!("{:x}", Md5::digest(b"alice:R:pw"));
    let ha2 = format!("{:x}", Md5::digest(format!("DESCRIBE:{}", uri).as_bytes()));
    let digest = format!(
        "{:x}",
        Md5::digest(format!("{}:{}:{}", ha1, second_nonce, ha2).as_bytes())
    );

    let authorized = format!(
        "DESCRIBE {} RTSP/1.0\r\nCSeq: 3\r\n\
         Authorization: Digest username=\"alice\", realm=\"R\", nonce=\"{}\", \
         uri=\"{}\", response=\"{}\"\r\n\r\n",
        uri, second_nonce, uri, digest
    );
    let ok = rtsp_request(&mut stream, &authorized).unwrap();
    assert!(ok.starts_with("RTSP/1.0 200 OK\r\n"), "{}", ok);
    assert!(ok.contains("Content-Type: application/sdp\r\n"));
    assert!(ok.contains("v=0\r\n"));

    server.stop();
}

#[test]
fn malformed_request_is_400_without_cseq_and_closes() {
    const BIND: &str = "127.0.0.1:28560";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let response = rtsp_request(&mut stream, "GARBAGE\r\n\r\n").unwrap();
    assert!(response.starts_with("RTSP/1.0 400 Bad Request\r\n"), "{}", response);
    assert!(!response.contains("CSeq"));
    assert!(response.contains("Allow: OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE\r\n"));

    let mut probe = [0u8; 1];
    assert_eq!(stream.read(&mut probe).unwrap_or(0), 0);

    server.stop();
}

#[test]
fn unsupported_method_is_405_and_closes() {
    const BIND: &str = "127.0.0.1:28561";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let response = rtsp_request(
        &mut stream,
        "RECORD rtsp://127.0.0.1:28561/s RTSP/1.0\r\nCSeq: 9\r\n\r\n",
    )
    .unwrap();
    assert!(response.starts_with("RTSP/1.0 405 Method Not Allowed\r\n"), "{}", response);
    assert!(response.contains("CSeq: 9\r\n"));
    assert!(response.contains("Allow: OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY, PAUSE\r\n"));

    let mut probe = [0u8; 1];
    assert_eq!(stream.read(&mut probe).unwrap_or(0), 0);

    server.stop();
}

fn extract_quoted(header: &str, prefix: &str) -> String {
    let start = header.find(prefix).expect("quoted field") + prefix.len();
    let end = header[start..].find('"').expect("closing quote") + start;
    header[start..end].to_string()
}

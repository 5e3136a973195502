//! HTTP Digest authentication (RFC 2617) as embedded in RTSP.
//!
//! The server challenges with `WWW-Authenticate: Digest realm="..",
//! nonce=".."` and the client answers with an `Authorization: Digest`
//! header carrying the MD5 response:
//!
//! ```text
//! HA1      = MD5(username ":" realm ":" password)
//! HA2      = MD5(method ":" uri)
//! response = MD5(HA1 ":" nonce ":" HA2)
//! ```
//!
//! Each control connection owns one [`DigestAuthenticator`]. Its nonce is
//! single-use on failure: every rejection regenerates the nonce before the
//! challenge goes out, so a replayed `Authorization` header can never
//! verify twice.

use std::collections::HashMap;

use md5::{Digest, Md5};
use rand::Rng;

use crate::protocol::scan_header;

/// Mapping from username to credential, plus the realm label.
///
/// Credentials are either clear passwords or precomputed
/// `MD5(username:realm:password)` digests; the flag applies to the whole
/// database. A server without a `UserDatabase` skips authentication
/// entirely.
pub struct UserDatabase {
    realm: String,
    users: HashMap<String, String>,
    passwords_are_md5: bool,
}

impl UserDatabase {
    /// Database holding clear-text passwords.
    pub fn new(realm: &str) -> Self {
        UserDatabase {
            realm: realm.to_string(),
            users: HashMap::new(),
            passwords_are_md5: false,
        }
    }

    /// Database holding `MD5(username:realm:password)` digests instead of
    /// clear passwords.
    pub fn with_md5_credentials(realm: &str) -> Self {
        UserDatabase {
            realm: realm.to_string(),
            users: HashMap::new(),
            passwords_are_md5: true,
        }
    }

    pub fn add_user(&mut self, username: &str, credential: &str) {
        self.users
            .insert(username.to_string(), credential.to_string());
    }

    pub fn remove_user(&mut self, username: &str) {
        self.users.remove(username);
    }

    pub fn lookup(&self, username: &str) -> Option<&str> {
        self.users.get(username).map(|c| c.as_str())
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn passwords_are_md5(&self) -> bool {
        self.passwords_are_md5
    }
}

/// Per-connection Digest authentication state.
///
/// Holds the realm and the one outstanding nonce. A fresh authenticator
/// has no nonce, so the first request on a connection always fails
/// verification and receives a challenge.
pub struct DigestAuthenticator {
    realm: String,
    nonce: Option<String>,
}

impl DigestAuthenticator {
    pub fn new() -> Self {
        DigestAuthenticator {
            realm: String::new(),
            nonce: None,
        }
    }

    /// Install the realm and a fresh random nonce, invalidating whatever
    /// nonce was outstanding.
    pub fn refresh(&mut self, realm: &str) {
        self.realm = realm.to_string();
        self.nonce = Some(generate_nonce());
    }

    /// The currently outstanding nonce, if any.
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// The `WWW-Authenticate` header value for a 401 response.
    pub fn challenge(&self) -> String {
        format!(
            "Digest realm=\"{}\", nonce=\"{}\"",
            self.realm,
            self.nonce.as_deref().unwrap_or("")
        )
    }

    /// Verify the `Authorization: Digest` header of `request` against the
    /// outstanding nonce and the user database.
    ///
    /// Rejects when there is no outstanding nonce, the header is missing
    /// or incomplete, the realm or nonce does not match, the username is
    /// unknown, or the digest response differs from the expected one.
    pub fn verify(&self, method: &str, request: &str, db: &UserDatabase) -> bool {
        let nonce = match self.nonce.as_deref() {
            Some(n) => n,
            None => return false,
        };
        let auth = match parse_authorization_header(request) {
            Some(a) => a,
            None => return false,
        };
        if auth.realm != self.realm || auth.nonce != nonce {
            return false;
        }
        let credential = match db.lookup(&auth.username) {
            Some(c) => c,
            None => {
                tracing::warn!(username = %auth.username, "authorization for unknown user");
                return false;
            }
        };

        let expected = compute_digest_response(
            &auth.username,
            credential,
            db.passwords_are_md5(),
            &self.realm,
            nonce,
            method,
            &auth.uri,
        );
        expected == auth.response
    }
}

impl Default for DigestAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// The quoted fields of an `Authorization: Digest` header.
///
/// All five fields are required; a header missing any of them fails to
/// parse, and verification rejects the request.
#[derive(Debug)]
pub struct AuthorizationHeader {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
}

/// Parse the `Authorization: Digest` header out of a full request.
///
/// The header name is matched case-insensitively; fields are
/// comma-separated `name="value"` pairs and unknown fields are ignored.
pub fn parse_authorization_header(request: &str) -> Option<AuthorizationHeader> {
    let fields = scan_header(request, "Authorization: Digest ")?;

    let mut username = None;
    let mut realm = None;
    let mut nonce = None;
    let mut uri = None;
    let mut response = None;

    for part in fields.split(',') {
        let part = part.trim();
        if let Some((name, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"').to_string();
            match name.trim() {
                "username" => username = Some(value),
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "uri" => uri = Some(value),
                "response" => response = Some(value),
                _ => {}
            }
        }
    }

    Some(AuthorizationHeader {
        username: username?,
        realm: realm?,
        nonce: nonce?,
        uri: uri?,
        response: response?,
    })
}

/// Compute the RFC 2617 digest response for a request.
///
/// `credential` is the clear password, or the precomputed HA1 digest when
/// `credential_is_md5` is set.
pub fn compute_digest_response(
    username: &str,
    credential: &str,
    credential_is_md5: bool,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    let ha1 = if credential_is_md5 {
        credential.to_string()
    } else {
        md5_hex(&format!("{}:{}:{}", username, realm, credential))
    };
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

fn generate_nonce() -> String {
    let mut rng = rand::rng();
    format!("{:08x}{:08x}", rng.random::<u32>(), rng.random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REALM: &str = "test-realm";

    fn database() -> UserDatabase {
        let mut db = UserDatabase::new(REALM);
        db.add_user("alice", "pw");
        db
    }

    fn authorized_request(nonce: &str, response: &str) -> String {
        format!(
            "DESCRIBE rtsp://host/s RTSP/1.0\r\nCSeq: 2\r\n\
             Authorization: Digest username=\"alice\", realm=\"{}\", nonce=\"{}\", \
             uri=\"rtsp://host/s\", response=\"{}\"\r\n\r\n",
            REALM, nonce, response
        )
    }

    #[test]
    fn digest_response_matches_rfc_2617_chain() {
        // Recompute the chain by hand to pin the formula.
        let ha1 = format!("{:x}", Md5::digest(b"alice:test-realm:pw"));
        let ha2 = format!("{:x}", Md5::digest(b"DESCRIBE:rtsp://host/s"));
        let expected = format!(
            "{:x}",
            Md5::digest(format!("{}:abc:{}", ha1, ha2).as_bytes())
        );

        let got = compute_digest_response(
            "alice",
            "pw",
            false,
            REALM,
            "abc",
            "DESCRIBE",
            "rtsp://host/s",
        );
        assert_eq!(got, expected);
    }

    #[test]
    fn verify_accepts_valid_response() {
        let db = database();
        let mut auth = DigestAuthenticator::new();
        auth.refresh(db.realm());
        let nonce = auth.nonce().unwrap().to_string();

        let response =
            compute_digest_response("alice", "pw", false, REALM, &nonce, "DESCRIBE", "rtsp://host/s");
        assert!(auth.verify("DESCRIBE", &authorized_request(&nonce, &response), &db));
    }

    #[test]
    fn verify_is_deterministic() {
        let db = database();
        let mut auth = DigestAuthenticator::new();
        auth.refresh(db.realm());
        let nonce = auth.nonce().unwrap().to_string();
        let response =
            compute_digest_response("alice", "pw", false, REALM, &nonce, "DESCRIBE", "rtsp://host/s");
        let request = authorized_request(&nonce, &response);

        assert!(auth.verify("DESCRIBE", &request, &db));
        assert!(auth.verify("DESCRIBE", &request, &db));
    }

    #[test]
    fn verify_rejects_tampered_response() {
        let db = database();
        let mut auth = DigestAuthenticator::new();
        auth.refresh(db.realm());
        let nonce = auth.nonce().unwrap().to_string();

        let mut response =
            compute_digest_response("alice", "pw", false, REALM, &nonce, "DESCRIBE", "rtsp://host/s");
        // Flip one hex digit.
        let flipped = if response.ends_with('0') { '1' } else { '0' };
        response.pop();
        response.push(flipped);

        assert!(!auth.verify("DESCRIBE", &authorized_request(&nonce, &response), &db));
    }

    #[test]
    fn verify_rejects_without_outstanding_nonce() {
        let db = database();
        let auth = DigestAuthenticator::new();
        let response =
            compute_digest_response("alice", "pw", false, REALM, "stale", "DESCRIBE", "rtsp://host/s");
        assert!(!auth.verify("DESCRIBE", &authorized_request("stale", &response), &db));
    }

    #[test]
    fn verify_rejects_stale_nonce() {
        let db = database();
        let mut auth = DigestAuthenticator::new();
        auth.refresh(db.realm());
        let old_nonce = auth.nonce().unwrap().to_string();
        let response = compute_digest_response(
            "alice", "pw", false, REALM, &old_nonce, "DESCRIBE", "rtsp://host/s",
        );

        auth.refresh(db.realm());
        assert!(!auth.verify("DESCRIBE", &authorized_request(&old_nonce, &response), &db));
    }

    #[test]
    fn verify_rejects_unknown_user() {
        let mut db = UserDatabase::new(REALM);
        db.add_user("bob", "pw");
        let mut auth = DigestAuthenticator::new();
        auth.refresh(db.realm());
        let nonce = auth.nonce().unwrap().to_string();
        let response =
            compute_digest_response("alice", "pw", false, REALM, &nonce, "DESCRIBE", "rtsp://host/s");

        assert!(!auth.verify("DESCRIBE", &authorized_request(&nonce, &response), &db));
    }

    #[test]
    fn verify_accepts_md5_stored_credentials() {
        let ha1 = format!("{:x}", Md5::digest(b"alice:test-realm:pw"));
        let mut db = UserDatabase::with_md5_credentials(REALM);
        db.add_user("alice", &ha1);

        let mut auth = DigestAuthenticator::new();
        auth.refresh(db.realm());
        let nonce = auth.nonce().unwrap().to_string();
        let response =
            compute_digest_response("alice", "pw", false, REALM, &nonce, "DESCRIBE", "rtsp://host/s");

        assert!(auth.verify("DESCRIBE", &authorized_request(&nonce, &response), &db));
    }

    #[test]
    fn refresh_generates_distinct_nonces() {
        let mut auth = DigestAuthenticator::new();
        auth.refresh(REALM);
        let first = auth.nonce().unwrap().to_string();
        auth.refresh(REALM);
        let second = auth.nonce().unwrap().to_string();
        assert_ne!(first, second);
    }

    #[test]
    fn parse_requires_all_five_fields() {
        let missing_uri = "DESCRIBE rtsp://h/s RTSP/1.0\r\n\
            Authorization: Digest username=\"a\", realm=\"r\", nonce=\"n\", response=\"x\"\r\n\r\n";
        assert!(parse_authorization_header(missing_uri).is_none());

        let complete = "DESCRIBE rtsp://h/s RTSP/1.0\r\n\
            Authorization: Digest username=\"a\", realm=\"r\", nonce=\"n\", \
            uri=\"rtsp://h/s\", response=\"x\"\r\n\r\n";
        let auth = parse_authorization_header(complete).unwrap();
        assert_eq!(auth.username, "a");
        assert_eq!(auth.realm, "r");
        assert_eq!(auth.nonce, "n");
        assert_eq!(auth.uri, "rtsp://h/s");
        assert_eq!(auth.response, "x");
    }

    #[test]
    fn parse_absent_header() {
        assert!(parse_authorization_header("DESCRIBE rtsp://h/s RTSP/1.0\r\nCSeq: 1\r\n\r\n").is_none());
    }

    #[test]
    fn user_records_can_be_removed() {
        let mut db = database();
        assert_eq!(db.lookup("alice"), Some("pw"));
        db.remove_user("alice");
        assert_eq!(db.lookup("alice"), None);
    }
}

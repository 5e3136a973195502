//! # rtsp-control — RTSP control-plane server core
//!
//! A Rust library implementing the control plane of an RTSP (RFC 2326)
//! server: request parsing, per-connection session state, transport
//! negotiation, Digest authentication, and the registry of named media
//! sessions. Media delivery itself (RTP packetization and transmission)
//! is delegated to [`MediaSession`]/[`Subsession`] implementations
//! supplied by the embedding application.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation |
//! | [RFC 2617](https://tools.ietf.org/html/rfc2617) | HTTP Digest | DESCRIBE authentication challenges and verification |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Embedded verbatim from media sessions into DESCRIBE responses |
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Server      — listener, registry, user DB    │
//! ├───────────────────────────────────────────────┤
//! │  Transport   — accept loop, request framing   │
//! │  Protocol    — parser, responses, dispatch    │
//! ├───────────────────────────────────────────────┤
//! │  Session     — per-connection stream states   │
//! │  Auth        — Digest challenge/verify        │
//! ├───────────────────────────────────────────────┤
//! │  Media       — collaborator traits (external) │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtsp_control::{MediaSession, Server};
//! # fn my_media_session() -> Arc<dyn MediaSession> { unimplemented!() }
//!
//! let mut server = Server::new("0.0.0.0:8554");
//! server.add_media_session(my_media_session()).unwrap();
//! server.start().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`Server`] orchestrator and [`ServerConfig`].
//! - [`registry`] — [`MediaSessionRegistry`], stream name → media session.
//! - [`protocol`] — request parser, response builder, per-connection
//!   [`ClientSession`](protocol::ClientSession) dispatch.
//! - [`session`] — per-track [`StreamState`], [`TransportHeader`] negotiation.
//! - [`auth`] — [`DigestAuthenticator`] and [`UserDatabase`].
//! - [`media`] — collaborator traits implemented by media sources.
//! - [`transport`] — TCP accept loop and request framing.
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod auth;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use auth::{DigestAuthenticator, UserDatabase};
pub use error::{Result, RtspError};
pub use media::{MediaSession, SetupReply, SetupRequest, StreamToken, Subsession};
pub use registry::MediaSessionRegistry;
pub use server::{Server, ServerConfig, RTSP_DEFAULT_PORT};
pub use session::{Disposition, StreamState, TransportHeader};

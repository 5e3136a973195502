//! Per-connection RTSP session state (RFC 2326 §3).
//!
//! An RTSP session binds one TCP control connection to one media session
//! and a set of per-track stream states:
//!
//! ```text
//! SETUP stream/track  -> bind media session, allocate stream states,
//!                        fill in one stream token
//! PLAY / PAUSE        -> start_stream / pause_stream on matching states
//! TEARDOWN            -> respond, close connection
//! connection drop     -> delete_stream for every issued token
//! ```
//!
//! At most one media session is bound per connection; a SETUP naming a
//! different stream replaces the binding. The [`TransportHeader`] parser
//! lives here because transport negotiation is the heart of SETUP.

pub mod transport;

use std::sync::Arc;

use crate::media::{StreamToken, Subsession};

pub use transport::TransportHeader;

/// Delivery state for one track of the bound media session.
///
/// The token is `None` until SETUP negotiates this track; every `Some`
/// token is returned to its subsession via `delete_stream` exactly once,
/// when the state is reclaimed.
pub struct StreamState {
    pub subsession: Arc<dyn Subsession>,
    pub token: Option<StreamToken>,
}

/// What the connection loop should do with the connection once the current
/// response has been written.
///
/// Handlers never tear the connection down themselves; they report a
/// disposition and the loop that owns the [`ClientSession`](crate::protocol::ClientSession)
/// drops it on [`Close`](Self::Close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep reading requests on this connection.
    Keep,
    /// Write the response, then close the connection and reclaim streams.
    Close,
}

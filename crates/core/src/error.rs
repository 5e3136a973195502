//! Error types for the RTSP control server library.

use std::fmt;

/// Errors that can occur in the RTSP control server library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP requests.
/// - **Transport**: [`Io`](Self::Io) — socket/network failures.
/// - **Server**: [`InvalidBindAddress`](Self::InvalidBindAddress),
///   [`AlreadyRunning`](Self::AlreadyRunning).
/// - **Registry**: [`EmptyStreamName`](Self::EmptyStreamName).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The bind address was not a valid `host:port` pair with an explicit
    /// non-zero port.
    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// A media session cannot be registered under an empty stream name.
    #[error("media session stream name must not be empty")]
    EmptyStreamName,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// The request line had no space after the method.
    MissingMethod,
    /// The request line did not contain the `RTSP/` version tag.
    MissingVersion,
    /// A parsed field exceeded its length bound.
    FieldTooLong,
    /// No `CSeq: ` header was found after the request line.
    MissingCSeq,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMethod => write!(f, "no space after method"),
            Self::MissingVersion => write!(f, "missing RTSP/ version tag"),
            Self::FieldTooLong => write!(f, "field exceeds length bound"),
            Self::MissingCSeq => write!(f, "missing CSeq header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

//! Error types for the RTSP client library.

use std::fmt;

/// Errors that can occur in the RTSP client library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Startup**: [`ConnectionFailed`](Self::ConnectionFailed): the control
///   connection could not be established. Fatal, never retried.
/// - **Transport**: [`Transport`](Self::Transport): a send or receive on an
///   established socket failed. Terminates only the loop that hit it.
/// - **Decode**: [`MalformedReply`](Self::MalformedReply),
///   [`MalformedPacket`](Self::MalformedPacket): the reply or datagram is
///   dropped and the owning loop keeps running.
/// - **Media**: [`MediaBind`](Self::MediaBind): the RTP port could not be bound.
/// - **Pacing**: [`InvalidRate`](Self::InvalidRate): unknown rate selector.
///
/// Requests issued in the wrong state are not errors; see
/// [`Dispatch`](crate::session::Dispatch).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// The control connection to the server could not be opened.
    #[error("failed to connect to {addr}: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Underlying I/O or socket error after startup.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A control reply could not be decoded.
    #[error("malformed RTSP reply: {kind}")]
    MalformedReply { kind: ReplyErrorKind },

    /// A datagram was shorter than the fixed RTP header.
    #[error("malformed RTP packet: {len} bytes")]
    MalformedPacket { len: usize },

    /// The client RTP port could not be bound after SETUP.
    #[error("failed to bind RTP port {port}: {source}")]
    MediaBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A playback rate selector other than `0.5x`, `1x` or `2x`.
    #[error("invalid playback rate: {0}")]
    InvalidRate(String),
}

/// Specific kind of reply decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyErrorKind {
    /// Reply was not valid UTF-8.
    NotUtf8,
    /// Fewer than the three positional lines (status, CSeq, Session).
    TooFewLines(usize),
    /// Status line did not carry a numeric status code.
    InvalidStatusLine,
    /// Second line did not carry a numeric CSeq.
    InvalidCSeq,
    /// Third line did not carry a numeric session id.
    InvalidSession,
}

impl fmt::Display for ReplyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotUtf8 => write!(f, "not valid UTF-8"),
            Self::TooFewLines(n) => write!(f, "expected 3 lines, got {n}"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidCSeq => write!(f, "invalid CSeq line"),
            Self::InvalidSession => write!(f, "invalid Session line"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

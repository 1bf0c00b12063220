//! Control protocol codec.
//!
//! The client speaks a reduced RTSP dialect: one request or reply per
//! message, newline-separated lines, no bodies, no SDP.
//!
//! ## Request format
//!
//! ```text
//! <METHOD> <resource> RTSP/1.0
//! CSeq: <n>
//! Transport: RTP/UDP; client_port= <port>     (SETUP)
//! Session: <id>                               (every other method)
//! ```
//!
//! ## Reply format
//!
//! ```text
//! RTSP/1.0 <status> <reason>
//! CSeq: <n>
//! Session: <id>
//! ```
//!
//! ## Supported methods
//!
//! | Method | Purpose |
//! |--------|---------|
//! | SETUP | Negotiate the client RTP port, obtain a session id |
//! | PLAY | Start media delivery |
//! | PAUSE | Suspend media delivery |
//! | TEARDOWN | Destroy the session |
//! | SPEED_0_5X / SPEED_1X / SPEED_2X | Ask the server to change its delivery rate |

pub mod request;
pub mod response;

pub use request::{RequestKind, RtspRequest};
pub use response::RtspReply;

//! Network transport for the control and media channels.
//!
//! The client uses the usual split transport model:
//!
//! - **TCP** ([`tcp`]): one reliable control connection, opened before the
//!   first request. Requests are written from the caller's thread; replies
//!   are read by a dedicated receive thread.
//!
//! - **UDP** ([`udp`]): one media socket bound to the client-chosen RTP
//!   port after SETUP succeeds, read by its own thread while playing.
//!
//! Both loops block only on their own socket. The control read has no
//! timeout; the media read has a short one so stop signals are noticed.

pub mod tcp;
pub mod udp;

pub use tcp::{ControlChannel, ControlReceiver, LoopControl};
pub use udp::MediaPipeline;

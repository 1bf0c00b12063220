pub mod client;
pub mod error;
pub mod media;
pub mod pacing;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{Client, ClientConfig};
pub use error::{Result, RtspError};
pub use media::{FrameSink, MediaStatsSnapshot};
pub use pacing::{PacingMode, PlaybackRate};
pub use protocol::{RequestKind, RtspReply, RtspRequest};
pub use session::{Dispatch, Session, SessionState, SkipReason};

//! Media packets and frame delivery.
//!
//! The server sends one complete encoded frame (a JPEG image in the
//! reference deployment) per RTP datagram. The receive side is:
//!
//! 1. [`rtp::RtpPacket::decode`] splits the 12-byte header from the payload.
//! 2. [`filter::SequenceFilter`] admits only packets newer than the
//!    high-water mark.
//! 3. Admitted payloads are handed to a [`FrameSink`].
//!
//! The loop that drives these steps lives in
//! [`transport::udp`](crate::transport::udp).

pub mod filter;
pub mod rtp;

use std::sync::atomic::{AtomicU64, Ordering};

pub use filter::SequenceFilter;
pub use rtp::RtpPacket;

/// Consumer of admitted frame payloads (display, cache, recorder).
///
/// Called on the media receive thread. Implementations must return
/// quickly: while `accept` runs, no datagrams are read and playback falls
/// behind. A sink must not call back into the [`Client`](crate::Client):
/// resuming after PAUSE waits for the previous media thread while holding
/// the session lock.
pub trait FrameSink: Send + Sync {
    /// Receive one admitted frame. `sequence_number` is the RTP sequence
    /// number the frame arrived with.
    fn accept(&self, sequence_number: u16, payload: &[u8]);
}

impl<F> FrameSink for F
where
    F: Fn(u16, &[u8]) + Send + Sync,
{
    fn accept(&self, sequence_number: u16, payload: &[u8]) {
        self(sequence_number, payload)
    }
}

/// Counters maintained by the media receive loop.
#[derive(Debug, Default)]
pub struct MediaStats {
    admitted: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
}

/// Point-in-time copy of [`MediaStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStatsSnapshot {
    /// Frames forwarded to the sink.
    pub admitted: u64,
    /// Duplicate or out-of-order packets.
    pub dropped: u64,
    /// Datagrams that failed to decode.
    pub malformed: u64,
}

impl MediaStats {
    pub(crate) fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MediaStatsSnapshot {
        MediaStatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

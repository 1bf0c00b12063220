//! Playback pacing.
//!
//! A user-selected [`PlaybackRate`] is turned into exactly one of two
//! mechanisms, fixed when the client is built:
//!
//! - [`PacingMode::ServerDirected`]: the rate is sent to the server as a
//!   `SPEED_*` request and the server adjusts its delivery rate. The media
//!   loop applies no delay.
//! - [`PacingMode::ClientPaced`]: the server is not told anything. After each
//!   admitted frame the media loop sleeps `base_interval / rate`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::RtspError;

/// Inter-frame delay at 1x in client-paced mode.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(500);

/// User-selectable playback rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackRate {
    /// 0.5x
    Half,
    /// 1x
    #[default]
    Normal,
    /// 2x
    Double,
}

impl PlaybackRate {
    /// Speed multiplier as a `(numerator, denominator)` pair. Both are non-zero.
    pub fn ratio(&self) -> (u32, u32) {
        match self {
            Self::Half => (1, 2),
            Self::Normal => (1, 1),
            Self::Double => (2, 1),
        }
    }

    /// Selector label as shown to users (`0.5x`, `1x`, `2x`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Half => "0.5x",
            Self::Normal => "1x",
            Self::Double => "2x",
        }
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PlaybackRate {
    type Err = RtspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0.5x" | "0.5" => Ok(Self::Half),
            "1x" | "1" => Ok(Self::Normal),
            "2x" | "2" => Ok(Self::Double),
            other => Err(RtspError::InvalidRate(other.to_string())),
        }
    }
}

/// Which pacing mechanism a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    ServerDirected,
    ClientPaced { base_interval: Duration },
}

impl Default for PacingMode {
    fn default() -> Self {
        Self::ClientPaced {
            base_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

/// Shared pacing state: the fixed mode plus the currently selected rate.
///
/// Read by the media loop after every admitted frame, written by the
/// caller when the user picks a new rate.
#[derive(Debug)]
pub struct Pacer {
    mode: PacingMode,
    rate: Mutex<PlaybackRate>,
}

impl Pacer {
    pub fn new(mode: PacingMode) -> Self {
        Pacer {
            mode,
            rate: Mutex::new(PlaybackRate::default()),
        }
    }

    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    pub fn rate(&self) -> PlaybackRate {
        *self.rate.lock()
    }

    /// Record the selected rate. Returns the previous one.
    pub fn set_rate(&self, rate: PlaybackRate) -> PlaybackRate {
        let previous = std::mem::replace(&mut *self.rate.lock(), rate);
        tracing::debug!(%previous, %rate, mode = ?self.mode, "playback rate changed");
        previous
    }

    /// Whether rate changes must be forwarded to the server.
    pub fn is_server_directed(&self) -> bool {
        self.mode == PacingMode::ServerDirected
    }

    /// Delay to apply after an admitted frame, `None` in server-directed mode.
    pub fn frame_delay(&self) -> Option<Duration> {
        frame_delay(self.mode, self.rate())
    }
}

/// `base_interval / rate` for client-paced mode.
pub fn frame_delay(mode: PacingMode, rate: PlaybackRate) -> Option<Duration> {
    match mode {
        PacingMode::ServerDirected => None,
        PacingMode::ClientPaced { base_interval } => {
            let (num, den) = rate.ratio();
            Some(base_interval * den / num.max(1))
        }
    }
}

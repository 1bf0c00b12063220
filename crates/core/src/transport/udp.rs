//! RTP media socket and the thread that reads it while playing.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::{FrameSink, MediaStats, MediaStatsSnapshot, RtpPacket, SequenceFilter};
use crate::pacing::Pacer;

/// Default receive timeout; bounds how long the loop takes to notice a stop.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Default datagram buffer. One datagram carries one whole frame.
pub const DEFAULT_MEDIA_BUFFER: usize = 20480;

/// Cooperative stop signals raised from the control side.
#[derive(Debug, Default)]
struct StopSignals {
    pause_acknowledged: AtomicBool,
    teardown_acknowledged: AtomicBool,
}

impl StopSignals {
    fn should_stop(&self) -> bool {
        self.pause_acknowledged.load(Ordering::SeqCst)
            || self.teardown_acknowledged.load(Ordering::SeqCst)
    }
}

/// RTP receive pipeline.
///
/// Owns the client media socket, bound when SETUP succeeds, and the thread
/// that reads it while the session is playing. The high-water mark of the
/// admission filter survives pause/resume cycles.
///
/// Stopping is cooperative: [`pause`](Self::pause) and
/// [`close`](Self::close) raise a flag that the loop sees on its next read
/// timeout, after which read errors are no longer reported.
pub struct MediaPipeline {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    buffer_size: usize,
    signals: Arc<StopSignals>,
    filter: Arc<Mutex<SequenceFilter>>,
    stats: Arc<MediaStats>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl MediaPipeline {
    /// Bind the client RTP port on all interfaces.
    pub fn open(port: u16, read_timeout: Duration, buffer_size: usize) -> Result<Self> {
        let bind_err = |source| RtspError::MediaBind { port, source };

        let socket = UdpSocket::bind(("0.0.0.0", port)).map_err(bind_err)?;
        // A zero timeout is rejected by the OS; fall back to the default.
        let timeout = if read_timeout.is_zero() {
            DEFAULT_READ_TIMEOUT
        } else {
            read_timeout
        };
        socket.set_read_timeout(Some(timeout)).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        tracing::info!(%local_addr, "RTP port open");

        Ok(MediaPipeline {
            socket: Arc::new(socket),
            local_addr,
            buffer_size: buffer_size.max(crate::media::rtp::HEADER_SIZE),
            signals: Arc::new(StopSignals::default()),
            filter: Arc::new(Mutex::new(SequenceFilter::new())),
            stats: Arc::new(MediaStats::default()),
            worker: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the receive loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn stats(&self) -> MediaStatsSnapshot {
        self.stats.snapshot()
    }

    /// Highest admitted sequence number so far.
    pub fn high_water(&self) -> Option<u16> {
        self.filter.lock().high_water()
    }

    /// Start (or resume) the receive loop.
    ///
    /// A loop that is already running and not paused is left alone. A loop
    /// that was paused is waited for before a fresh one is spawned.
    pub fn start(&mut self, sink: Arc<dyn FrameSink>, pacer: Arc<Pacer>) -> Result<()> {
        if self.signals.teardown_acknowledged.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.is_running() && !self.signals.pause_acknowledged.load(Ordering::SeqCst) {
            tracing::debug!(local_addr = %self.local_addr, "RTP loop already running");
            return Ok(());
        }
        self.reap();
        self.signals.pause_acknowledged.store(false, Ordering::SeqCst);

        let worker = ReceiveLoop {
            socket: self.socket.clone(),
            signals: self.signals.clone(),
            filter: self.filter.clone(),
            stats: self.stats.clone(),
            sink,
            pacer,
            buffer_size: self.buffer_size,
        };
        let handle = thread::Builder::new()
            .name("rtp-receive".to_string())
            .spawn(move || worker.run())?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Signal the loop that PAUSE was acknowledged. Does not wait for it.
    pub fn pause(&self) {
        self.signals.pause_acknowledged.store(true, Ordering::SeqCst);
        tracing::debug!(local_addr = %self.local_addr, "RTP loop pause requested");
    }

    /// Stop the loop, wait for it, and release the socket.
    ///
    /// Safe to call when the loop has already exited or never started.
    pub fn close(mut self) -> MediaStatsSnapshot {
        self.signals
            .teardown_acknowledged
            .store(true, Ordering::SeqCst);
        self.reap();
        let stats = self.stats.snapshot();
        tracing::info!(
            local_addr = %self.local_addr,
            admitted = stats.admitted,
            dropped = stats.dropped,
            malformed = stats.malformed,
            "RTP port closed"
        );
        stats
    }

    /// Join a finished or stopping worker and log how it ended.
    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "RTP loop ended with error"),
                Err(_) => tracing::error!("RTP loop panicked"),
            }
        }
    }
}

struct ReceiveLoop {
    socket: Arc<UdpSocket>,
    signals: Arc<StopSignals>,
    filter: Arc<Mutex<SequenceFilter>>,
    stats: Arc<MediaStats>,
    sink: Arc<dyn FrameSink>,
    pacer: Arc<Pacer>,
    buffer_size: usize,
}

impl ReceiveLoop {
    fn run(self) -> Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        tracing::debug!("RTP receive loop started");

        while !self.signals.should_stop() {
            let n = match self.socket.recv(&mut buf) {
                Ok(n) => n,
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    if self.signals.should_stop() {
                        break;
                    }
                    tracing::warn!(error = %e, "RTP receive failed");
                    return Err(e.into());
                }
            };

            let packet = match RtpPacket::decode(&buf[..n]) {
                Ok(packet) => packet,
                Err(e) => {
                    self.stats.record_malformed();
                    tracing::trace!(error = %e, "discarding datagram");
                    continue;
                }
            };

            let seq = packet.sequence_number;
            if !self.filter.lock().admit(seq) {
                self.stats.record_dropped();
                tracing::trace!(seq, "dropping late or duplicate packet");
                continue;
            }

            self.stats.record_admitted();
            tracing::trace!(seq, len = packet.payload.len(), "frame admitted");
            self.sink.accept(seq, &packet.payload);

            if let Some(delay) = self.pacer.frame_delay() {
                thread::sleep(delay);
            }
        }

        tracing::debug!("RTP receive loop stopped");
        Ok(())
    }
}

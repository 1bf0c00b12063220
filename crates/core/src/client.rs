//! The streaming client: a control connection, a session, and the media
//! pipeline opened on SETUP.

use std::io::ErrorKind;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, RtspError};
use crate::media::{FrameSink, MediaStatsSnapshot};
use crate::pacing::{Pacer, PacingMode, PlaybackRate};
use crate::protocol::{RequestKind, RtspReply};
use crate::session::{Dispatch, ReplyOutcome, Session, SessionState};
use crate::transport::tcp::DEFAULT_CONTROL_BUFFER;
use crate::transport::udp::{DEFAULT_MEDIA_BUFFER, DEFAULT_READ_TIMEOUT};
use crate::transport::{ControlChannel, LoopControl, MediaPipeline};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or IP address.
    pub server_addr: String,
    /// Server control (RTSP) port.
    pub server_port: u16,
    /// Local UDP port announced in SETUP and bound for RTP.
    pub rtp_port: u16,
    /// Resource requested from the server (e.g. `movie.Mjpeg`).
    pub resource: String,
    /// Pacing mechanism, fixed for the lifetime of the client.
    pub pacing: PacingMode,
    /// Connect timeout for the control connection. `None` blocks.
    pub connect_timeout: Option<Duration>,
    /// Media socket read timeout; bounds how fast the media loop stops.
    pub media_read_timeout: Duration,
    /// Bytes per control read. One read is decoded as one reply.
    pub control_buffer_size: usize,
    /// Bytes per media read. One datagram carries one frame.
    pub media_buffer_size: usize,
}

impl ClientConfig {
    pub fn new(server_addr: &str, server_port: u16, rtp_port: u16, resource: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            server_port,
            rtp_port,
            resource: resource.to_string(),
            pacing: PacingMode::default(),
            connect_timeout: None,
            media_read_timeout: DEFAULT_READ_TIMEOUT,
            control_buffer_size: DEFAULT_CONTROL_BUFFER,
            media_buffer_size: DEFAULT_MEDIA_BUFFER,
        }
    }

    /// `host:port` of the control endpoint.
    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.server_addr, self.server_port)
    }
}

/// State shared between the caller and the control receive thread.
///
/// Every session mutation goes through `session`. Media effects of a reply
/// run while that lock is held, so an observer that sees a new state also
/// sees its media side effect applied. Closing the pipeline on teardown is
/// the exception: it joins the RTP thread, so it runs after the lock is
/// released.
struct Shared {
    config: ClientConfig,
    session: Mutex<Session>,
    changed: Condvar,
    media: Mutex<Option<MediaPipeline>>,
    pacer: Arc<Pacer>,
    sink: Arc<dyn FrameSink>,
}

impl Shared {
    /// Apply one reply and run its side effects. Called on the control thread.
    fn on_reply(&self, reply: RtspReply) -> LoopControl {
        let mut session = self.session.lock();
        let outcome = session.apply(&reply);
        let mut closing = None;

        let control = match outcome {
            ReplyOutcome::Applied(transition) => {
                tracing::info!(
                    request = %transition.request,
                    from = %transition.from,
                    to = %transition.to,
                    session_id = ?session.session_id(),
                    "state transition"
                );
                match transition.request {
                    RequestKind::Setup => self.open_media(),
                    RequestKind::Play => self.start_media(),
                    RequestKind::Pause => {
                        if let Some(media) = self.media.lock().as_ref() {
                            media.pause();
                        }
                    }
                    RequestKind::Teardown => closing = self.media.lock().take(),
                    RequestKind::Speed(rate) => {
                        tracing::info!(%rate, "server acknowledged playback rate");
                    }
                }
                if transition.request == RequestKind::Teardown {
                    LoopControl::Close
                } else {
                    LoopControl::Continue
                }
            }
            ReplyOutcome::Rejected { request, status } => {
                tracing::warn!(%request, status, cseq = reply.cseq, "server rejected request");
                LoopControl::Continue
            }
            ReplyOutcome::Stale { expected, received } => {
                tracing::debug!(expected, received, "ignoring reply with stale CSeq");
                LoopControl::Continue
            }
            ReplyOutcome::ForeignSession { expected, received } => {
                tracing::warn!(expected, received, "ignoring reply for another session");
                LoopControl::Continue
            }
            ReplyOutcome::Unsolicited => {
                tracing::debug!(cseq = reply.cseq, "ignoring unsolicited reply");
                LoopControl::Continue
            }
        };

        drop(session);
        self.changed.notify_all();
        if let Some(media) = closing {
            media.close();
        }
        control
    }

    fn open_media(&self) {
        let mut media = self.media.lock();
        if media.is_some() {
            return;
        }
        match MediaPipeline::open(
            self.config.rtp_port,
            self.config.media_read_timeout,
            self.config.media_buffer_size,
        ) {
            Ok(pipeline) => *media = Some(pipeline),
            Err(e) => tracing::error!(error = %e, "cannot receive media"),
        }
    }

    fn start_media(&self) {
        match self.media.lock().as_mut() {
            Some(pipeline) => {
                if let Err(e) = pipeline.start(self.sink.clone(), self.pacer.clone()) {
                    tracing::error!(error = %e, "failed to start RTP loop");
                }
            }
            None => tracing::warn!("PLAY acknowledged but the RTP port is not open"),
        }
    }
}

/// One control connection plus the thread reading it.
struct ControlLink {
    channel: ControlChannel,
    receiver: Option<JoinHandle<Result<()>>>,
}

impl ControlLink {
    fn open(shared: &Arc<Shared>) -> Result<Self> {
        let config = &shared.config;
        let (channel, receiver) = ControlChannel::connect(
            &config.server_endpoint(),
            config.connect_timeout,
            config.control_buffer_size,
        )?;
        let handler = shared.clone();
        let receiver = receiver.spawn(move |reply| handler.on_reply(reply))?;
        Ok(ControlLink {
            channel,
            receiver: Some(receiver),
        })
    }

    fn join_receiver(&mut self) -> Result<()> {
        join_control(self.receiver.take())
    }
}

fn join_control(handle: Option<JoinHandle<Result<()>>>) -> Result<()> {
    match handle {
        Some(handle) => handle.join().unwrap_or_else(|_| {
            Err(RtspError::Transport(std::io::Error::other(
                "control receive thread panicked",
            )))
        }),
        None => Ok(()),
    }
}

/// RTSP streaming client.
///
/// Owns the control connection and, after SETUP, the media pipeline.
/// Requests are validated against the session state before anything is
/// written; replies are applied on a background thread.
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rtsp_client::{Client, ClientConfig, SessionState};
///
/// let config = ClientConfig::new("127.0.0.1", 8554, 25000, "movie.Mjpeg");
/// let sink = |seq: u16, frame: &[u8]| println!("frame {seq}: {} bytes", frame.len());
/// let client = Client::connect(config, Arc::new(sink))?;
///
/// client.setup()?;
/// client.wait_for_state(SessionState::Ready, Duration::from_secs(2));
/// client.play()?;
/// # Ok::<(), rtsp_client::RtspError>(())
/// ```
pub struct Client {
    shared: Arc<Shared>,
    control: Mutex<ControlLink>,
}

impl Client {
    /// Connect to the server and start the control receive loop.
    ///
    /// Fails with [`RtspError::ConnectionFailed`] if the server is unreachable.
    pub fn connect(config: ClientConfig, sink: Arc<dyn FrameSink>) -> Result<Self> {
        let shared = Arc::new(Shared {
            pacer: Arc::new(Pacer::new(config.pacing)),
            config,
            session: Mutex::new(Session::new()),
            changed: Condvar::new(),
            media: Mutex::new(None),
            sink,
        });
        let link = ControlLink::open(&shared)?;
        Ok(Client {
            shared,
            control: Mutex::new(link),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Send `kind` if the session allows it now.
    ///
    /// A request that is not allowed returns [`Dispatch::Skipped`] without
    /// writing anything. A SETUP issued after the control connection was
    /// closed by a teardown reconnects first. A failed write is returned as
    /// [`RtspError::Transport`] and not retried; the connection is closed
    /// and the request no longer counts as pending.
    pub fn send_request(&self, kind: RequestKind) -> Result<Dispatch> {
        let mut link = self.control.lock();

        let reconnect = {
            let session = self.shared.session.lock();
            if let Some(reason) = session.check(kind) {
                tracing::debug!(request = %kind, ?reason, "request skipped");
                return Ok(Dispatch::Skipped(reason));
            }
            // The teardown reply becomes visible before the receive loop has
            // shut the connection, so an acknowledged teardown counts as closed.
            session.teardown_acknowledged() || link.channel.is_closed()
        };

        if reconnect {
            if kind != RequestKind::Setup {
                return Err(RtspError::Transport(std::io::Error::new(
                    ErrorKind::NotConnected,
                    "control connection is closed",
                )));
            }
            link.channel.close();
            // The old receive thread may still be applying a reply, so it is
            // joined without holding the session lock.
            if let Err(e) = link.join_receiver() {
                tracing::debug!(error = %e, "previous control loop ended with error");
            }
            *link = ControlLink::open(&self.shared)?;
        }

        let config = &self.shared.config;
        let prepared = self
            .shared
            .session
            .lock()
            .prepare(kind, &config.resource, config.rtp_port);
        let request = match prepared {
            Ok(request) => request,
            Err(reason) => return Ok(Dispatch::Skipped(reason)),
        };

        if let Err(e) = link.channel.send(request.encode().as_bytes()) {
            tracing::warn!(request = %kind, cseq = request.cseq, error = %e, "request not sent");
            // Nothing will answer on this connection; the next SETUP reconnects.
            link.channel.close();
            self.shared.session.lock().abandon_pending();
            self.shared.changed.notify_all();
            return Err(e);
        }
        tracing::info!(
            request = %kind,
            cseq = request.cseq,
            session_id = request.session_id,
            "request sent"
        );
        Ok(Dispatch::Sent { cseq: request.cseq })
    }

    pub fn setup(&self) -> Result<Dispatch> {
        self.send_request(RequestKind::Setup)
    }

    pub fn play(&self) -> Result<Dispatch> {
        self.send_request(RequestKind::Play)
    }

    pub fn pause(&self) -> Result<Dispatch> {
        self.send_request(RequestKind::Pause)
    }

    pub fn teardown(&self) -> Result<Dispatch> {
        self.send_request(RequestKind::Teardown)
    }

    /// Select a playback rate.
    ///
    /// Client-paced: takes effect on the next admitted frame, nothing is
    /// sent and `None` is returned. Server-directed: a `SPEED_*` request is
    /// sent under the usual rules; the rate is recorded only if it was sent.
    pub fn set_rate(&self, rate: PlaybackRate) -> Result<Option<Dispatch>> {
        let pacer = &self.shared.pacer;
        if !pacer.is_server_directed() {
            pacer.set_rate(rate);
            return Ok(None);
        }
        let dispatch = self.send_request(RequestKind::Speed(rate))?;
        if dispatch.is_sent() {
            pacer.set_rate(rate);
        }
        Ok(Some(dispatch))
    }

    pub fn rate(&self) -> PlaybackRate {
        self.shared.pacer.rate()
    }

    pub fn state(&self) -> SessionState {
        self.shared.session.lock().state()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.shared.session.lock().session_id()
    }

    /// Copy of the current session.
    pub fn session(&self) -> Session {
        self.shared.session.lock().clone()
    }

    /// Block until the session reaches `state` or `timeout` passes.
    pub fn wait_for_state(&self, state: SessionState, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.state() == state)
    }

    /// Block until the most recent request has been answered.
    pub fn wait_for_reply(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| !s.awaiting_reply())
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Session) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut session = self.shared.session.lock();
        while !done(&*session) {
            if self
                .shared
                .changed
                .wait_until(&mut session, deadline)
                .timed_out()
            {
                return done(&*session);
            }
        }
        true
    }

    /// Whether the RTP port is currently bound.
    pub fn is_media_open(&self) -> bool {
        self.shared.media.lock().is_some()
    }

    /// Whether the RTP receive loop is running (playing and not paused).
    pub fn is_receiving(&self) -> bool {
        self.shared
            .media
            .lock()
            .as_ref()
            .is_some_and(MediaPipeline::is_running)
    }

    /// Counters of the media pipeline, `None` while no RTP port is open.
    pub fn media_stats(&self) -> Option<MediaStatsSnapshot> {
        self.shared.media.lock().as_ref().map(|m| m.stats())
    }

    /// Whether the control connection is open.
    pub fn is_connected(&self) -> bool {
        !self.control.lock().channel.is_closed()
    }

    /// Wait for the control receive loop to finish and return how it ended.
    ///
    /// After an acknowledged teardown this returns `Ok(())` once both
    /// sockets are closed.
    pub fn wait(&self) -> Result<()> {
        // Take the handle first so senders are not blocked while joining.
        let handle = self.control.lock().receiver.take();
        join_control(handle)
    }

    /// Close the control connection and the media socket without a
    /// teardown exchange. Safe to call more than once.
    pub fn shutdown(&self) {
        self.control.lock().channel.close();
        let media = self.shared.media.lock().take();
        if let Some(media) = media {
            media.close();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

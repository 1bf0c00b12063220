//! Client-side RTSP session state machine.
//!
//! The session tracks the playback state, the server-assigned session id,
//! the CSeq counter and the last request sent. It performs no I/O: callers
//! ask it to [`prepare`](Session::prepare) a request, send the bytes
//! themselves, and feed every decoded reply back through
//! [`apply`](Session::apply).
//!
//! ## Lifecycle
//!
//! ```text
//! Init  --SETUP/200-->    Ready
//! Ready --PLAY/200-->     Playing
//! Playing --PAUSE/200-->  Ready
//! Ready|Playing --TEARDOWN/200--> Init   (teardown acknowledged)
//! any   --SPEED_*/200-->  (unchanged)
//! ```
//!
//! Requests issued in the wrong state are skipped without consuming a
//! CSeq. Replies are matched on CSeq against the most recent request only;
//! there is no queue of outstanding requests. While a reply is pending,
//! PLAY, PAUSE and SPEED_* are held back. SETUP and TEARDOWN always go
//! out and replace the pending request, whose late reply is then stale.

use std::fmt;

use crate::protocol::{RequestKind, RtspReply, RtspRequest};

/// Playback state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session, or the previous one was torn down.
    #[default]
    Init,
    /// SETUP acknowledged, media port open, not playing.
    Ready,
    /// PLAY acknowledged, media is flowing.
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Ready => "READY",
            Self::Playing => "PLAYING",
        };
        f.write_str(s)
    }
}

/// Result of asking the session to send a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The request was written to the control connection.
    Sent { cseq: u32 },
    /// Nothing was sent and no CSeq was consumed.
    Skipped(SkipReason),
}

impl Dispatch {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Why a request was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The request is not allowed in the current state.
    Precondition {
        request: RequestKind,
        state: SessionState,
    },
    /// Another request is still awaiting its reply.
    RequestInFlight {
        request: RequestKind,
        pending: RequestKind,
    },
}

/// A state change caused by a successful reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub request: RequestKind,
    pub from: SessionState,
    pub to: SessionState,
}

/// What [`Session::apply`] did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Matched and successful; the transition has been applied.
    Applied(Transition),
    /// Matched, but the server answered with a non-200 status.
    Rejected { request: RequestKind, status: u16 },
    /// CSeq does not match the most recent request.
    Stale { expected: u32, received: u32 },
    /// Session id differs from the one assigned at SETUP.
    ForeignSession { expected: u64, received: u64 },
    /// No request has been sent yet.
    Unsolicited,
}

/// Client session state. Owned by a single serialized owner.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: SessionState,
    /// `0` while unassigned.
    session_id: u64,
    request_seq: u32,
    last_request_sent: Option<RequestKind>,
    teardown_acknowledged: bool,
    awaiting_reply: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Server-assigned session id, `None` until the first successful SETUP.
    pub fn session_id(&self) -> Option<u64> {
        (self.session_id != 0).then_some(self.session_id)
    }

    /// CSeq of the most recently sent request (`0` before the first).
    pub fn request_seq(&self) -> u32 {
        self.request_seq
    }

    pub fn last_request_sent(&self) -> Option<RequestKind> {
        self.last_request_sent
    }

    pub fn teardown_acknowledged(&self) -> bool {
        self.teardown_acknowledged
    }

    /// Whether the most recent request has not been answered yet.
    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// Check whether `kind` may be sent now, without changing anything.
    pub fn check(&self, kind: RequestKind) -> Option<SkipReason> {
        if !kind.permitted_in(self.state) {
            return Some(SkipReason::Precondition {
                request: kind,
                state: self.state,
            });
        }
        let supersedes = matches!(kind, RequestKind::Setup | RequestKind::Teardown);
        match self.last_request_sent {
            Some(pending) if self.awaiting_reply && !supersedes => {
                Some(SkipReason::RequestInFlight {
                    request: kind,
                    pending,
                })
            }
            _ => None,
        }
    }

    /// Stop waiting for the most recent request, e.g. after its write
    /// failed. The CSeq stays consumed, so a late reply would be stale anyway.
    pub fn abandon_pending(&mut self) {
        if self.awaiting_reply {
            tracing::debug!(
                cseq = self.request_seq,
                request = ?self.last_request_sent,
                "pending request abandoned"
            );
            self.awaiting_reply = false;
        }
    }

    /// Build the next request of `kind`, consuming a CSeq.
    ///
    /// On a skip nothing changes. A SETUP issued after a teardown starts a
    /// fresh session: the old id is forgotten so the new reply can assign one.
    pub fn prepare(
        &mut self,
        kind: RequestKind,
        resource: &str,
        client_port: u16,
    ) -> Result<RtspRequest, SkipReason> {
        if let Some(reason) = self.check(kind) {
            return Err(reason);
        }

        if kind == RequestKind::Setup && self.teardown_acknowledged {
            tracing::debug!(old_session_id = self.session_id, "starting a new session");
            self.session_id = 0;
            self.teardown_acknowledged = false;
        }

        self.request_seq += 1;
        self.last_request_sent = Some(kind);
        self.awaiting_reply = true;

        Ok(RtspRequest {
            kind,
            resource: resource.to_string(),
            cseq: self.request_seq,
            session_id: self.session_id,
            client_port: (kind == RequestKind::Setup).then_some(client_port),
        })
    }

    /// Apply a decoded reply.
    ///
    /// The reply is applied only if its CSeq equals the most recent request's
    /// and, once a session id has been assigned, its session id matches.
    /// The id is adopted from the first successful SETUP reply and never
    /// changes afterwards. Only status 200 drives a transition.
    pub fn apply(&mut self, reply: &RtspReply) -> ReplyOutcome {
        let Some(request) = self.last_request_sent else {
            return ReplyOutcome::Unsolicited;
        };

        if reply.cseq != self.request_seq {
            return ReplyOutcome::Stale {
                expected: self.request_seq,
                received: reply.cseq,
            };
        }

        if self.session_id == 0 {
            if request == RequestKind::Setup && reply.is_success() {
                self.session_id = reply.session_id;
                tracing::info!(session_id = self.session_id, "session id assigned");
            }
        } else if reply.session_id != self.session_id {
            return ReplyOutcome::ForeignSession {
                expected: self.session_id,
                received: reply.session_id,
            };
        }

        self.awaiting_reply = false;

        if !reply.is_success() {
            return ReplyOutcome::Rejected {
                request,
                status: reply.status_code,
            };
        }

        let from = self.state;
        let to = match request {
            RequestKind::Setup => SessionState::Ready,
            RequestKind::Play => SessionState::Playing,
            RequestKind::Pause => SessionState::Ready,
            RequestKind::Teardown => {
                self.teardown_acknowledged = true;
                SessionState::Init
            }
            RequestKind::Speed(_) => from,
        };
        self.state = to;

        tracing::debug!(%request, %from, %to, cseq = reply.cseq, "reply applied");
        ReplyOutcome::Applied(Transition { request, from, to })
    }
}

//! Request kinds, their state preconditions, and the request wire format.

use std::fmt;

use crate::pacing::PlaybackRate;
use crate::session::SessionState;

/// Protocol version written on every request line.
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// The kind of control request the client can issue.
///
/// Each kind carries its own precondition on the current
/// [`SessionState`]; see [`permitted_in`](Self::permitted_in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Setup,
    Play,
    Pause,
    Teardown,
    /// Server-directed rate change (`SPEED_0_5X`, `SPEED_1X`, `SPEED_2X`).
    Speed(PlaybackRate),
}

impl RequestKind {
    /// Method token written on the request line.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::Speed(PlaybackRate::Half) => "SPEED_0_5X",
            Self::Speed(PlaybackRate::Normal) => "SPEED_1X",
            Self::Speed(PlaybackRate::Double) => "SPEED_2X",
        }
    }

    /// Inverse of [`method`](Self::method).
    pub fn from_method(method: &str) -> Option<Self> {
        let kind = match method {
            "SETUP" => Self::Setup,
            "PLAY" => Self::Play,
            "PAUSE" => Self::Pause,
            "TEARDOWN" => Self::Teardown,
            "SPEED_0_5X" => Self::Speed(PlaybackRate::Half),
            "SPEED_1X" => Self::Speed(PlaybackRate::Normal),
            "SPEED_2X" => Self::Speed(PlaybackRate::Double),
            _ => return None,
        };
        Some(kind)
    }

    /// Whether this request may be sent while the session is in `state`.
    ///
    /// | Request  | Allowed in            |
    /// |----------|-----------------------|
    /// | SETUP    | Init                  |
    /// | PLAY     | Ready                 |
    /// | PAUSE    | Playing               |
    /// | TEARDOWN | Ready, Playing        |
    /// | SPEED_*  | any                   |
    pub fn permitted_in(&self, state: SessionState) -> bool {
        match self {
            Self::Setup => state == SessionState::Init,
            Self::Play => state == SessionState::Ready,
            Self::Pause => state == SessionState::Playing,
            Self::Teardown => state != SessionState::Init,
            Self::Speed(_) => true,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// An outgoing control request.
///
/// Renders to the newline-separated text format the streaming server
/// expects. SETUP carries a `Transport` line, every other method a
/// `Session` line:
///
/// ```text
/// SETUP movie.Mjpeg RTSP/1.0
/// CSeq: 1
/// Transport: RTP/UDP; client_port= 25000
/// ```
///
/// The spacing after `client_port=` is significant: servers split the
/// transport line on single spaces and read the port from the fourth field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspRequest {
    pub kind: RequestKind,
    /// Resource (file) name requested from the server.
    pub resource: String,
    pub cseq: u32,
    /// Session id, `0` while unassigned.
    pub session_id: u64,
    /// Client RTP port announced in the SETUP `Transport` line.
    pub client_port: Option<u16>,
}

impl RtspRequest {
    /// Render the request in wire format. Pure; performs no validation.
    pub fn encode(&self) -> String {
        let mut lines = vec![
            format!("{} {} {}", self.kind.method(), self.resource, RTSP_VERSION),
            format!("CSeq: {}", self.cseq),
        ];
        match (self.kind, self.client_port) {
            (RequestKind::Setup, Some(port)) => {
                lines.push(format!("Transport: RTP/UDP; client_port= {}", port));
            }
            _ => lines.push(format!("Session: {}", self.session_id)),
        }
        lines.join("\n")
    }

    /// Parse a request in wire format.
    ///
    /// Used by stub servers. Headers are looked up by name
    /// (case-insensitive), so a request with extra or reordered headers
    /// still parses. Returns `None` on an unknown method or missing CSeq.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut lines = raw.lines().map(str::trim_end);

        let mut parts = lines.next()?.split_whitespace();
        let kind = RequestKind::from_method(parts.next()?)?;
        let resource = parts.next()?.to_string();

        let mut cseq = None;
        let mut session_id = 0;
        let mut client_port = None;

        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if name.trim().eq_ignore_ascii_case("CSeq") {
                cseq = value.parse().ok();
            } else if name.trim().eq_ignore_ascii_case("Session") {
                session_id = value.split(';').next()?.trim().parse().ok()?;
            } else if name.trim().eq_ignore_ascii_case("Transport") {
                client_port = value.split(';').find_map(|part| {
                    part.trim()
                        .strip_prefix("client_port=")
                        .and_then(|p| p.trim().parse().ok())
                });
            }
        }

        Some(RtspRequest {
            kind,
            resource,
            cseq: cseq?,
            session_id,
            client_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: RequestKind, cseq: u32, session_id: u64) -> RtspRequest {
        RtspRequest {
            kind,
            resource: "movie.Mjpeg".to_string(),
            cseq,
            session_id,
            client_port: (kind == RequestKind::Setup).then_some(25000),
        }
    }

    #[test]
    fn encode_setup_with_transport() {
        let raw = request(RequestKind::Setup, 1, 0).encode();
        assert_eq!(
            raw,
            "SETUP movie.Mjpeg RTSP/1.0\nCSeq: 1\nTransport: RTP/UDP; client_port= 25000"
        );
        // Servers read the port as the fourth space-separated field.
        let transport = raw.lines().nth(2).unwrap();
        assert_eq!(transport.split(' ').nth(3), Some("25000"));
    }

    #[test]
    fn encode_play_with_session() {
        let raw = request(RequestKind::Play, 2, 77).encode();
        assert_eq!(raw, "PLAY movie.Mjpeg RTSP/1.0\nCSeq: 2\nSession: 77");
    }

    #[test]
    fn encode_speed_methods() {
        let raw = request(RequestKind::Speed(PlaybackRate::Half), 5, 77).encode();
        assert!(raw.starts_with("SPEED_0_5X movie.Mjpeg RTSP/1.0\n"));
        let raw = request(RequestKind::Speed(PlaybackRate::Double), 6, 77).encode();
        assert!(raw.starts_with("SPEED_2X "));
    }

    #[test]
    fn parse_recovers_encoded_fields() {
        for kind in [RequestKind::Setup, RequestKind::Pause, RequestKind::Teardown] {
            let original = request(kind, 9, if kind == RequestKind::Setup { 0 } else { 42 });
            let parsed = RtspRequest::parse(&original.encode()).unwrap();
            assert_eq!(parsed, original);
        }
    }

    #[test]
    fn parse_crlf_and_case_insensitive_headers() {
        let raw = "PLAY movie.Mjpeg RTSP/1.0\r\ncseq: 3\r\nsession: 77;timeout=60\r\n\r\n";
        let parsed = RtspRequest::parse(raw).unwrap();
        assert_eq!(parsed.kind, RequestKind::Play);
        assert_eq!(parsed.cseq, 3);
        assert_eq!(parsed.session_id, 77);
    }

    #[test]
    fn parse_rejects_unknown_method_and_missing_cseq() {
        assert!(RtspRequest::parse("DESCRIBE x RTSP/1.0\nCSeq: 1").is_none());
        assert!(RtspRequest::parse("PLAY x RTSP/1.0\nSession: 1").is_none());
        assert!(RtspRequest::parse("").is_none());
    }

    #[test]
    fn preconditions() {
        use SessionState::*;
        assert!(RequestKind::Setup.permitted_in(Init));
        assert!(!RequestKind::Setup.permitted_in(Ready));
        assert!(RequestKind::Play.permitted_in(Ready));
        assert!(!RequestKind::Play.permitted_in(Playing));
        assert!(RequestKind::Pause.permitted_in(Playing));
        assert!(!RequestKind::Pause.permitted_in(Ready));
        assert!(!RequestKind::Teardown.permitted_in(Init));
        assert!(RequestKind::Teardown.permitted_in(Ready));
        assert!(RequestKind::Teardown.permitted_in(Playing));
        for state in [Init, Ready, Playing] {
            assert!(RequestKind::Speed(PlaybackRate::Double).permitted_in(state));
        }
    }
}

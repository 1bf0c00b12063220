//! Control replies: positional decoding and serialization.

use crate::error::{ReplyErrorKind, RtspError};

/// A control reply from the server.
///
/// The wire format is three positional lines:
///
/// ```text
/// RTSP/1.0 200 OK
/// CSeq: 3
/// Session: 123456
/// ```
///
/// Lines are read by position, not by header name, because that is what
/// the servers this client talks to emit. The line count is checked before
/// any line is indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspReply {
    pub status_code: u16,
    pub cseq: u32,
    pub session_id: u64,
}

/// Status code of the only reply that advances the session.
pub const STATUS_OK: u16 = 200;

impl RtspReply {
    pub fn new(status_code: u16, cseq: u32, session_id: u64) -> Self {
        RtspReply {
            status_code,
            cseq,
            session_id,
        }
    }

    /// 200 OK: the request was accepted.
    pub fn ok(cseq: u32, session_id: u64) -> Self {
        Self::new(STATUS_OK, cseq, session_id)
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Decode a reply from raw bytes.
    ///
    /// Returns [`RtspError::MalformedReply`] when fewer than three lines are
    /// present or a line cannot be split into `<label> <number>`.
    pub fn decode(raw: &[u8]) -> crate::error::Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| malformed(ReplyErrorKind::NotUtf8))?;
        Self::parse(text)
    }

    /// Decode a reply from its text representation.
    pub fn parse(text: &str) -> crate::error::Result<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if lines.len() < 3 {
            return Err(malformed(ReplyErrorKind::TooFewLines(lines.len())));
        }

        let status_code = second_field(lines[0])
            .and_then(|s| s.parse().ok())
            .ok_or(malformed(ReplyErrorKind::InvalidStatusLine))?;

        let cseq = second_field(lines[1])
            .and_then(|s| s.parse().ok())
            .ok_or(malformed(ReplyErrorKind::InvalidCSeq))?;

        // Accept an RFC 2326 style timeout suffix: "Session: 123;timeout=60".
        let session_id = second_field(lines[2])
            .and_then(|s| s.split(';').next())
            .and_then(|s| s.parse().ok())
            .ok_or(malformed(ReplyErrorKind::InvalidSession))?;

        Ok(RtspReply {
            status_code,
            cseq,
            session_id,
        })
    }

    /// Serialize in the same three-line format (for stub servers and tests).
    pub fn serialize(&self) -> String {
        format!(
            "RTSP/1.0 {} {}\nCSeq: {}\nSession: {}",
            self.status_code,
            reason_phrase(self.status_code),
            self.cseq,
            self.session_id
        )
    }
}

fn second_field(line: &str) -> Option<&str> {
    line.split_whitespace().nth(1)
}

fn malformed(kind: ReplyErrorKind) -> RtspError {
    RtspError::MalformedReply { kind }
}

/// Reason phrase for the status codes the reference server emits.
pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        404 => "FILE_NOT_FOUND",
        500 => "CONNECTION_ERROR",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ok_reply() {
        let reply = RtspReply::parse("RTSP/1.0 200 OK\nCSeq: 1\nSession: 77").unwrap();
        assert_eq!(reply, RtspReply::ok(1, 77));
        assert!(reply.is_success());
    }

    #[test]
    fn parse_crlf_and_timeout_suffix() {
        let reply =
            RtspReply::parse("RTSP/1.0 200 OK\r\nCSeq: 4\r\nSession: 123456;timeout=60\r\n\r\n")
                .unwrap();
        assert_eq!(reply.cseq, 4);
        assert_eq!(reply.session_id, 123456);
    }

    #[test]
    fn parse_error_status_is_not_a_decode_error() {
        let reply = RtspReply::parse("RTSP/1.0 404 FILE_NOT_FOUND\nCSeq: 2\nSession: 0").unwrap();
        assert_eq!(reply.status_code, 404);
        assert!(!reply.is_success());
    }

    #[test]
    fn truncated_reply_is_malformed() {
        let err = RtspReply::parse("RTSP/1.0 200 OK\nCSeq: 1").unwrap_err();
        assert!(matches!(
            err,
            RtspError::MalformedReply {
                kind: ReplyErrorKind::TooFewLines(2)
            }
        ));
        assert!(RtspReply::parse("").is_err());
    }

    #[test]
    fn unsplittable_lines_are_malformed() {
        let err = RtspReply::parse("RTSP/1.0\nCSeq: 1\nSession: 7").unwrap_err();
        assert!(matches!(
            err,
            RtspError::MalformedReply {
                kind: ReplyErrorKind::InvalidStatusLine
            }
        ));

        let err = RtspReply::parse("RTSP/1.0 200 OK\nCSeq: one\nSession: 7").unwrap_err();
        assert!(matches!(
            err,
            RtspError::MalformedReply {
                kind: ReplyErrorKind::InvalidCSeq
            }
        ));

        let err = RtspReply::parse("RTSP/1.0 200 OK\nCSeq: 1\nSession:").unwrap_err();
        assert!(matches!(
            err,
            RtspError::MalformedReply {
                kind: ReplyErrorKind::InvalidSession
            }
        ));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = RtspReply::decode(&[0xff, 0xfe, b'\n']).unwrap_err();
        assert!(matches!(
            err,
            RtspError::MalformedReply {
                kind: ReplyErrorKind::NotUtf8
            }
        ));
    }

    #[test]
    fn serialize_matches_parse() {
        let reply = RtspReply::new(500, 9, 31337);
        let text = reply.serialize();
        assert!(text.starts_with("RTSP/1.0 500 CONNECTION_ERROR\n"));
        assert_eq!(RtspReply::parse(&text).unwrap(), reply);
    }
}

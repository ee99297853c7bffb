//! Request/response envelopes exchanged with a peer.
//!
//! A [`Command`] is immutable once built. A response is correlated to its
//! request by sharing the request's `id`.
//!
//! # Frame Format
//!
//! On a [`ChannelTransport`](crate::ChannelTransport) every command travels as
//! one length-prefixed frame (all integers big-endian):
//!
//! ```text
//! ┌──────────────┬──────────┬───────────┬─────────────────┐
//! │ body_len u32 │ id u64   │ dir u8    │ payload ...     │
//! └──────────────┴──────────┴───────────┴─────────────────┘
//!                 <──────────── body_len bytes ───────────>
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size of the frame length prefix.
pub const FRAME_LEN_PREFIX: usize = 4;

/// Size of the fixed part of a frame body (id + direction).
pub const FRAME_BODY_HEADER: usize = 8 + 1;

/// Largest frame body a transport accepts (16 MiB).
pub const MAX_FRAME_BODY: usize = 16 * 1024 * 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a command is a request or the response to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    fn as_byte(self) -> u8 {
        match self {
            Self::Request => 0,
            Self::Response => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Request),
            1 => Some(Self::Response),
            _ => None,
        }
    }
}

/// A request or response envelope with a correlation id and an opaque payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    id: u64,
    direction: Direction,
    payload: Bytes,
}

impl Command {
    /// Create a request with a fresh, process-unique correlation id.
    pub fn request(payload: impl Into<Bytes>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            direction: Direction::Request,
            payload: payload.into(),
        }
    }

    /// Create the response to `request` (same correlation id).
    pub fn response_to(request: &Command, payload: impl Into<Bytes>) -> Self {
        Self {
            id: request.id,
            direction: Direction::Response,
            payload: payload.into(),
        }
    }

    /// Build a command from its raw parts (used by decoders and tests).
    pub fn from_parts(id: u64, direction: Direction, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            direction,
            payload: payload.into(),
        }
    }

    /// Correlation id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_request(&self) -> bool {
        self.direction == Direction::Request
    }

    pub fn is_response(&self) -> bool {
        self.direction == Direction::Response
    }

    /// Opaque payload (cheap to clone).
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether `other` is the response correlated to this request.
    pub fn is_answered_by(&self, other: &Command) -> bool {
        self.is_request() && other.is_response() && self.id == other.id
    }

    /// Append this command as a length-prefixed frame.
    ///
    /// Returns `None` if the payload exceeds [`MAX_FRAME_BODY`].
    pub fn encode_frame(&self, dst: &mut BytesMut) -> Option<()> {
        let body_len = FRAME_BODY_HEADER + self.payload.len();
        if body_len > MAX_FRAME_BODY {
            return None;
        }
        dst.reserve(FRAME_LEN_PREFIX + body_len);
        dst.put_u32(body_len as u32);
        dst.put_u64(self.id);
        dst.put_u8(self.direction.as_byte());
        dst.put_slice(&self.payload);
        Some(())
    }

    /// Decode a frame body (everything after the length prefix).
    ///
    /// Returns `None` if the body is too short or the direction byte is unknown.
    pub fn decode_body(mut body: Bytes) -> Option<Self> {
        if body.len() < FRAME_BODY_HEADER {
            return None;
        }
        let id = body.get_u64();
        let direction = Direction::from_byte(body.get_u8())?;
        Some(Self {
            id,
            direction,
            payload: body,
        })
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Request => "request",
            Direction::Response => "response",
        };
        write!(f, "{}#{} ({} bytes)", dir, self.id, self.payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = Command::request("a");
        let b = Command::request("b");
        assert_ne!(a.id(), b.id());
        assert!(a.is_request());
    }

    #[test]
    fn test_response_correlates_to_request() {
        let req = Command::request("ping");
        let resp = Command::response_to(&req, "pong");
        assert_eq!(resp.id(), req.id());
        assert!(resp.is_response());
        assert!(req.is_answered_by(&resp));
        assert!(!resp.is_answered_by(&req));
        assert_eq!(resp.payload().as_ref(), b"pong");
    }

    #[test]
    fn test_unrelated_response_does_not_answer() {
        let req = Command::request("ping");
        let other = Command::request("other");
        let resp = Command::response_to(&other, "pong");
        assert!(!req.is_answered_by(&resp));
    }

    #[test]
    fn test_frame_layout() {
        let cmd = Command::from_parts(0x0102, Direction::Response, &b"xyz"[..]);
        let mut buf = BytesMut::new();
        cmd.encode_frame(&mut buf).unwrap();

        assert_eq!(buf.len(), FRAME_LEN_PREFIX + FRAME_BODY_HEADER + 3);
        assert_eq!(&buf[..4], &[0, 0, 0, 12]);
        assert_eq!(&buf[4..12], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(buf[12], 1);
        assert_eq!(&buf[13..], b"xyz");

        let body = buf.freeze().slice(FRAME_LEN_PREFIX..);
        let decoded = Command::decode_body(body).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn test_decode_body_rejects_short_and_unknown_direction() {
        assert!(Command::decode_body(Bytes::from_static(&[0, 0, 0])).is_none());

        let mut body = BytesMut::new();
        body.put_u64(7);
        body.put_u8(9);
        assert!(Command::decode_body(body.freeze()).is_none());
    }

    #[test]
    fn test_display_and_debug_hide_payload() {
        let cmd = Command::from_parts(5, Direction::Request, vec![0u8; 16]);
        assert_eq!(cmd.to_string(), "request#5 (16 bytes)");
        let debug = format!("{:?}", cmd);
        assert!(debug.contains("payload_len: 16"));
    }
}

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum payload of one frame. The length prefix is a u16, so this is
/// a hard wire-format limit, not a tunable.
pub const MAX_FRAME_BYTES: usize = u16::MAX as usize;

/// Length-prefixed string framing: 2-byte big-endian payload length
/// followed by that many bytes of UTF-8. Symmetric with the Java
/// `DataOutputStream.writeUTF` framing the original clients speak.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

/// Errors surfaced by the codec. All of them are protocol errors: the
/// connection is torn down, never resynchronized.
#[derive(Debug)]
pub enum FrameError {
    Io(std::io::Error),
    /// Frame payload is not valid UTF-8.
    InvalidUtf8,
    /// Outbound payload does not fit the 2-byte length prefix.
    TooLong(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "io error: {e}"),
            FrameError::InvalidUtf8 => write!(f, "frame payload is not valid UTF-8"),
            FrameError::TooLong(n) => {
                write!(f, "frame payload of {n} bytes exceeds {MAX_FRAME_BYTES}")
            }
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e)
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        if src.len() < 2 {
            return Ok(None);
        }
        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if src.len() < 2 + len {
            src.reserve(2 + len - src.len());
            return Ok(None);
        }
        src.advance(2);
        let payload = src.split_to(len);
        match std::str::from_utf8(&payload) {
            Ok(text) => Ok(Some(text.to_string())),
            Err(_) => Err(FrameError::InvalidUtf8),
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.encode(item.as_str(), dst)
    }
}

impl Encoder<&str> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), FrameError> {
        let bytes = item.as_bytes();
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(FrameError::TooLong(bytes.len()));
        }
        dst.reserve(2 + bytes.len());
        dst.put_u16(bytes.len() as u16);
        dst.put_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec.encode(text, &mut buf).unwrap();
        buf
    }

    #[test]
    fn round_trip() {
        let mut buf = encode("hola ¿qué tal?");
        let decoded = FrameCodec.decode(&mut buf).unwrap();
        assert_eq!(decoded.as_deref(), Some("hola ¿qué tal?"));
        assert!(buf.is_empty());
    }

    #[test]
    fn wire_layout_is_u16_be_prefix() {
        let buf = encode("abc");
        assert_eq!(&buf[..], &[0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn partial_frames_wait_for_more() {
        let full = encode("mensaje");
        // Only the prefix and half the payload so far.
        let mut buf = BytesMut::from(&full[..4]);
        assert!(FrameCodec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[4..]);
        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some("mensaje"));
    }

    #[test]
    fn two_frames_in_one_read() {
        let mut buf = encode("uno");
        buf.extend_from_slice(&encode("dos"));
        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some("uno"));
        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some("dos"));
        assert!(FrameCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn empty_frame_is_valid() {
        let mut buf = encode("");
        assert_eq!(FrameCodec.decode(&mut buf).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn oversize_payload_rejected_on_encode() {
        let big = "x".repeat(MAX_FRAME_BYTES + 1);
        let mut buf = BytesMut::new();
        match FrameCodec.encode(big.as_str(), &mut buf) {
            Err(FrameError::TooLong(n)) => assert_eq!(n, MAX_FRAME_BYTES + 1),
            other => panic!("expected TooLong, got {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_a_protocol_error() {
        let mut buf = BytesMut::from(&[0u8, 2, 0xff, 0xfe][..]);
        assert!(matches!(
            FrameCodec.decode(&mut buf),
            Err(FrameError::InvalidUtf8)
        ));
    }
}

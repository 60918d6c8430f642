//! Wire format encoding and decoding for WebSocket frames.
//!
//! Implements the client side of the RFC 6455 framing layout:
//!
//! ```text
//! ┌───────────┬───────────┬──────────────────┬──────────┬─────────────┐
//! │ FIN+opcode│ MASK+len7 │ Extended length  │ Mask key │ Payload     │
//! │ 1 byte    │ 1 byte    │ 0, 2 or 8 bytes  │ 4 bytes  │ len bytes   │
//! │           │           │ (u16/u64 BE)     │ (client) │ (masked)    │
//! └───────────┴───────────┴──────────────────┴──────────┴─────────────┘
//! ```
//!
//! Encoding always sets FIN (no application-level fragmentation) and always
//! masks with a fresh random 4-byte key, as required for client-to-server
//! frames. Decoding accepts both masked and unmasked frames so the same code
//! handles server traffic.
//!
//! Deliberate protocol subset, kept from the system this replaces:
//! continuation frames (opcode 0x0) are rejected, and control frames
//! (close/ping/pong) decode as payload-less: only their header bytes are
//! consumed. RFC 6455 §5.5 permits control payloads up to 125 bytes; this
//! codec does not parse them.

use bytes::Bytes;

use crate::error::{Result, WsBridgeError};

/// FIN flag in byte 0.
pub const FIN_BIT: u8 = 0x80;

/// Mask flag in byte 1.
pub const MASK_BIT: u8 = 0x80;

/// Length of the per-frame masking key.
pub const MASK_KEY_LEN: usize = 4;

/// 7-bit length marker introducing a 2-byte extended length.
pub const LEN_U16_MARKER: u8 = 126;

/// 7-bit length marker introducing an 8-byte extended length.
pub const LEN_U64_MARKER: u8 = 127;

/// Upper bound on a declared payload length. Anything larger is treated as
/// a corrupt header rather than buffered for.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Frame type tag from the opcode nibble.
///
/// Continuation (0x0) and the reserved ranges are rejected during decode;
/// this client never assembles fragmented messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// UTF-8 text payload (0x1).
    Text,
    /// Raw binary payload (0x2).
    Binary,
    /// Connection close (0x8).
    Close,
    /// Liveness probe (0x9).
    Ping,
    /// Liveness reply (0xA).
    Pong,
}

impl Opcode {
    /// Returns `true` for close/ping/pong frames.
    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = WsBridgeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(WsBridgeError::Protocol(format!(
                "unsupported opcode 0x{other:X}"
            ))),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }
}

/// One complete, unmasked wire frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Final-fragment flag. Always set on frames this codec produces.
    pub fin: bool,
    /// Frame type tag.
    pub opcode: Opcode,
    /// Whether the frame arrived masked.
    pub masked: bool,
    /// Payload bytes, already unmasked.
    pub payload: Bytes,
}

/// A successfully decoded frame plus the exact byte count it occupied.
#[derive(Debug)]
pub struct Decoded {
    /// The decoded frame.
    pub frame: Frame,
    /// Bytes consumed from the front of the input buffer.
    pub consumed: usize,
}

/// XOR the payload cyclically with the 4-byte key. Self-inverse.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; MASK_KEY_LEN]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % MASK_KEY_LEN];
    }
}

/// Encode one frame: header, fresh random mask key, masked payload.
///
/// # Example
///
/// ```
/// use wsbridge_client::protocol::{encode_frame, Opcode};
///
/// // 15-byte payload: 2 header bytes + 4 mask bytes + 15 masked bytes
/// let bytes = encode_frame(br#"{"type":"ping"}"#, Opcode::Text);
/// assert_eq!(bytes[0], 0x81); // FIN + text
/// assert_eq!(bytes.len(), 2 + 4 + 15);
/// ```
pub fn encode_frame(payload: &[u8], opcode: Opcode) -> Vec<u8> {
    let len = payload.len();
    let mut out = Vec::with_capacity(2 + 8 + MASK_KEY_LEN + len);

    out.push(FIN_BIT | u8::from(opcode));

    if len < usize::from(LEN_U16_MARKER) {
        out.push(MASK_BIT | len as u8);
    } else if len < 65536 {
        out.push(MASK_BIT | LEN_U16_MARKER);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(MASK_BIT | LEN_U64_MARKER);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let key: [u8; MASK_KEY_LEN] = rand::random();
    out.extend_from_slice(&key);

    let payload_start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[payload_start..], key);

    out
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame
/// (header, extended length, mask key, or payload still missing); in that
/// case nothing is consumed. Never yields a partial frame: `consumed` is
/// exactly the byte count the frame occupied on the wire.
///
/// Control frames are payload-less here: only the header (through the mask
/// key, if present) is consumed and the payload is left empty.
///
/// # Errors
///
/// `Protocol` on an unsupported opcode or a declared length beyond
/// [`MAX_PAYLOAD_LEN`].
pub fn decode_frame(buf: &[u8]) -> Result<Option<Decoded>> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let fin = buf[0] & FIN_BIT != 0;
    let opcode = Opcode::try_from(buf[0] & 0x0F)?;
    let masked = buf[1] & MASK_BIT != 0;
    let len7 = buf[1] & 0x7F;

    let (payload_len, mut offset) = match len7 {
        LEN_U16_MARKER => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4usize)
        }
        LEN_U64_MARKER => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let raw: [u8; 8] = buf[2..10].try_into().expect("slice is 8 bytes");
            (u64::from_be_bytes(raw), 10usize)
        }
        small => (u64::from(small), 2usize),
    };

    if payload_len > MAX_PAYLOAD_LEN as u64 {
        return Err(WsBridgeError::Protocol(format!(
            "declared payload length {payload_len} exceeds maximum {MAX_PAYLOAD_LEN}"
        )));
    }
    let payload_len = payload_len as usize;

    let mask_key = if masked {
        if buf.len() < offset + MASK_KEY_LEN {
            return Ok(None);
        }
        let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += MASK_KEY_LEN;
        Some(key)
    } else {
        None
    };

    if opcode.is_control() {
        // Header-only: any declared control payload is not parsed (subset
        // of RFC 6455 §5.5, kept deliberately).
        return Ok(Some(Decoded {
            frame: Frame {
                fin,
                opcode,
                masked,
                payload: Bytes::new(),
            },
            consumed: offset,
        }));
    }

    if buf.len() < offset + payload_len {
        return Ok(None);
    }

    let mut payload = buf[offset..offset + payload_len].to_vec();
    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Decoded {
        frame: Frame {
            fin,
            opcode,
            masked,
            payload: Bytes::from(payload),
        },
        consumed: offset + payload_len,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(payload: &[u8], opcode: Opcode) -> Frame {
        let encoded = encode_frame(payload, opcode);
        let decoded = decode_frame(&encoded)
            .expect("valid frame")
            .expect("complete frame");
        assert_eq!(decoded.consumed, encoded.len());
        decoded.frame
    }

    #[test]
    fn test_roundtrip_boundary_lengths() {
        for len in [0usize, 1, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = roundtrip(&payload, Opcode::Text);
            assert_eq!(frame.opcode, Opcode::Text);
            assert_eq!(&frame.payload[..], &payload[..], "length {len}");
            assert!(frame.fin);
            assert!(frame.masked);
        }
    }

    #[test]
    fn test_roundtrip_binary() {
        let payload = vec![0xAB; 300];
        let frame = roundtrip(&payload, Opcode::Binary);
        assert_eq!(frame.opcode, Opcode::Binary);
        assert_eq!(&frame.payload[..], &payload[..]);
    }

    #[test]
    fn test_encode_small_payload_header_layout() {
        // Exactly 14 bytes of payload
        let payload = br#"{"ping":false}"#;
        assert_eq!(payload.len(), 14);

        let encoded = encode_frame(payload, Opcode::Text);
        assert_eq!(encoded[0], 0x81); // FIN + text opcode
        assert_eq!(encoded[1], 0x8E); // mask bit + length 14
        assert_eq!(encoded.len(), 20); // 2 header + 4 mask + 14 payload
    }

    #[test]
    fn test_encode_u16_length_form() {
        let payload = vec![0u8; 126];
        let encoded = encode_frame(&payload, Opcode::Text);
        assert_eq!(encoded[1], MASK_BIT | LEN_U16_MARKER);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), 126);
        assert_eq!(encoded.len(), 4 + 4 + 126);
    }

    #[test]
    fn test_encode_u64_length_form() {
        let payload = vec![0x42u8; 70_000];
        let encoded = encode_frame(&payload, Opcode::Text);
        assert_eq!(encoded[1], MASK_BIT | LEN_U64_MARKER);
        let raw: [u8; 8] = encoded[2..10].try_into().unwrap();
        assert_eq!(u64::from_be_bytes(raw), 70_000);
        assert_eq!(encoded.len(), 10 + 4 + 70_000);
    }

    #[test]
    fn test_every_truncation_needs_more_data() {
        let payload = b"truncation sweep payload";
        let encoded = encode_frame(payload, Opcode::Text);

        for cut in 0..encoded.len() {
            let result = decode_frame(&encoded[..cut]).expect("no protocol error");
            assert!(result.is_none(), "prefix of {cut} bytes must not decode");
        }
    }

    #[test]
    fn test_truncation_of_extended_length_frame() {
        let payload = vec![7u8; 70_000];
        let encoded = encode_frame(&payload, Opcode::Binary);

        // Sample prefixes around the interesting boundaries instead of all 70k.
        for cut in [0, 1, 2, 5, 9, 10, 13, 14, 15, 1000, encoded.len() - 1] {
            let result = decode_frame(&encoded[..cut]).expect("no protocol error");
            assert!(result.is_none(), "prefix of {cut} bytes must not decode");
        }
    }

    #[test]
    fn test_mask_is_self_inverse() {
        let key = [0xDE, 0xAD, 0xBE, 0xEF];
        let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut masked = original.clone();
        apply_mask(&mut masked, key);
        assert_ne!(masked, original);

        apply_mask(&mut masked, key);
        assert_eq!(masked, original);
    }

    #[test]
    fn test_fresh_mask_key_per_frame() {
        // Identical payloads should almost never produce identical wire
        // bytes; with a 32-bit key, 8 collisions in a row would mean the
        // key generation is broken.
        let payload = b"same payload";
        let first = encode_frame(payload, Opcode::Text);
        let distinct = (0..8).any(|_| encode_frame(payload, Opcode::Text) != first);
        assert!(distinct);
    }

    #[test]
    fn test_decode_unmasked_server_frame() {
        // Servers send unmasked frames: 0x81, len, raw payload.
        let mut wire = vec![0x81, 0x05];
        wire.extend_from_slice(b"hello");

        let decoded = decode_frame(&wire).unwrap().unwrap();
        assert_eq!(decoded.consumed, 7);
        assert!(!decoded.frame.masked);
        assert_eq!(&decoded.frame.payload[..], b"hello");
    }

    #[test]
    fn test_decode_close_frame_consumes_header_only() {
        // Unmasked close with a declared 2-byte status payload: the codec
        // consumes the 2 header bytes and reports an empty payload.
        let wire = [0x88, 0x02, 0x03, 0xE8];
        let decoded = decode_frame(&wire).unwrap().unwrap();
        assert_eq!(decoded.frame.opcode, Opcode::Close);
        assert_eq!(decoded.consumed, 2);
        assert!(decoded.frame.payload.is_empty());
    }

    #[test]
    fn test_decode_masked_ping_consumes_through_mask_key() {
        let wire = [0x89, 0x80, 0x01, 0x02, 0x03, 0x04];
        let decoded = decode_frame(&wire).unwrap().unwrap();
        assert_eq!(decoded.frame.opcode, Opcode::Ping);
        assert_eq!(decoded.consumed, 6);

        // Mask key not fully present yet: keep waiting.
        assert!(decode_frame(&wire[..4]).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_opcode() {
        // Opcode 0x3 is reserved; 0x0 (continuation) is unsupported here.
        for byte0 in [0x83u8, 0x80] {
            let wire = [byte0, 0x00];
            assert!(matches!(
                decode_frame(&wire),
                Err(WsBridgeError::Protocol(_))
            ));
        }
    }

    #[test]
    fn test_decode_rejects_absurd_declared_length() {
        let mut wire = vec![0x82, LEN_U64_MARKER];
        wire.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(
            decode_frame(&wire),
            Err(WsBridgeError::Protocol(_))
        ));
    }

    #[test]
    fn test_opcode_conversions() {
        for opcode in [
            Opcode::Text,
            Opcode::Binary,
            Opcode::Close,
            Opcode::Ping,
            Opcode::Pong,
        ] {
            assert_eq!(Opcode::try_from(u8::from(opcode)).unwrap(), opcode);
        }
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ping.is_control());
        assert!(Opcode::Pong.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(!Opcode::Binary.is_control());
    }
}

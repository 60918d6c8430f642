//! Reassembly buffer for accumulating partial reads.
//!
//! A TCP read returns an arbitrary slice of the byte stream: half a frame,
//! one frame plus the start of the next, three frames at once. `FrameBuffer`
//! accumulates those chunks in a `bytes::BytesMut` and extracts every
//! complete frame, leaving partial data buffered for the next push.
//!
//! The buffer never advances past an incompletely verified frame: a decode
//! either consumes exactly one whole frame or consumes nothing, so corrupt
//! data cannot bleed into the next frame boundary.
//!
//! # Example
//!
//! ```
//! use wsbridge_client::protocol::{encode_frame, FrameBuffer, Opcode};
//!
//! let wire = encode_frame(b"hello", Opcode::Text);
//! let mut buffer = FrameBuffer::new();
//!
//! // First half of the frame: nothing complete yet.
//! assert!(buffer.push(&wire[..4]).unwrap().is_empty());
//!
//! // Rest arrives: one frame out, buffer drained.
//! let frames = buffer.push(&wire[4..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0].payload[..], b"hello");
//! assert!(buffer.is_empty());
//! ```

use bytes::BytesMut;

use super::frame::{decode_frame, Frame};
use crate::error::Result;

/// Initial buffer capacity; grows as needed for larger frames.
const INITIAL_CAPACITY: usize = 16 * 1024;

/// Buffer that turns a byte stream into a sequence of complete frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    /// Accumulated bytes not yet forming a complete frame.
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create an empty reassembly buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append a chunk and extract every complete frame it unlocks.
    ///
    /// Each successful decode drops exactly the consumed byte count from the
    /// buffer head. Returns an empty vector while a frame is still partial.
    ///
    /// # Errors
    ///
    /// Propagates `Protocol` errors from the codec (corrupt header,
    /// unsupported opcode). The buffer is left untouched at the offending
    /// frame so the caller can tear the connection down.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(decoded) = decode_frame(&self.buffer)? {
            let _ = self.buffer.split_to(decoded.consumed);
            frames.push(decoded.frame);
        }

        Ok(frames)
    }

    /// Number of buffered bytes awaiting a complete frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no partial data.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

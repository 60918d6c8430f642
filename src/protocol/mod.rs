//! Wire protocol: frame codec and stream reassembly.

mod frame;
mod frame_buffer;

pub use frame::{
    apply_mask, decode_frame, encode_frame, Decoded, Frame, Opcode, FIN_BIT, LEN_U16_MARKER,
    LEN_U64_MARKER, MASK_BIT, MASK_KEY_LEN, MAX_PAYLOAD_LEN,
};
pub use frame_buffer::FrameBuffer;

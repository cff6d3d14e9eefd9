//! MUP1 — the byte-stuffed, checksummed UART framing layer (spec §3, §4.A, §4.B).

mod frame;
mod reassembler;

pub use frame::{decode, encode, FrameType, EOF_BYTE, SOF_BYTE};
pub use reassembler::{DecodedFrame, Reassembler};

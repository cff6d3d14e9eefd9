//! Byte reassembler: turns an append-only serial byte stream into complete
//! MUP1 frames (spec §4.B).

use super::frame::{self, FrameType, EOF_BYTE, ESCAPE_BYTE, SOF_BYTE};

/// A decoded frame plus whether its declared checksum matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
    pub checksum_ok: bool,
}

/// Outcome of scanning for the next frame boundary in the buffer.
enum Scan {
    /// A full frame occupies `buf[0..len]`.
    Complete(usize),
    /// Not enough bytes buffered yet; wait for more input.
    Underrun,
}

/// Consumes an append-only byte stream and emits complete MUP1 frames.
///
/// Holds a single growable buffer (spec §3 "Lifecycles"): created empty,
/// grown by [`Reassembler::push`], cleared by [`Reassembler::reset`].
/// Framing errors never stall the stream — see [`Reassembler::push`].
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Drops any buffered, unemitted bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Appends `bytes` to the internal buffer and extracts every frame that
    /// is now complete. Tolerates arbitrary chunking of the input (spec §8
    /// property 3) and non-frame garbage between frames (property 4).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<DecodedFrame> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            let Some(sof) = self.buf.iter().position(|&b| b == SOF_BYTE) else {
                // No frame can possibly be forming without a SOF in the buffer.
                self.buf.clear();
                break;
            };
            if sof > 0 {
                self.buf.drain(0..sof);
            }

            match scan_frame_len(&self.buf) {
                Scan::Underrun => break,
                Scan::Complete(len) => match frame::decode(&self.buf[..len]) {
                    Ok((frame_type, payload, checksum_ok)) => {
                        if !checksum_ok {
                            tracing::warn!(?frame_type, "MUP1 checksum mismatch");
                        }
                        out.push(DecodedFrame {
                            frame_type,
                            payload,
                            checksum_ok,
                        });
                        self.buf.drain(0..len);
                    }
                    Err(err) => {
                        // Per spec §4.B: discard bytes up to and including
                        // the offending SOF and continue — not the whole
                        // scanned candidate, which may contain a later,
                        // recoverable SOF (e.g. an escaped byte misread as a
                        // frame boundary). `self.buf[0]` is that SOF, since
                        // the scan above already aligned the buffer to it.
                        tracing::debug!(%err, "discarding malformed MUP1 frame, resyncing past offending SOF");
                        self.buf.drain(0..=0);
                    }
                },
            }
        }

        out
    }
}

/// Scans `buf` (which starts with `SOF`) for the length of the next
/// self-consistent frame candidate, without validating its checksum.
fn scan_frame_len(buf: &[u8]) -> Scan {
    if buf.len() < 2 {
        return Scan::Underrun;
    }

    let mut i = 2; // skip SOF, type
    let first_eof = loop {
        match buf.get(i) {
            None => return Scan::Underrun,
            Some(&b) if b == EOF_BYTE => break i,
            Some(&b) if b == ESCAPE_BYTE => {
                if buf.get(i + 1).is_none() {
                    return Scan::Underrun;
                }
                i += 2;
            }
            Some(_) => i += 1,
        }
    };

    let padded = match buf.get(first_eof + 1) {
        None => return Scan::Underrun,
        Some(&b) => b == EOF_BYTE,
    };
    let checksum_start = if padded { first_eof + 2 } else { first_eof + 1 };
    let checksum_end = checksum_start + 4;
    if buf.len() < checksum_end {
        return Scan::Underrun;
    }
    Scan::Complete(checksum_end)
}

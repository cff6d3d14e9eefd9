//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode the core can produce, per spec §7.
#[derive(Debug, Error)]
pub enum Error {
    /// MUP1 frame shorter than the minimum `SOF type EOF EOF 4-hex` envelope.
    #[error("short frame: {len} bytes")]
    ShortFrame { len: usize },

    /// First byte of a frame was not `SOF` (0x3E).
    #[error("bad start-of-frame byte: 0x{0:02X}")]
    BadSOF(u8),

    /// Second byte of a frame was not one of `P`/`A`/`C`/`S`/`T`.
    #[error("unrecognized frame type byte: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// The trailing 4 ASCII bytes were not valid uppercase hex.
    #[error("bad checksum encoding: {0:?}")]
    BadChecksumEncoding(Vec<u8>),

    /// A CoAP option's delta/length TLV encoding was malformed.
    #[error("bad CoAP options: {0}")]
    BadOptions(String),

    /// A CoAP message shorter than the 4-byte header, or with the wrong version.
    #[error("malformed CoAP message: {0}")]
    MalformedMessage(String),

    /// Request deadline elapsed with no matching response.
    #[error("request timed out")]
    Timeout,

    /// CoAP response carried a 4.xx/5.xx class code.
    #[error("{reason} (0x{code:02X})")]
    ResponseError {
        code: u8,
        reason: String,
        payload: Option<Vec<u8>>,
    },

    /// CoAP response had a code outside {2.xx, 4.xx, 5.xx} or an unsupported version.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Message-id space exhausted against outstanding requests.
    #[error("too many requests in flight")]
    TooManyInFlight,

    /// The controller was torn down while requests were still pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The byte sink reported a failure while writing an encoded frame.
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// True for the advisory/recoverable conditions that spec §7 says must
    /// never abort the inbound stream (decode failures are logged and
    /// skipped, not propagated).
    pub fn is_inbound_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ShortFrame { .. }
                | Error::BadSOF(_)
                | Error::UnknownFrameType(_)
                | Error::BadChecksumEncoding(_)
        )
    }
}

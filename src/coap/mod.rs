//! CoAP (RFC 7252) message layer carried inside MUP1 `C` frames (spec §4.C).

mod message;
mod options;

pub use message::{
    build, parse, reason_for_code, response_class, CoapMessage, Method, Payload,
    CONTENT_FORMAT_CBOR,
};

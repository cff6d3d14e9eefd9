//! Building and parsing CoAP messages carried inside MUP1 `C` frames
//! (spec §4.C). Version, type and token length are fixed (1, CON, 0); only
//! message-id, Uri-Path/Content-Format/Uri-Query options and an optional
//! CBOR payload vary.

use super::options::{self, OPT_CONTENT_FORMAT, OPT_URI_PATH, OPT_URI_QUERY};
use crate::cbor;
use crate::error::{Error, Result};

/// `application/cbor`, used as the (spec-flagged provisional) Content-Format
/// value for every payload this client sends.
pub const CONTENT_FORMAT_CBOR: u8 = 60;

const VERSION: u8 = 1;
const TYPE_CON: u8 = 0;

/// The closed set of CoAP methods this client issues (RFC 7252 + RFC 8132
/// FETCH/PATCH/iPATCH). The numeric value *is* the wire code for requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Method {
    Get = 1,
    Post = 2,
    Put = 3,
    Delete = 4,
    Fetch = 5,
    Patch = 6,
    IPatch = 7,
}

/// Either a successfully CBOR-decoded payload, or the raw bytes when
/// decoding failed — spec §4.C: "if decoding raises, return the raw bytes
/// instead, so the caller can inspect them."
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Cbor(cbor::Value),
    Raw(Vec<u8>),
}

impl Payload {
    pub fn as_cbor(&self) -> Option<&cbor::Value> {
        match self {
            Payload::Cbor(v) => Some(v),
            Payload::Raw(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Cbor(v) => cbor::encode(&v),
            Payload::Raw(b) => b,
        }
    }
}

/// A decoded CoAP response (or request) message.
#[derive(Debug, Clone, PartialEq)]
pub struct CoapMessage {
    pub code: u8,
    pub mid: u16,
    pub payload: Option<Payload>,
}

/// `class = code >> 5`, per spec §4.C.
pub fn response_class(code: u8) -> u8 {
    code >> 5
}

/// Textual name for a CoAP response code, per RFC 7252 §12.1.2. Unknown
/// codes still get a readable fallback so `ResponseError` never shows a bare
/// number (spec §4.C: "part of the public surface").
pub fn reason_for_code(code: u8) -> String {
    let known = match code {
        0x41 => Some("Created"),
        0x42 => Some("Deleted"),
        0x43 => Some("Valid"),
        0x44 => Some("Changed"),
        0x45 => Some("Content"),
        0x5C => Some("Continue"),
        0x80 => Some("Bad Request"),
        0x81 => Some("Unauthorized"),
        0x82 => Some("Bad Option"),
        0x83 => Some("Forbidden"),
        0x84 => Some("Not Found"),
        0x85 => Some("Method Not Allowed"),
        0x86 => Some("Not Acceptable"),
        0x88 => Some("Request Entity Incomplete"),
        0x89 => Some("Conflict"),
        0x8C => Some("Precondition Failed"),
        0x8D => Some("Request Entity Too Large"),
        0x8F => Some("Unsupported Content-Format"),
        0x96 => Some("Unprocessable Entity"),
        0xA0 => Some("Internal Server Error"),
        0xA1 => Some("Not Implemented"),
        0xA2 => Some("Bad Gateway"),
        0xA3 => Some("Service Unavailable"),
        0xA4 => Some("Gateway Timeout"),
        0xA5 => Some("Proxying Not Supported"),
        _ => None,
    };
    match known {
        Some(name) => name.to_string(),
        None => format!("{}.{:02} Unknown", code >> 5, code & 0x1F),
    }
}

/// Builds a CoAP message: `method uri [payload]`, encoded per spec §4.C.
///
/// `uri` is split on the first `?` into path and query; empty path/query
/// segments are discarded. `payload`, if present, is CBOR-encoded and
/// terminates the message behind a `0xFF` marker; Content-Format is only
/// emitted when a payload is carried.
pub fn build(method: Method, mid: u16, uri: &str, payload: Option<&cbor::Value>) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + uri.len());
    out.push((VERSION << 6) | (TYPE_CON << 4));
    out.push(method as u8);
    out.extend_from_slice(&mid.to_be_bytes());

    let (path, query) = match uri.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (uri, None),
    };

    let mut prev = 0u16;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        prev = options::push_option(&mut out, prev, OPT_URI_PATH, segment.as_bytes());
    }

    if payload.is_some() {
        prev = options::push_option(&mut out, prev, OPT_CONTENT_FORMAT, &[CONTENT_FORMAT_CBOR]);
    }

    if let Some(query) = query {
        for segment in query.split('&').filter(|s| !s.is_empty()) {
            prev = options::push_option(&mut out, prev, OPT_URI_QUERY, segment.as_bytes());
        }
    }
    let _ = prev;

    if let Some(value) = payload {
        out.push(0xFF);
        out.extend_from_slice(&cbor::encode(value));
    }

    out
}

/// Parses a received CoAP message (spec §4.C).
pub fn parse(bytes: &[u8]) -> Result<CoapMessage> {
    if bytes.len() < 4 {
        return Err(Error::MalformedMessage(format!(
            "message shorter than 4-byte header: {} bytes",
            bytes.len()
        )));
    }
    let version = bytes[0] >> 6;
    if version != VERSION {
        return Err(Error::MalformedMessage(format!(
            "unsupported CoAP version {version}"
        )));
    }
    let tkl = bytes[0] & 0x0F;
    let code = bytes[1];
    let mid = u16::from_be_bytes([bytes[2], bytes[3]]);

    let mut pos = 4 + tkl as usize;
    if pos > bytes.len() {
        return Err(Error::MalformedMessage("token length exceeds message".into()));
    }

    let _options = options::parse_options(bytes, &mut pos)?;

    let payload = if pos < bytes.len() {
        let raw = &bytes[pos..];
        match cbor::decode(raw) {
            Ok(value) => Some(Payload::Cbor(value)),
            Err(_) => Some(Payload::Raw(raw.to_vec())),
        }
    } else {
        None
    };

    Ok(CoapMessage { code, mid, payload })
}

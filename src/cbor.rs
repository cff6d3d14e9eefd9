//! Thin wrapper around a CBOR codec.
//!
//! Spec §1 treats CBOR encode/decode as an opaque external collaborator
//! ("encode(value)→bytes / decode(bytes)→value"); this module is that pair,
//! backed by `ciborium` (the CBOR crate used elsewhere in the example corpus
//! for CORECONF/MLS-style CBOR payloads — the teacher workspace itself has
//! no CBOR dependency to reuse).

pub use ciborium::value::Value;

/// Encodes `value` to its canonical CBOR byte representation.
///
/// Infallible in practice for the bounded `Value` trees this crate builds
/// (no unrepresentable floats, no cyclic structures), but `ciborium`'s
/// writer is fallible in general, so we surface that.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).expect("CBOR encode of a Value cannot fail");
    out
}

/// Decodes `bytes` as a CBOR value.
pub fn decode(bytes: &[u8]) -> Result<Value, ciborium::de::Error<std::io::Error>> {
    ciborium::de::from_reader(bytes)
}

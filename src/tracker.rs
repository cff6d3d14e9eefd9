//! Request tracker (spec §4.D): mid allocation, correlation of CoAP
//! responses to pending requests, per-request timeout.
//!
//! Mirrors `MonClient::send_command`'s shape: register the pending entry
//! under the lock, drop the lock, write to the transport, then race the
//! response channel against a `tokio::time::timeout`.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, trace};

use crate::cbor;
use crate::coap::{self, Method, Payload};
use crate::error::{Error, Result};
use crate::mup1::{self, FrameType};
use crate::transport::Transport;

type Responder = oneshot::Sender<Result<Option<Payload>>>;

struct State {
    next_mid: u16,
    pending: HashMap<u16, Responder>,
}

/// Allocates message-ids, correlates CoAP responses by mid, and enforces
/// the per-request deadline.
pub struct RequestTracker {
    transport: Arc<dyn Transport>,
    timeout: std::time::Duration,
    state: Mutex<State>,
}

impl RequestTracker {
    pub fn new(transport: Arc<dyn Transport>, timeout: std::time::Duration) -> Self {
        Self {
            transport,
            timeout,
            state: Mutex::new(State {
                next_mid: 0,
                pending: HashMap::new(),
            }),
        }
    }

    /// Issues a CoAP request and awaits its response, per spec §4.D.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&cbor::Value>,
    ) -> Result<Option<Payload>> {
        let (tx, rx) = oneshot::channel();
        let mid = {
            let mut state = self.state.lock().await;
            let mid = allocate_mid(&mut state)?;
            state.pending.insert(mid, tx);
            mid
        };

        let coap_bytes = coap::build(method, mid, uri, payload);
        let frame = mup1::encode(FrameType::Coap, &coap_bytes);

        if let Err(err) = self.transport.send_bytes(Bytes::from(frame)).await {
            self.state.lock().await.pending.remove(&mid);
            return Err(err);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.state.lock().await.pending.remove(&mid);
                Err(Error::Timeout)
            }
        }
    }

    /// Delivers a decoded CoAP response to its matching pending request, if
    /// any (spec §4.D, §4.E). A response with no matching mid — arrived
    /// after timeout, or never requested — is discarded and logged.
    pub async fn handle_response(&self, mid: u16, code: u8, payload: Option<Payload>) {
        let responder = { self.state.lock().await.pending.remove(&mid) };
        let Some(responder) = responder else {
            debug!(mid, code, "discarding CoAP response with no pending request");
            return;
        };

        let result = match coap::response_class(code) {
            2 => Ok(payload),
            4 | 5 => Err(Error::ResponseError {
                code,
                reason: coap::reason_for_code(code),
                payload: payload.map(Payload::into_bytes),
            }),
            _ => Err(Error::ProtocolError(format!(
                "unexpected response class for code 0x{code:02X}"
            ))),
        };

        // The awaiting side may already be gone (future dropped); that's not
        // this tracker's problem.
        let _ = responder.send(result);
        trace!(mid, code, "delivered CoAP response to pending request");
    }

    /// Rejects the pending request matching `mid` (if any) with `err`,
    /// without requiring a decoded CoAP response — used when the response
    /// was malformed enough that only its 4-byte header (hence `mid`) could
    /// be trusted (spec §7: `BadOptions` still resolves the pending request
    /// with `ProtocolError`).
    pub async fn fail_response(&self, mid: u16, err: Error) {
        let responder = { self.state.lock().await.pending.remove(&mid) };
        let Some(responder) = responder else {
            debug!(mid, "discarding response-decode failure with no pending request");
            return;
        };
        let _ = responder.send(Err(err));
    }

    /// Rejects every pending request with `ConnectionClosed` and empties the
    /// pending map (spec §3 "Lifecycles").
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        for (_, responder) in state.pending.drain() {
            let _ = responder.send(Err(Error::ConnectionClosed));
        }
    }
}

/// Post-increments the mid counter until an unused value is found, wrapping
/// mod 2^16. `TooManyInFlight` if every mid is already pending.
fn allocate_mid(state: &mut State) -> Result<u16> {
    let start = state.next_mid;
    loop {
        let candidate = state.next_mid;
        state.next_mid = state.next_mid.wrapping_add(1);
        if !state.pending.contains_key(&candidate) {
            return Ok(candidate);
        }
        if state.next_mid == start {
            return Err(Error::TooManyInFlight);
        }
    }
}

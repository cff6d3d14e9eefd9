//! Event bus (spec §4.E): routes a decoded frame by type to the CoAP
//! request tracker or to one of the `pong`/`announcement`/`system`/`trace`
//! subscriber lists.
//!
//! The registry shape — a map of event kind to an ordered list of
//! subscribers behind a lock, delivered in registration order — follows
//! `msgr2::message_bus::MessageBus`, generalized here to support `once`
//! removal instead of the message bus's all-persistent dispatchers.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::coap;
use crate::mup1::{DecodedFrame, FrameType};
use crate::tracker::RequestTracker;

/// The event kinds a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Pong,
    Announcement,
    System,
    Trace,
}

pub type Callback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Handle returned by `on`/`once`, usable with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: u64,
    callback: Callback,
    once: bool,
}

#[derive(Default)]
struct Registry {
    subs: HashMap<Event, Vec<Subscription>>,
}

/// Owns the subscriber registry and hands CoAP responses off to the
/// request tracker.
pub struct Dispatcher {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
    tracker: Arc<RequestTracker>,
}

impl Dispatcher {
    pub fn new(tracker: Arc<RequestTracker>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            next_id: AtomicU64::new(0),
            tracker,
        }
    }

    /// Registers a persistent subscriber.
    pub async fn on(&self, event: Event, callback: Callback) -> SubscriptionId {
        self.subscribe(event, callback, false).await
    }

    /// Registers a subscriber that is removed after its first delivery,
    /// whether the callback panics or returns normally.
    pub async fn once(&self, event: Event, callback: Callback) -> SubscriptionId {
        self.subscribe(event, callback, true).await
    }

    /// Removes a subscriber registered via `on` or `once`.
    pub async fn off(&self, event: Event, id: SubscriptionId) {
        let mut registry = self.registry.write().await;
        if let Some(list) = registry.subs.get_mut(&event) {
            list.retain(|s| s.id != id.0);
        }
    }

    async fn subscribe(&self, event: Event, callback: Callback, once: bool) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.write().await;
        registry
            .subs
            .entry(event)
            .or_default()
            .push(Subscription { id, callback, once });
        SubscriptionId(id)
    }

    /// Routes one decoded frame, per spec §4.E's type switch.
    pub async fn dispatch(&self, frame: DecodedFrame) {
        match frame.frame_type {
            FrameType::Ping => self.publish(Event::Pong, &[]).await,
            FrameType::Announcement => self.publish(Event::Announcement, &frame.payload).await,
            FrameType::Coap => match coap::parse(&frame.payload) {
                Ok(msg) => {
                    self.tracker.handle_response(msg.mid, msg.code, msg.payload).await;
                }
                Err(err) => {
                    warn!(%err, "discarding malformed CoAP message");
                    // The 4-byte header (hence the mid) is intact whenever
                    // options are malformed (spec §7), so the correlated
                    // pending request, if any, still gets rejected instead
                    // of hanging until its timeout.
                    if let Some(mid_bytes) = frame.payload.get(2..4) {
                        let mid = u16::from_be_bytes([mid_bytes[0], mid_bytes[1]]);
                        self.tracker
                            .fail_response(mid, crate::error::Error::ProtocolError(err.to_string()))
                            .await;
                    }
                }
            },
            FrameType::System => self.publish(Event::System, &frame.payload).await,
            FrameType::Trace => self.publish(Event::Trace, &frame.payload).await,
        }
    }

    /// Delivers `payload` to every subscriber of `event` in registration
    /// order. `once` subscribers are removed from the registry before being
    /// invoked, so they are detached exactly once regardless of whether the
    /// callback panics.
    async fn publish(&self, event: Event, payload: &[u8]) {
        let to_invoke = {
            let mut registry = self.registry.write().await;
            let Some(list) = registry.subs.get_mut(&event) else {
                return;
            };
            if list.is_empty() {
                return;
            }
            let mut invoke = Vec::with_capacity(list.len());
            let mut remaining = Vec::with_capacity(list.len());
            for sub in list.drain(..) {
                if sub.once {
                    invoke.push(sub.callback);
                } else {
                    invoke.push(sub.callback.clone());
                    remaining.push(sub);
                }
            }
            *list = remaining;
            invoke
        };

        for callback in to_invoke {
            if std::panic::catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                debug!(?event, "event subscriber panicked");
            }
        }
    }
}

//! Host-side control library for a Microchip VelocityDRIVE-class managed
//! Ethernet switch: MUP1 framing, CoAP request/response, and CORECONF
//! (CBOR-over-CoAP) request helpers.
//!
//! The physical serial transport, UI, and YANG schema awareness are all
//! external to this crate — see [`transport::Transport`] for the one
//! boundary it consumes.

pub mod cbor;
pub mod coap;
pub mod config;
pub mod controller;
pub mod device_info;
pub mod dispatcher;
pub mod error;
pub mod mup1;
pub mod tracker;
pub mod transport;

pub use coap::{Method, Payload};
pub use config::VelocityConfig;
pub use controller::Controller;
pub use device_info::DeviceInfo;
pub use dispatcher::{Event, SubscriptionId};
pub use error::{Error, Result};
pub use transport::{Status, Transport};

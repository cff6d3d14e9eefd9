//! Controller configuration.
//!
//! Every duration the core waits on is a defaulted, overridable field rather
//! than a literal, following `MonClientConfig`'s shape.

use std::time::Duration;

/// Tunable timeouts for the request tracker and controller facade.
#[derive(Debug, Clone)]
pub struct VelocityConfig {
    /// Deadline for a CoAP request awaiting its matching response.
    pub request_timeout: Duration,
    /// Deadline for `ping()` awaiting a `pong` event.
    pub ping_timeout: Duration,
    /// Deadline for `save_config()`/`factory_reset()` awaiting a system response.
    pub system_command_timeout: Duration,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(1),
            system_command_timeout: Duration::from_secs(10),
        }
    }
}

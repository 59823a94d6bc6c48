//! # Runtime configuration.
//!
//! Plain structs with public fields and defaults. All of them deserialize
//! with `serde` so an outer loader can fill them from a file; missing fields
//! fall back to [`Default`].
//!
//! | Struct             | Used by                         |
//! |--------------------|---------------------------------|
//! | [`SupervisorConfig`] | grace period, event bus, restart backoff |
//! | [`SamplingConfig`]   | one acquisition worker's loop   |
//! | [`RouterConfig`]     | subscription queue size         |
//! | [`GatewayConfig`]    | viewer write deadline           |
//! | [`HubConfig`]        | all of the above                |
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use telehub::{HubConfig, SamplingConfig};
//!
//! let mut cfg = HubConfig::default();
//! cfg.supervisor.grace = Duration::from_secs(2);
//! cfg.router.subscriber_capacity = 64;
//!
//! let gps = SamplingConfig::every(Duration::from_millis(500));
//! assert_eq!(gps.failure_threshold, 3);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Supervisor settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long `stop`/`stop_all` wait for a worker before aborting it.
    pub grace: Duration,
    /// Capacity of the lifecycle event bus.
    pub bus_capacity: usize,
    /// Restart delay for faulted workers.
    pub backoff: BackoffPolicy,
}

impl Default for SupervisorConfig {
    /// - `grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `backoff = 1s × 2^n`, capped at 60s, no jitter
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(60),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
        }
    }
}

/// Sampling loop settings for one worker.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Pause between two acquisitions.
    pub interval: Duration,
    /// Consecutive failures that turn into a worker fault. Clamped to at least 1.
    pub failure_threshold: u32,
    /// Bounded command queue size.
    pub command_capacity: usize,
}

impl SamplingConfig {
    /// Default settings with a different interval.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub(crate) fn threshold(&self) -> u32 {
        self.failure_threshold.max(1)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            failure_threshold: 3,
            command_capacity: 16,
        }
    }
}

/// Router settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-subscription queue capacity (drop-oldest beyond it).
    pub subscriber_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
        }
    }
}

/// Gateway settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// A viewer write slower than this tears the connection down.
    pub write_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything a [`Hub`](crate::Hub) needs.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub supervisor: SupervisorConfig,
    pub router: RouterConfig,
    pub gateway: GatewayConfig,
}

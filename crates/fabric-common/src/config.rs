//! Tunable parameters (spec §6). `dial_lock_ttl` and
//! `duplicate_link_close_delay` are fixed in the core and therefore
//! module-level constants rather than config fields.

use std::time::Duration;

use serde::Deserialize;

/// Dial lock self-expiry — fixed at 1 minute (spec §6).
pub const DIAL_LOCK_TTL: Duration = Duration::from_secs(60);

/// Grace period before a displaced link is actually closed, so in-flight
/// circuits can re-route — fixed at 5 minutes (spec §6).
pub const DUPLICATE_LINK_CLOSE_DELAY: Duration = Duration::from_secs(5 * 60);

/// Dial lock table size above which a sweep of stale entries runs before
/// granting a new lock.
pub const DIAL_LOCK_SWEEP_THRESHOLD: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// How long a `Pending` link may remain before the sweeper removes it.
    pub pending_timeout_ms: u64,
    /// Bound on concurrent outbound dials per router.
    pub dial_worker_count: usize,
    /// Startup poll interval for control-channel installation (spec §9
    /// keeps this as the documented-equivalent constant; the rendezvous
    /// primitive in `timer.rs` makes the poll itself unnecessary, but the
    /// value is kept for anything that still wants to report it).
    pub control_channel_poll_ms: u64,
    /// How often the controller's missing-link scanner runs.
    pub missing_link_scan_interval_ms: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            pending_timeout_ms: 15_000,
            dial_worker_count: 8,
            control_channel_poll_ms: 30,
            missing_link_scan_interval_ms: 5_000,
        }
    }
}

impl FabricConfig {
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_timeout_ms)
    }

    pub fn missing_link_scan_interval(&self) -> Duration {
        Duration::from_millis(self.missing_link_scan_interval_ms)
    }

    /// Parses a TOML config file, falling back to defaults for absent
    /// fields (mirrors `rist-bonding-core::config::BondingConfigInput`).
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

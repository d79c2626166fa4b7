//! Canonical default values shared across the control plane.

use std::time::Duration;

/// Reconciler tick interval.
pub const INTERVAL: Duration = Duration::from_secs(60);

/// Freshness window of the worker telemetry caches.
pub const CACHE_TTL: Duration = Duration::from_secs(30);

/// Upper bound on every remote shell invocation.
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures tolerated per worker before its switch errors out.
pub const ERR_TRY_COUNT: u32 = 10;

/// Concurrent per-worker updates within one campaign tick.
pub const PARALLEL: usize = 4;

/// Control API listen address.
pub const LISTEN_ADDR: &str = "0.0.0.0:6788";

pub(crate) fn interval() -> Duration {
    INTERVAL
}

pub(crate) fn cache_ttl() -> Duration {
    CACHE_TTL
}

pub(crate) fn parallel() -> usize {
    PARALLEL
}

pub(crate) fn listen_addr() -> String {
    LISTEN_ADDR.to_string()
}

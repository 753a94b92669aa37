//! Fixed-window request counting keyed by client identity.
//!
//! Each key owns one entry holding a request count and the instant its
//! window closes. The first request after the window closes opens a new
//! window with a count of one. Exactly `limit` requests are admitted per
//! window; the next one is denied with the time left until reset.
//!
//! Counters live in this process only. They are lost on restart and are not
//! shared between instances: behind a load balancer with N replicas a client
//! can make up to `limit * N` requests per window.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::debug;

use crate::error::ConfigError;
use crate::metrics::RATE_LIMIT_KEYS;

pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_WINDOW_SECS: u32 = 60;

/// Expired entries are swept at most this often, inline with a request.
pub const SWEEP_INTERVAL_SECS: i64 = 5 * 60;

const NEVER_SWEPT: i64 = i64::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u32,
    window_secs: u32,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window_secs: u32) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        if window_secs == 0 {
            return Err(ConfigError::ZeroRateWindow);
        }
        Ok(Self { limit, window_secs })
    }

    /// 5 requests per minute, for public endpoints that trigger side effects.
    pub fn strict() -> Self {
        Self {
            limit: 5,
            window_secs: 60,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_secs(&self) -> u32 {
        self.window_secs
    }

    fn window(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.window_secs))
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

// Rate limit entry - tracks requests per IP/key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl RateLimitEntry {
    fn open(now: DateTime<Utc>, policy: &RateLimitPolicy) -> Self {
        Self {
            count: 1,
            window_reset_at: now + policy.window(),
        }
    }
}

/// Quota left after an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    // first request of a fresh window
    fn opened(policy: &RateLimitPolicy, reset_at: DateTime<Utc>) -> Self {
        Self {
            limit: policy.limit,
            remaining: policy.limit - 1,
            reset_at,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Too Many Requests - limit of {limit} requests per {window_secs} seconds exceeded, retry in {retry_after_secs} seconds"
)]
pub struct RateLimitDenial {
    pub limit: u32,
    pub window_secs: u32,
    pub retry_after_secs: u64,
    pub reset_at: DateTime<Utc>,
}

pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    default_policy: RateLimitPolicy,
    sweep_interval: TimeDelta,
    // millis since epoch of the last sweep
    last_sweep_ms: AtomicI64,
}

impl RateLimiter {
    pub fn new(default_policy: RateLimitPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            default_policy,
            sweep_interval: TimeDelta::seconds(SWEEP_INTERVAL_SECS),
            last_sweep_ms: AtomicI64::new(NEVER_SWEPT),
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Count one request for `key` at `now` under `policy` (or the default).
    pub fn check(
        &self,
        key: &str,
        policy: Option<&RateLimitPolicy>,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus, RateLimitDenial> {
        self.maybe_sweep(now);
        let policy = policy.unwrap_or(&self.default_policy);

        // the shard lock is held for the whole read-increment-write
        let outcome = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if now <= occupied.get().window_reset_at => {
                let entry = occupied.get_mut();
                entry.count = entry.count.saturating_add(1);
                if entry.count > policy.limit {
                    Err(RateLimitDenial {
                        limit: policy.limit,
                        window_secs: policy.window_secs,
                        retry_after_secs: retry_after_secs(entry.window_reset_at, now),
                        reset_at: entry.window_reset_at,
                    })
                } else {
                    Ok(RateLimitStatus {
                        limit: policy.limit,
                        remaining: policy.limit - entry.count,
                        reset_at: entry.window_reset_at,
                    })
                }
            }
            Entry::Occupied(mut occupied) => {
                let entry = RateLimitEntry::open(now, policy);
                let reset_at = entry.window_reset_at;
                occupied.insert(entry);
                Ok(RateLimitStatus::opened(policy, reset_at))
            }
            Entry::Vacant(vacant) => {
                let entry = RateLimitEntry::open(now, policy);
                let reset_at = entry.window_reset_at;
                vacant.insert(entry);
                Ok(RateLimitStatus::opened(policy, reset_at))
            }
        };

        RATE_LIMIT_KEYS.set(self.tracked_keys() as f64);
        outcome
    }

    fn maybe_sweep(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep_ms.load(Ordering::Acquire);

        if last == NEVER_SWEPT {
            let _ = self.last_sweep_ms.compare_exchange(
                NEVER_SWEPT,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return;
        }

        if now_ms.saturating_sub(last) < self.sweep_interval.num_milliseconds() {
            return;
        }

        // only the caller that moves the marker sweeps
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.window_reset_at >= now);
        let after = self.entries.len();

        debug!(
            removed = before.saturating_sub(after),
            remaining = after,
            "Swept expired rate limit entries"
        );
    }
}

fn retry_after_secs(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (reset_at - now).num_milliseconds().max(0);
    // ceil to whole seconds
    ((millis + 999) / 1000) as u64
}

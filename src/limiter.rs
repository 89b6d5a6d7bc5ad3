//! Per-tier concurrency limiting for the extraction stage.
//!
//! Extraction is the most memory- and CPU-intensive step of the pipeline, so
//! each tenant tier gets a bounded pool of extraction slots. Acquisition
//! waits briefly (100 ms by default) and then fails fast with
//! [`ConcurrencyLimitError`] instead of queuing unboundedly — callers surface
//! that as a retriable "too many concurrent uploads" condition.
//!
//! The limiter is in-memory and per-process; it resets on restart. Slots are
//! RAII guards, so release happens exactly once on every exit path.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Tenant subscription tiers.
///
/// Unknown tier names fall back to [`Free`](Self::Free), the most
/// restrictive pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Free,
    Starter,
    Pro,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Starter, Tier::Pro];

    /// Case-insensitive parse with fallback to `Free`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "starter" => Self::Starter,
            "pro" => Self::Pro,
            _ => Self::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
        }
    }

    /// Default concurrent-extraction capacity for this tier.
    fn default_capacity(&self) -> usize {
        match self {
            Self::Free => 1,
            Self::Starter => 2,
            Self::Pro => 5,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raised when a tier's extraction pool stays exhausted past the bounded
/// acquisition wait.
#[derive(Debug, Error, Diagnostic)]
#[error(
    "too many concurrent uploads: tier '{tier}' allows at most {limit} simultaneous extractions; \
     retry once current uploads finish"
)]
#[diagnostic(
    code(inkstream::limiter::exhausted),
    help("Wait for in-flight uploads to complete, or upgrade the tier.")
)]
pub struct ConcurrencyLimitError {
    pub tier: Tier,
    pub limit: usize,
}

struct TierPool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
}

/// Bounded per-tier extraction pools.
pub struct ConcurrencyLimiter {
    pools: FxHashMap<Tier, TierPool>,
    acquire_timeout: Duration,
}

impl ConcurrencyLimiter {
    /// Limiter with the default capacities (free 1, starter 2, pro 5) and a
    /// 100 ms acquisition wait.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(100))
    }

    /// Limiter with default capacities and a custom acquisition wait.
    pub fn with_timeout(acquire_timeout: Duration) -> Self {
        let capacities = Tier::ALL
            .iter()
            .map(|tier| (*tier, tier.default_capacity()))
            .collect();
        Self::with_capacities(capacities, acquire_timeout)
    }

    /// Limiter with explicit per-tier capacities. Tiers absent from the map
    /// get their defaults.
    pub fn with_capacities(
        capacities: FxHashMap<Tier, usize>,
        acquire_timeout: Duration,
    ) -> Self {
        let pools = Tier::ALL
            .iter()
            .map(|tier| {
                let capacity = capacities
                    .get(tier)
                    .copied()
                    .unwrap_or_else(|| tier.default_capacity())
                    .max(1);
                (
                    *tier,
                    TierPool {
                        capacity,
                        semaphore: Arc::new(Semaphore::new(capacity)),
                        active: Arc::new(AtomicUsize::new(0)),
                    },
                )
            })
            .collect();

        Self {
            pools,
            acquire_timeout,
        }
    }

    /// Capacity of a tier's pool.
    pub fn limit(&self, tier: Tier) -> usize {
        self.pool(tier).capacity
    }

    /// Take an extraction slot for `job_id`, waiting at most the configured
    /// timeout.
    ///
    /// The returned [`ConcurrencySlot`] releases the slot when dropped, so
    /// release is guaranteed exactly once per successful acquisition — on
    /// success and on every failure path alike.
    pub async fn acquire(
        &self,
        tier: Tier,
        job_id: &str,
    ) -> Result<ConcurrencySlot, ConcurrencyLimitError> {
        let pool = self.pool(tier);

        let permit = tokio::time::timeout(
            self.acquire_timeout,
            pool.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            warn!(tier = %tier, limit = pool.capacity, job_id, "extraction slot wait timed out");
            ConcurrencyLimitError {
                tier,
                limit: pool.capacity,
            }
        })?
        .expect("extraction semaphore closed");

        let active = pool.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            tier = %tier,
            job_id,
            active,
            limit = pool.capacity,
            "extraction slot acquired"
        );

        Ok(ConcurrencySlot {
            _permit: permit,
            tier,
            job_id: job_id.to_string(),
            active: Arc::clone(&pool.active),
        })
    }

    /// Snapshot of pool usage for observability.
    pub fn stats(&self) -> Vec<TierStats> {
        Tier::ALL
            .iter()
            .map(|tier| {
                let pool = self.pool(*tier);
                let active = pool.active.load(Ordering::SeqCst);
                TierStats {
                    tier: *tier,
                    limit: pool.capacity,
                    active,
                    available: pool.capacity.saturating_sub(active),
                }
            })
            .collect()
    }

    fn pool(&self, tier: Tier) -> &TierPool {
        // All tiers are populated at construction; Free always exists.
        self.pools
            .get(&tier)
            .or_else(|| self.pools.get(&Tier::Free))
            .expect("limiter pools missing Free tier")
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

/// Usage snapshot for one tier pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierStats {
    pub tier: Tier,
    pub limit: usize,
    pub active: usize,
    pub available: usize,
}

/// One unit of permission to run an extraction; releases itself on drop.
#[derive(Debug)]
pub struct ConcurrencySlot {
    _permit: OwnedSemaphorePermit,
    tier: Tier,
    job_id: String,
    active: Arc<AtomicUsize>,
}

impl ConcurrencySlot {
    pub fn tier(&self) -> Tier {
        self.tier
    }
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(
            tier = %self.tier,
            job_id = %self.job_id,
            active = remaining,
            "extraction slot released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tier_names_fall_back_to_free() {
        assert_eq!(Tier::parse("Pro"), Tier::Pro);
        assert_eq!(Tier::parse("STARTER"), Tier::Starter);
        assert_eq!(Tier::parse("enterprise"), Tier::Free);
        assert_eq!(Tier::parse(""), Tier::Free);
    }

    #[tokio::test]
    async fn acquire_within_capacity_succeeds() {
        let limiter = ConcurrencyLimiter::new();
        let slot = limiter.acquire(Tier::Starter, "job_a").await.unwrap();
        assert_eq!(slot.tier(), Tier::Starter);
        assert_eq!(limiter.stats()[1].active, 1);
        drop(slot);
        assert_eq!(limiter.stats()[1].active, 0);
    }

    #[tokio::test]
    async fn exhausted_pool_fails_within_bounded_wait() {
        let limiter = ConcurrencyLimiter::with_timeout(Duration::from_millis(10));
        let _held = limiter.acquire(Tier::Free, "job_a").await.unwrap();

        let err = limiter.acquire(Tier::Free, "job_b").await.unwrap_err();
        assert_eq!(err.tier, Tier::Free);
        assert_eq!(err.limit, 1);
    }

    #[tokio::test]
    async fn dropped_slot_frees_capacity_for_waiters() {
        let limiter = ConcurrencyLimiter::with_timeout(Duration::from_millis(10));
        {
            let _slot = limiter.acquire(Tier::Free, "job_a").await.unwrap();
        }
        // Slot released by drop; a new acquire must succeed immediately.
        limiter.acquire(Tier::Free, "job_b").await.unwrap();
    }
}

use std::time::{Duration, Instant};

use inkstream::limiter::{ConcurrencyLimiter, Tier};

#[tokio::test]
async fn n_plus_one_acquisitions_never_block_indefinitely() {
    let limiter = ConcurrencyLimiter::with_timeout(Duration::from_millis(100));
    let cap = limiter.limit(Tier::Pro);
    assert_eq!(cap, 5);

    let mut held = Vec::new();
    for n in 0..cap {
        held.push(
            limiter
                .acquire(Tier::Pro, &format!("job_{n}"))
                .await
                .expect("within capacity"),
        );
    }

    // The (N+1)th attempt fails within the bounded wait instead of queuing.
    let started = Instant::now();
    let err = limiter.acquire(Tier::Pro, "job_overflow").await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(err.limit, cap);
    assert_eq!(err.tier, Tier::Pro);

    // Freeing one slot lets a waiter through again.
    held.pop();
    limiter.acquire(Tier::Pro, "job_retry").await.unwrap();
}

#[tokio::test]
async fn slots_are_released_exactly_once_per_acquisition() {
    let limiter = ConcurrencyLimiter::with_timeout(Duration::from_millis(10));

    for round in 0..3 {
        let slot = limiter
            .acquire(Tier::Starter, &format!("job_{round}"))
            .await
            .unwrap();
        let stats = limiter.stats();
        let starter = stats.iter().find(|s| s.tier == Tier::Starter).unwrap();
        assert_eq!(starter.active, 1);
        drop(slot);
    }

    let stats = limiter.stats();
    let starter = stats.iter().find(|s| s.tier == Tier::Starter).unwrap();
    assert_eq!(starter.active, 0);
    assert_eq!(starter.available, starter.limit);
}

#[tokio::test]
async fn tiers_do_not_share_pools() {
    let limiter = ConcurrencyLimiter::with_timeout(Duration::from_millis(10));
    let _free = limiter.acquire(Tier::Free, "job_free").await.unwrap();

    // Free is exhausted; starter and pro are unaffected.
    assert!(limiter.acquire(Tier::Free, "job_free_2").await.is_err());
    assert!(limiter.acquire(Tier::Starter, "job_starter").await.is_ok());
    assert!(limiter.acquire(Tier::Pro, "job_pro").await.is_ok());
}

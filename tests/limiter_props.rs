// tests/limiter_props.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parcel_tracker::RateLimiter;
use tokio::time::Instant;

/// Submit `n` tasks that each take `work`; return (max concurrent, start instants).
async fn drive(limiter: &RateLimiter, n: usize, work: Duration) -> (usize, Vec<Instant>) {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let starts = Arc::new(Mutex::new(Vec::new()));

    let pending: Vec<_> = (0..n)
        .map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let starts = Arc::clone(&starts);
            limiter.submit(move || async move {
                starts.lock().unwrap().push(Instant::now());
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(work).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();

    for p in pending {
        p.await.unwrap();
    }
    let starts = starts.lock().unwrap().clone();
    (peak.load(Ordering::SeqCst), starts)
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_the_cap() {
    for (rps, cap) in [(50.0, 1), (50.0, 2), (100.0, 3), (1000.0, 5)] {
        let limiter = RateLimiter::new(rps, cap).unwrap();
        let (peak, starts) = drive(&limiter, 12, Duration::from_millis(250)).await;
        assert!(peak <= cap, "rps={rps} cap={cap} peak={peak}");
        assert_eq!(starts.len(), 12);
    }
}

#[tokio::test(start_paused = true)]
async fn starts_are_spaced_by_the_rate_interval() {
    for rps in [2.0, 3.0, 10.0] {
        // Plenty of slots: only the rate cap can space the starts.
        let limiter = RateLimiter::new(rps, 8).unwrap();
        let interval = limiter.min_interval();
        let (_, mut starts) = drive(&limiter, 6, Duration::from_millis(5)).await;
        starts.sort();
        for pair in starts.windows(2) {
            assert!(
                pair[1] - pair[0] >= interval,
                "rps={rps}: gap {:?} < {:?}",
                pair[1] - pair[0],
                interval
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn deferred_start_fires_exactly_when_spacing_allows() {
    // Spare slots and long tasks: neither a completion nor the concurrency cap
    // may be what releases the next start, only the armed timer.
    let limiter = RateLimiter::new(10.0, 8).unwrap();
    let interval = limiter.min_interval();
    let t0 = Instant::now();
    let (peak, mut starts) = drive(&limiter, 5, interval * 3).await;
    starts.sort();

    let offsets: Vec<Duration> = starts.iter().map(|s| *s - t0).collect();
    let expected: Vec<Duration> = (0..5u32).map(|i| interval * i).collect();
    assert_eq!(offsets, expected);
    assert!(peak > 1, "starts should overlap running tasks, peak={peak}");
}

#[tokio::test(start_paused = true)]
async fn rate_cap_holds_across_slots() {
    // 2 rps with 2 slots still means one start per 500 ms.
    let limiter = RateLimiter::new(2.0, 2).unwrap();
    let t0 = Instant::now();
    let (_, starts) = drive(&limiter, 4, Duration::from_millis(10)).await;
    let last = starts.into_iter().max().unwrap();
    assert!(last - t0 >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn failures_are_delivered_and_the_queue_keeps_moving() {
    let limiter = RateLimiter::new(100.0, 1).unwrap();
    let bad = limiter.submit(|| async {
        Err::<(), _>(parcel_tracker::TrackError::Transport {
            status: 500,
            body: "boom".into(),
        })
    });
    let good = limiter.submit(|| async { Ok(7) });
    assert_eq!(bad.await.unwrap_err().status(), Some(500));
    assert_eq!(good.await.unwrap(), 7);
}

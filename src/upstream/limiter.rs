// src/upstream/limiter.rs
//! FIFO rate limiter + concurrency gate shared by every caller of one upstream client.
//!
//! Two independent caps:
//! - at most `max_concurrency` tasks in flight;
//! - successive task *starts* are at least `1000 / max_rps` ms apart, across all
//!   slots (one shared "earliest next start").
//!
//! When the queue is blocked only by the start spacing, a single timer is armed
//! for the exact moment the next start becomes legal.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::gauge;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Result, TrackError};

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    min_interval: Duration,
    max_concurrency: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Job>,
    running: usize,
    next_start_at: Option<Instant>,
    timer_armed: bool,
}

impl RateLimiter {
    /// `max_rps` must be finite and > 0, `max_concurrency` >= 1.
    pub fn new(max_rps: f64, max_concurrency: usize) -> Result<Self> {
        if !(max_rps.is_finite() && max_rps > 0.0) {
            return Err(TrackError::config(format!(
                "max requests per second must be > 0 (got {max_rps})"
            )));
        }
        if max_concurrency == 0 {
            return Err(TrackError::config("max concurrency must be >= 1"));
        }

        let interval_ms = ((1000.0 / max_rps).floor() as u64).max(1);
        Ok(Self {
            inner: Arc::new(Inner {
                min_interval: Duration::from_millis(interval_ms),
                max_concurrency,
                state: Mutex::new(State::default()),
            }),
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Tasks started and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().running
    }

    /// Enqueue `task` now and return a future resolving to its result.
    ///
    /// Admission order is the call order, not the order the returned futures
    /// are first polled. Errors from the task come back unchanged; the gate
    /// itself only adds [`TrackError::TaskDropped`] if the task panicked.
    pub fn submit<F, Fut, T>(&self, task: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                // Receiver may be gone if the caller stopped waiting.
                let _ = tx.send(task().await);
            })
        });

        self.inner.lock().queue.push_back(job);
        self.inner.pump();

        async move { rx.await.unwrap_or(Err(TrackError::TaskDropped)) }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start as many queued tasks as both caps allow right now.
    fn pump(self: &Arc<Self>) {
        let mut ready = Vec::new();
        let mut wake_at = None;
        {
            let mut state = self.lock();
            while state.running < self.max_concurrency && !state.queue.is_empty() {
                let now = Instant::now();
                if let Some(at) = state.next_start_at.filter(|at| now < *at) {
                    if !state.timer_armed {
                        state.timer_armed = true;
                        wake_at = Some(at);
                    }
                    break;
                }
                let Some(job) = state.queue.pop_front() else {
                    break;
                };
                state.running += 1;
                state.next_start_at = Some(now + self.min_interval);
                ready.push(job);
            }
            gauge!("limiter_queue_depth").set(state.queue.len() as f64);
        }

        // Spawn outside the lock: a slot guard dropped early re-enters `pump`.
        for job in ready {
            let guard = SlotGuard {
                inner: Arc::clone(self),
            };
            tokio::spawn(async move {
                let _guard = guard;
                job().await;
            });
        }

        if let Some(at) = wake_at {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep_until(at).await;
                inner.lock().timer_armed = false;
                inner.pump();
            });
        }
    }
}

/// Releases a slot when the task finishes, panics included, and refills it.
struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.inner.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.inner.pump();
    }
}

// src/poller.rs
//! Polling scheduler.
//!
//! One background task: wait `interval`, run a cycle over every watch, repeat.
//! The next wait starts only after the previous cycle has finished, so at most
//! one cycle is ever in flight. `stop()` cancels a pending wait but never an
//! in-flight cycle.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::fingerprint::snapshot_hash;
use crate::format::{format_update, DisplayZone};
use crate::notify::Notifier;
use crate::snapshot::Watch;
use crate::store::WatchStore;
use crate::upstream::{query_with_carrier_fallback, TrackingApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopped,
}

/// Per-cycle tally. `notified` includes watches that were then removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub unchanged: usize,
    pub notified: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Collaborators a cycle talks to.
#[derive(Clone)]
pub struct PollerDeps {
    pub store: Arc<dyn WatchStore>,
    pub api: Arc<dyn TrackingApi>,
    pub notifier: Arc<dyn Notifier>,
    pub timezone: DisplayZone,
}

/// Handle to the running poll loop.
pub struct Poller {
    cancel: CancellationToken,
    state: Arc<watch::Sender<PollerState>>,
    task: JoinHandle<()>,
}

impl Poller {
    /// Spawn the loop on the current tokio runtime. The first cycle runs one
    /// `interval` from now.
    pub fn start(deps: PollerDeps, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (tx, _rx) = watch::channel(PollerState::Idle);
        let state = Arc::new(tx);

        let task = tokio::spawn(run_loop(
            deps,
            interval,
            cancel.clone(),
            Arc::clone(&state),
        ));

        Self {
            cancel,
            state,
            task,
        }
    }

    /// Stop scheduling. An in-flight cycle finishes on its own.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.state.send_if_modified(|s| {
            if *s == PollerState::Idle {
                *s = PollerState::Stopped;
                true
            } else {
                false
            }
        });
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// Wait for the loop to exit (call [`Poller::stop`] first).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "poller task ended abnormally");
        }
    }
}

async fn run_loop(
    deps: PollerDeps,
    interval: Duration,
    cancel: CancellationToken,
    state: Arc<watch::Sender<PollerState>>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        // stop() may have won the race after the timer fired.
        let started = state.send_if_modified(|s| match s {
            PollerState::Stopped => false,
            _ => {
                *s = PollerState::Running;
                true
            }
        });
        if !started {
            break;
        }

        run_cycle(&deps).await;

        let stopping = cancel.is_cancelled();
        state.send_replace(if stopping {
            PollerState::Stopped
        } else {
            PollerState::Idle
        });
        if stopping {
            break;
        }
    }
    state.send_replace(PollerState::Stopped);
    debug!("poller stopped");
}

enum WatchOutcome {
    Unchanged,
    Notified,
    Removed,
}

/// One pass over every watch, sequentially. Per-watch failures are logged and
/// counted, never propagated.
pub async fn run_cycle(deps: &PollerDeps) -> CycleReport {
    let mut report = CycleReport::default();

    let watches = match deps.store.list_all().await {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, "poll cycle skipped: watch list unavailable");
            return report;
        }
    };
    if watches.is_empty() {
        trace!("no watches to poll");
        return report;
    }

    info!(count = watches.len(), "running poll cycle");

    for watch in &watches {
        report.checked += 1;
        match poll_watch(deps, watch).await {
            Ok(WatchOutcome::Unchanged) => report.unchanged += 1,
            Ok(WatchOutcome::Notified) => report.notified += 1,
            Ok(WatchOutcome::Removed) => {
                report.notified += 1;
                report.removed += 1;
            }
            Err(e) => {
                report.failed += 1;
                counter!("poll_watch_failures_total").increment(1);
                warn!(
                    error = %e,
                    tracking_number = %watch.tracking_number,
                    user_id = watch.user_id,
                    "poll update failed"
                );
            }
        }
    }

    counter!("poll_cycles_total").increment(1);
    info!(
        checked = report.checked,
        unchanged = report.unchanged,
        notified = report.notified,
        removed = report.removed,
        failed = report.failed,
        "poll cycle finished"
    );
    report
}

async fn poll_watch(deps: &PollerDeps, watch: &Watch) -> Result<WatchOutcome> {
    let snapshot = query_with_carrier_fallback(
        deps.api.as_ref(),
        &watch.tracking_number,
        watch.carrier_code.as_deref(),
    )
    .await?;
    let hash = snapshot_hash(&snapshot);

    if watch.last_status_hash.as_deref() == Some(hash.as_str()) {
        trace!(tracking_number = %watch.tracking_number, "unchanged");
        return Ok(WatchOutcome::Unchanged);
    }

    // Send first: if delivery fails the hash stays old and the update is retried.
    let text = format_update(watch, &snapshot, &deps.timezone);
    deps.notifier.send(watch.user_id, &text).await?;
    counter!("poll_notifications_total").increment(1);

    if snapshot.terminal {
        let carrier = snapshot
            .carrier_code
            .as_deref()
            .or(watch.carrier_code.as_deref());
        if let Some(carrier) = carrier {
            if let Err(e) = deps
                .api
                .delete_tracking(&watch.tracking_number, carrier)
                .await
            {
                warn!(
                    error = %e,
                    tracking_number = %watch.tracking_number,
                    user_id = watch.user_id,
                    "failed to delete terminal tracking upstream"
                );
            }
        }
        deps.store
            .remove(watch.user_id, &watch.tracking_number)
            .await?;
        counter!("poll_terminal_removed_total").increment(1);
        info!(
            tracking_number = %watch.tracking_number,
            user_id = watch.user_id,
            "removed terminal watch"
        );
        return Ok(WatchOutcome::Removed);
    }

    deps.store
        .update_state(
            watch.user_id,
            &watch.tracking_number,
            &hash,
            snapshot.carrier_code.as_deref(),
        )
        .await?;
    Ok(WatchOutcome::Notified)
}

// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod format;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod poller;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod upstream;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::error::{Result, TrackError};
pub use crate::fingerprint::snapshot_hash;
pub use crate::normalize::{is_terminal, normalize_snapshot};
pub use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
pub use crate::poller::{run_cycle, CycleReport, Poller, PollerDeps, PollerState};
pub use crate::snapshot::{Checkpoint, Snapshot, Watch};
pub use crate::store::{JsonWatchStore, WatchStore};
pub use crate::upstream::{query_with_carrier_fallback, RateLimiter, TrackingApi, UpstreamClient};

// src/store/mod.rs
//! Persistent watch list.
//!
//! The poller only needs the trait; [`JsonWatchStore`] is the file-backed
//! implementation the binaries use.

mod json_file;

use async_trait::async_trait;

use crate::error::Result;
use crate::snapshot::Watch;

pub use json_file::JsonWatchStore;

/// Watches keyed by (user id, uppercased tracking number).
#[async_trait]
pub trait WatchStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Watch>>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Watch>>;

    /// Insert a new watch, or update carrier/label of an existing one.
    /// `None` leaves the stored value untouched.
    async fn upsert(
        &self,
        user_id: i64,
        tracking_number: &str,
        carrier_code: Option<&str>,
        label: Option<&str>,
    ) -> Result<()>;

    /// Record the last-seen hash. A missing watch is a no-op.
    async fn update_state(
        &self,
        user_id: i64,
        tracking_number: &str,
        last_status_hash: &str,
        carrier_code: Option<&str>,
    ) -> Result<()>;

    /// Returns how many watches were removed (0 or 1 for a consistent store).
    async fn remove(&self, user_id: i64, tracking_number: &str) -> Result<usize>;
}

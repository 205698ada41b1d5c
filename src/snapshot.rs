// src/snapshot.rs
use serde::{Deserialize, Serialize};

/// One event in a shipment's history. Upstream time formats vary
/// (ISO-8601, UTC-normalized, `YYYY-MM-DD HH:mm:ss`), so time stays a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub time: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl Checkpoint {
    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.location.is_none() && self.description.is_none()
    }
}

/// Canonical, point-in-time shipment state derived from one upstream query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tracking_number: String,
    pub carrier_code: Option<String>,
    /// Free text, `"unknown"` when nothing usable was found.
    pub status: String,
    pub terminal: bool,
    pub last_checkpoint: Option<Checkpoint>,
}

impl Snapshot {
    pub const UNKNOWN_STATUS: &'static str = "unknown";

    pub fn unknown(tracking_number: impl Into<String>, carrier_code: Option<String>) -> Self {
        Self {
            tracking_number: tracking_number.into(),
            carrier_code,
            status: Self::UNKNOWN_STATUS.to_string(),
            terminal: false,
            last_checkpoint: None,
        }
    }
}

/// A (user, tracking number) subscription with its last-seen fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watch {
    pub user_id: i64,
    pub tracking_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_hash: Option<String>,
}

impl Watch {
    pub fn new(user_id: i64, tracking_number: impl Into<String>) -> Self {
        Self {
            user_id,
            tracking_number: tracking_number.into(),
            carrier_code: None,
            label: None,
            last_status_hash: None,
        }
    }

    /// Identity check: same user and same tracking number ignoring case.
    pub fn matches(&self, user_id: i64, tracking_number: &str) -> bool {
        self.user_id == user_id
            && self.tracking_number.to_uppercase() == tracking_number.to_uppercase()
    }
}

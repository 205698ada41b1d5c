// src/normalize/checkpoints.rs
use serde_json::{Map, Value};

use super::fields::{as_object, first_string};
use crate::snapshot::Checkpoint;

/// Array-valued keys that carry checkpoint lists on a parcel record.
const CHECKPOINT_ARRAY_KEYS: &[&str] = &[
    "checkpoints",
    "events",
    "tracking_info",
    "trace",
    "traces",
    "origin_info",
];

const LOGISTICS_KEY: &str = "localLogisticsInfo";
const LOGISTICS_DETAILS_KEY: &str = "trackingDetails";

// UTC-normalized alias first so it wins over the local-time field.
const TIME_KEYS: &[&str] = &[
    "eventTimeZeroUTC",
    "time",
    "event_time",
    "checkpoint_time",
    "date",
    "created_at",
    "eventTime",
];
const LOCATION_KEYS: &[&str] = &["location", "city", "country", "place", "address"];
const DESCRIPTION_KEYS: &[&str] = &[
    "description",
    "status",
    "event",
    "details",
    "checkpoint_description",
    "eventDetail",
];
const SUBSTATUS_KEYS: &[&str] = &["transitSubStatus", "subStatus", "sub_status", "substatus"];

/// A checkpoint plus the raw sub-status it came with (only used as a terminal signal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawCheckpoint {
    pub checkpoint: Checkpoint,
    pub substatus: Option<String>,
}

/// Collect checkpoints from every known list on `record`, most recent first.
///
/// Ordering is a plain string comparison of the time field, which keeps
/// `YYYY-MM-DD...` shaped values in chronological order without parsing.
pub(crate) fn extract_checkpoints(record: &Map<String, Value>) -> Vec<RawCheckpoint> {
    let mut lists: Vec<&Vec<Value>> = CHECKPOINT_ARRAY_KEYS
        .iter()
        .filter_map(|k| record.get(*k).and_then(Value::as_array))
        .collect();

    if let Some(details) = record
        .get(LOGISTICS_KEY)
        .and_then(as_object)
        .and_then(|l| l.get(LOGISTICS_DETAILS_KEY))
        .and_then(Value::as_array)
    {
        lists.push(details);
    }

    let mut out: Vec<RawCheckpoint> = lists
        .into_iter()
        .flatten()
        .filter_map(as_object)
        .map(|entry| RawCheckpoint {
            checkpoint: Checkpoint {
                time: first_string(entry, TIME_KEYS),
                location: first_string(entry, LOCATION_KEYS),
                description: first_string(entry, DESCRIPTION_KEYS),
            },
            substatus: first_string(entry, SUBSTATUS_KEYS),
        })
        .filter(|c| !c.checkpoint.is_empty())
        .collect();

    // Stable: entries with equal (or missing) times keep upstream order.
    out.sort_by(|a, b| {
        let ta = a.checkpoint.time.as_deref().unwrap_or("");
        let tb = b.checkpoint.time.as_deref().unwrap_or("");
        tb.cmp(ta)
    });
    out
}

// src/normalize/mod.rs
//! Schema-tolerant normalization of upstream tracking responses.
//!
//! The aggregator has no single stable response shape: records may sit at the
//! root, under `data`, under `data.accepted.content`, in lists keyed by
//! different names, and fields are spelled several ways. Instead of modelling
//! every shape, the normalizer walks the parsed JSON tree, collects objects that
//! look like parcel records and picks the best one.

mod checkpoints;
mod fields;
pub mod terminal;

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::snapshot::Snapshot;
use checkpoints::extract_checkpoints;
use fields::{as_object, first_string, has_any_key, is_truthy, walk_objects};

pub use terminal::is_terminal;

const CONTAINER_KEYS: &[&str] = &[
    "data",
    "result",
    "results",
    "items",
    "list",
    "trackings",
    "packages",
];

const IDENTIFIER_KEYS: &[&str] = &[
    "tracking_number",
    "trackingNumber",
    "number",
    "track_number",
    "trackNo",
];

const STATUS_BEARING_KEYS: &[&str] = &[
    "status",
    "track_status",
    "latest_status",
    "status_description",
    "checkpoints",
    "events",
];

const STATUS_KEYS: &[&str] = &[
    "status",
    "track_status",
    "latest_status",
    "status_description",
    "trackingStatus",
    "transitStatus",
];

const CARRIER_KEYS: &[&str] = &[
    "carrier_code",
    "carrierCode",
    "carrier",
    "shipping_carrier",
    "courierCode",
];

const TRANSIT_STATUS_KEYS: &[&str] = &["transitStatus"];
const TRANSIT_SUBSTATUS_KEYS: &[&str] = &["transitSubStatus"];
const LOGISTICS_KEY: &str = "localLogisticsInfo";
const LOGISTICS_CARRIER_KEYS: &[&str] = &["courierCode"];

/// Build the canonical snapshot for `tracking_number` out of any parsed body.
///
/// Never fails: when no record is found the snapshot carries status
/// `"unknown"`, `terminal == false` and the caller's carrier code.
pub fn normalize_snapshot(
    raw: &Value,
    tracking_number: &str,
    explicit_carrier: Option<&str>,
) -> Snapshot {
    let empty = Map::new();
    let record = find_parcel_record(raw, tracking_number).unwrap_or(&empty);

    let checkpoints = extract_checkpoints(record);
    let latest = checkpoints.first();

    let raw_status = first_string(record, STATUS_KEYS);
    let status = latest
        .and_then(|c| c.checkpoint.description.clone())
        .or_else(|| raw_status.clone())
        .unwrap_or_else(|| Snapshot::UNKNOWN_STATUS.to_string());

    let carrier_code = first_string(record, CARRIER_KEYS)
        .or_else(|| {
            record
                .get(LOGISTICS_KEY)
                .and_then(as_object)
                .and_then(|l| first_string(l, LOGISTICS_CARRIER_KEYS))
        })
        .or_else(|| explicit_carrier.map(str::to_string));

    // The final signal can live in a field the resolved status discards.
    let signals = [
        raw_status,
        first_string(record, TRANSIT_STATUS_KEYS),
        first_string(record, TRANSIT_SUBSTATUS_KEYS),
        latest.and_then(|c| c.substatus.clone()),
        Some(status.clone()),
    ];
    let signals: Vec<&str> = signals.iter().flatten().map(String::as_str).collect();
    let terminal = is_terminal(signals.as_slice());

    Snapshot {
        tracking_number: tracking_number.to_string(),
        carrier_code,
        status,
        terminal,
        last_checkpoint: latest.map(|c| c.checkpoint.clone()),
    }
}

/// Exact identifier match first, then the first record with a status-bearing key.
fn find_parcel_record<'a>(raw: &'a Value, tracking_number: &str) -> Option<&'a Map<String, Value>> {
    let candidates = collect_candidate_records(raw);
    let wanted = tracking_number.to_uppercase();

    let exact = candidates.iter().copied().find(|c| {
        first_string(c, IDENTIFIER_KEYS).is_some_and(|n| n.to_uppercase() == wanted)
    });
    exact.or_else(|| {
        candidates
            .iter()
            .copied()
            .find(|c| has_any_key(c, STATUS_BEARING_KEYS))
    })
}

fn collect_candidate_records(raw: &Value) -> Vec<&Map<String, Value>> {
    let mut roots = vec![raw];
    if let Some(top) = raw.as_object() {
        roots.extend(
            CONTAINER_KEYS
                .iter()
                .filter_map(|k| top.get(*k))
                .filter(|v| is_truthy(v)),
        );
    }

    let mut records = Vec::new();
    for root in roots {
        walk_objects(root, &mut |obj| {
            // Identifier matches win; the status check is only a fallback.
            if has_any_key(obj, IDENTIFIER_KEYS) || has_any_key(obj, STATUS_BEARING_KEYS) {
                records.push(obj);
            }
        });
    }
    dedupe_records(records)
}

/// Structural dedupe, first occurrence wins.
fn dedupe_records(records: Vec<&Map<String, Value>>) -> Vec<&Map<String, Value>> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            let signature = serde_json::to_string(r).unwrap_or_default();
            seen.insert(signature)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_yields_unknown() {
        let s = normalize_snapshot(&json!({}), "X1", Some("SPXVN"));
        assert_eq!(s.status, "unknown");
        assert!(!s.terminal);
        assert_eq!(s.carrier_code.as_deref(), Some("SPXVN"));
        assert_eq!(s.last_checkpoint, None);
    }

    #[test]
    fn non_object_bodies_are_tolerated() {
        let s = normalize_snapshot(&json!("gateway timeout"), "X1", None);
        assert_eq!(s, Snapshot::unknown("X1", None));
        let s = normalize_snapshot(&json!([1, 2, null]), "X1", None);
        assert_eq!(s.status, "unknown");
    }

    #[test]
    fn identifier_match_is_case_insensitive() {
        let raw = json!({"data": [
            {"trackNo": "other", "status": "Delivered"},
            {"trackNo": "abc123", "status": "In Transit"}
        ]});
        let s = normalize_snapshot(&raw, "ABC123", None);
        assert_eq!(s.status, "In Transit");
        assert!(!s.terminal);
    }

    #[test]
    fn falls_back_to_first_status_bearing_record() {
        let raw = json!({"result": {"meta": {"page": 1}, "parcel": {"latest_status": "Picked up"}}});
        let s = normalize_snapshot(&raw, "NOPE", None);
        assert_eq!(s.status, "Picked up");
    }

    #[test]
    fn terminal_signal_from_substatus_survives_status_resolution() {
        let raw = json!({"data": {"content": [{
            "trackNo": "T1",
            "trackingStatus": "101",
            "transitStatus": "TRANSIT",
            "transitSubStatus": "RETURNED_TO_SENDER",
            "localLogisticsInfo": {"trackingDetails": [
                {"eventTime": "2026-02-01 09:00:00", "eventDetail": "Arrived at sorting hub"}
            ]}
        }]}});
        let s = normalize_snapshot(&raw, "T1", None);
        assert_eq!(s.status, "Arrived at sorting hub");
        assert!(s.terminal);
    }

    #[test]
    fn latest_checkpoint_substatus_is_a_signal() {
        let raw = json!({"trackNo": "T2", "events": [
            {"time": "2026-03-01 10:00", "description": "Handed over", "subStatus": "DELIVERY_SUCCESS"},
            {"time": "2026-02-28 10:00", "description": "On the way"}
        ]});
        let s = normalize_snapshot(&raw, "T2", None);
        assert_eq!(s.status, "Handed over");
        assert!(s.terminal);
    }

    #[test]
    fn duplicate_records_are_collapsed() {
        let rec = json!({"trackNo": "A", "status": "x"});
        let raw = json!({"data": [rec.clone(), rec]});
        let candidates = collect_candidate_records(&raw);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn normalization_is_pure() {
        let raw = json!({"data": {"list": [{"tracking_number": "Z", "status": "In Transit",
            "checkpoints": [{"time": "2026-01-01", "city": "Da Nang", "event": "Arrived"}]}]}});
        let a = normalize_snapshot(&raw, "Z", Some("C"));
        let b = normalize_snapshot(&raw, "Z", Some("C"));
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }
}

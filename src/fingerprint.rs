// src/fingerprint.rs
//! Change-detection fingerprint for snapshots.

use sha2::{Digest, Sha256};

use crate::snapshot::Snapshot;

/// Hex SHA-256 over the snapshot fields joined by `|`.
///
/// Field order is fixed; persisted hashes from earlier runs must keep matching.
pub fn snapshot_hash(snapshot: &Snapshot) -> String {
    let cp = snapshot.last_checkpoint.as_ref();
    let parts: [&str; 7] = [
        &snapshot.tracking_number,
        snapshot.carrier_code.as_deref().unwrap_or(""),
        &snapshot.status,
        cp.and_then(|c| c.time.as_deref()).unwrap_or(""),
        cp.and_then(|c| c.location.as_deref()).unwrap_or(""),
        cp.and_then(|c| c.description.as_deref()).unwrap_or(""),
        if snapshot.terminal { "1" } else { "0" },
    ];

    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Checkpoint;

    fn sample() -> Snapshot {
        Snapshot {
            tracking_number: "SPXVN064584367312".into(),
            carrier_code: Some("SPXVN".into()),
            status: "In transit".into(),
            terminal: false,
            last_checkpoint: Some(Checkpoint {
                time: Some("2026-01-01T10:00:00Z".into()),
                location: Some("Ho Chi Minh City".into()),
                description: Some("In transit".into()),
            }),
        }
    }

    #[test]
    fn deterministic_and_fixed_length() {
        let a = snapshot_hash(&sample());
        let b = snapshot_hash(&sample());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn every_field_moves_the_digest() {
        let base = snapshot_hash(&sample());

        let mut s = sample();
        s.carrier_code = None;
        assert_ne!(snapshot_hash(&s), base);

        let mut s = sample();
        s.status = "Delivered".into();
        assert_ne!(snapshot_hash(&s), base);

        let mut s = sample();
        s.terminal = true;
        assert_ne!(snapshot_hash(&s), base);

        let mut s = sample();
        s.last_checkpoint.as_mut().unwrap().location = Some("Hanoi".into());
        assert_ne!(snapshot_hash(&s), base);

        let mut s = sample();
        s.last_checkpoint = None;
        assert_ne!(snapshot_hash(&s), base);
    }

    #[test]
    fn matches_known_digest_of_joined_fields() {
        let s = Snapshot::unknown("A", None);
        let mut hasher = Sha256::new();
        hasher.update(b"A||unknown||||0");
        assert_eq!(snapshot_hash(&s), hex::encode(hasher.finalize()));
    }
}

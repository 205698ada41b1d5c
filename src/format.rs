// src/format.rs
//! Plain-text rendering of snapshots for user notifications.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;

use crate::snapshot::{Snapshot, Watch};

const TERMINAL_NOTICE: &str = "Terminal shipment state detected. This tracking will be auto-removed.";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Zone checkpoint times are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    Fixed(FixedOffset),
    /// IANA name such as `Asia/Ho_Chi_Minh`; DST-aware.
    Named(Tz),
}

impl DisplayZone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    fn render(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Fixed(offset) => at.with_timezone(offset).format(TIME_FORMAT).to_string(),
            Self::Named(tz) => at.with_timezone(tz).format(TIME_FORMAT).to_string(),
        }
    }
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self::utc()
    }
}

/// Display timezone: `UTC`, an IANA name (`Asia/Ho_Chi_Minh`), or a fixed
/// offset such as `+07:00` / `-0530` / `UTC+07:00`. Anything else falls back
/// to UTC with a warning.
pub fn parse_timezone(raw: &str) -> DisplayZone {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("utc") || s.eq_ignore_ascii_case("z") {
        return DisplayZone::utc();
    }
    if let Ok(tz) = s.parse::<Tz>() {
        return DisplayZone::Named(tz);
    }
    let offset = s
        .strip_prefix("UTC")
        .or_else(|| s.strip_prefix("GMT"))
        .unwrap_or(s);
    match parse_offset(offset) {
        Some(tz) => DisplayZone::Fixed(tz),
        None => {
            tracing::warn!(timezone = raw, "unsupported timezone, using UTC");
            DisplayZone::utc()
        }
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let rest = s.strip_prefix('+').or_else(|| s.strip_prefix('-'))?;
    let sign = if s.starts_with('-') { -1 } else { 1 };
    if !rest.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }
    let (h, m) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if !(0..=14).contains(&h) || !(0..60).contains(&m) {
        return None;
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

/// Multi-line summary of a snapshot.
pub fn format_snapshot(snapshot: &Snapshot, label: Option<&str>, tz: &DisplayZone) -> String {
    let mut lines = vec![format!("Tracking: {}", snapshot.tracking_number)];
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        lines.push(format!("Label: {label}"));
    }
    lines.push(format!(
        "Carrier: {}",
        snapshot
            .carrier_code
            .as_deref()
            .unwrap_or("auto-detect/unknown")
    ));
    lines.push(format!("Status: {}", humanize_status(&snapshot.status)));

    if let Some(cp) = &snapshot.last_checkpoint {
        lines.push("Last checkpoint:".to_string());
        lines.push(format!(
            "- Time: {}",
            format_checkpoint_time(cp.time.as_deref(), tz)
        ));
        if let Some(location) = cp.location.as_deref() {
            lines.push(format!("- Location: {location}"));
        }
        if let Some(details) = cp.description.as_deref().map(str::trim) {
            if !details.is_empty() && details != snapshot.status.trim() {
                lines.push(format!("- Details: {details}"));
            }
        }
    }

    if snapshot.terminal {
        lines.push(TERMINAL_NOTICE.to_string());
    }
    lines.join("\n")
}

/// Notification body for a changed watch.
pub fn format_update(watch: &Watch, snapshot: &Snapshot, tz: &DisplayZone) -> String {
    let label = watch.label.as_deref().filter(|l| !l.is_empty());
    let title = match label {
        Some(l) => format!("Update for {l} ({})", watch.tracking_number),
        None => format!("Update for {}", watch.tracking_number),
    };
    format!("{title}:\n\n{}", format_snapshot(snapshot, label, tz))
}

/// Readable text for the aggregator's transit words and 3-digit codes.
/// Free text passes through unchanged.
pub fn humanize_status(status: &str) -> String {
    let value = status.trim();
    if value.is_empty() {
        return "Unknown".to_string();
    }
    let upper = value.to_uppercase();

    let transit = match upper.as_str() {
        "INIT" => Some("Shipment information received"),
        "PICKUP" => Some("Picked up by carrier"),
        "TRANSIT" => Some("In transit"),
        "DELIVERING" => Some("Out for delivery"),
        "DELIVERED" => Some("Delivered"),
        "EXCEPTION" => Some("Delivery exception"),
        "RETURNED" => Some("Returned to sender"),
        _ => None,
    };
    if let Some(text) = transit {
        return text.to_string();
    }

    if upper.len() == 3 && upper.bytes().all(|b| b.is_ascii_digit()) {
        let exact = match upper.as_str() {
            "001" => Some("Shipment information received"),
            "101" => Some("In transit"),
            "201" => Some("Out for delivery"),
            "301" => Some("Delivered"),
            "401" => Some("Delivery exception"),
            "501" => Some("Returned to sender"),
            _ => None,
        };
        if let Some(text) = exact {
            return format!("{text} ({upper})");
        }
        let band = match upper.parse::<u16>().unwrap_or(0) {
            100..=199 => "In transit",
            200..=299 => "Out for delivery",
            300..=399 => "Delivered",
            400..=499 => "Delivery exception",
            500..=599 => "Returned/cancelled",
            _ => "Shipment status",
        };
        return format!("{band} ({upper})");
    }

    value.to_string()
}

fn format_checkpoint_time(time: Option<&str>, tz: &DisplayZone) -> String {
    let Some(time) = time else {
        return "n/a".to_string();
    };
    match parse_utc_like(time) {
        Some(at) => tz.render(at),
        None => time.to_string(),
    }
}

/// RFC 3339 (any offset) or a bare `YYYY-MM-DD HH:mm:ss` / `YYYY-MM-DDTHH:mm:ss`
/// taken as UTC.
fn parse_utc_like(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .map(|naive| naive.and_utc())
}

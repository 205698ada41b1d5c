// src/normalize/terminal.rs
//! Terminal-state heuristic over free-text/code status signals.
//!
//! The word and phrase lists are a compatibility contract: widening them changes
//! which watches get auto-removed.

use once_cell::sync::Lazy;
use regex::Regex;

const TERMINAL_WORDS: &[&str] = &["delivered", "completed", "done", "signed", "returned"];

// Vietnamese delivery / return phrasing seen in carrier free text.
const TERMINAL_PHRASES_VI: &[&str] = &[
    "đã giao hàng",
    "đã giao thành công",
    "giao hàng thành công",
    "giao thành công",
    "đã nhận hàng",
    "đã hoàn hàng",
    "hoàn hàng thành công",
    "đã trả hàng",
    "trả hàng thành công",
    "đã hoàn trả",
    "hoàn trả thành công",
    "đã chuyển hoàn",
];

const FINAL_EXCEPTION_PHRASES: &[&str] = &[
    "lost",
    "destroyed",
    "disposed",
    "undeliverable",
    "cancelled",
    "canceled",
    "returned to origin",
    "return to origin",
    "returned to shipper",
    "return to shipper",
    "thất lạc",
    "đã hủy",
    "hủy đơn",
];

const RETRY_HINTS: &[&str] = &[
    "reattempt",
    "re-attempt",
    "retry",
    "rescheduled",
    "reschedule",
    "next delivery attempt",
    "will attempt",
    "attempt again",
    "giao lại",
];

// Exactly-three-digit runs; the aggregator uses 3xx for delivered tiers.
static RE_STATUS_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{3})(?:\D|$)").expect("static regex"));

static RE_TERMINAL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:returning_to_sender|returned_to_sender|delivered|delivery_success)\b")
        .expect("static regex")
});

static RE_EXCEPTION_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:canceled|cancelled|undeliverable|lost|destroyed|disposed)\b")
        .expect("static regex")
});

/// True if ANY signal looks final. Empty signals never match.
pub fn is_terminal<S: AsRef<str>>(signals: &[S]) -> bool {
    signals.iter().any(|s| signal_is_terminal(s.as_ref()))
}

fn signal_is_terminal(signal: &str) -> bool {
    let signal = signal.trim();
    if signal.is_empty() {
        return false;
    }
    let lower = signal.to_lowercase();

    has_delivered_code(signal)
        || contains_any(&lower, TERMINAL_WORDS)
        || contains_any(&lower, TERMINAL_PHRASES_VI)
        || RE_TERMINAL_TOKEN.is_match(signal)
        || is_final_exception(signal, &lower)
}

fn has_delivered_code(signal: &str) -> bool {
    // Captures cannot overlap on the separator, so walk matches by hand.
    let mut start = 0;
    while let Some(caps) = RE_STATUS_CODE.captures_at(signal, start) {
        let Some(code) = caps.get(1) else { break };
        if let Ok(n) = code.as_str().parse::<u16>() {
            if (300..400).contains(&n) {
                return true;
            }
        }
        start = code.end();
    }
    false
}

fn is_final_exception(signal: &str, lower: &str) -> bool {
    if contains_any(lower, RETRY_HINTS) {
        return false;
    }
    contains_any(lower, FINAL_EXCEPTION_PHRASES) || RE_EXCEPTION_TOKEN.is_match(signal)
}

fn contains_any(haystack_lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack_lower.contains(n))
}

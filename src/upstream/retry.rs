// src/upstream/retry.rs
//! Retry policy for the tracking aggregator.
//!
//! The numbers are a fixed policy, not configuration: 4 attempts, `Retry-After`
//! honoured verbatim, otherwise `min(8, 2^(attempt-1))` seconds plus up to one
//! second of jitter.

use std::time::Duration;

use serde_json::Value;

pub const MAX_ATTEMPTS: u32 = 4;
const MAX_BACKOFF_SECS: f64 = 8.0;

/// The aggregator's `code` value for a successful call.
pub const SUCCESS_CODE: &str = "00000";

/// Application-level success check on a parsed body.
///
/// 1. a string `code` decides alone;
/// 2. else a `msg` field must read `success`;
/// 3. else a non-empty `message` means failure (only error bodies carry it);
/// 4. else success.
pub fn is_app_success(body: &Value) -> bool {
    let Some(obj) = body.as_object() else {
        return true;
    };
    if let Some(code) = obj.get("code").and_then(Value::as_str) {
        return code == SUCCESS_CODE;
    }
    if let Some(msg) = obj.get("msg") {
        return msg
            .as_str()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case("success"));
    }
    if let Some(message) = obj.get("message") {
        return !is_present(message);
    }
    true
}

fn is_present(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Upstream `code` / `message` for diagnostics, whatever their JSON type.
pub fn app_error_parts(body: &Value) -> (String, String) {
    let field = |k: &str| match body.get(k) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let message = [field("msg"), field("message")]
        .into_iter()
        .find(|m| !m.is_empty())
        .unwrap_or_default();
    (field("code"), message)
}

/// 429 and 5xx are worth another try.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Parse a `Retry-After` header given in seconds. HTTP-date forms are ignored.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Exponential part of the wait before attempt `attempt + 1` (1-based `attempt`).
pub fn backoff_base(attempt: u32) -> Duration {
    let exp = 2f64.powi(attempt.saturating_sub(1).min(16) as i32);
    Duration::from_secs_f64(exp.min(MAX_BACKOFF_SECS))
}

/// Wait before the next attempt: `Retry-After` wins, else backoff + jitter.
pub fn retry_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    match retry_after {
        Some(d) => d,
        None => backoff_base(attempt) + Duration::from_secs_f64(rand::random::<f64>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_code_decides_when_present() {
        assert!(is_app_success(&json!({"code": "00000", "msg": "whatever"})));
        assert!(!is_app_success(&json!({"code": "A0400", "msg": "success"})));
    }

    #[test]
    fn msg_then_message_fallbacks() {
        assert!(is_app_success(&json!({"msg": "  Success "})));
        assert!(!is_app_success(&json!({"msg": "param error"})));
        assert!(!is_app_success(&json!({"message": "invalid secret"})));
        assert!(is_app_success(&json!({"message": ""})));
        assert!(is_app_success(&json!({"data": []})));
        // numeric code is not the string code field
        assert!(!is_app_success(&json!({"code": 200, "message": "ok"})));
    }

    #[test]
    fn non_object_bodies_count_as_success() {
        assert!(is_app_success(&json!("plain text")));
        assert!(is_app_success(&json!([1, 2])));
    }

    #[test]
    fn error_parts_prefer_msg() {
        let (code, msg) = app_error_parts(&json!({"code": "A0001", "msg": "bad", "message": "x"}));
        assert_eq!((code.as_str(), msg.as_str()), ("A0001", "bad"));
        let (code, msg) = app_error_parts(&json!({"code": 500, "message": "oops"}));
        assert_eq!((code.as_str(), msg.as_str()), ("500", "oops"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn backoff_doubles_and_caps_at_eight() {
        let secs: Vec<u64> = (1..=6).map(|a| backoff_base(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn retry_after_is_honoured_exactly() {
        let d = parse_retry_after(" 3 ");
        assert_eq!(d, Some(Duration::from_secs(3)));
        assert_eq!(retry_delay(1, d), Duration::from_secs(3));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn oversized_retry_after_is_ignored() {
        assert_eq!(parse_retry_after("100000000000000000000"), None);
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn jitter_stays_under_one_second() {
        for attempt in 1..=3 {
            let d = retry_delay(attempt, None);
            assert!(d >= backoff_base(attempt));
            assert!(d < backoff_base(attempt) + Duration::from_secs(1));
        }
    }
}

// src/upstream/mod.rs
//! Client for the third-party tracking aggregator.
//!
//! Every logical call (import / query / delete) is one task on the client's
//! [`RateLimiter`]; retries run inside that task.

pub mod limiter;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use serde_json::{json, Map, Value};

use crate::config::AppConfig;
use crate::error::{Result, TrackError};
use crate::normalize::normalize_snapshot;
use crate::snapshot::Snapshot;

pub use limiter::RateLimiter;
use retry::{app_error_parts, is_app_success, is_retryable_status, parse_retry_after, retry_delay};

pub const DEFAULT_BASE_URL: &str = "https://api.track123.com/gateway/open-api";

const IMPORT_PATH: &str = "/tk/v2.1/track/import";
const QUERY_PATH: &str = "/tk/v2.1/track/query";
const DELETE_PATH: &str = "/tk/v2.1/track/delete";
const API_SECRET_HEADER: &str = "Track123-Api-Secret";
const CLIENT_USER_AGENT: &str = "parcel-tracker/0.1";

/// The three upstream operations the rest of the crate depends on.
#[async_trait]
pub trait TrackingApi: Send + Sync {
    /// Register a tracking number upstream so it starts being tracked.
    async fn import_tracking(&self, tracking_number: &str, carrier_code: Option<&str>)
        -> Result<()>;

    /// Fresh snapshot for one tracking number.
    async fn query_tracking(
        &self,
        tracking_number: &str,
        carrier_code: Option<&str>,
    ) -> Result<Snapshot>;

    /// Stop tracking upstream.
    async fn delete_tracking(&self, tracking_number: &str, carrier_code: &str) -> Result<()>;
}

/// Query with the carrier first; if that fails and a carrier was given,
/// retry once letting the aggregator auto-detect it.
pub async fn query_with_carrier_fallback<A>(
    api: &A,
    tracking_number: &str,
    carrier_code: Option<&str>,
) -> Result<Snapshot>
where
    A: TrackingApi + ?Sized,
{
    match api.query_tracking(tracking_number, carrier_code).await {
        Ok(snapshot) => Ok(snapshot),
        Err(e) => {
            let Some(carrier) = carrier_code else {
                return Err(e);
            };
            tracing::warn!(
                error = %e,
                tracking_number,
                carrier_code = carrier,
                "carrier query failed, retrying without carrier"
            );
            api.query_tracking(tracking_number, None).await
        }
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    transport: Arc<Transport>,
    limiter: RateLimiter,
}

struct Transport {
    http: reqwest::Client,
    base_url: String,
    api_secret: String,
}

/// One HTTP exchange, before any success/retry judgement.
struct RawResponse {
    status: u16,
    body: Value,
    body_text: String,
    retry_after: Option<Duration>,
}

impl UpstreamClient {
    pub fn new(
        base_url: &str,
        api_secret: &str,
        max_rps: f64,
        max_concurrency: usize,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            transport: Arc::new(Transport {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                api_secret: api_secret.to_string(),
            }),
            limiter: RateLimiter::new(max_rps, max_concurrency)?,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(
            &cfg.base_url,
            &cfg.api_secret,
            cfg.max_rps,
            cfg.max_concurrency,
        )
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Parsed query body without normalization.
    pub async fn query_raw(
        &self,
        tracking_number: &str,
        carrier_code: Option<&str>,
    ) -> Result<Value> {
        let payload = match carrier_code {
            Some(_) => json!({ "trackNoInfos": [track_item(tracking_number, carrier_code)] }),
            None => json!({ "trackNos": [tracking_number] }),
        };
        self.call(QUERY_PATH, payload).await
    }

    async fn call(&self, endpoint: &'static str, payload: Value) -> Result<Value> {
        let transport = Arc::clone(&self.transport);
        self.limiter
            .submit(move || async move { transport.post_with_retry(endpoint, &payload).await })
            .await
    }
}

#[async_trait]
impl TrackingApi for UpstreamClient {
    async fn import_tracking(
        &self,
        tracking_number: &str,
        carrier_code: Option<&str>,
    ) -> Result<()> {
        let payload = json!([track_item(tracking_number, carrier_code)]);
        self.call(IMPORT_PATH, payload).await.map(|_| ())
    }

    async fn query_tracking(
        &self,
        tracking_number: &str,
        carrier_code: Option<&str>,
    ) -> Result<Snapshot> {
        let raw = self.query_raw(tracking_number, carrier_code).await?;
        Ok(normalize_snapshot(&raw, tracking_number, carrier_code))
    }

    async fn delete_tracking(&self, tracking_number: &str, carrier_code: &str) -> Result<()> {
        let payload = json!([track_item(tracking_number, Some(carrier_code))]);
        self.call(DELETE_PATH, payload).await.map(|_| ())
    }
}

/// `{"trackNo": .., "courierCode": ..}`; the carrier key is omitted when unknown.
fn track_item(tracking_number: &str, carrier_code: Option<&str>) -> Value {
    let mut item = Map::new();
    item.insert("trackNo".into(), Value::from(tracking_number));
    if let Some(c) = carrier_code {
        item.insert("courierCode".into(), Value::from(c));
    }
    Value::Object(item)
}

impl Transport {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<RawResponse> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, endpoint))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(API_SECRET_HEADER, &self.api_secret)
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body_text = resp.text().await?;
        // Non-JSON bodies (gateway pages, plain errors) are kept as a string value.
        let body = serde_json::from_str(&body_text)
            .unwrap_or_else(|_| Value::String(body_text.clone()));

        Ok(RawResponse {
            status,
            body,
            body_text,
            retry_after,
        })
    }

    async fn post_with_retry(&self, endpoint: &'static str, body: &Value) -> Result<Value> {
        let mut attempt = 1;
        loop {
            counter!("upstream_requests_total", "endpoint" => endpoint).increment(1);
            let res = self.post(endpoint, body).await?;

            let http_ok = (200..300).contains(&res.status);
            if http_ok && is_app_success(&res.body) {
                return Ok(res.body);
            }

            // A 2xx here carries an application-level failure code.
            let retryable = http_ok || is_retryable_status(res.status);
            if !retryable || attempt >= retry::MAX_ATTEMPTS {
                counter!("upstream_failures_total", "endpoint" => endpoint).increment(1);
                return Err(res.into_error(http_ok));
            }

            let delay = retry_delay(attempt, res.retry_after);
            counter!("upstream_retries_total", "endpoint" => endpoint).increment(1);
            tracing::warn!(
                endpoint,
                status = res.status,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "upstream call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl RawResponse {
    fn into_error(self, http_ok: bool) -> TrackError {
        if http_ok {
            let (code, message) = app_error_parts(&self.body);
            TrackError::UpstreamRejected {
                status: self.status,
                code,
                message,
                body: self.body_text,
            }
        } else {
            TrackError::Transport {
                status: self.status,
                body: self.body_text,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_item_omits_missing_carrier() {
        assert_eq!(track_item("A1", None), json!({"trackNo": "A1"}));
        assert_eq!(
            track_item("A1", Some("SPXVN")),
            json!({"trackNo": "A1", "courierCode": "SPXVN"})
        );
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let c = UpstreamClient::new("https://example.test/api/", "s", 2.0, 2).unwrap();
        assert_eq!(c.transport.base_url, "https://example.test/api");
    }

    struct FlakyCarrierApi;

    #[async_trait]
    impl TrackingApi for FlakyCarrierApi {
        async fn import_tracking(&self, _: &str, _: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn query_tracking(&self, tn: &str, carrier: Option<&str>) -> Result<Snapshot> {
            match carrier {
                Some(_) => Err(TrackError::Transport {
                    status: 400,
                    body: "bad carrier".into(),
                }),
                None => Ok(Snapshot::unknown(tn, Some("AUTO".into()))),
            }
        }
        async fn delete_tracking(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn carrier_fallback_retries_without_carrier() {
        let s = query_with_carrier_fallback(&FlakyCarrierApi, "T", Some("WRONG"))
            .await
            .unwrap();
        assert_eq!(s.carrier_code.as_deref(), Some("AUTO"));
    }

    #[tokio::test]
    async fn no_fallback_without_carrier() {
        struct Down;
        #[async_trait]
        impl TrackingApi for Down {
            async fn import_tracking(&self, _: &str, _: Option<&str>) -> Result<()> {
                Ok(())
            }
            async fn query_tracking(&self, _: &str, _: Option<&str>) -> Result<Snapshot> {
                Err(TrackError::Transport {
                    status: 503,
                    body: String::new(),
                })
            }
            async fn delete_tracking(&self, _: &str, _: &str) -> Result<()> {
                Ok(())
            }
        }
        let err = query_with_carrier_fallback(&Down, "T", None).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
}

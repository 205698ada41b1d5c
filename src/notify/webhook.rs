// src/notify/webhook.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::Notifier;
use crate::error::{Result, TrackError};

/// POSTs `{"user_id": .., "text": ..}` to a fixed URL, with a short retry loop.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    user_id: i64,
    text: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, user_id: i64, text: &str) -> Result<()> {
        let payload = WebhookPayload { user_id, text };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) => format!("webhook HTTP error: {e}"),
                },
                Err(e) => format!("webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(TrackError::notify(err));
            }
            tokio::time::sleep(backoff(attempt)).await;
        }
    }
}

/// Wait after failed attempt `attempt` (1-based): 500ms doubling, capped at 32s.
fn backoff(attempt: u8) -> Duration {
    let shift = attempt.saturating_sub(1).min(6);
    Duration::from_millis(500u64 << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_secs(1));
        assert_eq!(backoff(7), Duration::from_secs(32));
        assert_eq!(backoff(65), Duration::from_secs(32));
        assert_eq!(backoff(u8::MAX), Duration::from_secs(32));
    }
}

// src/notify/mod.rs
//! Outbound user notifications.

pub mod webhook;

use async_trait::async_trait;

use crate::error::Result;

pub use webhook::WebhookNotifier;

/// Delivers a plain-text message to one user. Callers log failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user_id: i64, text: &str) -> Result<()>;
}

/// Writes notifications to the log. Used when no transport is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, user_id: i64, text: &str) -> Result<()> {
        tracing::info!(user_id, "notification:\n{text}");
        Ok(())
    }
}

//! NATS subscription for incoming scoring requests

use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use tracing::info;

/// Queue-group subscriber for scoring requests
///
/// Every scoring process joins the same queue group, so each request is
/// delivered to exactly one of them.
pub struct ScoreRequestConsumer {
    client: Client,
    subject: String,
    queue_group: String,
}

impl ScoreRequestConsumer {
    /// Create a new request consumer
    pub fn new(client: Client, subject: &str, queue_group: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            queue_group: queue_group.to_string(),
        }
    }

    /// Join the queue group on the scoring subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", self.subject))?;
        info!(
            subject = %self.subject,
            queue_group = %self.queue_group,
            "Subscribed to scoring subject"
        );
        Ok(subscriber)
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }
}

//! NATS reply publisher for scoring results

use crate::types::verdict::ScoreReply;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Sends scoring replies back to the requester's inbox
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    /// Create a new reply publisher
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Serialize a reply body
    pub fn encode(reply: &ScoreReply) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(reply)?)
    }

    /// Publish a reply to the request's reply subject
    pub async fn publish(&self, reply_to: Subject, reply: &ScoreReply) -> Result<()> {
        let payload = Self::encode(reply)?;

        self.client
            .publish(reply_to.clone(), payload.into())
            .await?;

        debug!(
            reply_to = %reply_to,
            is_error = reply.is_error(),
            "Published scoring reply"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::verdict::{ErrorResponse, ScoreResponse};

    #[test]
    fn test_encode_success_reply() {
        let reply = ScoreReply::Scored(ScoreResponse::new(0.5, 0.5));
        let body = ReplyPublisher::encode(&reply).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"fraud_probability":0.5,"is_fraudulent":true}"#
        );
    }

    #[test]
    fn test_encode_error_reply() {
        let reply = ScoreReply::Failed(ErrorResponse {
            error: "unknown type".to_string(),
            kind: ErrorKind::UnknownCategory,
        });
        let body = ReplyPublisher::encode(&reply).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"error":"unknown type","kind":"unknown_category"}"#
        );
    }
}

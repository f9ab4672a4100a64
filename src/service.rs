//! Request handling: raw payload in, structured reply out

use crate::error::Result;
use crate::models::cache::BundleCache;
use crate::models::inference::{ScoreResult, ScoringEngine};
use crate::models::store::ArtifactStore;
use crate::types::transaction::TransactionRecord;
use crate::types::verdict::{ScoreReply, DEFAULT_THRESHOLD};
use tracing::{debug, warn};

/// Scores request payloads against the lazily loaded bundle.
///
/// Shared by every worker task; a bundle that failed to load is retried on
/// the next request.
pub struct ScoringService {
    cache: BundleCache,
    threshold: f64,
}

impl ScoringService {
    pub fn new(cache: BundleCache, threshold: f64) -> Self {
        Self { cache, threshold }
    }

    /// Service over the bundle currently published in `store`.
    pub fn from_store(store: ArtifactStore) -> Self {
        Self::new(BundleCache::new(store), DEFAULT_THRESHOLD)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    /// Engine over the cached bundle, loading it on first use.
    pub fn engine(&self) -> Result<ScoringEngine> {
        let bundle = self.cache.get_or_load()?;
        Ok(ScoringEngine::with_threshold(bundle, self.threshold))
    }

    /// Score an already decoded record.
    pub fn score(&self, record: &TransactionRecord) -> Result<ScoreResult> {
        self.engine()?.score(record)
    }

    /// Decode, validate and score one JSON request body.
    pub fn handle(&self, payload: &[u8]) -> ScoreReply {
        let result = TransactionRecord::from_slice(payload)
            .and_then(|record| self.score(&record))
            .map(|scored| scored.to_response());

        match &result {
            Ok(response) => debug!(
                fraud_probability = response.fraud_probability,
                is_fraudulent = response.is_fraudulent,
                "Request scored"
            ),
            Err(e) => warn!(kind = %e.kind(), error = %e, "Request rejected"),
        }
        ScoreReply::from(result)
    }
}

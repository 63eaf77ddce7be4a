use std::sync::Arc;

use chrono::{DateTime, Utc};
use insight_core::{
    indicator_fingerprint, ClaimTicket, CommitOutcome, DailyWindow, DataSource,
    GenerationRecord, InsightError, InsightKey, InsightResult, InsightStatus, InsightStore,
};
use llm_client::LlmBackend;
use serde::Serialize;

use crate::claim::{ClaimArbiter, ClaimOutcome};
use crate::generator::InsightGenerator;
use crate::persister::ResultPersister;

/// Bumped whenever the indicator prompt or schema changes
pub const INDICATOR_PROMPT_VERSION: &str = "v2";

/// What the client sees. A record serializes flat with its `status`; the
/// bare pending marker is used when the window holds no record for the
/// requested data version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InsightResponse {
    Record(GenerationRecord),
    Pending { status: InsightStatus },
}

impl InsightResponse {
    pub fn pending() -> Self {
        InsightResponse::Pending {
            status: InsightStatus::Pending,
        }
    }

    pub fn status(&self) -> InsightStatus {
        match self {
            InsightResponse::Record(record) => record.status,
            InsightResponse::Pending { status } => *status,
        }
    }
}

/// Request handler for single-indicator narratives.
///
/// ```text
/// CHECK_FRESHNESS -> CACHE_HIT | CLAIMING
/// CLAIMING        -> CLAIMED | BLOCKED
/// CLAIMED         -> GENERATING -> PERSISTING -> RETURN
/// ```
#[derive(Clone)]
pub struct IndicatorInsightHandler {
    source: Arc<dyn DataSource>,
    store: Arc<dyn InsightStore>,
    arbiter: ClaimArbiter,
    generator: InsightGenerator,
    persister: ResultPersister,
    window: DailyWindow,
    prompt_version: String,
}

impl IndicatorInsightHandler {
    pub fn new(
        source: Arc<dyn DataSource>,
        store: Arc<dyn InsightStore>,
        backend: Arc<dyn LlmBackend>,
        window: DailyWindow,
    ) -> Self {
        Self {
            source,
            arbiter: ClaimArbiter::new(store.clone()),
            persister: ResultPersister::new(store.clone()),
            store,
            generator: InsightGenerator::new(backend),
            window,
            prompt_version: INDICATOR_PROMPT_VERSION.to_string(),
        }
    }

    pub fn with_prompt_version(mut self, prompt_version: impl Into<String>) -> Self {
        self.prompt_version = prompt_version.into();
        self
    }

    pub async fn handle(&self, code: &str) -> InsightResult<InsightResponse> {
        self.handle_at(code, Utc::now()).await
    }

    #[tracing::instrument(skip(self, now), fields(window = tracing::field::Empty))]
    pub async fn handle_at(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> InsightResult<InsightResponse> {
        let feature = self
            .source
            .indicator_feature(code)
            .await?
            .ok_or_else(|| InsightError::NotFound(format!("Indicator not found: {code}")))?;

        let key = InsightKey {
            entity_key: code.to_string(),
            data_fingerprint: indicator_fingerprint(&feature),
            model_id: self.generator.model_id().to_string(),
            prompt_version: self.prompt_version.clone(),
        };

        if let Some(hit) = self.store.lookup(&key).await? {
            tracing::info!(fingerprint = %key.data_fingerprint, "Insight cache hit");
            return Ok(InsightResponse::Record(hit));
        }

        let window_key = self.window.key_at(now);
        tracing::Span::current().record("window", window_key.as_str());

        let ticket = ClaimTicket {
            key,
            window_key,
            data_latest_date: feature.latest_date.clone(),
        };

        let claimed = match self.arbiter.try_claim(&ticket).await? {
            ClaimOutcome::Claimed(record) => record,
            ClaimOutcome::Blocked(existing) => {
                tracing::debug!("Window already claimed");
                // Never answer with a record generated from other data
                return Ok(match existing {
                    Some(record) if record.matches_version(&ticket.key) => {
                        InsightResponse::Record(record)
                    }
                    _ => InsightResponse::pending(),
                });
            }
        };

        // From here on this caller owns the window and must leave it terminal.
        let generated = match self
            .source
            .indicator_history(code, feature.history_window())
            .await
        {
            Ok(history) => {
                self.generator
                    .generate(&feature, &history, &ticket.window_key)
                    .await
            }
            Err(e) => Err(e),
        };

        let outcome = match generated {
            Ok(insight) => CommitOutcome::Done(insight),
            Err(e) => {
                tracing::warn!(error = %e, "Insight generation failed");
                CommitOutcome::Error(e.to_string())
            }
        };

        let record = self
            .persister
            .commit(&ticket, claimed.attempt, outcome)
            .await?;
        Ok(InsightResponse::Record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_marker_serializes_as_status_only() {
        let value = serde_json::to_value(InsightResponse::pending()).unwrap();
        assert_eq!(value, serde_json::json!({"status": "pending"}));
    }
}

use std::sync::Arc;

use insight_core::{
    ClaimTicket, CommitOutcome, GenerationRecord, InsightCommit, InsightResult, InsightStore,
};

/// Writes the terminal state of a claimed attempt.
#[derive(Clone)]
pub struct ResultPersister {
    store: Arc<dyn InsightStore>,
}

impl ResultPersister {
    pub fn new(store: Arc<dyn InsightStore>) -> Self {
        Self { store }
    }

    pub async fn commit(
        &self,
        ticket: &ClaimTicket,
        attempt: i64,
        outcome: CommitOutcome,
    ) -> InsightResult<GenerationRecord> {
        let commit = InsightCommit {
            ticket: ticket.clone(),
            attempt,
            outcome,
        };

        let record = self.store.commit(&commit).await?;
        tracing::info!(
            code = %record.entity_key,
            window = %record.window_key,
            attempt = record.attempt,
            status = %record.status,
            "Committed insight"
        );
        Ok(record)
    }
}

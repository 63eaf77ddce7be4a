use std::sync::Arc;

use insight_core::{ClaimTicket, GenerationRecord, InsightResult, InsightStore};

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This caller owns generation for the window. Carries the pending record.
    Claimed(GenerationRecord),
    /// Someone else holds or already finished the window. The record is
    /// `None` only if it vanished between the failed claim and the re-read,
    /// and may belong to another data version.
    Blocked(Option<GenerationRecord>),
}

/// Single-writer lock on top of the store's conditional insert.
///
/// There is no in-process coordination: every decision is made by one atomic
/// store statement, so separate server processes arbitrate correctly too.
#[derive(Clone)]
pub struct ClaimArbiter {
    store: Arc<dyn InsightStore>,
}

impl ClaimArbiter {
    pub fn new(store: Arc<dyn InsightStore>) -> Self {
        Self { store }
    }

    pub async fn try_claim(&self, ticket: &ClaimTicket) -> InsightResult<ClaimOutcome> {
        if let Some(record) = self.store.try_insert_pending(ticket).await? {
            tracing::debug!(
                code = %ticket.key.entity_key,
                window = %ticket.window_key,
                "Claimed fresh window"
            );
            return Ok(ClaimOutcome::Claimed(record));
        }

        if let Some(record) = self.supersede(ticket).await? {
            return Ok(ClaimOutcome::Claimed(record));
        }

        let existing = self
            .store
            .fetch_window(&ticket.key.entity_key, &ticket.window_key)
            .await?;

        // The holder may have finished an older version after the supersede
        // was refused. One more attempt re-arms that terminal record.
        let finished_elsewhere = existing
            .as_ref()
            .is_some_and(|r| r.status.is_terminal() && !r.matches_version(&ticket.key));
        if finished_elsewhere {
            if let Some(record) = self.supersede(ticket).await? {
                return Ok(ClaimOutcome::Claimed(record));
            }
        }
        Ok(ClaimOutcome::Blocked(existing))
    }

    async fn supersede(&self, ticket: &ClaimTicket) -> InsightResult<Option<GenerationRecord>> {
        let rearmed = self.store.try_supersede(ticket).await?;
        if let Some(record) = &rearmed {
            tracing::info!(
                code = %ticket.key.entity_key,
                window = %ticket.window_key,
                attempt = record.attempt,
                "Re-armed window for new data version"
            );
        }
        Ok(rearmed)
    }
}

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use insight_core::{
    AdvisoryCacheRecord, AdvisoryKey, AdvisoryStore, ClaimTicket, GenerationRecord,
    InsightCommit, InsightError, InsightKey, InsightResult, InsightStatus, InsightStore,
};

use crate::{now_stamp, TerminalColumns};

/// Process-local store. Each operation runs under the owning shard's lock, so
/// the claim semantics match the SQL store.
#[derive(Default)]
pub struct MemoryInsightStore {
    insights: DashMap<(String, String), GenerationRecord>,
    /// Terminal attempts by (code, window, attempt); never rewritten
    log: DashMap<(String, String, i64), GenerationRecord>,
    advice: DashMap<AdvisoryKey, AdvisoryCacheRecord>,
}

impl MemoryInsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every window record, for inspection in tests
    pub fn records(&self) -> Vec<GenerationRecord> {
        self.insights.iter().map(|r| r.value().clone()).collect()
    }

    /// Snapshot of every logged terminal attempt
    pub fn history(&self) -> Vec<GenerationRecord> {
        self.log.iter().map(|r| r.value().clone()).collect()
    }
}

fn pending_record(ticket: &ClaimTicket, attempt: i64) -> GenerationRecord {
    let now = now_stamp();
    GenerationRecord {
        entity_key: ticket.key.entity_key.clone(),
        window_key: ticket.window_key.clone(),
        data_fingerprint: ticket.key.data_fingerprint.clone(),
        data_latest_date: ticket.data_latest_date.clone(),
        status: InsightStatus::Pending,
        model_id: ticket.key.model_id.clone(),
        prompt_version: ticket.key.prompt_version.clone(),
        attempt,
        result: None,
        headline: None,
        signal_label: None,
        confidence: None,
        confidence_reason: None,
        error_message: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[async_trait]
impl InsightStore for MemoryInsightStore {
    async fn lookup(&self, key: &InsightKey) -> InsightResult<Option<GenerationRecord>> {
        Ok(self
            .log
            .iter()
            .filter(|r| r.value().is_hit_for(key))
            .max_by(|a, b| a.value().updated_at.cmp(&b.value().updated_at))
            .map(|r| r.value().clone()))
    }

    async fn try_insert_pending(
        &self,
        ticket: &ClaimTicket,
    ) -> InsightResult<Option<GenerationRecord>> {
        let id = (ticket.key.entity_key.clone(), ticket.window_key.clone());
        match self.insights.entry(id) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let record = pending_record(ticket, 1);
                slot.insert(record.clone());
                Ok(Some(record))
            }
        }
    }

    async fn try_supersede(
        &self,
        ticket: &ClaimTicket,
    ) -> InsightResult<Option<GenerationRecord>> {
        let id = (ticket.key.entity_key.clone(), ticket.window_key.clone());
        let Some(mut existing) = self.insights.get_mut(&id) else {
            return Ok(None);
        };

        let same_version = existing.data_fingerprint == ticket.key.data_fingerprint
            && existing.model_id == ticket.key.model_id
            && existing.prompt_version == ticket.key.prompt_version;
        if existing.status == InsightStatus::Pending || same_version {
            return Ok(None);
        }

        let record = pending_record(ticket, existing.attempt + 1);
        *existing = record.clone();
        Ok(Some(record))
    }

    async fn fetch_window(
        &self,
        entity_key: &str,
        window_key: &str,
    ) -> InsightResult<Option<GenerationRecord>> {
        Ok(self
            .insights
            .get(&(entity_key.to_string(), window_key.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn commit(&self, commit: &InsightCommit) -> InsightResult<GenerationRecord> {
        let cols = TerminalColumns::from_outcome(&commit.outcome)?;
        let ticket = &commit.ticket;
        let id = (ticket.key.entity_key.clone(), ticket.window_key.clone());

        let record = {
            let mut slot = self
                .insights
                .get_mut(&id)
                .filter(|r| r.attempt == commit.attempt)
                .ok_or_else(|| {
                    InsightError::Consistency(format!(
                        "no claimed record for {} in window {} at attempt {}",
                        ticket.key.entity_key, ticket.window_key, commit.attempt
                    ))
                })?;

            slot.status = cols.status;
            slot.result = cols.result;
            slot.headline = cols.headline;
            slot.signal_label = cols.signal_label;
            slot.confidence = cols.confidence;
            slot.confidence_reason = cols.confidence_reason;
            slot.error_message = cols.error_message;
            slot.data_fingerprint = ticket.key.data_fingerprint.clone();
            slot.model_id = ticket.key.model_id.clone();
            slot.prompt_version = ticket.key.prompt_version.clone();
            slot.data_latest_date = ticket.data_latest_date.clone();
            slot.updated_at = now_stamp();
            slot.clone()
        };

        // A repeated commit keeps the first logged copy of the attempt
        self.log
            .entry((id.0, id.1, commit.attempt))
            .or_insert_with(|| record.clone());
        Ok(record)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl AdvisoryStore for MemoryInsightStore {
    async fn get_advice(&self, key: &AdvisoryKey) -> InsightResult<Option<AdvisoryCacheRecord>> {
        Ok(self.advice.get(key).map(|r| r.value().clone()))
    }

    async fn insert_advice(&self, record: &AdvisoryCacheRecord) -> InsightResult<bool> {
        match self.advice.entry(record.key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }
}

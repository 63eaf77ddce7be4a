use async_trait::async_trait;

use crate::{
    AdvisoryCacheRecord, AdvisoryKey, ClaimTicket, GenerationRecord, HistoryPoint,
    IndicatorFeature, InsightCommit, InsightKey, InsightResult, RegimeSnapshot, ValuedPosition,
};

/// Read-only view of the dashboard's relational data.
///
/// Implemented by the REST client in production and by fakes in tests.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Current feature row for one indicator, `None` when the code is unknown
    async fn indicator_feature(&self, code: &str) -> InsightResult<Option<IndicatorFeature>>;

    /// The `limit` most recent observations, oldest first
    async fn indicator_history(&self, code: &str, limit: usize)
        -> InsightResult<Vec<HistoryPoint>>;

    /// Feature rows for a set of codes. Unknown codes are simply absent.
    async fn indicator_features(&self, codes: &[String]) -> InsightResult<Vec<IndicatorFeature>>;

    async fn latest_regime(&self) -> InsightResult<Option<RegimeSnapshot>>;

    async fn valued_positions(&self) -> InsightResult<Vec<ValuedPosition>>;
}

/// Generation records with insert-as-lock semantics.
///
/// At most one window record exists per `(entity_key, window_key)`; it is the
/// lock and follows the latest attempt. Each terminal attempt is also appended
/// to a log that is never rewritten. Every mutating operation is atomic; none
/// of them may be emulated with a read followed by a write.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Most recent logged `done` record matching every field of `key`
    async fn lookup(&self, key: &InsightKey) -> InsightResult<Option<GenerationRecord>>;

    /// Insert a `pending` record for the ticket's window. `None` when a record
    /// for that window already exists.
    async fn try_insert_pending(&self, ticket: &ClaimTicket)
        -> InsightResult<Option<GenerationRecord>>;

    /// Re-arm the window's record as `pending` for the ticket's version when
    /// the existing record is terminal and was produced for a different
    /// fingerprint, model or prompt version. Bumps `attempt`. `None` when
    /// nothing qualified.
    async fn try_supersede(&self, ticket: &ClaimTicket)
        -> InsightResult<Option<GenerationRecord>>;

    async fn fetch_window(
        &self,
        entity_key: &str,
        window_key: &str,
    ) -> InsightResult<Option<GenerationRecord>>;

    /// Write the terminal state for a claimed attempt and log it. Fails with
    /// `InsightError::Consistency` when the claimed record is gone.
    async fn commit(&self, commit: &InsightCommit) -> InsightResult<GenerationRecord>;

    /// Connectivity probe
    async fn ping(&self) -> InsightResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}

/// Cache of portfolio advisory responses. No claim step.
#[async_trait]
pub trait AdvisoryStore: Send + Sync {
    async fn get_advice(&self, key: &AdvisoryKey) -> InsightResult<Option<AdvisoryCacheRecord>>;

    /// Insert unless the key already exists. Returns whether a row was written.
    async fn insert_advice(&self, record: &AdvisoryCacheRecord) -> InsightResult<bool>;
}

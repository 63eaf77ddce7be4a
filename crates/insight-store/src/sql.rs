use async_trait::async_trait;
use insight_core::{
    AdvisoryCacheRecord, AdvisoryKey, AdvisoryStore, ClaimTicket, GenerationRecord,
    InsightCommit, InsightError, InsightKey, InsightResult, InsightStore,
};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::{now_stamp, TerminalColumns};

const INSIGHT_COLUMNS: &str = "code, asof_date, data_fingerprint, data_latest_date, status, \
     model, prompt_version, attempt, insight_json, headline, signal_label, confidence, \
     confidence_reason, error_message, created_at, updated_at";

fn store_err(e: sqlx::Error) -> InsightError {
    InsightError::Store(e.to_string())
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct InsightRow {
    code: String,
    asof_date: String,
    data_fingerprint: String,
    data_latest_date: Option<String>,
    status: String,
    model: String,
    prompt_version: String,
    attempt: i64,
    insight_json: Option<String>,
    headline: Option<String>,
    signal_label: Option<String>,
    confidence: Option<f64>,
    confidence_reason: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl InsightRow {
    fn into_record(self) -> InsightResult<GenerationRecord> {
        let result: Option<serde_json::Value> = self
            .insight_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(GenerationRecord {
            entity_key: self.code,
            window_key: self.asof_date,
            data_fingerprint: self.data_fingerprint,
            data_latest_date: self.data_latest_date,
            status: self.status.parse()?,
            model_id: self.model,
            prompt_version: self.prompt_version,
            attempt: self.attempt,
            result,
            headline: self.headline,
            signal_label: self.signal_label,
            confidence: self.confidence,
            confidence_reason: self.confidence_reason,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AdviceRow {
    regime_asof_date: String,
    payload_hash: String,
    model: String,
    prompt_version: String,
    payload: String,
    response: String,
    created_at: String,
}

impl AdviceRow {
    fn into_record(self) -> InsightResult<AdvisoryCacheRecord> {
        Ok(AdvisoryCacheRecord {
            key: AdvisoryKey {
                regime_asof_date: self.regime_asof_date,
                payload_hash: self.payload_hash,
                model_id: self.model,
                prompt_version: self.prompt_version,
            },
            payload: serde_json::from_str(&self.payload)?,
            response: serde_json::from_str(&self.response)?,
            created_at: self.created_at,
        })
    }
}

/// Store over a sqlx `Any` pool
#[derive(Clone)]
pub struct SqlInsightStore {
    pool: AnyPool,
}

impl SqlInsightStore {
    /// Connect and apply the schema.
    ///
    /// In-memory SQLite databases are private to one connection, so the pool
    /// is pinned to a single connection for them.
    pub async fn connect(database_url: &str) -> InsightResult<Self> {
        sqlx::any::install_default_drivers();

        let in_memory = database_url.contains(":memory:");
        let file_without_options =
            database_url.starts_with("sqlite:") && !in_memory && !database_url.contains('?');
        let url = if file_without_options {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        let pool = AnyPoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect(&url)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!("Insight store ready ({})", url.split(':').next().unwrap_or("unknown"));
        Ok(store)
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> InsightResult<()> {
        let schema = include_str!("../schema.sql");

        // sqlx runs one statement per query
        for statement in schema.split(';') {
            let stmt: String = statement
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(store_err)?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl InsightStore for SqlInsightStore {
    async fn lookup(&self, key: &InsightKey) -> InsightResult<Option<GenerationRecord>> {
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM indicator_insights_log \
             WHERE code = $1 AND data_fingerprint = $2 AND model = $3 AND prompt_version = $4 \
               AND status = 'done' \
             ORDER BY updated_at DESC LIMIT 1"
        );
        let row: Option<InsightRow> = sqlx::query_as(&sql)
            .bind(&key.entity_key)
            .bind(&key.data_fingerprint)
            .bind(&key.model_id)
            .bind(&key.prompt_version)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(InsightRow::into_record).transpose()
    }

    async fn try_insert_pending(
        &self,
        ticket: &ClaimTicket,
    ) -> InsightResult<Option<GenerationRecord>> {
        let sql = format!(
            "INSERT INTO indicator_insights_daily \
               (code, asof_date, data_fingerprint, data_latest_date, status, model, prompt_version, \
                attempt, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 'pending', $5, $6, 1, $7, $7) \
             ON CONFLICT (code, asof_date) DO NOTHING \
             RETURNING {INSIGHT_COLUMNS}"
        );
        let row: Option<InsightRow> = sqlx::query_as(&sql)
            .bind(&ticket.key.entity_key)
            .bind(&ticket.window_key)
            .bind(&ticket.key.data_fingerprint)
            .bind(ticket.data_latest_date.clone())
            .bind(&ticket.key.model_id)
            .bind(&ticket.key.prompt_version)
            .bind(now_stamp())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(InsightRow::into_record).transpose()
    }

    async fn try_supersede(
        &self,
        ticket: &ClaimTicket,
    ) -> InsightResult<Option<GenerationRecord>> {
        let sql = format!(
            "UPDATE indicator_insights_daily SET \
               status = 'pending', data_fingerprint = $3, data_latest_date = $4, \
               model = $5, prompt_version = $6, attempt = attempt + 1, \
               insight_json = NULL, headline = NULL, signal_label = NULL, confidence = NULL, \
               confidence_reason = NULL, error_message = NULL, \
               created_at = $7, updated_at = $7 \
             WHERE code = $1 AND asof_date = $2 AND status <> 'pending' \
               AND (data_fingerprint <> $3 OR model <> $5 OR prompt_version <> $6) \
             RETURNING {INSIGHT_COLUMNS}"
        );
        let row: Option<InsightRow> = sqlx::query_as(&sql)
            .bind(&ticket.key.entity_key)
            .bind(&ticket.window_key)
            .bind(&ticket.key.data_fingerprint)
            .bind(ticket.data_latest_date.clone())
            .bind(&ticket.key.model_id)
            .bind(&ticket.key.prompt_version)
            .bind(now_stamp())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(InsightRow::into_record).transpose()
    }

    async fn fetch_window(
        &self,
        entity_key: &str,
        window_key: &str,
    ) -> InsightResult<Option<GenerationRecord>> {
        let sql = format!(
            "SELECT {INSIGHT_COLUMNS} FROM indicator_insights_daily \
             WHERE code = $1 AND asof_date = $2"
        );
        let row: Option<InsightRow> = sqlx::query_as(&sql)
            .bind(entity_key)
            .bind(window_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(InsightRow::into_record).transpose()
    }

    async fn commit(&self, commit: &InsightCommit) -> InsightResult<GenerationRecord> {
        let cols = TerminalColumns::from_outcome(&commit.outcome)?;
        let result_text = cols.result.as_ref().map(|v| v.to_string());
        let ticket = &commit.ticket;

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let sql = format!(
            "UPDATE indicator_insights_daily SET \
               status = $4, insight_json = $5, headline = $6, signal_label = $7, \
               confidence = $8, confidence_reason = $9, error_message = $10, \
               data_fingerprint = $11, model = $12, prompt_version = $13, \
               data_latest_date = $14, updated_at = $15 \
             WHERE code = $1 AND asof_date = $2 AND attempt = $3 \
             RETURNING {INSIGHT_COLUMNS}"
        );
        let row: Option<InsightRow> = sqlx::query_as(&sql)
            .bind(&ticket.key.entity_key)
            .bind(&ticket.window_key)
            .bind(commit.attempt)
            .bind(cols.status.as_str())
            .bind(result_text)
            .bind(cols.headline)
            .bind(cols.signal_label)
            .bind(cols.confidence)
            .bind(cols.confidence_reason)
            .bind(cols.error_message)
            .bind(&ticket.key.data_fingerprint)
            .bind(&ticket.key.model_id)
            .bind(&ticket.key.prompt_version)
            .bind(ticket.data_latest_date.clone())
            .bind(now_stamp())
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;

        let Some(row) = row else {
            return Err(InsightError::Consistency(format!(
                "no claimed record for {} in window {} at attempt {}",
                ticket.key.entity_key, ticket.window_key, commit.attempt
            )));
        };

        // A repeated commit keeps the first logged copy of the attempt
        let log_sql = format!(
            "INSERT INTO indicator_insights_log ({INSIGHT_COLUMNS}) \
             SELECT {INSIGHT_COLUMNS} FROM indicator_insights_daily \
             WHERE code = $1 AND asof_date = $2 AND attempt = $3 \
             ON CONFLICT (code, asof_date, attempt) DO NOTHING"
        );
        sqlx::query(&log_sql)
            .bind(&ticket.key.entity_key)
            .bind(&ticket.window_key)
            .bind(commit.attempt)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        row.into_record()
    }

    async fn ping(&self) -> InsightResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sql"
    }
}

#[async_trait]
impl AdvisoryStore for SqlInsightStore {
    async fn get_advice(&self, key: &AdvisoryKey) -> InsightResult<Option<AdvisoryCacheRecord>> {
        let row: Option<AdviceRow> = sqlx::query_as(
            "SELECT regime_asof_date, payload_hash, model, prompt_version, payload, response, created_at \
             FROM llm_portfolio_advice \
             WHERE regime_asof_date = $1 AND payload_hash = $2 AND model = $3 AND prompt_version = $4 \
             LIMIT 1",
        )
        .bind(&key.regime_asof_date)
        .bind(&key.payload_hash)
        .bind(&key.model_id)
        .bind(&key.prompt_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(AdviceRow::into_record).transpose()
    }

    async fn insert_advice(&self, record: &AdvisoryCacheRecord) -> InsightResult<bool> {
        let result = sqlx::query(
            "INSERT INTO llm_portfolio_advice \
               (regime_asof_date, payload_hash, model, prompt_version, payload, response, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (regime_asof_date, payload_hash, model, prompt_version) DO NOTHING",
        )
        .bind(&record.key.regime_asof_date)
        .bind(&record.key.payload_hash)
        .bind(&record.key.model_id)
        .bind(&record.key.prompt_version)
        .bind(record.payload.to_string())
        .bind(serde_json::to_string(&record.response)?)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{insight, ticket};
    use insight_core::{
        AdvisoryResponse, AdvisorySummary, CommitOutcome, InsightStatus, Level,
    };
    use std::sync::Arc;

    async fn setup_test_store() -> SqlInsightStore {
        SqlInsightStore::connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite")
    }

    #[tokio::test]
    async fn insert_pending_is_exclusive_per_window() {
        let store = setup_test_store().await;
        let t = ticket("vix", "2026-03-01", "f1");

        let first = store.try_insert_pending(&t).await.unwrap().unwrap();
        assert_eq!(first.status, InsightStatus::Pending);
        assert_eq!(first.attempt, 1);

        assert!(store.try_insert_pending(&t).await.unwrap().is_none());

        let next_day = ticket("vix", "2026-03-02", "f1");
        assert!(store.try_insert_pending(&next_day).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_inserts_yield_one_winner() {
        let store = Arc::new(setup_test_store().await);
        let t = ticket("nfci", "2026-03-01", "f1");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let t = t.clone();
                tokio::spawn(async move { store.try_insert_pending(&t).await })
            })
            .collect();

        let mut winners = 0;
        for outcome in futures_util::future::join_all(tasks).await {
            if outcome.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn commit_done_then_lookup_hits() {
        let store = setup_test_store().await;
        let t = ticket("vix", "2026-03-01", "f1");
        let claimed = store.try_insert_pending(&t).await.unwrap().unwrap();

        assert!(store.lookup(&t.key).await.unwrap().is_none());

        let commit = InsightCommit {
            ticket: t.clone(),
            attempt: claimed.attempt,
            outcome: CommitOutcome::Done(insight("Calm markets")),
        };
        let done = store.commit(&commit).await.unwrap();
        assert_eq!(done.status, InsightStatus::Done);
        assert_eq!(done.signal_label.as_deref(), Some("neutral"));
        assert_eq!(done.result.as_ref().unwrap()["headline"], "Calm markets");

        // Retrying the same commit leaves the record in the same state
        let again = store.commit(&commit).await.unwrap();
        assert_eq!(again.headline, done.headline);
        assert_eq!(again.status, InsightStatus::Done);

        let hit = store.lookup(&t.key).await.unwrap().unwrap();
        assert_eq!(hit.headline.as_deref(), Some("Calm markets"));

        let other_version = ticket("vix", "2026-03-01", "f2");
        assert!(store.lookup(&other_version.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn error_commit_is_never_a_hit() {
        let store = setup_test_store().await;
        let t = ticket("fsi", "2026-03-01", "f1");
        let claimed = store.try_insert_pending(&t).await.unwrap().unwrap();

        let record = store
            .commit(&InsightCommit {
                ticket: t.clone(),
                attempt: claimed.attempt,
                outcome: CommitOutcome::Error("model returned prose".into()),
            })
            .await
            .unwrap();

        assert_eq!(record.status, InsightStatus::Error);
        assert!(record.result.is_none());
        assert!(store.lookup(&t.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_without_claim_is_a_consistency_error() {
        let store = setup_test_store().await;
        let t = ticket("vix", "2026-03-01", "f1");
        let err = store
            .commit(&InsightCommit {
                ticket: t,
                attempt: 1,
                outcome: CommitOutcome::Error("x".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::Consistency(_)));
    }

    #[tokio::test]
    async fn supersede_rearms_only_terminal_records_of_another_version() {
        let store = setup_test_store().await;
        let f1 = ticket("vix", "2026-03-01", "f1");
        let f2 = ticket("vix", "2026-03-01", "f2");

        store.try_insert_pending(&f1).await.unwrap().unwrap();
        // In-flight claim is never taken over
        assert!(store.try_supersede(&f2).await.unwrap().is_none());

        store
            .commit(&InsightCommit {
                ticket: f1.clone(),
                attempt: 1,
                outcome: CommitOutcome::Done(insight("v1")),
            })
            .await
            .unwrap();

        // Same version does not re-arm
        assert!(store.try_supersede(&f1).await.unwrap().is_none());

        let rearmed = store.try_supersede(&f2).await.unwrap().unwrap();
        assert_eq!(rearmed.status, InsightStatus::Pending);
        assert_eq!(rearmed.attempt, 2);
        assert_eq!(rearmed.data_fingerprint, "f2");
        assert!(rearmed.result.is_none());

        // The old attempt can no longer commit into the re-armed record
        let stale = store
            .commit(&InsightCommit {
                ticket: f1.clone(),
                attempt: 1,
                outcome: CommitOutcome::Done(insight("late")),
            })
            .await;
        assert!(matches!(stale, Err(InsightError::Consistency(_))));
    }

    #[tokio::test]
    async fn superseded_narrative_stays_a_hit() {
        let store = setup_test_store().await;
        let f1 = ticket("vix", "2026-03-01", "f1");
        let f2 = ticket("vix", "2026-03-01", "f2");

        store.try_insert_pending(&f1).await.unwrap().unwrap();
        store
            .commit(&InsightCommit {
                ticket: f1.clone(),
                attempt: 1,
                outcome: CommitOutcome::Done(insight("first read")),
            })
            .await
            .unwrap();

        store.try_supersede(&f2).await.unwrap().unwrap();
        store
            .commit(&InsightCommit {
                ticket: f2.clone(),
                attempt: 2,
                outcome: CommitOutcome::Done(insight("second read")),
            })
            .await
            .unwrap();

        // Data flipped back: the first narrative is still served
        let back = store.lookup(&f1.key).await.unwrap().unwrap();
        assert_eq!(back.headline.as_deref(), Some("first read"));
        assert_eq!(back.attempt, 1);

        let current = store.lookup(&f2.key).await.unwrap().unwrap();
        assert_eq!(current.headline.as_deref(), Some("second read"));

        let window = store.fetch_window("vix", "2026-03-01").await.unwrap().unwrap();
        assert_eq!(window.attempt, 2);
    }

    #[tokio::test]
    async fn advice_insert_drops_duplicates() {
        let store = setup_test_store().await;
        let record = AdvisoryCacheRecord {
            key: AdvisoryKey {
                regime_asof_date: "2026-02-27".into(),
                payload_hash: "abc".into(),
                model_id: "claude-haiku-4-5".into(),
                prompt_version: "v1".into(),
            },
            payload: serde_json::json!({"asof": "2026-02-27"}),
            response: AdvisoryResponse {
                summary: AdvisorySummary {
                    headline: "Hold".into(),
                    conviction: Level::Medium,
                    data_quality: Level::High,
                },
                actions: vec![],
                rationale: vec![],
                triggers: vec![],
                no_action_reason: Some("Balanced".into()),
            },
            created_at: "2026-02-27T10:00:00Z".into(),
        };

        assert!(store.insert_advice(&record).await.unwrap());
        assert!(!store.insert_advice(&record).await.unwrap());

        let cached = store.get_advice(&record.key).await.unwrap().unwrap();
        assert_eq!(cached.response, record.response);

        let mut other = record.key.clone();
        other.prompt_version = "v2".into();
        assert!(store.get_advice(&other).await.unwrap().is_none());
    }
}

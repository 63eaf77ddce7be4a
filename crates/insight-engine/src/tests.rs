//! Shared fakes and end-to-end handler scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use insight_core::{
    indicator_fingerprint, ClaimTicket, CommitOutcome, DailyWindow, DataSource,
    GenerationRecord, HistoryPoint, IndicatorFeature, IndicatorInsight, InsightCommit,
    InsightError, InsightKey, InsightResult, InsightStatus, InsightStore, RegimeSnapshot,
    ValuedPosition,
};
use insight_store::MemoryInsightStore;
use llm_client::{CompletionRequest, LlmBackend, LlmError, LlmResult};

use crate::advisory::AdvisoryHandler;
use crate::indicator::{IndicatorInsightHandler, InsightResponse};

pub(crate) const INSIGHT_JSON: &str = r#"{
  "headline": "Volatility subdued",
  "signal_label": "bullish",
  "confidence": 0.72,
  "confidence_reason": "Long, stable history"
}"#;

const ADVICE_JSON: &str = r#"{
  "summary": {"headline": "Stay the course", "conviction": "medium", "data_quality": "high"},
  "actions": [],
  "rationale": [{"point": "Regime is stable"}],
  "triggers": [{"if": "VIX above 25", "then": "Raise cash"}],
  "no_action_reason": "Weights within tolerance"
}"#;

/// Backend that returns a canned reply and records what it was asked
pub(crate) struct ScriptedBackend {
    reply: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last: Mutex<Option<CompletionRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            ..Self::replying("")
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<CompletionRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().ok_or(LlmError::Api {
            backend: "scripted",
            status: 503,
            body: "overloaded".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "deepseek-chat"
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// In-memory dashboard data with mutable feature values
#[derive(Default)]
pub(crate) struct FakeSource {
    features: Mutex<HashMap<String, IndicatorFeature>>,
    history_calls: AtomicUsize,
    pub(crate) regime: Option<RegimeSnapshot>,
    pub(crate) positions: Vec<ValuedPosition>,
}

impl FakeSource {
    pub(crate) fn with_indicator(code: &str, value: f64) -> Self {
        let source = Self::default();
        source.set_value(code, value);
        source
    }

    pub(crate) fn set_value(&self, code: &str, value: f64) {
        self.features.lock().unwrap().insert(
            code.to_string(),
            IndicatorFeature {
                code: code.to_string(),
                name: Some(code.to_uppercase()),
                frequency: Some("daily".into()),
                latest_date: Some("2026-02-27".into()),
                latest_value: Some(value),
                delta_1m: Some(-1.2),
                zscore_3y: Some(-0.4),
                ..Default::default()
            },
        );
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn indicator_feature(&self, code: &str) -> InsightResult<Option<IndicatorFeature>> {
        Ok(self.features.lock().unwrap().get(code).cloned())
    }

    async fn indicator_history(
        &self,
        _code: &str,
        limit: usize,
    ) -> InsightResult<Vec<HistoryPoint>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok((1..=limit.min(3))
            .map(|d| HistoryPoint {
                obs_date: format!("2026-02-{:02}", 24 + d),
                raw_value: Some(15.0 + d as f64),
            })
            .collect())
    }

    async fn indicator_features(&self, codes: &[String]) -> InsightResult<Vec<IndicatorFeature>> {
        let features = self.features.lock().unwrap();
        Ok(codes.iter().filter_map(|c| features.get(c).cloned()).collect())
    }

    async fn latest_regime(&self) -> InsightResult<Option<RegimeSnapshot>> {
        Ok(self.regime.clone())
    }

    async fn valued_positions(&self) -> InsightResult<Vec<ValuedPosition>> {
        Ok(self.positions.clone())
    }
}

fn day(d: u32) -> DateTime<Utc> {
    // 12:00 in Singapore
    Utc.with_ymd_and_hms(2026, 3, d, 4, 0, 0).unwrap()
}

struct Harness {
    source: Arc<FakeSource>,
    store: Arc<MemoryInsightStore>,
    backend: Arc<ScriptedBackend>,
    handler: IndicatorInsightHandler,
}

fn harness(backend: ScriptedBackend) -> Harness {
    let source = Arc::new(FakeSource::with_indicator("vix", 16.4));
    let store = Arc::new(MemoryInsightStore::new());
    let backend = Arc::new(backend);
    let handler = IndicatorInsightHandler::new(
        source.clone(),
        store.clone(),
        backend.clone(),
        DailyWindow::default(),
    );
    Harness {
        source,
        store,
        backend,
        handler,
    }
}

fn record(response: InsightResponse) -> GenerationRecord {
    match response {
        InsightResponse::Record(record) => record,
        other => panic!("expected a record, got {other:?}"),
    }
}

#[tokio::test]
async fn fresh_code_generates_then_hits() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));

    let first = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    assert_eq!(first.status, InsightStatus::Done);
    assert_eq!(first.window_key, "2026-03-01");
    assert_eq!(first.headline.as_deref(), Some("Volatility subdued"));
    assert_eq!(first.signal_label.as_deref(), Some("bullish"));
    assert_eq!(h.backend.calls(), 1);

    let second = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    assert_eq!(second, first);
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn same_data_is_a_hit_in_a_later_window() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));

    h.handler.handle_at("vix", day(1)).await.unwrap();
    let later = record(h.handler.handle_at("vix", day(3)).await.unwrap());

    assert_eq!(later.window_key, "2026-03-01");
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn changed_data_regenerates_within_the_window() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));

    let first = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    h.source.set_value("vix", 24.9);
    let second = record(h.handler.handle_at("vix", day(1)).await.unwrap());

    assert_eq!(second.status, InsightStatus::Done);
    assert_ne!(second.data_fingerprint, first.data_fingerprint);
    assert_eq!(second.attempt, first.attempt + 1);
    assert_eq!(h.backend.calls(), 2);
    assert_eq!(h.store.records().len(), 1);
}

#[tokio::test]
async fn data_flipping_back_reuses_the_first_narrative() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));

    let first = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    h.source.set_value("vix", 24.9);
    let second = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    h.source.set_value("vix", 16.4);
    let third = record(h.handler.handle_at("vix", day(1)).await.unwrap());

    assert_ne!(second.data_fingerprint, first.data_fingerprint);
    assert_eq!(third, first);
    assert_eq!(h.backend.calls(), 2);
    assert_eq!(h.store.records().len(), 1);
    assert_eq!(h.store.history().len(), 2);
}

#[tokio::test]
async fn new_data_waits_while_older_version_is_in_flight() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));

    let older = insight_store_ticket(&h, "2026-03-01").await;
    h.store.try_insert_pending(&older).await.unwrap().unwrap();
    h.source.set_value("vix", 24.9);

    let response = h.handler.handle_at("vix", day(1)).await.unwrap();
    assert_eq!(response, InsightResponse::pending());
    assert_eq!(h.backend.calls(), 0);
}

/// Store that lets an older claim holder finish right after a supersede
/// attempt is refused, before the window is re-read.
struct FinishingHolderStore {
    inner: MemoryInsightStore,
    holder_commit: Mutex<Option<InsightCommit>>,
}

#[async_trait]
impl InsightStore for FinishingHolderStore {
    async fn lookup(&self, key: &InsightKey) -> InsightResult<Option<GenerationRecord>> {
        self.inner.lookup(key).await
    }

    async fn try_insert_pending(
        &self,
        ticket: &ClaimTicket,
    ) -> InsightResult<Option<GenerationRecord>> {
        self.inner.try_insert_pending(ticket).await
    }

    async fn try_supersede(
        &self,
        ticket: &ClaimTicket,
    ) -> InsightResult<Option<GenerationRecord>> {
        let rearmed = self.inner.try_supersede(ticket).await?;
        let holder_commit = self.holder_commit.lock().unwrap().take();
        if let Some(commit) = holder_commit {
            self.inner.commit(&commit).await?;
        }
        Ok(rearmed)
    }

    async fn fetch_window(
        &self,
        entity_key: &str,
        window_key: &str,
    ) -> InsightResult<Option<GenerationRecord>> {
        self.inner.fetch_window(entity_key, window_key).await
    }

    async fn commit(&self, commit: &InsightCommit) -> InsightResult<GenerationRecord> {
        self.inner.commit(commit).await
    }

    fn backend_name(&self) -> &'static str {
        "finishing-holder"
    }
}

#[tokio::test]
async fn holder_finishing_during_claim_never_serves_old_data() {
    let source = Arc::new(FakeSource::with_indicator("vix", 16.4));
    let older = {
        let feature = source.indicator_feature("vix").await.unwrap().unwrap();
        ClaimTicket {
            key: InsightKey {
                entity_key: "vix".into(),
                data_fingerprint: indicator_fingerprint(&feature),
                model_id: "deepseek-chat".into(),
                prompt_version: crate::indicator::INDICATOR_PROMPT_VERSION.into(),
            },
            window_key: "2026-03-01".into(),
            data_latest_date: feature.latest_date,
        }
    };

    let inner = MemoryInsightStore::new();
    inner.try_insert_pending(&older).await.unwrap().unwrap();
    let older_result: IndicatorInsight = serde_json::from_str(INSIGHT_JSON).unwrap();
    let store = Arc::new(FinishingHolderStore {
        inner,
        holder_commit: Mutex::new(Some(InsightCommit {
            ticket: older.clone(),
            attempt: 1,
            outcome: CommitOutcome::Done(older_result),
        })),
    });

    let backend = Arc::new(ScriptedBackend::replying(INSIGHT_JSON));
    let handler = IndicatorInsightHandler::new(
        source.clone(),
        store.clone(),
        backend.clone(),
        DailyWindow::default(),
    );

    source.set_value("vix", 24.9);
    let fresh = record(handler.handle_at("vix", day(1)).await.unwrap());

    assert_eq!(fresh.status, InsightStatus::Done);
    assert_ne!(fresh.data_fingerprint, older.key.data_fingerprint);
    assert_eq!(fresh.attempt, 2);
    assert_eq!(backend.calls(), 1);

    // The older narrative finished and is still logged for its own data
    let logged = store.lookup(&older.key).await.unwrap().unwrap();
    assert_eq!(logged.attempt, 1);
}

#[tokio::test]
async fn concurrent_requests_generate_once() {
    let backend = ScriptedBackend::replying(INSIGHT_JSON).with_delay(Duration::from_millis(50));
    let h = harness(backend);
    let handler = Arc::new(h.handler);

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.handle_at("vix", day(1)).await })
        })
        .collect();

    let mut finished = Vec::new();
    let mut pending = 0;
    for result in futures_util::future::join_all(tasks).await {
        match result.unwrap().unwrap() {
            InsightResponse::Record(r) if r.status == InsightStatus::Done => finished.push(r),
            response if response.status() == InsightStatus::Pending => pending += 1,
            other => panic!("no request should fail, got {other:?}"),
        }
    }
    let done = finished.len();

    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.source.history_calls.load(Ordering::SeqCst), 1);
    assert_eq!(done + pending, 12);
    assert!(done >= 1);

    // One generation logged; every finished answer is that same record
    let history = h.store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].attempt, 1);
    for response in &finished {
        assert_eq!(response, &history[0]);
    }
}

#[tokio::test]
async fn stuck_pending_from_previous_window_is_healed() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));

    // A claim from yesterday whose holder never came back
    let stuck = insight_store_ticket(&h, "2026-02-28").await;
    assert!(h.store.try_insert_pending(&stuck).await.unwrap().is_some());

    let fresh = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    assert_eq!(fresh.status, InsightStatus::Done);
    assert_eq!(fresh.window_key, "2026-03-01");
    assert_eq!(h.backend.calls(), 1);
}

async fn insight_store_ticket(h: &Harness, window: &str) -> ClaimTicket {
    let feature = h.source.indicator_feature("vix").await.unwrap().unwrap();
    ClaimTicket {
        key: InsightKey {
            entity_key: "vix".into(),
            data_fingerprint: indicator_fingerprint(&feature),
            model_id: "deepseek-chat".into(),
            prompt_version: crate::indicator::INDICATOR_PROMPT_VERSION.into(),
        },
        window_key: window.into(),
        data_latest_date: feature.latest_date,
    }
}

#[tokio::test]
async fn malformed_output_is_committed_as_error() {
    let h = harness(ScriptedBackend::replying("Sorry, the market is closed."));

    let failed = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    assert_eq!(failed.status, InsightStatus::Error);
    assert!(failed.error_message.is_some());
    assert!(failed.result.is_none());

    // The error is final for this window and version, never served as a hit
    let again = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    assert_eq!(again.status, InsightStatus::Error);
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn backend_failure_is_committed_as_error() {
    let h = harness(ScriptedBackend::failing());

    let failed = record(h.handler.handle_at("vix", day(1)).await.unwrap());
    assert_eq!(failed.status, InsightStatus::Error);
    assert!(failed.error_message.unwrap().contains("503"));
}

#[tokio::test]
async fn unknown_code_is_not_found_and_claims_nothing() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));

    let err = h.handler.handle_at("nope", day(1)).await.unwrap_err();
    assert!(matches!(err, InsightError::NotFound(msg) if msg.contains("nope")));
    assert!(h.store.records().is_empty());
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn prompt_version_bump_regenerates() {
    let h = harness(ScriptedBackend::replying(INSIGHT_JSON));
    h.handler.handle_at("vix", day(1)).await.unwrap();

    let bumped = h.handler.clone().with_prompt_version("v3");
    let next = record(bumped.handle_at("vix", day(1)).await.unwrap());
    assert_eq!(next.prompt_version, "v3");
    assert_eq!(h.backend.calls(), 2);
}

#[tokio::test]
async fn advisory_is_cached_by_payload() {
    let mut source = FakeSource::with_indicator("vix", 16.4);
    source.set_value("nfci", -0.5);
    source.regime = Some(RegimeSnapshot {
        asof_date: "2026-03-01".into(),
        growth_label: Some("Expansion".into()),
        confidence_label: Some("High".into()),
        ..Default::default()
    });
    source.positions = vec![ValuedPosition {
        code: "ES3".into(),
        asset_type: Some("etf".into()),
        value_sgd: Some(1000.0),
        ..Default::default()
    }];

    let store = Arc::new(MemoryInsightStore::new());
    let backend = Arc::new(ScriptedBackend::replying(ADVICE_JSON));
    let handler = AdvisoryHandler::new(Arc::new(source), store, backend.clone());

    let first = handler.generate().await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.advice.summary.headline, "Stay the course");

    let second = handler.generate().await.unwrap();
    assert!(second.cached);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.advice, first.advice);
    assert_eq!(backend.calls(), 1);

    let prompt = backend.last_request().unwrap().user;
    assert!(prompt.contains("\"base_currency\": \"SGD\""));
}

#[tokio::test]
async fn advisory_without_regime_is_not_found() {
    let handler = AdvisoryHandler::new(
        Arc::new(FakeSource::default()),
        Arc::new(MemoryInsightStore::new()),
        Arc::new(ScriptedBackend::replying(ADVICE_JSON)),
    );
    assert!(matches!(handler.generate().await, Err(InsightError::NotFound(_))));
}

#[tokio::test]
async fn advisory_actions_are_capped() {
    let actions: Vec<String> = (0..7)
        .map(|i| format!(r#"{{"action":"trim","asset":"A{i}","why":"overweight"}}"#))
        .collect();
    let reply = format!(
        r#"{{"summary":{{"headline":"Trim","conviction":"low","data_quality":"medium"}},"actions":[{}]}}"#,
        actions.join(",")
    );

    let mut source = FakeSource::default();
    source.regime = Some(RegimeSnapshot {
        asof_date: "2026-03-01".into(),
        ..Default::default()
    });
    let handler = AdvisoryHandler::new(
        Arc::new(source),
        Arc::new(MemoryInsightStore::new()),
        Arc::new(ScriptedBackend::replying(&reply)),
    );

    let reply = handler.generate().await.unwrap();
    assert_eq!(reply.advice.actions.len(), crate::advisory::MAX_ACTIONS);
}

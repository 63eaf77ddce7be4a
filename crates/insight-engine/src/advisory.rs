use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use insight_core::{
    payload_hash, AdvisoryCacheRecord, AdvisoryConstraints, AdvisoryHolding, AdvisoryKey,
    AdvisoryPayload, AdvisoryResponse, AdvisoryStore, AssetClassSubtotal, DataSource,
    DriverIndicator, InsightError, InsightResult, MacroRegimeSummary, PortfolioBreakdown,
    ValuedPosition, BASE_CURRENCY, REGIME_DRIVER_CODES,
};
use llm_client::{CompletionRequest, LlmBackend};
use serde::Serialize;

use crate::generator::parse_structured;
use crate::prompt;

pub const ADVISORY_PROMPT_VERSION: &str = "v1";
pub const MAX_ACTIONS: usize = 5;
const ADVISORY_MAX_TOKENS: u32 = 4096;

/// Advisory plus cache provenance, flattened for the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryReply {
    #[serde(flatten)]
    pub advice: AdvisoryResponse,
    pub cached: bool,
    pub created_at: String,
}

fn pct(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part * 100.0 / total
    } else {
        0.0
    }
}

/// Aggregate valued positions by asset class. Class order follows first
/// appearance so the payload hash is stable for a stable upstream order.
pub fn summarize_portfolio(positions: &[ValuedPosition]) -> PortfolioBreakdown {
    let total: f64 = positions.iter().map(ValuedPosition::value_or_zero).sum();

    let mut classes: Vec<(String, f64)> = Vec::new();
    for position in positions {
        let class = position.class_label();
        match classes.iter_mut().find(|(name, _)| *name == class) {
            Some((_, sum)) => *sum += position.value_or_zero(),
            None => classes.push((class, position.value_or_zero())),
        }
    }

    let subtotals = classes
        .into_iter()
        .map(|(asset_class, total_sgd)| AssetClassSubtotal {
            weight_pct: pct(total_sgd, total),
            asset_class,
            total_sgd,
        })
        .collect();

    let holdings = positions
        .iter()
        .map(|p| AdvisoryHolding {
            ticker: p.code.clone(),
            asset_name: p.asset_name.clone(),
            asset_class: p.class_label(),
            units: p.quantity,
            price_latest: p.price_used,
            price_date_used: p.price_date_used.clone(),
            fx_rate: p.sgd_per_ccy,
            fx_date_used: p.fx_date_used.clone(),
            value_sgd: p.value_sgd,
            weight_pct: pct(p.value_or_zero(), total),
        })
        .collect();

    PortfolioBreakdown {
        total_value_sgd: total,
        subtotals,
        holdings,
    }
}

/// Assemble everything the advisory model sees from the data source.
pub async fn build_advisory_payload(source: &dyn DataSource) -> InsightResult<AdvisoryPayload> {
    let codes: Vec<String> = REGIME_DRIVER_CODES.iter().map(|c| c.to_string()).collect();

    let (regime, drivers, positions) = tokio::try_join!(
        source.latest_regime(),
        source.indicator_features(&codes),
        source.valued_positions(),
    )?;

    let regime =
        regime.ok_or_else(|| InsightError::NotFound("No regime snapshot available".to_string()))?;

    // Upstream order is not guaranteed; keep the canonical driver order.
    let mut macro_drivers: Vec<DriverIndicator> =
        drivers.iter().map(DriverIndicator::from).collect();
    macro_drivers.sort_by_key(|d| {
        REGIME_DRIVER_CODES
            .iter()
            .position(|c| *c == d.code)
            .unwrap_or(usize::MAX)
    });

    Ok(AdvisoryPayload {
        asof: regime.asof_date.clone(),
        base_currency: BASE_CURRENCY.to_string(),
        macro_regime: MacroRegimeSummary::from(&regime),
        macro_drivers,
        portfolio: summarize_portfolio(&positions),
        constraints: AdvisoryConstraints::default(),
    })
}

/// Portfolio advisory with a content-addressed cache and no claim step.
/// Concurrent misses may both generate; the store keeps the first insert.
#[derive(Clone)]
pub struct AdvisoryHandler {
    source: Arc<dyn DataSource>,
    store: Arc<dyn AdvisoryStore>,
    backend: Arc<dyn LlmBackend>,
    prompt_version: String,
}

impl AdvisoryHandler {
    pub fn new(
        source: Arc<dyn DataSource>,
        store: Arc<dyn AdvisoryStore>,
        backend: Arc<dyn LlmBackend>,
    ) -> Self {
        Self {
            source,
            store,
            backend,
            prompt_version: ADVISORY_PROMPT_VERSION.to_string(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate(&self) -> InsightResult<AdvisoryReply> {
        let payload = build_advisory_payload(self.source.as_ref()).await?;
        let key = AdvisoryKey {
            regime_asof_date: payload.asof.clone(),
            payload_hash: payload_hash(&payload)?,
            model_id: self.backend.model_id().to_string(),
            prompt_version: self.prompt_version.clone(),
        };

        if let Some(cached) = self.store.get_advice(&key).await? {
            tracing::info!(hash = %key.payload_hash, "Advisory cache hit");
            return Ok(AdvisoryReply {
                advice: cached.response,
                cached: true,
                created_at: cached.created_at,
            });
        }

        tracing::info!(hash = %key.payload_hash, "Advisory cache miss, calling model");
        let request = CompletionRequest::new(
            prompt::ADVISORY_SYSTEM_PROMPT,
            prompt::advisory_user_prompt(&payload)?,
        )
        .max_tokens(ADVISORY_MAX_TOKENS);

        let text = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| {
                InsightError::Generation(format!("{}: {}", self.backend.backend_name(), e))
            })?;

        let mut advice: AdvisoryResponse = parse_structured(&text)?;
        if advice.actions.len() > MAX_ACTIONS {
            tracing::warn!(
                count = advice.actions.len(),
                "Truncating advisory actions to {}",
                MAX_ACTIONS
            );
            advice.actions.truncate(MAX_ACTIONS);
        }

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = AdvisoryCacheRecord {
            key,
            payload: serde_json::to_value(&payload)?,
            response: advice.clone(),
            created_at: created_at.clone(),
        };

        match self.store.insert_advice(&record).await {
            Ok(true) => tracing::debug!("Advisory cached"),
            Ok(false) => tracing::debug!("Advisory already cached by a concurrent request"),
            Err(e) => tracing::warn!(error = %e, "Failed to cache advisory"),
        }

        Ok(AdvisoryReply {
            advice,
            cached: false,
            created_at,
        })
    }
}

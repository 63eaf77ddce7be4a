//! Read models behind the dashboard pages that do not go through the
//! generation cache.

use chrono::Utc;
use futures_util::future::join_all;
use insight_core::{
    CreditGapPoint, DataSource, IndicatorWithTrend, InsightError, InsightResult, MacroSnapshot,
    RegimeTakeaways, TrendPoint,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PostgrestClient;

/// Observations per sparkline
pub const TREND_POINTS: usize = 40;

/// Roughly five years of business days
pub const CREDIT_HISTORY_ROWS: usize = 1300;

/// One row of `v_indicator_features_explain`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainFeature {
    pub code: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub latest_value: Option<f64>,
    pub display_unit: Option<String>,
    pub latest_date: Option<String>,
    #[serde(default)]
    pub delta_1w: Option<f64>,
    #[serde(default)]
    pub delta_1m: Option<f64>,
    #[serde(default)]
    pub delta_3m: Option<f64>,

    #[serde(default)]
    pub bullish_risk_assets: Option<String>,
    #[serde(default)]
    pub bullish_bonds: Option<String>,
    #[serde(default)]
    pub bullish_usd: Option<String>,

    #[serde(default)]
    pub meaning_short: Option<String>,
    #[serde(default)]
    pub significance: Option<String>,
    #[serde(default)]
    pub direction_notes: Option<String>,
    #[serde(default)]
    pub common_misread: Option<String>,

    #[serde(default)]
    pub freshness_status: Option<String>,
    #[serde(default)]
    pub lag_days: Option<i64>,
}

/// Row ids of one position, resolved from human-readable names
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTarget {
    pub asset_id: String,
    pub account_id: String,
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl PostgrestClient {
    pub async fn latest_takeaways(&self) -> InsightResult<Option<RegimeTakeaways>> {
        let rows: Vec<RegimeTakeaways> = self
            .select("v_regime_takeaways", &[("limit", "1".to_string())])
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn explain_features(&self) -> InsightResult<Vec<ExplainFeature>> {
        self.select(
            "v_indicator_features_explain",
            &[
                ("select", "*".to_string()),
                ("order", "category.asc,name.asc".to_string()),
            ],
        )
        .await
    }

    /// Credit gap rows, newest first
    pub async fn credit_gap_history(&self, limit: usize) -> InsightResult<Vec<CreditGapPoint>> {
        self.select(
            "v_credit_risk_gap",
            &[
                ("order", "obs_date.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    /// Regime, takeaways and every indicator with its sparkline.
    ///
    /// Takeaways are optional and a failed trend fetch leaves that
    /// indicator's trend empty. Regime and feature failures are fatal.
    pub async fn macro_snapshot(&self) -> InsightResult<MacroSnapshot> {
        let regime = self.latest_regime().await?;

        let takeaways = match self.latest_takeaways().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Skipping regime takeaways: {}", e);
                None
            }
        };

        let features = self.get_all_features().await?;

        let trends = join_all(
            features
                .iter()
                .map(|feature| self.get_history(&feature.code, TREND_POINTS)),
        )
        .await;

        let indicators = features
            .into_iter()
            .zip(trends)
            .map(|(feature, trend)| {
                let trend = match trend {
                    Ok(points) => points.into_iter().map(TrendPoint::from).collect(),
                    Err(e) => {
                        tracing::error!("Failed to fetch trend for {}: {}", feature.code, e);
                        Vec::new()
                    }
                };
                IndicatorWithTrend { feature, trend }
            })
            .collect();

        let as_of = regime
            .as_ref()
            .map(|r| r.asof_date.clone())
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());

        Ok(MacroSnapshot {
            as_of,
            regime,
            takeaways,
            indicators,
        })
    }

    async fn lookup_id(
        &self,
        relation: &str,
        column: &str,
        value: &str,
        id_column: &str,
    ) -> InsightResult<Option<String>> {
        let rows: Vec<Value> = self
            .select(
                relation,
                &[
                    (column, format!("eq.{value}")),
                    ("select", id_column.to_string()),
                ],
            )
            .await?;
        Ok(rows.first().and_then(|row| row.get(id_column)).and_then(id_text))
    }

    /// Resolve an asset code and account name to row ids.
    pub async fn resolve_position(
        &self,
        code: &str,
        account: &str,
    ) -> InsightResult<PositionTarget> {
        let asset_id = self
            .lookup_id("assets", "code", code, "asset_id")
            .await?
            .ok_or_else(|| InsightError::NotFound(format!("Asset not found: {code}")))?;

        let account_id = self
            .lookup_id("accounts", "name", account, "account_id")
            .await?
            .ok_or_else(|| InsightError::NotFound(format!("Account not found: {account}")))?;

        Ok(PositionTarget {
            asset_id,
            account_id,
        })
    }

    pub async fn update_position_quantity(
        &self,
        target: &PositionTarget,
        quantity: f64,
    ) -> InsightResult<()> {
        let body = serde_json::json!({
            "quantity": quantity,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.patch(
            "positions",
            &[
                ("asset_id", format!("eq.{}", target.asset_id)),
                ("account_id", format!("eq.{}", target.account_id)),
            ],
            &body,
        )
        .await
    }
}

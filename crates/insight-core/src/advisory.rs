use serde::{Deserialize, Serialize};

use crate::{IndicatorFeature, RegimeSnapshot};

/// Indicators that drive the macro regime and are always sent with an
/// advisory request
pub const REGIME_DRIVER_CODES: &[&str] = &[
    "vix",
    "nfci",
    "fsi",
    "core_pce_yoy",
    "unemployment_rate",
    "industrial_prod_yoy",
    "retail_sales_yoy",
    "fed_funds_rate",
];

pub const BASE_CURRENCY: &str = "SGD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroRegimeSummary {
    pub asof_date: String,
    pub growth_label: Option<String>,
    pub inflation_label: Option<String>,
    pub policy_label: Option<String>,
    pub risk_label: Option<String>,
    pub liquidity_label: Option<String>,
    pub conviction_label: Option<String>,
    pub data_quality_label: Option<String>,
    pub data_quality_score: Option<f64>,
    pub max_regime_lag_days: Option<i64>,
}

impl From<&RegimeSnapshot> for MacroRegimeSummary {
    fn from(r: &RegimeSnapshot) -> Self {
        Self {
            asof_date: r.asof_date.clone(),
            growth_label: r.growth_label.clone(),
            inflation_label: r.inflation_label.clone(),
            policy_label: r.policy_label.clone(),
            risk_label: r.risk_label.clone(),
            liquidity_label: r.liquidity_label.clone(),
            conviction_label: r.confidence_label.clone(),
            data_quality_label: r.data_quality_label.clone(),
            data_quality_score: r.data_quality_score,
            max_regime_lag_days: r.max_regime_lag_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverIndicator {
    pub code: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub latest_date: Option<String>,
    pub latest_value: Option<f64>,
    pub delta_1m: Option<f64>,
    pub delta_3m: Option<f64>,
    pub zscore_3y: Option<f64>,
    pub pctile_10y: Option<f64>,
    pub std_3y: Option<f64>,
}

impl From<&IndicatorFeature> for DriverIndicator {
    fn from(f: &IndicatorFeature) -> Self {
        Self {
            code: f.code.clone(),
            name: f.name.clone(),
            category: f.category.clone(),
            latest_date: f.latest_date.clone(),
            latest_value: f.latest_value,
            delta_1m: f.delta_1m,
            delta_3m: f.delta_3m,
            zscore_3y: f.zscore_3y,
            pctile_10y: f.pctile_10y,
            std_3y: f.std_3y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryHolding {
    pub ticker: String,
    pub asset_name: Option<String>,
    pub asset_class: String,
    pub units: Option<f64>,
    pub price_latest: Option<f64>,
    pub price_date_used: Option<String>,
    pub fx_rate: Option<f64>,
    pub fx_date_used: Option<String>,
    pub value_sgd: Option<f64>,
    pub weight_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClassSubtotal {
    pub asset_class: String,
    pub total_sgd: f64,
    pub weight_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioBreakdown {
    pub total_value_sgd: f64,
    pub subtotals: Vec<AssetClassSubtotal>,
    pub holdings: Vec<AdvisoryHolding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryConstraints {
    pub max_single_position_pct: f64,
    pub preferred_rebalance_threshold_pct: f64,
}

impl Default for AdvisoryConstraints {
    fn default() -> Self {
        Self {
            max_single_position_pct: 20.0,
            preferred_rebalance_threshold_pct: 5.0,
        }
    }
}

/// Everything the advisory model sees. The whole payload is hashed to decide
/// cache reuse, so any field added here participates in invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryPayload {
    pub asof: String,
    pub base_currency: String,
    pub macro_regime: MacroRegimeSummary,
    pub macro_drivers: Vec<DriverIndicator>,
    pub portfolio: PortfolioBreakdown,
    pub constraints: AdvisoryConstraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Rebalance,
    Add,
    Trim,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryAction {
    pub action: ActionKind,
    pub asset: String,
    #[serde(default)]
    pub from_weight_pct: Option<f64>,
    #[serde(default)]
    pub to_weight_pct: Option<f64>,
    #[serde(default)]
    pub change_pct: Option<f64>,
    pub why: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RationalePoint {
    pub point: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryTrigger {
    #[serde(rename = "if")]
    pub condition: String,
    #[serde(rename = "then")]
    pub consequence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorySummary {
    pub headline: String,
    pub conviction: Level,
    pub data_quality: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    pub summary: AdvisorySummary,
    #[serde(default)]
    pub actions: Vec<AdvisoryAction>,
    #[serde(default)]
    pub rationale: Vec<RationalePoint>,
    #[serde(default)]
    pub triggers: Vec<AdvisoryTrigger>,
    #[serde(default)]
    pub no_action_reason: Option<String>,
}

/// Cache coordinates of an advisory response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvisoryKey {
    pub regime_asof_date: String,
    pub payload_hash: String,
    pub model_id: String,
    pub prompt_version: String,
}

/// One row of `llm_portfolio_advice`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryCacheRecord {
    #[serde(flatten)]
    pub key: AdvisoryKey,
    pub payload: serde_json::Value,
    pub response: AdvisoryResponse,
    pub created_at: String,
}

use serde::{Deserialize, Serialize};

/// One row of the `v_indicator_features` view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFeature {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub display_unit: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub latest_date: Option<String>,
    #[serde(default)]
    pub latest_value: Option<f64>,

    #[serde(default)]
    pub value_1w: Option<f64>,
    #[serde(default)]
    pub delta_1w: Option<f64>,
    #[serde(default)]
    pub value_1m: Option<f64>,
    #[serde(default)]
    pub delta_1m: Option<f64>,
    #[serde(default)]
    pub value_3m: Option<f64>,
    #[serde(default)]
    pub delta_3m: Option<f64>,

    #[serde(default, alias = "percentile_10y")]
    pub pctile_10y: Option<f64>,
    #[serde(default)]
    pub zscore_3y: Option<f64>,
    #[serde(default)]
    pub mean_3y: Option<f64>,
    #[serde(default)]
    pub std_3y: Option<f64>,
}

impl IndicatorFeature {
    /// Number of observations worth of history to hand the model,
    /// scaled so every frequency covers roughly the same span.
    pub fn history_window(&self) -> usize {
        let freq = self
            .frequency
            .as_deref()
            .unwrap_or("daily")
            .to_lowercase();
        if freq.contains("month") {
            24
        } else if freq.contains("week") {
            52
        } else {
            60
        }
    }
}

/// Raw observation from `indicator_values`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub obs_date: String,
    pub raw_value: Option<f64>,
}

/// Sparkline point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: Option<f64>,
}

impl From<HistoryPoint> for TrendPoint {
    fn from(p: HistoryPoint) -> Self {
        Self {
            date: p.obs_date,
            value: p.raw_value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorWithTrend {
    #[serde(flatten)]
    pub feature: IndicatorFeature,
    pub trend: Vec<TrendPoint>,
}

/// Latest row of `v_regime_snapshot`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub asof_date: String,
    #[serde(default)]
    pub max_lag_days: Option<i64>,

    #[serde(default)]
    pub growth_score: Option<f64>,
    #[serde(default)]
    pub growth_label: Option<String>,
    #[serde(default)]
    pub inflation_score: Option<f64>,
    #[serde(default)]
    pub inflation_label: Option<String>,
    #[serde(default)]
    pub policy_score: Option<f64>,
    #[serde(default)]
    pub policy_label: Option<String>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub risk_label: Option<String>,
    #[serde(default)]
    pub liquidity_score: Option<f64>,
    #[serde(default)]
    pub liquidity_label: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub confidence_label: Option<String>,

    #[serde(default)]
    pub vix_latest: Option<f64>,
    #[serde(default)]
    pub fsi_latest: Option<f64>,
    #[serde(default)]
    pub nfci_latest: Option<f64>,
    #[serde(default)]
    pub core_pce_latest: Option<f64>,

    #[serde(default)]
    pub data_quality_score: Option<f64>,
    #[serde(default)]
    pub data_quality_label: Option<String>,
    #[serde(default)]
    pub missing_count: Option<i64>,
    #[serde(default)]
    pub stale_count: Option<i64>,
    #[serde(default)]
    pub no_delta_count: Option<i64>,
    #[serde(default)]
    pub max_regime_lag_days: Option<i64>,
    #[serde(default)]
    pub missing_codes: Vec<String>,
    #[serde(default)]
    pub stale_codes: Vec<String>,
    #[serde(default)]
    pub no_delta_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTakeaways {
    pub asof_date: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub confidence_label: Option<String>,
    #[serde(default)]
    pub max_lag_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroSnapshot {
    #[serde(rename = "asOf")]
    pub as_of: String,
    pub regime: Option<RegimeSnapshot>,
    pub takeaways: Option<RegimeTakeaways>,
    pub indicators: Vec<IndicatorWithTrend>,
}

/// One row of `v_portfolio_positions_valued_sgd`.
///
/// The view has been renamed a few times upstream, so older column names are
/// accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuedPosition {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(alias = "ticker")]
    pub code: String,
    #[serde(default)]
    pub asset_name: Option<String>,
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub asset_class: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub asset_ccy: Option<String>,
    #[serde(default, alias = "units")]
    pub quantity: Option<f64>,

    #[serde(default, alias = "price_latest")]
    pub price_used: Option<f64>,
    #[serde(default)]
    pub price_date_used: Option<String>,
    #[serde(default)]
    pub price_source_used: Option<String>,

    #[serde(default, alias = "fx_rate")]
    pub sgd_per_ccy: Option<f64>,
    #[serde(default)]
    pub fx_date_used: Option<String>,
    #[serde(default)]
    pub fx_source_used: Option<String>,

    #[serde(default)]
    pub value_native: Option<f64>,
    #[serde(default)]
    pub value_sgd: Option<f64>,
}

impl ValuedPosition {
    /// Asset class used for aggregation: explicit class, then asset type, then "Other"
    pub fn class_label(&self) -> String {
        self.asset_class
            .clone()
            .or_else(|| self.asset_type.clone())
            .unwrap_or_else(|| "Other".to_string())
    }

    pub fn value_or_zero(&self) -> f64 {
        self.value_sgd.unwrap_or(0.0)
    }
}

/// One row of `v_credit_risk_gap`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditGapPoint {
    pub obs_date: String,
    pub hy_oas_pct: f64,
    pub ig_oas_pct: f64,
    pub gap_pct: f64,
    pub gap_bps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditStats {
    pub as_of: String,
    pub gap_bps: f64,
    pub hy_oas_pct: f64,
    pub ig_oas_pct: f64,
    pub change_30d_bps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditStress {
    pub stats: Option<CreditStats>,
    pub history: Vec<CreditGapPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_window_scales_with_frequency() {
        let mut f = IndicatorFeature::default();
        assert_eq!(f.history_window(), 60);
        f.frequency = Some("Weekly".to_string());
        assert_eq!(f.history_window(), 52);
        f.frequency = Some("Monthly, SA".to_string());
        assert_eq!(f.history_window(), 24);
    }

    #[test]
    fn valued_position_accepts_legacy_columns() {
        let pos: ValuedPosition = serde_json::from_value(serde_json::json!({
            "ticker": "ES3",
            "units": 120.0,
            "price_latest": 3.5,
            "fx_rate": 1.0,
            "asset_type": "etf",
            "value_sgd": 420.0
        }))
        .unwrap();

        assert_eq!(pos.code, "ES3");
        assert_eq!(pos.quantity, Some(120.0));
        assert_eq!(pos.price_used, Some(3.5));
        assert_eq!(pos.class_label(), "etf");
    }
}

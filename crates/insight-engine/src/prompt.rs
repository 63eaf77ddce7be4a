//! Prompt text and payload shaping for every generation call.

use insight_core::{AdvisoryPayload, HistoryPoint, IndicatorFeature, InsightResult};
use serde_json::{json, Value};

/// Significant figures kept for numbers sent to a model
pub const PROMPT_PRECISION: i32 = 4;

/// Round to `digits` significant figures. Zero and non-finite values pass
/// through unchanged.
pub fn round_sig(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits - 1 - magnitude);
    let rounded = (value * scale).round() / scale;
    // Reparse to shed binary noise such as 0.30000000000000004
    format!("{:.*e}", (digits - 1).max(0) as usize, rounded)
        .parse()
        .unwrap_or(rounded)
}

fn sig(value: Option<f64>) -> Option<f64> {
    value.map(|v| round_sig(v, PROMPT_PRECISION))
}

// ---------------------------------------------------------------------------
// Indicator insight
// ---------------------------------------------------------------------------

pub const INDICATOR_SYSTEM_PROMPT: &str = "You are a macro dashboard analyst. Be concise. \
Give insights useful to a retail investor based on the indicator data.";

const INDICATOR_SCHEMA: &str = r#"OUTPUT REQUIREMENTS:
Return JSON ONLY with this exact schema:
{
  "headline": "string (<= 80 chars)",
  "signal_label": "bullish|neutral|bearish",
  "confidence": number (0.0 to 1.0),
  "confidence_reason": "string (<= 140 chars)",
  "what_it_measures": "string (<= 200 chars)",
  "directionality": {"higher_is": "better|worse|depends", "notes": "string (<= 160 chars)"},
  "now": {
    "latest_date": "YYYY-MM-DD",
    "latest_value": number,
    "context": {"pctile_10y": number|null, "zscore_3y": number|null}
  },
  "momentum": {
    "delta_1w": number|null,
    "delta_1m": number|null,
    "delta_3m": number|null,
    "momentum_label": "improving|deteriorating|mixed|flat"
  },
  "watch_levels": {
    "bullish_trigger": {"level": number|null, "direction": "below|above|null", "why": "string (<= 120 chars)"},
    "bearish_trigger": {"level": number|null, "direction": "below|above|null", "why": "string (<= 120 chars)"},
    "notes": "string (<= 160 chars)"
  },
  "recent_pattern": "string (<= 220 chars)",
  "narrative_bullets": [
    {"title": "What it is", "text": "string (<= 240 chars)"},
    {"title": "Level vs history", "text": "string (<= 240 chars)"},
    {"title": "Momentum", "text": "string (<= 240 chars)"},
    {"title": "What to watch", "text": "string (<= 240 chars)"},
    {"title": "Recent pattern", "text": "string (<= 240 chars)"}
  ],
  "implications": {
    "asset_impact": [
      {"asset": "equities|credit|rates|usd|commodities", "impact": "supportive|headwind|neutral", "why": "string (<= 120 chars)"}
    ],
    "positioning_tilt": {
      "equity_beta": "increase|reduce|neutral",
      "duration": "increase|reduce|neutral",
      "credit_risk": "increase|reduce|neutral",
      "cash_buffer": "increase|reduce|neutral"
    }
  },
  "data_quality": {"missing_fields": ["string"], "notes": "string (<= 160 chars)"}
}"#;

/// Model input for one indicator: metadata, rounded stats and history
/// (oldest first).
pub fn indicator_payload(
    feature: &IndicatorFeature,
    history: &[HistoryPoint],
    window_key: &str,
) -> Value {
    let recent_history: Vec<Value> = history
        .iter()
        .map(|p| json!({"obs_date": p.obs_date, "raw_value": sig(p.raw_value)}))
        .collect();

    json!({
        "metadata": {
            "code": feature.code,
            "name": feature.name,
            "category": feature.category,
            "unit": feature.display_unit,
            "frequency": feature.frequency,
            "source": feature.source,
        },
        "stats": {
            "latest_value": sig(feature.latest_value),
            "latest_date": feature.latest_date,
            "delta_1w": sig(feature.delta_1w),
            "delta_1m": sig(feature.delta_1m),
            "delta_3m": sig(feature.delta_3m),
            "zscore_3y": sig(feature.zscore_3y),
            "percentile_10y": sig(feature.pctile_10y),
        },
        "recent_history": recent_history,
        "current_date": window_key,
    })
}

pub fn indicator_user_prompt(
    feature: &IndicatorFeature,
    history: &[HistoryPoint],
    window_key: &str,
) -> String {
    format!(
        "Analyze this indicator data:\n{}\n\nInstructions:\n{}",
        indicator_payload(feature, history, window_key),
        INDICATOR_SCHEMA
    )
}

// ---------------------------------------------------------------------------
// Portfolio advisory
// ---------------------------------------------------------------------------

pub const ADVISORY_SYSTEM_PROMPT: &str = r#"You are a portfolio co-pilot. Use ONLY the provided JSON payload. Do not invent holdings, prices, or macro data.

Goal: propose a small number of practical adjustments that align the portfolio with the macro regime, while respecting data quality and constraints.

Rules:
- If macro_regime.data_quality_label is "low" OR macro_regime.conviction_label is "low", prefer smaller changes or "no action".
- Do not output generic advice. Every action must reference specific holdings and specific macro signals from the payload.
- Avoid frequent trading. Prefer rebalancing.
- Output JSON ONLY with this schema:

{
  "summary": {"headline": "string", "conviction": "low|medium|high", "data_quality": "low|medium|high"},
  "actions": [
    {"action": "rebalance|add|trim|hold", "asset": "string", "from_weight_pct": number|null, "to_weight_pct": number|null, "change_pct": number|null, "why": "string"}
  ],
  "rationale": [
    {"point": "string"}
  ],
  "triggers": [
    {"if": "string", "then": "string"}
  ],
  "no_action_reason": "string|null"
}

Keep actions <= 5. If recommending no action, set actions = [] and fill no_action_reason."#;

pub fn advisory_user_prompt(payload: &AdvisoryPayload) -> InsightResult<String> {
    Ok(serde_json::to_string_pretty(payload)?)
}

// ---------------------------------------------------------------------------
// Regime takeaways
// ---------------------------------------------------------------------------

pub const TAKEAWAYS_SYSTEM_PROMPT: &str = "You are a senior macro strategist. Analyze the provided \
economic data. Identify the most significant regime shifts, risks, or opportunities. Output EXACTLY \
3-5 concise bullet points (plain text, no markdown bullets needed, just newlines or separated). Do \
not include introductory text. You need to explain it in terms that a retail investor with basic \
investment knowledge can understand.";

pub fn takeaways_user_prompt(features: &[IndicatorFeature]) -> InsightResult<String> {
    let compact: Vec<Value> = features
        .iter()
        .map(|f| {
            json!({
                "code": f.code,
                "name": f.name,
                "category": f.category,
                "latest": sig(f.latest_value),
                "delta_1m": sig(f.delta_1m),
                "zscore_3y": sig(f.zscore_3y),
                "percentile": sig(f.pctile_10y),
            })
        })
        .collect();

    Ok(format!(
        "Analyze this macro dashboard data (deltas are 1-month changes, zscores are 3-year). \n\n{}",
        serde_json::to_string_pretty(&compact)?
    ))
}

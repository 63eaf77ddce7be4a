use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::InsightError;

/// Lifecycle of a generation record. `Pending` only ever moves to one of the
/// two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightStatus {
    Pending,
    Done,
    Error,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightStatus::Pending => "pending",
            InsightStatus::Done => "done",
            InsightStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InsightStatus::Pending)
    }
}

impl fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightStatus {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InsightStatus::Pending),
            "done" => Ok(InsightStatus::Done),
            "error" => Ok(InsightStatus::Error),
            other => Err(InsightError::InvalidData(format!(
                "unknown insight status '{other}'"
            ))),
        }
    }
}

/// Everything that must match for a stored narrative to be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsightKey {
    pub entity_key: String,
    pub data_fingerprint: String,
    pub model_id: String,
    pub prompt_version: String,
}

/// A request to take the single-writer claim for one entity in one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimTicket {
    pub key: InsightKey,
    pub window_key: String,
    pub data_latest_date: Option<String>,
}

/// One row of `indicator_insights_daily`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    #[serde(rename = "code")]
    pub entity_key: String,
    #[serde(rename = "asof_date")]
    pub window_key: String,
    pub data_fingerprint: String,
    pub data_latest_date: Option<String>,
    pub status: InsightStatus,
    #[serde(rename = "model")]
    pub model_id: String,
    pub prompt_version: String,
    pub attempt: i64,
    #[serde(rename = "insight_json")]
    pub result: Option<serde_json::Value>,
    pub headline: Option<String>,
    pub signal_label: Option<String>,
    pub confidence: Option<f64>,
    pub confidence_reason: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl GenerationRecord {
    /// Whether this record may be served for `key` as a cache hit
    pub fn is_hit_for(&self, key: &InsightKey) -> bool {
        self.status == InsightStatus::Done && self.matches_version(key)
    }

    /// Same entity, data fingerprint, model and prompt, in any status
    pub fn matches_version(&self, key: &InsightKey) -> bool {
        self.entity_key == key.entity_key
            && self.data_fingerprint == key.data_fingerprint
            && self.model_id == key.model_id
            && self.prompt_version == key.prompt_version
    }
}

/// Terminal state written back by the claim holder
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Done(IndicatorInsight),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsightCommit {
    pub ticket: ClaimTicket,
    pub attempt: i64,
    pub outcome: CommitOutcome,
}

// ---------------------------------------------------------------------------
// Narrative schema returned by the model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum SignalLabel {
    Bullish,
    Neutral,
    Bearish,
}

impl SignalLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLabel::Bullish => "bullish",
            SignalLabel::Neutral => "neutral",
            SignalLabel::Bearish => "bearish",
        }
    }
}

impl TryFrom<String> for SignalLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "bullish" => Ok(SignalLabel::Bullish),
            "neutral" => Ok(SignalLabel::Neutral),
            "bearish" => Ok(SignalLabel::Bearish),
            other => Err(format!("unknown signal label '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directionality {
    #[serde(default)]
    pub higher_is: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelContext {
    #[serde(default)]
    pub pctile_10y: Option<f64>,
    #[serde(default)]
    pub zscore_3y: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowContext {
    #[serde(default)]
    pub latest_date: Option<String>,
    #[serde(default)]
    pub latest_value: Option<f64>,
    #[serde(default)]
    pub context: Option<LevelContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    #[serde(default)]
    pub delta_1w: Option<f64>,
    #[serde(default)]
    pub delta_1m: Option<f64>,
    #[serde(default)]
    pub delta_3m: Option<f64>,
    #[serde(default)]
    pub momentum_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub why: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchLevels {
    #[serde(default)]
    pub bullish_trigger: Option<Trigger>,
    #[serde(default)]
    pub bearish_trigger: Option<Trigger>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeBullet {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetImpact {
    pub asset: String,
    pub impact: String,
    #[serde(default)]
    pub why: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositioningTilt {
    #[serde(default)]
    pub equity_beta: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub credit_risk: Option<String>,
    #[serde(default)]
    pub cash_buffer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Implications {
    #[serde(default)]
    pub asset_impact: Vec<AssetImpact>,
    #[serde(default)]
    pub positioning_tilt: Option<PositioningTilt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityNotes {
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Structured narrative for a single indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorInsight {
    pub headline: String,
    #[serde(alias = "signal")]
    pub signal_label: SignalLabel,
    pub confidence: f64,
    #[serde(default)]
    pub confidence_reason: Option<String>,
    #[serde(default)]
    pub what_it_measures: Option<String>,
    #[serde(default)]
    pub directionality: Option<Directionality>,
    #[serde(default)]
    pub now: Option<NowContext>,
    #[serde(default)]
    pub momentum: Option<Momentum>,
    #[serde(default)]
    pub watch_levels: Option<WatchLevels>,
    #[serde(default)]
    pub recent_pattern: Option<String>,
    #[serde(default)]
    pub narrative_bullets: Vec<NarrativeBullet>,
    #[serde(default)]
    pub implications: Option<Implications>,
    #[serde(default)]
    pub data_quality: Option<DataQualityNotes>,
}

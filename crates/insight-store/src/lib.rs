//! Persistence for generated narratives.
//!
//! `SqlInsightStore` runs on any sqlx `Any` backend (SQLite locally, Postgres
//! in production). `MemoryInsightStore` keeps everything in process and is
//! used for tests and throwaway runs.

pub mod memory;
pub mod sql;

pub use memory::MemoryInsightStore;
pub use sql::SqlInsightStore;

use chrono::{SecondsFormat, Utc};
use insight_core::{CommitOutcome, InsightResult, InsightStatus};
use serde_json::Value;

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// ordering matches time ordering.
pub(crate) fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Column values written when an attempt reaches a terminal state
pub(crate) struct TerminalColumns {
    pub status: InsightStatus,
    pub result: Option<Value>,
    pub headline: Option<String>,
    pub signal_label: Option<String>,
    pub confidence: Option<f64>,
    pub confidence_reason: Option<String>,
    pub error_message: Option<String>,
}

impl TerminalColumns {
    pub fn from_outcome(outcome: &CommitOutcome) -> InsightResult<Self> {
        Ok(match outcome {
            CommitOutcome::Done(insight) => Self {
                status: InsightStatus::Done,
                result: Some(serde_json::to_value(insight)?),
                headline: Some(insight.headline.clone()),
                signal_label: Some(insight.signal_label.as_str().to_string()),
                confidence: Some(insight.confidence),
                confidence_reason: insight.confidence_reason.clone(),
                error_message: None,
            },
            CommitOutcome::Error(message) => Self {
                status: InsightStatus::Error,
                result: None,
                headline: None,
                signal_label: None,
                confidence: None,
                confidence_reason: None,
                error_message: Some(message.clone()),
            },
        })
    }
}

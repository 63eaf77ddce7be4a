//! Client side of the indicator insight protocol: re-issue the request at a
//! fixed interval until the record reaches a terminal state.

use std::time::Duration;

use insight_core::{GenerationRecord, InsightStatus};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const MAX_ATTEMPTS: u32 = 40;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Still pending after {0} attempts")]
    GaveUp(u32),
}

pub type PollResult<T> = Result<T, PollError>;

/// Terminal state reached by polling
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Done(Box<GenerationRecord>),
    Failed(String),
}

#[derive(Deserialize)]
struct StatusProbe {
    status: InsightStatus,
    #[serde(default)]
    error_message: Option<String>,
}

pub struct InsightPoller {
    client: Client,
    base_url: String,
    interval: Duration,
    max_attempts: u32,
}

impl InsightPoller {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            interval: POLL_INTERVAL,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// One request. `None` while the record is still pending.
    pub async fn check(&self, code: &str) -> PollResult<Option<PollOutcome>> {
        let response = self
            .client
            .post(format!("{}/api/indicator-insight", self.base_url))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let value: serde_json::Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(PollError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(e) => return Err(PollError::InvalidResponse(e.to_string())),
        };

        let probe: StatusProbe = serde_json::from_value(value.clone())
            .map_err(|e| PollError::InvalidResponse(format!("missing status: {e}")))?;

        match probe.status {
            InsightStatus::Pending => Ok(None),
            InsightStatus::Error => Ok(Some(PollOutcome::Failed(
                probe
                    .error_message
                    .unwrap_or_else(|| "generation failed".to_string()),
            ))),
            InsightStatus::Done => {
                let record: GenerationRecord = serde_json::from_value(value)
                    .map_err(|e| PollError::InvalidResponse(format!("bad record: {e}")))?;
                Ok(Some(PollOutcome::Done(Box::new(record))))
            }
        }
    }

    /// Poll until `done` or `error`, giving up after the attempt cap.
    pub async fn poll(&self, code: &str) -> PollResult<PollOutcome> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        for attempt in 1..=self.max_attempts {
            ticker.tick().await;
            if let Some(outcome) = self.check(code).await? {
                tracing::debug!(code, attempt, "Insight reached terminal state");
                return Ok(outcome);
            }
            tracing::debug!(code, attempt, "Insight pending");
        }

        Err(PollError::GaveUp(self.max_attempts))
    }
}

use std::sync::Arc;

use insight_core::{IndicatorFeature, InsightError, InsightResult};
use llm_client::{CompletionRequest, LlmBackend};

use crate::prompt;

pub const MAX_BULLETS: usize = 5;
const TAKEAWAYS_MAX_TOKENS: u32 = 500;
const TAKEAWAYS_TEMPERATURE: f64 = 0.2;

/// Split model text into plain bullets: leading bullet glyphs and
/// whitespace are removed, blank lines dropped, at most `MAX_BULLETS` kept.
pub fn parse_bullets(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '*' | '•'))
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_BULLETS)
        .collect()
}

/// Uncached regime summary over the whole indicator set
#[derive(Clone)]
pub struct TakeawaysGenerator {
    backend: Arc<dyn LlmBackend>,
}

impl TakeawaysGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub async fn generate(&self, features: &[IndicatorFeature]) -> InsightResult<Vec<String>> {
        let request = CompletionRequest::new(
            prompt::TAKEAWAYS_SYSTEM_PROMPT,
            prompt::takeaways_user_prompt(features)?,
        )
        .max_tokens(TAKEAWAYS_MAX_TOKENS)
        .temperature(TAKEAWAYS_TEMPERATURE);

        let text = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| {
                InsightError::Generation(format!("{}: {}", self.backend.backend_name(), e))
            })?;

        let bullets = parse_bullets(&text);
        tracing::info!(count = bullets.len(), "Generated regime takeaways");
        Ok(bullets)
    }
}

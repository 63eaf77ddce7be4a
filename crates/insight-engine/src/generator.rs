use std::sync::Arc;

use insight_core::{HistoryPoint, IndicatorFeature, IndicatorInsight, InsightError, InsightResult};
use llm_client::{extract_json_object, CompletionRequest, LlmBackend};
use serde::de::DeserializeOwned;

use crate::prompt;

/// Pull the first JSON object out of model text and decode it.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> InsightResult<T> {
    let object = extract_json_object(text).ok_or_else(|| {
        InsightError::Generation("no JSON object found in model output".to_string())
    })?;

    serde_json::from_str(object)
        .map_err(|e| InsightError::Generation(format!("model output does not match schema: {e}")))
}

fn validate(insight: &IndicatorInsight) -> InsightResult<()> {
    if insight.headline.trim().is_empty() {
        return Err(InsightError::Generation("empty headline".to_string()));
    }
    if !(0.0..=1.0).contains(&insight.confidence) {
        return Err(InsightError::Generation(format!(
            "confidence {} outside [0, 1]",
            insight.confidence
        )));
    }
    Ok(())
}

/// Produces the structured narrative for one indicator. One backend call per
/// invocation, no retries.
#[derive(Clone)]
pub struct InsightGenerator {
    backend: Arc<dyn LlmBackend>,
}

impl InsightGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub async fn generate(
        &self,
        feature: &IndicatorFeature,
        history: &[HistoryPoint],
        window_key: &str,
    ) -> InsightResult<IndicatorInsight> {
        let request = CompletionRequest::new(
            prompt::INDICATOR_SYSTEM_PROMPT,
            prompt::indicator_user_prompt(feature, history, window_key),
        )
        .json_only();

        let text = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| {
                InsightError::Generation(format!("{}: {}", self.backend.backend_name(), e))
            })?;

        let insight: IndicatorInsight = parse_structured(&text)?;
        validate(&insight)?;
        Ok(insight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ScriptedBackend;

    fn feature() -> IndicatorFeature {
        IndicatorFeature {
            code: "vix".into(),
            latest_value: Some(16.4),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let backend = Arc::new(ScriptedBackend::replying(
            "```json\n{\"headline\":\"Volatility subdued\",\"signal_label\":\"Bullish\",\"confidence\":0.7}\n```",
        ));
        let generator = InsightGenerator::new(backend.clone());

        let insight = generator.generate(&feature(), &[], "2026-03-01").await.unwrap();
        assert_eq!(insight.headline, "Volatility subdued");
        assert_eq!(backend.calls(), 1);
        assert!(backend.last_request().unwrap().json_only);
    }

    #[tokio::test]
    async fn prose_is_a_generation_error() {
        let backend = Arc::new(ScriptedBackend::replying("I cannot help with that."));
        let err = InsightGenerator::new(backend)
            .generate(&feature(), &[], "2026-03-01")
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::Generation(_)));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected() {
        let backend = Arc::new(ScriptedBackend::replying(
            r#"{"headline":"x","signal_label":"neutral","confidence":1.7}"#,
        ));
        let err = InsightGenerator::new(backend)
            .generate(&feature(), &[], "2026-03-01")
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::Generation(msg) if msg.contains("confidence")));
    }

    #[tokio::test]
    async fn backend_failure_is_a_generation_error() {
        let backend = Arc::new(ScriptedBackend::failing());
        let err = InsightGenerator::new(backend)
            .generate(&feature(), &[], "2026-03-01")
            .await
            .unwrap_err();
        assert!(matches!(err, InsightError::Generation(_)));
    }
}

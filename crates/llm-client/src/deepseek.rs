use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LlmError, LlmResult};
use crate::{CompletionRequest, LlmBackend};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client for DeepSeek
#[derive(Clone)]
pub struct DeepSeekClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl DeepSeekClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl LlmBackend for DeepSeekClient {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: request.json_only.then_some(ResponseFormat {
                kind: "json_object",
            }),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(LlmError::from_send)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                backend: self.backend_name(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no completion content".to_string()))?;

        tracing::debug!(model = %self.model, chars = content.len(), "DeepSeek completion received");
        Ok(content)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &'static str {
        "deepseek"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn json_mode_is_requested_and_content_returned() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer ds-key")
            .match_body(Matcher::PartialJsonString(
                r#"{"model":"deepseek-chat","response_format":{"type":"json_object"}}"#.into(),
            ))
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"{\"headline\":\"x\"}"}}]}"#)
            .create_async()
            .await;

        let client = DeepSeekClient::new("ds-key", server.url(), Duration::from_secs(5));
        let request = CompletionRequest::new("sys", "user").json_only();
        let text = client.complete(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, r#"{"headline":"x"}"#);
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(402)
            .with_body("insufficient balance")
            .create_async()
            .await;

        let client = DeepSeekClient::new("ds-key", server.url(), Duration::from_secs(5));
        let err = client
            .complete(&CompletionRequest::new("sys", "user"))
            .await
            .unwrap_err();

        match err {
            LlmError::Api { status, body, .. } => {
                assert_eq!(status, 402);
                assert_eq!(body, "insufficient balance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_invalid() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = DeepSeekClient::new("ds-key", server.url(), Duration::from_secs(5));
        let err = client
            .complete(&CompletionRequest::new("sys", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}

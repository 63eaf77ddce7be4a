pub mod anthropic;
pub mod deepseek;
pub mod error;
pub mod extract;

pub use anthropic::AnthropicClient;
pub use deepseek::DeepSeekClient;
pub use error::{LlmError, LlmResult};
pub use extract::extract_json_object;

use async_trait::async_trait;

/// One prompt round trip
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Ask the backend to constrain output to a single JSON object when it
    /// supports that
    pub json_only: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            json_only: false,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn json_only(mut self) -> Self {
        self.json_only = true;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Backend-agnostic text generation.
///
/// Implemented by the hosted chat APIs and by scripted fakes in tests.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send one prompt and return the raw text of the first completion.
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String>;

    /// Model identifier recorded next to every cached result
    fn model_id(&self) -> &str;

    fn backend_name(&self) -> &'static str;
}

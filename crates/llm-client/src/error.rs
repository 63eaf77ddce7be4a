use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("{backend} returned HTTP {status}: {body}")]
    Api {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LlmError {
    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::RequestFailed(err)
        }
    }
}

pub type LlmResult<T> = Result<T, LlmError>;

use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:insights.db";
pub const DEFAULT_WINDOW_TZ: &str = "Asia/Singapore";

/// Process configuration, read once at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Data source
    pub supabase_url: String,
    pub supabase_service_key: String,

    // Generation backends
    pub deepseek_api_key: String,
    pub deepseek_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub llm_timeout: Duration,

    // Insight store; "memory" keeps records in process
    pub database_url: String,
    pub window_tz: String,

    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).with_context(|| format!("{key} not set"));

        let llm_timeout_secs: u64 = get("LLM_TIMEOUT_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .context("LLM_TIMEOUT_SECS must be a whole number of seconds")?;

        Ok(Self {
            supabase_url: required("SUPABASE_URL")?,
            supabase_service_key: required("SUPABASE_SERVICE_KEY")?,
            deepseek_api_key: required("DEEPSEEK_API_KEY")?,
            deepseek_base_url: get("DEEPSEEK_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DEEPSEEK_BASE_URL.to_string()),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            window_tz: get("INSIGHT_WINDOW_TZ").unwrap_or_else(|| DEFAULT_WINDOW_TZ.to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.eq_ignore_ascii_case("memory")
    }
}

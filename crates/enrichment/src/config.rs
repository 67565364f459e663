use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_MODEL: &str = "Qwen3-VL-4B-Instruct-GGUF";
pub const DEFAULT_MAX_TOKENS: u32 = 100;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 20;
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 6;

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl EnrichmentConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Reads `VISITGATE_ENRICHMENT_*`, falling back to the local defaults.
    pub fn from_env() -> Self {
        let base_url = env::var("VISITGATE_ENRICHMENT_BASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = env::var("VISITGATE_ENRICHMENT_MODEL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let request_timeout = Duration::from_secs(
            env::var("VISITGATE_ENRICHMENT_TIMEOUT_SECONDS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        );
        let connect_timeout = Duration::from_secs(
            env::var("VISITGATE_ENRICHMENT_CONNECT_TIMEOUT_SECONDS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS),
        );

        Self {
            connect_timeout,
            request_timeout,
            ..Self::new(base_url, model)
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, request_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.request_timeout = request_timeout;
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

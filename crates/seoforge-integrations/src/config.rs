//! Provider configuration loaded from the environment.
//!
//! One settings struct per provider, all sharing the same key scheme:
//! `SEOFORGE_<PROVIDER>_API_KEY`, `_API_URL`, `_TIMEOUT_SECS`, `_MAX_RETRIES`,
//! `_RETRY_DELAY_MS`, `_CIRCUIT_FAILURE_THRESHOLD`,
//! `_CIRCUIT_RECOVERY_TIMEOUT_SECS`. Missing keys fall back to code defaults.

use std::env;
use std::time::Duration;

use seoforge_utils::{CircuitBreakerConfig, RetryPolicy};

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Shared per-provider settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

impl ProviderSettings {
    /// Load settings for `provider` (upper-snake prefix, e.g. `POP`), with
    /// `default_url` used when no URL override is present.
    pub fn from_env(provider: &str, default_url: &str) -> Self {
        let prefix = format!("SEOFORGE_{provider}");
        Self {
            api_key: env_string(&format!("{prefix}_API_KEY")),
            api_url: env_string(&format!("{prefix}_API_URL"))
                .unwrap_or_else(|| default_url.to_string()),
            timeout: Duration::from_secs(env_u64(&format!("{prefix}_TIMEOUT_SECS"), 60)),
            retry: RetryPolicy::new(
                env_u32(&format!("{prefix}_MAX_RETRIES"), 3),
                Duration::from_millis(env_u64(&format!("{prefix}_RETRY_DELAY_MS"), 1_000)),
            ),
            breaker: CircuitBreakerConfig {
                failure_threshold: env_u32(&format!("{prefix}_CIRCUIT_FAILURE_THRESHOLD"), 5),
                recovery_timeout: Duration::from_secs(env_u64(
                    &format!("{prefix}_CIRCUIT_RECOVERY_TIMEOUT_SECS"),
                    60,
                )),
            },
        }
    }
}

/// Optimization-provider settings: shared settings plus task polling knobs.
#[derive(Debug, Clone)]
pub struct PopSettings {
    pub provider: ProviderSettings,
    pub task_poll_interval: Duration,
    pub task_timeout: Duration,
}

impl PopSettings {
    pub fn from_env() -> Self {
        Self {
            provider: ProviderSettings::from_env("POP", "https://api.pageoptimizer.pro/api"),
            task_poll_interval: Duration::from_secs(env_u64(
                "SEOFORGE_POP_TASK_POLL_INTERVAL_SECS",
                2,
            )),
            task_timeout: Duration::from_secs(env_u64("SEOFORGE_POP_TASK_TIMEOUT_SECS", 300)),
        }
    }
}

/// Keyword-volume provider settings: shared settings plus lookup defaults.
#[derive(Debug, Clone)]
pub struct KeywordVolumeSettings {
    pub provider: ProviderSettings,
    pub country: String,
    pub currency: String,
    pub data_source: String,
}

impl KeywordVolumeSettings {
    pub fn from_env() -> Self {
        Self {
            provider: ProviderSettings::from_env(
                "KEYWORDS",
                "https://api.keywordseverywhere.com",
            ),
            country: env_string("SEOFORGE_KEYWORDS_COUNTRY").unwrap_or_else(|| "us".to_string()),
            currency: env_string("SEOFORGE_KEYWORDS_CURRENCY")
                .unwrap_or_else(|| "USD".to_string()),
            data_source: env_string("SEOFORGE_KEYWORDS_DATA_SOURCE")
                .unwrap_or_else(|| "gkp".to_string()),
        }
    }
}

/// LLM completion provider settings: shared settings plus model choice.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: ProviderSettings,
    pub model: String,
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self {
            provider: ProviderSettings::from_env("LLM", "https://api.anthropic.com/v1"),
            model: env_string("SEOFORGE_LLM_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
        }
    }
}

/// NLP entity provider settings: shared settings plus API version.
#[derive(Debug, Clone)]
pub struct NlpSettings {
    pub provider: ProviderSettings,
    pub api_version: String,
}

impl NlpSettings {
    pub fn from_env() -> Self {
        Self {
            provider: ProviderSettings::from_env("NLP", "https://language.googleapis.com"),
            api_version: env_string("SEOFORGE_NLP_API_VERSION")
                .unwrap_or_else(|| "v1".to_string()),
        }
    }
}

// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

fn default_confidence_threshold() -> u8 {
    75
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_call_limit() -> u32 {
    100
}
fn default_call_window_secs() -> u64 {
    60
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "ENV" means: read from GOOGLE_AI_API_KEY.
    pub api_key: String,
    /// Raw classifier confidence (0–100) at/above which its spam signal
    /// becomes a rejection. Defaults to 75.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,
    /// How long a classification is reused for identical context.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Global quota protecting the remote API: calls per window.
    #[serde(default = "default_call_limit")]
    pub call_limit_per_window: u32,
    #[serde(default = "default_call_window_secs")]
    pub call_window_secs: u64,
    /// Hard bound on one remote call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Override for tests / self-hosted gateways.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            confidence_threshold: default_confidence_threshold(),
            cache_ttl_secs: default_cache_ttl_secs(),
            call_limit_per_window: default_call_limit(),
            call_window_secs: default_call_window_secs(),
            timeout_secs: default_timeout_secs(),
            endpoint: None,
        }
    }
}

impl AiConfig {
    /// Load from a JSON file. A missing file means "classifier off".
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        // Resolve api key if "ENV". A missing key degrades the classifier
        // instead of failing the whole service (configuration errors are
        // a degrade path, not a fatal one).
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = env::var("GOOGLE_AI_API_KEY").unwrap_or_default();
        }

        // Sanitize bounds.
        cfg.confidence_threshold = cfg.confidence_threshold.min(100);
        if cfg.call_window_secs == 0 {
            cfg.call_window_secs = default_call_window_secs();
        }
        if cfg.timeout_secs == 0 {
            cfg.timeout_secs = default_timeout_secs();
        }

        Ok(cfg)
    }

    /// The classifier only runs with a key present and the switch on.
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let c = AiConfig::default();
        assert!(!c.enabled);
        assert!(!c.is_configured());
        assert_eq!(c.confidence_threshold, 75);
        assert_eq!(c.cache_ttl_secs, 3600);
        assert_eq!(c.call_limit_per_window, 100);
        assert_eq!(c.timeout_secs, 30);
    }

    #[test]
    fn enabled_without_key_is_not_configured() {
        let c = AiConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(!c.is_configured());
    }
}

// src/config/mod.rs
//! Configuration surface of the protection pipeline.
//!
//! `ProtectionConfig` is an explicit struct with named fields and
//! documented defaults, not an associative options array with implicit
//! fallbacks. Loaded from `config/protection.toml`; a missing file means
//! "all defaults", a malformed file is an error.

pub mod ai;

pub use ai::AiConfig;

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::fingerprint::FingerprintStrategy;

fn default_true() -> bool {
    true
}
fn default_min_time_seconds() -> u64 {
    3
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_max_submissions() -> u32 {
    5
}
fn default_spam_threshold() -> u32 {
    50
}
fn default_pattern_retention_days() -> u32 {
    90
}
fn default_pattern_min_confidence() -> f32 {
    60.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    /// Toggle the honeypot check.
    #[serde(default = "default_true")]
    pub honeypot_enabled: bool,
    /// Minimum seconds a human needs on the form; 0 disables the check.
    #[serde(default = "default_min_time_seconds")]
    pub min_time_seconds: u64,
    /// Sliding window for the per-IP rate limiter.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Max submissions per IP per window.
    #[serde(default = "default_max_submissions")]
    pub max_submissions: u32,
    /// Aggregate heuristic score at/above which a submission is spam.
    #[serde(default = "default_spam_threshold")]
    pub spam_threshold: u32,
    /// Toggle automatic pattern learning from confirmed spam.
    #[serde(default = "default_true")]
    pub auto_learning_enabled: bool,
    /// Prune: drop low-confidence patterns older than this.
    #[serde(default = "default_pattern_retention_days")]
    pub pattern_retention_days: u32,
    /// Prune: confidence floor below which old patterns are dropped.
    #[serde(default = "default_pattern_min_confidence")]
    pub pattern_min_confidence: f32,
    /// How the pattern-fallback path matches stored fingerprints.
    #[serde(default)]
    pub fingerprint_strategy: FingerprintStrategy,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            honeypot_enabled: true,
            min_time_seconds: default_min_time_seconds(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            max_submissions: default_max_submissions(),
            spam_threshold: default_spam_threshold(),
            auto_learning_enabled: true,
            pattern_retention_days: default_pattern_retention_days(),
            pattern_min_confidence: default_pattern_min_confidence(),
            fingerprint_strategy: FingerprintStrategy::default(),
        }
    }
}

impl ProtectionConfig {
    /// Load from a TOML file. A missing file yields defaults; a present
    /// but invalid file is a hard error (bad config should not silently
    /// weaken protection).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let cfg: ProtectionConfig = toml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate_limit_window_secs == 0 {
            anyhow::bail!("rate_limit_window_secs must be > 0");
        }
        if self.max_submissions == 0 {
            anyhow::bail!("max_submissions must be > 0");
        }
        if self.spam_threshold == 0 {
            anyhow::bail!("spam_threshold must be > 0");
        }
        if !(0.0..=100.0).contains(&self.pattern_min_confidence) {
            anyhow::bail!("pattern_min_confidence must be within 0..=100");
        }
        Ok(())
    }
}

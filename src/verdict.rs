//! verdict.rs — structures for the spam verdict and its reason trail.
//!
//! The goal: a standardized output for accept/flag/reject + confidence +
//! machine-usable reasons, so callers (and tests) never parse free text.

use serde::{Deserialize, Serialize};

/// Closed set of reason codes a verdict can carry. Serialized snake_case
/// so callers see stable string tags ("honeypot", "time_validation", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    BlockedIp,
    Honeypot,
    TimeValidation,
    RateLimit,
    ContentAnalysis,
    AuthorAnalysis,
    UrlAnalysis,
    AiAnalysis,
    PatternFallback,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::BlockedIp => "blocked_ip",
            ReasonCode::Honeypot => "honeypot",
            ReasonCode::TimeValidation => "time_validation",
            ReasonCode::RateLimit => "rate_limit",
            ReasonCode::ContentAnalysis => "content_analysis",
            ReasonCode::AuthorAnalysis => "author_analysis",
            ReasonCode::UrlAnalysis => "url_analysis",
            ReasonCode::AiAnalysis => "ai_analysis",
            ReasonCode::PatternFallback => "pattern_fallback",
        }
    }
}

/// Which layer produced the decisive signal (analytics label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Blocklist,
    Honeypot,
    TimeValidation,
    RateLimit,
    AiAnalysis,
    ContentHeuristics,
    PatternFallback,
    Clean,
}

/// What the caller should do with the submission. Matches the classifier
/// contract's `recommended_action` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Block,
    Flag,
    #[default]
    Allow,
}

/// Parsed classifier output, kept verbatim on the verdict for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(default)]
    pub is_spam: bool,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub spam_indicators: Vec<String>,
    #[serde(default = "default_threat_type")]
    pub threat_type: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub recommended_action: RecommendedAction,
}

fn default_threat_type() -> String {
    "legitimate".to_string()
}

impl Default for AiAnalysis {
    /// The safe fallback object applied when the remote output is
    /// unusable: never spam, zero confidence, allow.
    fn default() -> Self {
        Self {
            is_spam: false,
            confidence: 0,
            spam_indicators: Vec::new(),
            threat_type: default_threat_type(),
            reasoning: String::new(),
            recommended_action: RecommendedAction::Allow,
        }
    }
}

/// Output of one evaluation. Created once, immutable, handed to the
/// caller and (for confirmed spam) to the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_spam: bool,
    /// 0–100.
    pub confidence: u8,
    /// Ordered trail of every triggered reason, first authoritative hit
    /// first. Accumulated, not just the decisive one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<ReasonCode>,
    pub detection_method: DetectionMethod,
    pub recommended_action: RecommendedAction,
    /// Raw classifier analysis when the AI layer contributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<AiAnalysis>,
}

impl Verdict {
    pub fn spam(confidence: u8, method: DetectionMethod) -> Self {
        let confidence = confidence.min(100);
        Self {
            is_spam: true,
            confidence,
            reasons: Vec::new(),
            detection_method: method,
            // High-confidence spam is rejected outright, borderline spam
            // is surfaced for moderation.
            recommended_action: if confidence >= 80 {
                RecommendedAction::Block
            } else {
                RecommendedAction::Flag
            },
            ai_analysis: None,
        }
    }

    pub fn clean(aux_confidence: u8) -> Self {
        Self {
            is_spam: false,
            confidence: aux_confidence.min(100),
            reasons: Vec::new(),
            detection_method: DetectionMethod::Clean,
            recommended_action: RecommendedAction::Allow,
            ai_analysis: None,
        }
    }

    /// Appends one reason (builder style).
    pub fn with_reason(mut self, reason: ReasonCode) -> Self {
        self.reasons.push(reason);
        self
    }

    /// Appends a whole trail, preserving order.
    pub fn with_reasons(mut self, reasons: impl IntoIterator<Item = ReasonCode>) -> Self {
        self.reasons.extend(reasons);
        self
    }

    pub fn with_ai_analysis(mut self, analysis: AiAnalysis) -> Self {
        self.ai_analysis = Some(analysis);
        self
    }

    pub fn has_reason(&self, reason: ReasonCode) -> bool {
        self.reasons.contains(&reason)
    }
}

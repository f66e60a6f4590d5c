//! fingerprint.rs — canonical feature fingerprints for learned spam.
//!
//! A fingerprint is a canonicalized summary of a submission (length
//! bucket, link flag, indicator list, threat type, IP, user-agent
//! family) hashed to a stable hex key. The learner writes them, the
//! pattern-fallback path matches against them.
//!
//! Matching is strategy-driven: the original exact-feature comparison is
//! deliberately weak (two unrelated messages in the same length bucket
//! both carrying links collide), so a similarity strategy over a stored
//! content preview can be selected instead without changing the pipeline
//! contract.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analyze::heuristics::link_count;
use crate::context::SubmissionContext;

/// Width of the content-length bucket in chars. Coarse enough that
/// trivial padding does not defeat the fingerprint.
const LEN_BUCKET_WIDTH: usize = 50;

static UA_FAMILY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:Chrome|Firefox|Safari)/[\d.]+").expect("ua family regex"));

/// How stored patterns are compared against an incoming submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FingerprintStrategy {
    /// IP equality, or (length bucket, has-links) equality. The
    /// original's behavior; collision-prone but cheap.
    #[default]
    ExactFeatures,
    /// Normalized Levenshtein similarity over the stored content
    /// preview; IP equality still short-circuits.
    Similarity { threshold: f32 },
}

/// Raw feature payload stored alongside each pattern hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFeatures {
    pub content_len_bucket: u32,
    pub has_links: bool,
    #[serde(default)]
    pub spam_indicators: Vec<String>,
    pub threat_type: String,
    pub ip: String,
    pub user_agent_family: String,
    /// First 100 chars of the content; consulted only by the similarity
    /// strategy, never part of the hash.
    #[serde(default)]
    pub content_preview: String,
}

impl PatternFeatures {
    pub fn from_context(
        ctx: &SubmissionContext,
        spam_indicators: Vec<String>,
        threat_type: &str,
    ) -> Self {
        Self {
            content_len_bucket: (ctx.content.chars().count() / LEN_BUCKET_WIDTH) as u32,
            has_links: link_count(&ctx.content) > 0,
            spam_indicators,
            threat_type: threat_type.to_string(),
            ip: ctx.source_ip.clone(),
            user_agent_family: user_agent_family(&ctx.user_agent),
            content_preview: ctx.content_preview(),
        }
    }

    /// Stable hex hash over the canonical feature tuple. The indicator
    /// list is sorted first so ordering differences never split a
    /// fingerprint.
    pub fn hash(&self) -> String {
        let mut indicators = self.spam_indicators.clone();
        indicators.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.content_len_bucket.to_le_bytes());
        hasher.update([self.has_links as u8]);
        for ind in &indicators {
            hasher.update(ind.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.threat_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.ip.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.user_agent_family.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Does this stored feature set match an incoming one under the
    /// given strategy?
    pub fn matches(&self, incoming: &PatternFeatures, strategy: FingerprintStrategy) -> bool {
        // Same source IP is decisive under every strategy.
        if !self.ip.is_empty() && self.ip == incoming.ip {
            return true;
        }
        match strategy {
            FingerprintStrategy::ExactFeatures => {
                self.content_len_bucket == incoming.content_len_bucket
                    && self.has_links == incoming.has_links
            }
            FingerprintStrategy::Similarity { threshold } => {
                if self.content_preview.is_empty() || incoming.content_preview.is_empty() {
                    return false;
                }
                strsim::normalized_levenshtein(&self.content_preview, &incoming.content_preview)
                    >= f64::from(threshold.clamp(0.0, 1.0))
            }
        }
    }
}

/// Browser-and-version prefix of a user-agent string, or "unknown".
pub fn user_agent_family(user_agent: &str) -> String {
    UA_FAMILY_RE
        .find(user_agent)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntryKind;

    fn ctx(content: &str, ip: &str, ua: &str) -> SubmissionContext {
        SubmissionContext {
            content: content.to_string(),
            author_name: String::new(),
            author_email: String::new(),
            author_url: String::new(),
            source_ip: ip.to_string(),
            user_agent: ua.to_string(),
            form_loaded_at: None,
            submitted_at: 0,
            entry_kind: EntryKind::Comment,
            honeypot: String::new(),
        }
    }

    #[test]
    fn hash_is_stable_under_indicator_order() {
        let mut a = PatternFeatures::from_context(
            &ctx("hello", "1.1.1.1", ""),
            vec!["links".into(), "caps".into()],
            "promotional",
        );
        let b = PatternFeatures::from_context(
            &ctx("hello", "1.1.1.1", ""),
            vec!["caps".into(), "links".into()],
            "promotional",
        );
        assert_eq!(a.hash(), b.hash());

        a.threat_type = "bot".into();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn exact_strategy_matches_on_ip_or_shape() {
        let stored = PatternFeatures::from_context(
            &ctx("buy now http://x.example padded to some length", "9.9.9.9", ""),
            vec![],
            "promotional",
        );

        // Same IP, different content.
        let same_ip = PatternFeatures::from_context(&ctx("whatever", "9.9.9.9", ""), vec![], "x");
        assert!(stored.matches(&same_ip, FingerprintStrategy::ExactFeatures));

        // Same length bucket and link flag, different IP.
        let same_shape = PatternFeatures::from_context(
            &ctx("get it now http://y.example also about this long", "8.8.8.8", ""),
            vec![],
            "x",
        );
        assert!(stored.matches(&same_shape, FingerprintStrategy::ExactFeatures));

        // No links, different bucket.
        let different = PatternFeatures::from_context(&ctx("hi", "8.8.8.8", ""), vec![], "x");
        assert!(!stored.matches(&different, FingerprintStrategy::ExactFeatures));
    }

    #[test]
    fn similarity_strategy_needs_close_previews() {
        let stored = PatternFeatures::from_context(
            &ctx("Cheap watches, buy now at http://w.example", "9.9.9.9", ""),
            vec![],
            "promotional",
        );
        let close = PatternFeatures::from_context(
            &ctx("Cheap watches, buy now at http://v.example", "7.7.7.7", ""),
            vec![],
            "x",
        );
        let far = PatternFeatures::from_context(
            &ctx("Thanks for the thoughtful article, bookmarked.", "7.7.7.7", ""),
            vec![],
            "x",
        );
        let strat = FingerprintStrategy::Similarity { threshold: 0.85 };
        assert!(stored.matches(&close, strat));
        assert!(!stored.matches(&far, strat));
    }

    #[test]
    fn ua_family_extraction() {
        assert_eq!(
            user_agent_family("Mozilla/5.0 (X11; Linux) Chrome/124.0.0.0 Safari/537.36"),
            "Chrome/124.0.0.0"
        );
        assert_eq!(
            user_agent_family("Mozilla/5.0 (X11; Linux; rv:109.0) Gecko/20100101 Firefox/118.0"),
            "Firefox/118.0"
        );
        assert_eq!(user_agent_family("curl/8.5.0"), "unknown");
    }
}

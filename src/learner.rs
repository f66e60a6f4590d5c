//! learner.rs — turns confirmed spam verdicts into stored fingerprints.
//!
//! The gate is deliberately strict: only spam with confidence above 80
//! is learned, so borderline heuristic hits never pollute the pattern
//! store. Repeat detections converge through the store's upsert.

use std::sync::Arc;

use tracing::debug;

use crate::context::SubmissionContext;
use crate::fingerprint::PatternFeatures;
use crate::patterns::{PatternStore, ThreatPattern};
use crate::verdict::{DetectionMethod, Verdict};

/// Confidence a verdict must exceed before it is worth remembering.
const LEARN_CONFIDENCE_FLOOR: u8 = 80;

/// Only verdicts that judged the CONTENT are worth fingerprinting.
/// Environmental rejections (blocklist, honeypot, timing, rate limit)
/// describe the circumstances of one request; storing them would key a
/// permanent pattern to an IP that merely submitted too often.
fn learnable(method: DetectionMethod) -> bool {
    matches!(
        method,
        DetectionMethod::AiAnalysis | DetectionMethod::ContentHeuristics
    )
}

pub struct PatternLearner {
    store: Arc<dyn PatternStore>,
    enabled: bool,
}

impl PatternLearner {
    pub fn new(store: Arc<dyn PatternStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Record a verdict. Returns the stored pattern when the verdict
    /// passed the learning gate, `None` otherwise.
    pub async fn observe(
        &self,
        ctx: &SubmissionContext,
        verdict: &Verdict,
        indicators: Vec<String>,
    ) -> Option<ThreatPattern> {
        if !self.enabled
            || !verdict.is_spam
            || !learnable(verdict.detection_method)
            || verdict.confidence <= LEARN_CONFIDENCE_FLOOR
        {
            return None;
        }

        let threat_type = verdict
            .ai_analysis
            .as_ref()
            .map(|a| a.threat_type.as_str())
            .unwrap_or("heuristic");

        let features = PatternFeatures::from_context(ctx, indicators, threat_type);
        let pattern = self
            .store
            .upsert(
                features,
                f32::from(verdict.confidence),
                threat_type,
                verdict.ai_analysis.clone(),
            )
            .await;

        debug!(
            hash = %pattern.hash,
            count = pattern.detection_count,
            confidence = pattern.confidence,
            "learned threat pattern"
        );
        Some(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntryKind;
    use crate::patterns::MemoryPatternStore;
    use crate::verdict::{AiAnalysis, DetectionMethod};

    fn ctx() -> SubmissionContext {
        SubmissionContext {
            content: "buy viagra now http://p.example http://q.example http://r.example".into(),
            author_name: "x".into(),
            author_email: String::new(),
            author_url: String::new(),
            source_ip: "203.0.113.5".into(),
            user_agent: "Mozilla/5.0 Chrome/124.0".into(),
            form_loaded_at: None,
            submitted_at: 0,
            entry_kind: EntryKind::Comment,
            honeypot: String::new(),
        }
    }

    #[tokio::test]
    async fn gate_requires_high_confidence_spam() {
        let store = Arc::new(MemoryPatternStore::new());
        let learner = PatternLearner::new(store.clone(), true);

        let clean = Verdict::clean(95);
        assert!(learner.observe(&ctx(), &clean, vec![]).await.is_none());

        let borderline = Verdict::spam(80, DetectionMethod::ContentHeuristics);
        assert!(
            learner.observe(&ctx(), &borderline, vec![]).await.is_none(),
            "exactly 80 must not be learned"
        );

        let strong = Verdict::spam(90, DetectionMethod::ContentHeuristics);
        let learned = learner.observe(&ctx(), &strong, vec![]).await.unwrap();
        assert_eq!(learned.pattern_type, "heuristic");
        assert_eq!(learned.detection_count, 1);
    }

    #[tokio::test]
    async fn ai_threat_type_wins_over_heuristic_label() {
        let store = Arc::new(MemoryPatternStore::new());
        let learner = PatternLearner::new(store, true);

        let verdict = Verdict::spam(92, DetectionMethod::AiAnalysis).with_ai_analysis(AiAnalysis {
            is_spam: true,
            confidence: 92,
            threat_type: "promotional".into(),
            ..Default::default()
        });
        let learned = learner.observe(&ctx(), &verdict, vec![]).await.unwrap();
        assert_eq!(learned.pattern_type, "promotional");
        assert!(learned.ai_analysis.is_some());
    }

    #[tokio::test]
    async fn environmental_rejections_are_never_learned() {
        let store = Arc::new(MemoryPatternStore::new());
        let learner = PatternLearner::new(store.clone(), true);

        // All issued at full confidence by the engine, none of them says
        // anything about the content.
        for method in [
            DetectionMethod::RateLimit,
            DetectionMethod::Blocklist,
            DetectionMethod::Honeypot,
            DetectionMethod::PatternFallback,
        ] {
            let verdict = Verdict::spam(100, method);
            assert!(
                learner.observe(&ctx(), &verdict, vec![]).await.is_none(),
                "{method:?} must not be fingerprinted"
            );
        }
        assert_eq!(store.summary().await.total_patterns, 0);
    }

    #[tokio::test]
    async fn disabled_learner_stores_nothing() {
        let store = Arc::new(MemoryPatternStore::new());
        let learner = PatternLearner::new(store.clone(), false);
        let strong = Verdict::spam(99, DetectionMethod::Honeypot);
        assert!(learner.observe(&ctx(), &strong, vec![]).await.is_none());
        assert_eq!(store.summary().await.total_patterns, 0);
    }
}

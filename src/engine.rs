//! # Decision Engine
//! Orchestrates one evaluation: authoritative gates first (blocklist,
//! honeypot, timing, rate limit), then the AI classifier, then the local
//! heuristic aggregate, then the learned-pattern fallback when the
//! classifier is unavailable. Every verdict is recorded to the
//! evaluation log and offered to the learner.

use std::sync::Arc;

use tracing::{debug, info};

use crate::analyze::ai_adapter::DynClassifier;
use crate::analyze::heuristics::{
    self, honeypot_triggered, submitted_too_fast, TIMING_SCORE,
};
use crate::blocklist::BlockedIpSet;
use crate::config::ProtectionConfig;
use crate::context::SubmissionContext;
use crate::fingerprint::PatternFeatures;
use crate::history::EvaluationLog;
use crate::learner::PatternLearner;
use crate::patterns::PatternStore;
use crate::rate_limit::RateLimiter;
use crate::verdict::{DetectionMethod, ReasonCode, Verdict};

pub struct DecisionEngine {
    config: ProtectionConfig,
    blocklist: Arc<BlockedIpSet>,
    rate_limiter: RateLimiter,
    classifier: DynClassifier,
    patterns: Arc<dyn PatternStore>,
    learner: PatternLearner,
    history: Arc<EvaluationLog>,
}

impl DecisionEngine {
    pub fn new(
        config: ProtectionConfig,
        blocklist: Arc<BlockedIpSet>,
        rate_limiter: RateLimiter,
        classifier: DynClassifier,
        patterns: Arc<dyn PatternStore>,
        history: Arc<EvaluationLog>,
    ) -> Self {
        let learner = PatternLearner::new(Arc::clone(&patterns), config.auto_learning_enabled);
        Self {
            config,
            blocklist,
            rate_limiter,
            classifier,
            patterns,
            learner,
            history,
        }
    }

    /// Evaluate one submission. Always returns a verdict; degraded
    /// collaborators (rate-limit store, classifier) weaken the signal,
    /// never fail the call.
    pub async fn evaluate(&self, ctx: &SubmissionContext) -> Verdict {
        metrics::counter!("spamshield_evaluations_total").increment(1);

        // Authoritative gates: first hit decides, in fixed order.
        if self.blocklist.contains(&ctx.source_ip) {
            let v = Verdict::spam(100, DetectionMethod::Blocklist).with_reason(ReasonCode::BlockedIp);
            return self.finish(ctx, v, Vec::new()).await;
        }

        if self.config.honeypot_enabled && honeypot_triggered(ctx) {
            let v = Verdict::spam(100, DetectionMethod::Honeypot).with_reason(ReasonCode::Honeypot);
            return self.finish(ctx, v, Vec::new()).await;
        }

        if self.config.min_time_seconds > 0
            && submitted_too_fast(ctx, self.config.min_time_seconds)
        {
            let v = Verdict::spam(TIMING_SCORE as u8, DetectionMethod::TimeValidation)
                .with_reason(ReasonCode::TimeValidation);
            return self.finish(ctx, v, Vec::new()).await;
        }

        if !self.rate_limiter.allow(&ctx.source_ip) {
            let v = Verdict::spam(100, DetectionMethod::RateLimit).with_reason(ReasonCode::RateLimit);
            return self.finish(ctx, v, Vec::new()).await;
        }

        // Non-authoritative layers. Heuristics run regardless so their
        // reasons and indicators enrich whatever layer decides.
        let report = heuristics::evaluate(ctx);

        let classification = self.classifier.classify(ctx).await;
        let classifier_answered = classification.is_some();
        let mut aux_confidence = 0u8;
        let mut clean_analysis = None;

        if let Some(c) = classification {
            if c.spam_signal {
                let v = Verdict::spam(c.analysis.confidence, DetectionMethod::AiAnalysis)
                    .with_reasons(report.reasons.clone())
                    .with_reason(ReasonCode::AiAnalysis)
                    .with_ai_analysis(c.analysis);
                return self.finish(ctx, v, report.indicators).await;
            }
            aux_confidence = c.analysis.confidence;
            clean_analysis = Some(c.analysis);
        }

        if report.is_spam(&self.config) {
            let v = Verdict::spam(
                report.score.min(100) as u8,
                DetectionMethod::ContentHeuristics,
            )
            .with_reasons(report.reasons.clone());
            return self.finish(ctx, v, report.indicators).await;
        }

        // Learned-pattern fallback covers the window where the
        // classifier is down or unconfigured.
        if !classifier_answered {
            let probe = PatternFeatures::from_context(ctx, report.indicators.clone(), "unknown");
            if let Some(hit) = self
                .patterns
                .match_fallback(&probe, self.config.fingerprint_strategy)
                .await
            {
                debug!(hash = %hit.hash, "pattern fallback matched");
                let v = Verdict::spam(hit.confidence as u8, DetectionMethod::PatternFallback)
                    .with_reasons(report.reasons.clone())
                    .with_reason(ReasonCode::PatternFallback);
                return self.finish(ctx, v, report.indicators).await;
            }
        }

        let mut v = Verdict::clean(aux_confidence);
        if let Some(analysis) = clean_analysis {
            v = v.with_ai_analysis(analysis);
        }
        self.finish(ctx, v, report.indicators).await
    }

    async fn finish(
        &self,
        ctx: &SubmissionContext,
        verdict: Verdict,
        indicators: Vec<String>,
    ) -> Verdict {
        if verdict.is_spam {
            metrics::counter!("spamshield_spam_blocked_total").increment(1);
            info!(
                ip = %ctx.source_ip,
                kind = ctx.entry_kind.as_str(),
                method = ?verdict.detection_method,
                confidence = verdict.confidence,
                "submission rejected"
            );
        }
        self.history.record(ctx, &verdict);
        self.learner.observe(ctx, &verdict, indicators).await;
        verdict
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    pub fn blocklist(&self) -> &BlockedIpSet {
        &self.blocklist
    }

    pub fn patterns(&self) -> &Arc<dyn PatternStore> {
        &self.patterns
    }

    pub fn history(&self) -> &EvaluationLog {
        &self.history
    }
}

//! patterns.rs — the threat pattern store: learned spam fingerprints.
//!
//! The trait is the seam to the storage collaborator; the in-memory
//! implementation ships with the crate and is what the service runs with
//! by default. Upsert is a single map-entry operation so concurrent
//! identical spam bursts can never create duplicate rows.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::{FingerprintStrategy, PatternFeatures};
use crate::verdict::AiAnalysis;

/// Confidence bump applied on a repeat detection, capped at 100.
const REPEAT_CONFIDENCE_STEP: f32 = 5.0;

/// Stored patterns only participate in the fallback match above this
/// confidence.
pub const FALLBACK_CONFIDENCE_FLOOR: f32 = 80.0;

/// A learned, reusable fingerprint of previously confirmed spam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatPattern {
    pub hash: String,
    pub pattern_type: String,
    pub confidence: f32,
    pub detection_count: u32,
    pub last_detected: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub features: PatternFeatures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<AiAnalysis>,
    pub verified: bool,
}

/// Retention policy for `prune`. Two tiers: old low-confidence rows, and
/// younger one-off detections that never recurred.
#[derive(Debug, Clone, Copy)]
pub struct PrunePolicy {
    pub max_age_days: u32,
    pub min_confidence: f32,
    pub stale_age_days: u32,
    pub stale_min_confidence: f32,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            max_age_days: 90,
            min_confidence: 60.0,
            stale_age_days: 30,
            stale_min_confidence: 75.0,
        }
    }
}

/// Aggregate view for the stats surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreatSummary {
    pub total_patterns: usize,
    /// Patterns seen within the last 24 hours.
    pub recent_patterns: usize,
    /// High-confidence (>= 75) patterns currently active.
    pub active_patterns: usize,
    /// (pattern_type, count) pairs, most frequent first.
    pub top_threat_types: Vec<(String, usize)>,
}

/// Storage collaborator seam for learned patterns.
#[async_trait]
pub trait PatternStore: Send + Sync {
    async fn lookup(&self, hash: &str) -> Option<ThreatPattern>;

    /// Insert-or-increment, atomic on the hash: an existing pattern gains
    /// a detection and a confidence bump; a new one is inserted at the
    /// supplied confidence.
    async fn upsert(
        &self,
        features: PatternFeatures,
        confidence: f32,
        threat_type: &str,
        ai_analysis: Option<AiAnalysis>,
    ) -> ThreatPattern;

    /// Remove rows per the retention policy. Returns how many were
    /// dropped.
    async fn prune(&self, policy: PrunePolicy) -> usize;

    /// Highest-confidence patterns, for classifier prompt hints.
    async fn top_patterns(&self, limit: usize, min_confidence: f32) -> Vec<ThreatPattern>;

    /// Fallback match: first stored high-confidence pattern matching the
    /// incoming features under the given strategy.
    async fn match_fallback(
        &self,
        incoming: &PatternFeatures,
        strategy: FingerprintStrategy,
    ) -> Option<ThreatPattern>;

    /// Operator blocked an IP: every pattern from it becomes a verified
    /// threat at full confidence.
    async fn verify_by_ip(&self, ip: &str) -> usize;

    async fn summary(&self) -> ThreatSummary;
}

/// In-memory pattern store keyed by fingerprint hash.
#[derive(Debug, Default)]
pub struct MemoryPatternStore {
    inner: Mutex<HashMap<String, ThreatPattern>>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternStore for MemoryPatternStore {
    async fn lookup(&self, hash: &str) -> Option<ThreatPattern> {
        let map = self.inner.lock().expect("pattern store mutex poisoned");
        map.get(hash).cloned()
    }

    async fn upsert(
        &self,
        features: PatternFeatures,
        confidence: f32,
        threat_type: &str,
        ai_analysis: Option<AiAnalysis>,
    ) -> ThreatPattern {
        let hash = features.hash();
        let now = Utc::now();
        let mut map = self.inner.lock().expect("pattern store mutex poisoned");

        let entry = map
            .entry(hash.clone())
            .and_modify(|p| {
                p.detection_count += 1;
                p.confidence = (p.confidence + REPEAT_CONFIDENCE_STEP).min(100.0);
                p.last_detected = now;
            })
            .or_insert_with(|| ThreatPattern {
                hash,
                pattern_type: threat_type.to_string(),
                confidence: confidence.clamp(0.0, 100.0),
                detection_count: 1,
                last_detected: now,
                created_at: now,
                features,
                ai_analysis,
                verified: false,
            });
        entry.clone()
    }

    async fn prune(&self, policy: PrunePolicy) -> usize {
        let now = Utc::now();
        let old_cutoff = now - Duration::days(i64::from(policy.max_age_days));
        let stale_cutoff = now - Duration::days(i64::from(policy.stale_age_days));

        let mut map = self.inner.lock().expect("pattern store mutex poisoned");
        let before = map.len();
        map.retain(|_, p| {
            let old_and_weak = p.created_at < old_cutoff && p.confidence < policy.min_confidence;
            let one_off = p.created_at < stale_cutoff
                && p.detection_count == 1
                && p.confidence < policy.stale_min_confidence;
            !(old_and_weak || one_off)
        });
        before - map.len()
    }

    async fn top_patterns(&self, limit: usize, min_confidence: f32) -> Vec<ThreatPattern> {
        let map = self.inner.lock().expect("pattern store mutex poisoned");
        let mut patterns: Vec<ThreatPattern> = map
            .values()
            .filter(|p| p.confidence > min_confidence)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.detection_count.cmp(&a.detection_count))
        });
        patterns.truncate(limit);
        patterns
    }

    async fn match_fallback(
        &self,
        incoming: &PatternFeatures,
        strategy: FingerprintStrategy,
    ) -> Option<ThreatPattern> {
        let map = self.inner.lock().expect("pattern store mutex poisoned");
        map.values()
            .filter(|p| p.confidence > FALLBACK_CONFIDENCE_FLOOR)
            .find(|p| p.features.matches(incoming, strategy))
            .cloned()
    }

    async fn verify_by_ip(&self, ip: &str) -> usize {
        let mut map = self.inner.lock().expect("pattern store mutex poisoned");
        let mut touched = 0;
        for p in map.values_mut() {
            if p.features.ip == ip {
                p.verified = true;
                p.confidence = 100.0;
                touched += 1;
            }
        }
        touched
    }

    async fn summary(&self) -> ThreatSummary {
        let map = self.inner.lock().expect("pattern store mutex poisoned");
        let day_ago = Utc::now() - Duration::hours(24);

        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut recent = 0;
        let mut active = 0;
        for p in map.values() {
            *by_type.entry(p.pattern_type.clone()).or_default() += 1;
            if p.last_detected > day_ago {
                recent += 1;
            }
            if p.confidence >= 75.0 {
                active += 1;
            }
        }
        let mut top: Vec<(String, usize)> = by_type.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        top.truncate(5);

        ThreatSummary {
            total_patterns: map.len(),
            recent_patterns: recent,
            active_patterns: active,
            top_threat_types: top,
        }
    }
}

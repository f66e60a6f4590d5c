//! history.rs — in-memory analytics log of evaluations.
//!
//! Every verdict is recorded here (spam and clean alike) so the stats
//! surface and the classifier's recent-spam prompt hints have something
//! to read. Capacity-bound; the persistent analytics store is an
//! external collaborator.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::context::SubmissionContext;
use crate::verdict::{DetectionMethod, Verdict};

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub ts_unix: u64,
    pub entry_kind: &'static str,
    pub is_spam: bool,
    pub confidence: u8,
    pub detection_method: DetectionMethod,
    pub source_ip: String,
    /// First 100 chars of content; enough for diagnostics and prompt
    /// hints without retaining full bodies.
    pub content_preview: String,
}

#[derive(Debug)]
pub struct EvaluationLog {
    inner: Mutex<Vec<EvaluationRecord>>,
    cap: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpamStats {
    pub total_evaluated: usize,
    pub spam_blocked: usize,
    /// Spam within the last 30 days of records.
    pub blocked_this_month: usize,
}

impl EvaluationLog {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.min(10_000),
        }
    }

    pub fn record(&self, ctx: &SubmissionContext, verdict: &Verdict) {
        let entry = EvaluationRecord {
            ts_unix: now_unix(),
            entry_kind: ctx.entry_kind.as_str(),
            is_spam: verdict.is_spam,
            confidence: verdict.confidence,
            detection_method: verdict.detection_method,
            source_ip: ctx.source_ip.clone(),
            content_preview: ctx.content_preview(),
        };

        let mut v = self.inner.lock().expect("evaluation log mutex poisoned");
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<EvaluationRecord> {
        let v = self.inner.lock().expect("evaluation log mutex poisoned");
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    /// Content previews of recent spam, newest first. Feeds the
    /// classifier prompt as in-context hints.
    pub fn recent_spam_previews(&self, n: usize) -> Vec<String> {
        let v = self.inner.lock().expect("evaluation log mutex poisoned");
        v.iter()
            .rev()
            .filter(|r| r.is_spam && !r.content_preview.is_empty())
            .take(n)
            .map(|r| r.content_preview.clone())
            .collect()
    }

    pub fn stats(&self) -> SpamStats {
        let v = self.inner.lock().expect("evaluation log mutex poisoned");
        let month_cutoff = now_unix().saturating_sub(30 * 24 * 3600);
        let mut stats = SpamStats {
            total_evaluated: v.len(),
            ..Default::default()
        };
        for r in v.iter() {
            if r.is_spam {
                stats.spam_blocked += 1;
                if r.ts_unix >= month_cutoff {
                    stats.blocked_this_month += 1;
                }
            }
        }
        stats
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

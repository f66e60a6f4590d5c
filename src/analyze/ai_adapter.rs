//! AI classifier adapter: provider abstraction + TTL cache + global call
//! quota.
//!
//! This is the only component allowed to perform network I/O, and it is
//! built to degrade: configuration gaps, quota exhaustion, timeouts,
//! non-200 responses, and unparseable output all collapse to `None`
//! ("no AI signal") so the pipeline can fall back to local heuristics.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::analyze::repair::parse_classifier_output;
use crate::config::AiConfig;
use crate::context::SubmissionContext;
use crate::history::EvaluationLog;
use crate::patterns::{PatternStore, ThreatPattern};
use crate::verdict::AiAnalysis;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent";

/// How many stored patterns / recent spam previews the prompt embeds.
const PROMPT_PATTERN_HINTS: usize = 5;
const PROMPT_SPAM_HINTS: usize = 3;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// The adapter's contribution to one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub analysis: AiAnalysis,
    /// `true` once the raw classifier signal clears the configured
    /// confidence threshold, i.e. this is a rejection contribution.
    pub spam_signal: bool,
}

/// Trait object used by the decision engine.
pub trait SpamClassifier: Send + Sync {
    /// Classify one submission, or degrade to `None`.
    fn classify<'a>(
        &'a self,
        ctx: &'a SubmissionContext,
    ) -> Pin<Box<dyn Future<Output = Option<Classification>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn SpamClassifier>;

/// Factory: build a classifier according to config and environment.
///
/// * `AI_TEST_MODE=mock` returns a deterministic mock (always clean).
/// * An unconfigured/disabled config returns the disabled client.
/// * Otherwise the Gemini provider wrapped with cache + call quota.
pub fn build_classifier(
    config: &AiConfig,
    patterns: Arc<dyn PatternStore>,
    history: Arc<EvaluationLog>,
) -> DynClassifier {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockProvider {
            fixed: r#"{"is_spam": false, "confidence": 10, "threat_type": "legitimate",
                "reasoning": "mock", "recommended_action": "allow"}"#
                .to_string(),
        };
        return Arc::new(CachingClassifier::new(
            mock,
            config.clone(),
            patterns,
            history,
        ));
    }

    if !config.is_configured() {
        return Arc::new(DisabledClassifier);
    }

    let provider = GeminiProvider::new(config);
    Arc::new(CachingClassifier::new(
        provider,
        config.clone(),
        patterns,
        history,
    ))
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: performs the actual remote call and returns the
/// raw model text. Separated so the caching wrapper is reusable for
/// production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GeminiProvider {
    pub fn new(config: &AiConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("spamshield/0.1 (+github.com/spamshield/spamshield)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key: config.api_key.clone(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        }
    }
}

impl Provider for GeminiProvider {
    fn fetch<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return None;
            }

            #[derive(Serialize)]
            struct Part<'a> {
                text: &'a str,
            }
            #[derive(Serialize)]
            struct Content<'a> {
                parts: Vec<Part<'a>>,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct GenerationConfig {
                temperature: f32,
                max_output_tokens: u32,
                top_p: f32,
                top_k: u32,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Req<'a> {
                contents: Vec<Content<'a>>,
                generation_config: GenerationConfig,
            }

            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: CandidateContent,
            }
            #[derive(Deserialize)]
            struct CandidateContent {
                #[serde(default)]
                parts: Vec<RespPart>,
            }
            #[derive(Deserialize)]
            struct RespPart {
                #[serde(default)]
                text: String,
            }

            let req = Req {
                contents: vec![Content {
                    parts: vec![Part { text: prompt }],
                }],
                // Low temperature: we want a deterministic classifier,
                // not a creative one.
                generation_config: GenerationConfig {
                    temperature: 0.1,
                    max_output_tokens: 1000,
                    top_p: 0.8,
                    top_k: 10,
                },
            };

            let url = format!("{}?key={}", self.endpoint, self.api_key);
            let resp = match self.http.post(&url).json(&req).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "classifier request failed");
                    return None;
                }
            };
            if !resp.status().is_success() {
                warn!(status = %resp.status(), "classifier returned non-success status");
                return None;
            }
            let body: Resp = match resp.json().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "classifier response body did not decode");
                    return None;
                }
            };

            let text = body
                .candidates
                .first()
                .and_then(|c| c.content.parts.first())
                .map(|p| p.text.clone())?;
            if text.trim().is_empty() {
                None
            } else {
                Some(text)
            }
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Returns `None` always; used when the classifier is disabled or not
/// configured.
pub struct DisabledClassifier;

impl SpamClassifier for DisabledClassifier {
    fn classify<'a>(
        &'a self,
        _ctx: &'a SubmissionContext,
    ) -> Pin<Box<dyn Future<Output = Option<Classification>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed-response provider for tests and local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl Provider for MockProvider {
    fn fetch<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching wrapper (TTL cache + global call quota)
// ------------------------------------------------------------

struct CallWindow {
    count: u32,
    started: Instant,
}

/// Wraps a provider with a context-keyed TTL cache and a global
/// calls-per-window quota protecting the remote API.
pub struct CachingClassifier<P: Provider> {
    inner: P,
    config: AiConfig,
    cache: Mutex<HashMap<String, (Instant, Classification)>>,
    calls: Mutex<CallWindow>,
    patterns: Arc<dyn PatternStore>,
    history: Arc<EvaluationLog>,
}

impl<P: Provider> CachingClassifier<P> {
    pub fn new(
        inner: P,
        config: AiConfig,
        patterns: Arc<dyn PatternStore>,
        history: Arc<EvaluationLog>,
    ) -> Self {
        Self {
            inner,
            config,
            cache: Mutex::new(HashMap::new()),
            calls: Mutex::new(CallWindow {
                count: 0,
                started: Instant::now(),
            }),
            patterns,
            history,
        }
    }

    /// Atomically consume one slot of the remote-call quota. Exhaustion
    /// degrades (no AI signal) rather than flagging spam.
    fn try_take_call_slot(&self) -> bool {
        let mut w = self.calls.lock().expect("call window mutex poisoned");
        if w.started.elapsed() >= Duration::from_secs(self.config.call_window_secs) {
            w.count = 0;
            w.started = Instant::now();
        }
        if w.count >= self.config.call_limit_per_window {
            return false;
        }
        w.count += 1;
        true
    }

    fn cache_get(&self, key: &str) -> Option<Classification> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let mut cache = self.cache.lock().expect("classifier cache mutex poisoned");
        match cache.get(key) {
            Some((at, hit)) if at.elapsed() < ttl => Some(hit.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_put(&self, key: String, value: Classification) {
        let mut cache = self.cache.lock().expect("classifier cache mutex poisoned");
        cache.insert(key, (Instant::now(), value));
    }

    async fn classify_impl(&self, ctx: &SubmissionContext) -> Option<Classification> {
        // 1) Cache lookup (hits never consume quota).
        let key = context_cache_key(ctx);
        if let Some(hit) = self.cache_get(&key) {
            debug!(provider = self.inner.name(), "classifier cache hit");
            return Some(hit);
        }

        // 2) Remote-call quota.
        if !self.try_take_call_slot() {
            metrics::counter!("spamshield_ai_degraded_total").increment(1);
            warn!("classifier call quota exhausted; degrading to no AI signal");
            return None;
        }

        // 3) Prompt with learned-pattern and recent-spam hints.
        let hints = self
            .patterns
            .top_patterns(PROMPT_PATTERN_HINTS, 70.0)
            .await;
        let recent = self.history.recent_spam_previews(PROMPT_SPAM_HINTS);
        let prompt = build_prompt(ctx, &hints, &recent);

        // 4) Remote call, hard-bounded even if the HTTP client's own
        //    timeout misbehaves.
        let fetch = self.inner.fetch(&prompt);
        let raw = match tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            fetch,
        )
        .await
        {
            Ok(Some(text)) => text,
            Ok(None) => {
                metrics::counter!("spamshield_ai_degraded_total").increment(1);
                return None;
            }
            Err(_) => {
                metrics::counter!("spamshield_ai_degraded_total").increment(1);
                warn!(timeout_secs = self.config.timeout_secs, "classifier call timed out");
                return None;
            }
        };

        // 5) Defensive parse + threshold gate.
        let analysis = parse_classifier_output(&raw);
        let spam_signal =
            analysis.is_spam && analysis.confidence >= self.config.confidence_threshold;
        let result = Classification {
            analysis,
            spam_signal,
        };

        // 6) Cache before returning.
        self.cache_put(key, result.clone());
        Some(result)
    }
}

impl<P: Provider> SpamClassifier for CachingClassifier<P> {
    fn classify<'a>(
        &'a self,
        ctx: &'a SubmissionContext,
    ) -> Pin<Box<dyn Future<Output = Option<Classification>> + Send + 'a>> {
        Box::pin(self.classify_impl(ctx))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// Prompt construction
// ------------------------------------------------------------

/// Cache key over the full context, so any field change is a new entry.
fn context_cache_key(ctx: &SubmissionContext) -> String {
    let mut hasher = Sha256::new();
    for field in [
        ctx.content.as_str(),
        ctx.author_name.as_str(),
        ctx.author_email.as_str(),
        ctx.author_url.as_str(),
        ctx.source_ip.as_str(),
        ctx.user_agent.as_str(),
        ctx.entry_kind.as_str(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn strip_tags(content: &str) -> String {
    use once_cell::sync::Lazy;
    use regex::Regex;
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
    TAG_RE.replace_all(content, " ").into_owned()
}

/// Build the analysis prompt, embedding known high-confidence patterns
/// and recent spam snippets as in-context hints.
pub fn build_prompt(
    ctx: &SubmissionContext,
    patterns: &[ThreatPattern],
    recent_spam: &[String],
) -> String {
    let mut p = String::with_capacity(1024);
    p.push_str(
        "You are an advanced spam detection system. Analyze the following content and determine if it's spam.\n\n",
    );

    p.push_str("CONTENT TO ANALYZE:\n");
    p.push_str(&format!("Type: {}\n", ctx.entry_kind.as_str()));
    p.push_str(&format!("Content: {}\n", strip_tags(&ctx.content)));
    p.push_str(&format!("Author: {}\n", or_unknown(&ctx.author_name)));
    p.push_str(&format!("Email: {}\n", or_unknown(&ctx.author_email)));
    p.push_str(&format!("URL: {}\n", or_none(&ctx.author_url)));
    p.push_str(&format!("IP: {}\n", or_unknown(&ctx.source_ip)));
    p.push_str(&format!("User Agent: {}\n", or_unknown(&ctx.user_agent)));

    if !patterns.is_empty() {
        p.push_str("\nKNOWN SPAM PATTERNS (learn from these):\n");
        for pattern in patterns {
            p.push_str(&format!(
                "- {} (confidence: {:.0})\n",
                pattern.pattern_type, pattern.confidence
            ));
        }
    }

    if !recent_spam.is_empty() {
        p.push_str("\nRECENT SPAM INDICATORS:\n");
        for snippet in recent_spam {
            p.push_str(&format!("- {snippet}\n"));
        }
    }

    p.push_str("\nANALYSIS REQUIREMENTS:\n");
    p.push_str("1. Examine content for spam indicators: promotional language, suspicious links, gibberish, repetitive patterns\n");
    p.push_str("2. Check author details for legitimacy\n");
    p.push_str("3. Analyze IP and user agent for bot patterns\n");
    p.push_str("4. Consider context and intent\n");
    p.push_str("5. Look for social engineering attempts\n");

    p.push_str("\nRespond with JSON in this exact format:\n");
    p.push_str("{\n");
    p.push_str("  \"is_spam\": boolean,\n");
    p.push_str("  \"confidence\": number (0-100),\n");
    p.push_str("  \"spam_indicators\": [\"indicator1\", \"indicator2\"],\n");
    p.push_str("  \"threat_type\": \"string (promotional/malicious/bot/legitimate)\",\n");
    p.push_str("  \"reasoning\": \"detailed explanation\",\n");
    p.push_str("  \"recommended_action\": \"block/flag/allow\"\n");
    p.push_str("}\n");

    p
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() {
        "unknown"
    } else {
        s
    }
}

fn or_none(s: &str) -> &str {
    if s.is_empty() {
        "none"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntryKind;
    use crate::patterns::MemoryPatternStore;

    fn ctx(content: &str) -> SubmissionContext {
        SubmissionContext {
            content: content.into(),
            author_name: "Sam".into(),
            author_email: "sam@example.com".into(),
            author_url: String::new(),
            source_ip: "192.0.2.10".into(),
            user_agent: "Mozilla/5.0 Chrome/124.0".into(),
            form_loaded_at: Some(100),
            submitted_at: 130,
            entry_kind: EntryKind::Comment,
            honeypot: String::new(),
        }
    }

    #[test]
    fn cache_key_changes_with_any_field() {
        let a = context_cache_key(&ctx("hello"));
        let b = context_cache_key(&ctx("hello!"));
        assert_ne!(a, b);

        let mut c = ctx("hello");
        c.source_ip = "192.0.2.11".into();
        assert_ne!(a, context_cache_key(&c));

        assert_eq!(a, context_cache_key(&ctx("hello")));
    }

    #[test]
    fn prompt_embeds_hints_and_schema() {
        let prompt = build_prompt(
            &ctx("great <b>post</b>"),
            &[],
            &["buy pills http://x".to_string()],
        );
        assert!(prompt.contains("Content: great  post"));
        assert!(prompt.contains("RECENT SPAM INDICATORS"));
        assert!(prompt.contains("buy pills http://x"));
        assert!(prompt.contains("\"recommended_action\": \"block/flag/allow\""));
    }

    #[tokio::test]
    async fn threshold_gates_the_spam_signal() {
        let patterns: Arc<dyn PatternStore> = Arc::new(MemoryPatternStore::new());
        let history = Arc::new(EvaluationLog::with_capacity(16));
        let cfg = AiConfig {
            enabled: true,
            api_key: "test".into(),
            confidence_threshold: 75,
            ..Default::default()
        };

        let below = CachingClassifier::new(
            MockProvider {
                fixed: r#"{"is_spam": true, "confidence": 60}"#.into(),
            },
            cfg.clone(),
            Arc::clone(&patterns),
            Arc::clone(&history),
        );
        let out = below.classify(&ctx("x")).await.expect("mock always answers");
        assert!(out.analysis.is_spam);
        assert!(!out.spam_signal, "60 < 75 must not reject");

        let above = CachingClassifier::new(
            MockProvider {
                fixed: r#"{"is_spam": true, "confidence": 90}"#.into(),
            },
            cfg,
            patterns,
            history,
        );
        let out = above.classify(&ctx("x")).await.expect("mock always answers");
        assert!(out.spam_signal);
    }

    #[tokio::test]
    async fn quota_exhaustion_degrades() {
        let patterns: Arc<dyn PatternStore> = Arc::new(MemoryPatternStore::new());
        let history = Arc::new(EvaluationLog::with_capacity(16));
        let cfg = AiConfig {
            enabled: true,
            api_key: "test".into(),
            call_limit_per_window: 1,
            ..Default::default()
        };
        let client = CachingClassifier::new(
            MockProvider {
                fixed: r#"{"is_spam": false, "confidence": 0}"#.into(),
            },
            cfg,
            patterns,
            history,
        );

        assert!(client.classify(&ctx("first")).await.is_some());
        // Second distinct context: no cache hit, quota exhausted.
        assert!(client.classify(&ctx("second")).await.is_none());
        // Identical to the first: cache hit, no quota needed.
        assert!(client.classify(&ctx("first")).await.is_some());
    }
}

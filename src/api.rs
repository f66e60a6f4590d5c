use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analyze::ai_adapter::build_classifier;
use crate::blocklist::BlockedIpSet;
use crate::config::{AiConfig, ProtectionConfig};
use crate::context::{EntryKind, SubmissionContext};
use crate::engine::DecisionEngine;
use crate::history::{EvaluationLog, SpamStats};
use crate::patterns::{MemoryPatternStore, PatternStore, PrunePolicy, ThreatSummary};
use crate::rate_limit::RateLimiter;
use crate::verdict::Verdict;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<DecisionEngine>,
}

/// Assemble the full service from config files and environment.
pub fn create_router() -> Router {
    let protection = ProtectionConfig::load_from_file("config/protection.toml")
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "protection config invalid; using defaults");
            ProtectionConfig::default()
        });
    let ai = AiConfig::load_from_file("config/ai.json").unwrap_or_else(|e| {
        tracing::error!(error = %e, "ai config invalid; classifier disabled");
        AiConfig::default()
    });
    create_router_with(protection, ai)
}

/// Assemble the service from explicit configs (tests use this directly).
pub fn create_router_with(protection: ProtectionConfig, ai: AiConfig) -> Router {
    let patterns: Arc<dyn PatternStore> = Arc::new(MemoryPatternStore::new());
    let history = Arc::new(EvaluationLog::with_capacity(2000));
    let classifier = build_classifier(&ai, Arc::clone(&patterns), Arc::clone(&history));

    let engine = DecisionEngine::new(
        protection.clone(),
        Arc::new(BlockedIpSet::new()),
        RateLimiter::in_memory(
            Duration::from_secs(protection.rate_limit_window_secs),
            protection.max_submissions,
        ),
        classifier,
        patterns,
        history,
    );
    router_for(Arc::new(engine))
}

pub fn router_for(engine: Arc<DecisionEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/evaluate", post(evaluate))
        .route("/stats", get(stats))
        .route("/debug/history", get(debug_history))
        .route("/admin/block-ip", post(admin_block_ip))
        .route("/admin/prune-patterns", post(admin_prune_patterns))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct EvaluateReq {
    content: String,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    author_email: String,
    #[serde(default)]
    author_url: String,
    source_ip: String,
    #[serde(default)]
    user_agent: String,
    #[serde(default)]
    form_loaded_at: Option<u64>,
    /// Missing means "now".
    #[serde(default)]
    submitted_at: Option<u64>,
    #[serde(default = "default_entry_kind")]
    entry_kind: EntryKind,
    #[serde(default)]
    honeypot: String,
}

fn default_entry_kind() -> EntryKind {
    EntryKind::Comment
}

async fn evaluate(State(state): State<AppState>, Json(body): Json<EvaluateReq>) -> Json<Verdict> {
    let ctx = SubmissionContext {
        content: body.content,
        author_name: body.author_name,
        author_email: body.author_email,
        author_url: body.author_url,
        source_ip: body.source_ip,
        user_agent: body.user_agent,
        form_loaded_at: body.form_loaded_at,
        submitted_at: body.submitted_at.unwrap_or_else(current_unix),
        entry_kind: body.entry_kind,
        honeypot: body.honeypot,
    };
    Json(state.engine.evaluate(&ctx).await)
}

fn current_unix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(serde::Serialize)]
struct StatsResp {
    evaluations: SpamStats,
    threats: ThreatSummary,
    blocked_ips: usize,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResp> {
    Json(StatsResp {
        evaluations: state.engine.history().stats(),
        threats: state.engine.patterns().summary().await,
        blocked_ips: state.engine.blocklist().len(),
    })
}

async fn debug_history(
    State(state): State<AppState>,
) -> Json<Vec<crate::history::EvaluationRecord>> {
    Json(state.engine.history().snapshot_last_n(20))
}

#[derive(serde::Deserialize)]
struct BlockIpReq {
    ip: String,
}

#[derive(serde::Serialize)]
struct BlockIpResp {
    added: bool,
    /// Stored patterns from this IP promoted to verified threats.
    patterns_verified: usize,
}

/// Operator confirmation that an IP is hostile: block it and promote its
/// stored patterns to verified, full-confidence threats.
async fn admin_block_ip(
    State(state): State<AppState>,
    Json(body): Json<BlockIpReq>,
) -> Json<BlockIpResp> {
    let added = state.engine.blocklist().add(&body.ip);
    let patterns_verified = state.engine.patterns().verify_by_ip(&body.ip).await;
    tracing::info!(ip = %body.ip, added, patterns_verified, "ip blocked by operator");
    Json(BlockIpResp {
        added,
        patterns_verified,
    })
}

#[derive(serde::Serialize)]
struct PruneResp {
    removed: usize,
}

async fn admin_prune_patterns(State(state): State<AppState>) -> Json<PruneResp> {
    let cfg = state.engine.config();
    let policy = PrunePolicy {
        max_age_days: cfg.pattern_retention_days,
        min_confidence: cfg.pattern_min_confidence,
        ..PrunePolicy::default()
    };
    let removed = state.engine.patterns().prune(policy).await;
    tracing::info!(removed, "pattern store pruned");
    Json(PruneResp { removed })
}

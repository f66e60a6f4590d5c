// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod analyze;
pub mod api;
pub mod blocklist;
pub mod config;
pub mod context;
pub mod engine;
pub mod fingerprint;
pub mod history;
pub mod learner;
pub mod metrics;
pub mod patterns;
pub mod rate_limit;
pub mod verdict;

// ---- Re-exports for stable public API ----
pub use crate::analyze::ai_adapter;
pub use crate::api::{create_router, create_router_with, router_for};
pub use crate::config::{AiConfig, ProtectionConfig};
pub use crate::context::{EntryKind, SubmissionContext};
pub use crate::engine::DecisionEngine;
pub use crate::verdict::{DetectionMethod, ReasonCode, RecommendedAction, Verdict};

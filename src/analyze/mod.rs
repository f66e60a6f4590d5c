// src/analyze/mod.rs
//! Analysis layer: local heuristics, classifier adapter, and defensive
//! repair of classifier output.

pub mod ai_adapter;
pub mod heuristics;
pub mod repair;

pub use ai_adapter::{
    build_classifier, CachingClassifier, Classification, DisabledClassifier, DynClassifier,
    GeminiProvider, MockProvider, Provider, SpamClassifier,
};
pub use heuristics::{evaluate, HeuristicReport};
pub use repair::parse_classifier_output;

//! Spam Protection Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.
//!
//! See `README.md` for quickstart.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spamshield::api;
use spamshield::config::{AiConfig, ProtectionConfig};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - SPAMSHIELD_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("SPAMSHIELD_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spamshield=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This is where
    // GOOGLE_AI_API_KEY comes from when config/ai.json says "ENV".
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let protection = ProtectionConfig::load_from_file("config/protection.toml")
        .expect("protection config invalid");
    let ai = AiConfig::load_from_file("config/ai.json").expect("ai config invalid");

    let metrics = spamshield::metrics::Metrics::init(protection.spam_threshold, ai.cache_ttl_secs);

    let router = api::create_router_with(protection, ai).merge(metrics.router());

    Ok(router.into())
}

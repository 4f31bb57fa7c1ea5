//! inkstone service binary: wire the pool, dispatcher, engine and store,
//! then serve the homework API.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use inkstone_dispatch::{Dispatcher, RecoveryTicker, build_budget, build_pool};
use inkstone_engine::GradingEngine;
use inkstone_llm::{ProviderRegistry, ProviderSettings};
use inkstone_server::api::{AppState, api_routes};
use inkstone_server::store::JsonlResultStore;
use inkstone_types::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    info!(
        provider = %config.ai.provider,
        storage = ?config.dispatch.storage_type,
        "starting inkstone"
    );

    let pool = build_pool(&config.dispatch).await?;
    let budget = build_budget(&config.dispatch).await?;

    if config.ai.api_keys.is_empty() {
        warn!("==============================================");
        warn!("  no API keys configured!");
        warn!("  set INKSTONE_API_KEYS=sk-key1,sk-key2");
        warn!("==============================================");
    } else if pool.available_count().await == 0 {
        // A shared Redis pool may already hold keys from another instance.
        pool.add_keys(config.ai.api_keys.clone()).await;
        info!(count = config.ai.api_keys.len(), "api keys seeded into pool");
    } else {
        info!(
            existing = pool.available_count().await,
            "pool already seeded, skipping key load"
        );
    }

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&pool),
        budget,
        config.dispatch.clone(),
    ));

    let ticker = Arc::new(RecoveryTicker::new(
        Arc::clone(&pool),
        config.dispatch.key_cooldown_seconds,
    ));
    let _recovery = ticker.spawn();

    let registry = ProviderRegistry::from_settings(provider_settings(&config));
    let provider = registry.get(&config.ai.provider)?;

    let engine = Arc::new(GradingEngine::new(
        provider,
        Arc::clone(&dispatcher),
        config.ai.clone(),
    ));
    let store = Arc::new(
        JsonlResultStore::open(config.server.store_path.clone())
            .await
            .context("opening result store")?,
    );

    let state = AppState {
        engine,
        store,
        config: config.server.clone(),
    };

    let app = axum::Router::new()
        .nest("/api/homework", api_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(axum::extract::DefaultBodyLimit::max(
            config.server.max_upload_bytes,
        ))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "inkstone listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Provider connection settings, overridable per provider via environment.
fn provider_settings(config: &AppConfig) -> Vec<ProviderSettings> {
    let env_or = |name: &str, default: &str| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_owned())
    };

    let mut openai = ProviderSettings::openai(
        env_or("INKSTONE_OPENAI_BASE_URL", "https://api.openai.com/v1"),
        env_or("INKSTONE_OPENAI_MODEL", "gpt-4o"),
    );
    openai.request_timeout_seconds = config.ai.request_timeout_seconds;

    let mut anthropic = ProviderSettings::anthropic(
        env_or("INKSTONE_ANTHROPIC_BASE_URL", "https://api.anthropic.com/v1"),
        env_or("INKSTONE_ANTHROPIC_MODEL", "claude-sonnet-4-5"),
    );
    anthropic.request_timeout_seconds = config.ai.request_timeout_seconds;

    vec![openai, anthropic]
}

//! Configuration structs with environment loading.
//!
//! Every knob has a default matching a light single-node deployment; the
//! `INKSTONE_*` environment variables override individual values. An explicit
//! `from_env` at process start replaces any framework-level injection.

use serde::{Deserialize, Serialize};

/// Which backing store the credential pool and rate budget use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-process queues; single-node deployments.
    #[default]
    Memory,
    /// Redis-backed queues shared by multiple dispatcher instances.
    Redis,
}

/// Dispatch-layer configuration: pool, rate budget, retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Pool/budget variant selection.
    pub storage_type: StorageType,

    /// Upper bound on concurrently executing dispatched tasks.
    pub max_concurrent: usize,

    /// Retries per item on top of the first attempt.
    pub retry_count: u32,

    /// Seconds between failed-key recovery ticks.
    pub key_cooldown_seconds: u64,

    /// Sliding-window length in seconds.
    pub rate_limit_window_seconds: u64,

    /// Admissions allowed per credential per window.
    pub rate_limit_max_requests: usize,

    /// Blocking borrow timeout in seconds. A single-key deployment needs
    /// this long enough to outlast the previous task.
    pub key_borrow_timeout_seconds: u64,

    /// Upper bound on batch fan-out size.
    pub max_characters_per_batch: usize,

    /// Redis connection URL (shared-remote variants only).
    pub redis_url: String,

    /// Redis list holding available credentials.
    pub key_pool_name: String,

    /// Redis list holding failed credentials.
    pub failed_key_pool_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            max_concurrent: 15,
            retry_count: 3,
            key_cooldown_seconds: 60,
            rate_limit_window_seconds: 60,
            rate_limit_max_requests: 50,
            key_borrow_timeout_seconds: 120,
            max_characters_per_batch: 30,
            redis_url: "redis://127.0.0.1:6379".into(),
            key_pool_name: "ai:key:pool".into(),
            failed_key_pool_name: "ai:key:failed".into(),
        }
    }
}

/// Upstream model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Active provider name: "openai" or "anthropic".
    pub provider: String,

    /// Largest image edge in pixels before the preprocessor downscales.
    pub max_image_size: u32,

    /// Upstream HTTP read timeout in seconds (blocking mode).
    pub request_timeout_seconds: u64,

    /// Three-pass critique composition for single-character mode.
    pub multi_agent_enabled: bool,

    /// Credentials seeded into the pool at startup.
    pub api_keys: Vec<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            max_image_size: 512,
            request_timeout_seconds: 30,
            multi_agent_enabled: false,
            api_keys: Vec::new(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:8080".
    pub bind_addr: String,

    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,

    /// End-to-end deadline for a streaming request, in seconds.
    pub stream_timeout_seconds: u64,

    /// Flood limiter: window length in minutes.
    pub flood_window_minutes: i64,

    /// Flood limiter: calls allowed per user per window.
    pub flood_max_calls: u64,

    /// Path of the JSONL result store.
    pub store_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            max_upload_bytes: 10 * 1024 * 1024,
            stream_timeout_seconds: 180,
            flood_window_minutes: 5,
            flood_max_calls: 20,
            store_path: "data/inkstone-store.jsonl".into(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub dispatch: DispatchConfig,
    pub ai: AiConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from `INKSTONE_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_str("INKSTONE_STORAGE_TYPE") {
            config.dispatch.storage_type = match v.to_lowercase().as_str() {
                "redis" => StorageType::Redis,
                _ => StorageType::Memory,
            };
        }
        env_parse("INKSTONE_MAX_CONCURRENT", &mut config.dispatch.max_concurrent);
        env_parse("INKSTONE_RETRY_COUNT", &mut config.dispatch.retry_count);
        env_parse(
            "INKSTONE_KEY_COOLDOWN_SECONDS",
            &mut config.dispatch.key_cooldown_seconds,
        );
        env_parse(
            "INKSTONE_RATE_LIMIT_WINDOW_SECONDS",
            &mut config.dispatch.rate_limit_window_seconds,
        );
        env_parse(
            "INKSTONE_RATE_LIMIT_MAX_REQUESTS",
            &mut config.dispatch.rate_limit_max_requests,
        );
        env_parse(
            "INKSTONE_KEY_BORROW_TIMEOUT_SECONDS",
            &mut config.dispatch.key_borrow_timeout_seconds,
        );
        env_parse(
            "INKSTONE_MAX_CHARACTERS_PER_BATCH",
            &mut config.dispatch.max_characters_per_batch,
        );
        if let Some(v) = env_str("INKSTONE_REDIS_URL") {
            config.dispatch.redis_url = v;
        }

        if let Some(v) = env_str("INKSTONE_AI_PROVIDER") {
            config.ai.provider = v;
        }
        env_parse("INKSTONE_MAX_IMAGE_SIZE", &mut config.ai.max_image_size);
        env_parse(
            "INKSTONE_REQUEST_TIMEOUT_SECONDS",
            &mut config.ai.request_timeout_seconds,
        );
        env_parse(
            "INKSTONE_MULTI_AGENT_ENABLED",
            &mut config.ai.multi_agent_enabled,
        );
        if let Some(v) = env_str("INKSTONE_API_KEYS") {
            config.ai.api_keys = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }

        if let Some(v) = env_str("INKSTONE_BIND_ADDR") {
            config.server.bind_addr = v;
        }
        if let Some(v) = env_str("INKSTONE_STORE_PATH") {
            config.server.store_path = v;
        }

        config
    }
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Some(v) = env_str(name) {
        if let Ok(parsed) = v.parse() {
            *target = parsed;
        }
    }
}

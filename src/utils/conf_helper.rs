use anyhow::Context;
use std::io::ErrorKind;
use std::sync::OnceLock;
use tokio::fs;
use tokio::net::TcpListener;
use tracing::info;

use crate::models::service_model::ServiceConfig;

pub const CONFIG_ENV: &str = "ANNOTATOR_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "annotator.json";

static CONFIG_CACHE: OnceLock<ServiceConfig> = OnceLock::new();

/// Reads the service config; a missing file means defaults.
pub async fn load_config() -> anyhow::Result<ServiceConfig> {
    let file_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

    match fs::read_to_string(&file_path).await {
        Ok(data) => serde_json::from_str(&data)
            .with_context(|| format!("JSON parse error in {file_path}")),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(ServiceConfig::default()),
        Err(e) => Err(e).with_context(|| format!("file read error: {file_path}")),
    }
}

/// Binds the listener, patches the real port into the config and caches it.
pub async fn init_config_and_bind(mut config: ServiceConfig) -> anyhow::Result<TcpListener> {
    let bind_addr = format!("{}:{}", config.connection.ip, config.connection.port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind failed on {bind_addr}"))?;

    let actual_port = listener.local_addr().context("listener address")?.port();

    // === PORT PATCH ===
    config.connection.port = actual_port;

    CONFIG_CACHE
        .set(config)
        .map_err(|_| anyhow::anyhow!("config already initialized"))?;

    info!("Config initialized with port: {}", actual_port);

    Ok(listener)
}

pub fn get_cached_config() -> &'static ServiceConfig {
    CONFIG_CACHE.get_or_init(ServiceConfig::default)
}

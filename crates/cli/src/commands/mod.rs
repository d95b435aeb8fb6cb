pub mod build_anchors;
pub mod config_cmd;
pub mod doctor;
pub mod route;
pub mod topics;

use mindchat_config::AppConfig;
use mindchat_embeddings::EmbeddingProvider;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// The config at `path`, or the default location with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// Load the embedding model off the async runtime. Never fails.
pub async fn load_provider(config: &AppConfig) -> Arc<EmbeddingProvider> {
    let config = config.clone();
    let provider = tokio::task::spawn_blocking(move || EmbeddingProvider::load(&config))
        .await
        .unwrap_or_else(|e| EmbeddingProvider::unavailable(format!("model loader panicked: {e}")));
    debug!(available = provider.is_available(), "Embedding provider ready");
    Arc::new(provider)
}

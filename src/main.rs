use anyhow::Context;
use tracing::{info, warn};

mod models;
mod routes;
mod state;
mod utils;

use crate::state::app_state::AppState;
use crate::utils::conf_helper::{get_cached_config, init_config_and_bind, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await?;

    tracing_subscriber::fmt()
        .with_max_level(config.max_level())
        .init();

    // === CONFIG + LISTENER ===
    let listener = init_config_and_bind(config)
        .await
        .context("critical init failure")?;

    let config = get_cached_config();

    info!(
        "Server initialized on {}:{}",
        config.connection.ip,
        config.connection.port
    );

    let state = AppState::from_config(config).await;
    let app = routes::app(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Persist whatever is being edited before exiting
    let mut session = state.session.lock().await;
    if let Err(e) = session.close() {
        warn!("final save failed: {}", e);
    }
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler failed: {}", e);
    }
}

//! FloodWatch server entrypoint.
//!
//! Startup order: tracing, configuration from the environment, region
//! registry (fatal on a malformed document), storage, application state,
//! scheduler warm-up, then the HTTP listener. Shutdown is cooperative:
//! Ctrl-C cancels the scheduler loops with a grace period before the
//! process exits.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use floodwatch::api::{self, AppState};
use floodwatch::config::CoreConfig;
use floodwatch::region::RegionRegistry;
use floodwatch::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("floodwatch=info".parse()?))
        .init();

    let config = CoreConfig::from_env();
    info!(
        region = %config.current_region,
        port = config.port,
        freeze_mode = config.freeze_mode,
        "starting floodwatch"
    );

    // Malformed region documents are fatal at startup
    let registry = RegionRegistry::load(&config.regions_path, &config.districts_dir)?;

    let storage = match Storage::new(&config.database_url).await {
        Ok(storage) => Some(storage),
        Err(err) => {
            // The log store is an optional sibling concern; run without it
            warn!(error = %err, "storage unavailable, weather logs disabled");
            None
        }
    };

    let port = config.port;
    let state = AppState::build(config, registry, storage).await?;

    let scheduler = Arc::clone(&state.scheduler);
    scheduler.start().await;

    let app = api::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "floodwatch is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&scheduler)))
        .await?;

    Ok(())
}

async fn shutdown_signal(scheduler: Arc<floodwatch::scheduler::Scheduler>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "shutdown signal listener failed");
        return;
    }
    info!("shutdown signal received");
    scheduler.stop().await;
}

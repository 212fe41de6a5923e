//! Health, status, threat, and manual-refresh endpoints.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::api::AppState;
use crate::cache::RefreshOutcome;
use crate::error::CoreError;
use crate::sources::ManagedSource;

/// GET /health - liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// GET /api/status - cache metadata for every source plus provider health.
#[instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    let sources: Vec<Value> = state
        .sources
        .iter()
        .map(|s| {
            json!({
                "enabled": s.enabled(),
                "cache": s.cache_info(),
            })
        })
        .collect();

    let providers = state.factory.health_all().await;

    Json(json!({
        "region": state.current_region(),
        "sources": sources,
        "threat": state.threat.cache_info(),
        "intel": state.intel.cache_info(),
        "providers": providers,
    }))
}

/// POST /api/refresh/:source - trigger one ad-hoc refresh by cache name.
#[instrument(skip(state))]
pub async fn refresh_source(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<Value>, CoreError> {
    let outcome = state.scheduler.refresh_source(&source).await?;
    info!(source = %source, outcome = ?outcome, "manual refresh");
    Ok(Json(json!({
        "source": source,
        "refreshed": outcome == RefreshOutcome::Refreshed,
    })))
}

/// GET /api/threat - the pre-computed flood threat snapshot.
///
/// Served straight from the threat cache; a cold miss triggers exactly one
/// forced recomputation before answering.
#[instrument(skip(state))]
pub async fn get_threat(State(state): State<AppState>) -> Result<Json<Value>, CoreError> {
    if state.threat.snapshot().is_none() {
        state.threat.refresh_cycle(true).await?;
    }
    let snapshot = state.threat.snapshot().ok_or_else(|| {
        CoreError::provider("threat", "no snapshot available after refresh")
    })?;

    Ok(Json(json!({
        "cache": state.threat.cache_info(),
        "threat": snapshot,
    })))
}

//! Intelligence endpoints: priorities, clusters, summaries, and actions.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::api::AppState;
use crate::error::CoreError;
use crate::model::UrgencyTier;
use crate::sources::ManagedSource;

/// Run one analysis cycle if no snapshot exists yet.
async fn ensure_snapshot(state: &AppState) -> Result<(), CoreError> {
    if state.intel.snapshot().is_none() {
        state.intel.run_analysis(true).await?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct PrioritiesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub district: Option<String>,
    pub urgency: Option<String>,
}

fn default_limit() -> usize {
    50
}

/// GET /api/intel/priorities - reports ranked by urgency score.
#[instrument(skip(state))]
pub async fn get_priorities(
    State(state): State<AppState>,
    Query(query): Query<PrioritiesQuery>,
) -> Result<Json<Value>, CoreError> {
    if query.limit > 200 {
        return Err(CoreError::Validation("limit must be <= 200".to_string()));
    }
    let tier = match &query.urgency {
        Some(raw) => Some(
            UrgencyTier::parse(raw)
                .ok_or_else(|| CoreError::Validation(format!("unknown urgency tier: {raw}")))?,
        ),
        None => None,
    };

    ensure_snapshot(&state).await?;
    let reports = state
        .intel
        .priorities(query.district.as_deref(), tier, query.limit);

    Ok(Json(json!({
        "count": reports.len(),
        "cache": state.intel.cache_info(),
        "reports": reports,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ClustersQuery {
    pub district: Option<String>,
}

/// GET /api/intel/clusters - geographic emergency clusters.
#[instrument(skip(state))]
pub async fn get_clusters(
    State(state): State<AppState>,
    Query(query): Query<ClustersQuery>,
) -> Result<Json<Value>, CoreError> {
    ensure_snapshot(&state).await?;
    let clusters = state.intel.clusters(query.district.as_deref());
    Ok(Json(json!({
        "count": clusters.len(),
        "cache": state.intel.cache_info(),
        "clusters": clusters,
    })))
}

/// GET /api/intel/summary - overall intelligence summary.
#[instrument(skip(state))]
pub async fn get_summary(State(state): State<AppState>) -> Result<Json<Value>, CoreError> {
    ensure_snapshot(&state).await?;
    let summary = state
        .intel
        .summary()
        .ok_or_else(|| CoreError::provider("intel", "no summary after analysis"))?;
    Ok(Json(json!({
        "cache": state.intel.cache_info(),
        "summary": summary,
    })))
}

/// GET /api/intel/district/:district - detail for one district.
#[instrument(skip(state))]
pub async fn get_district_intel(
    State(state): State<AppState>,
    Path(district): Path<String>,
) -> Result<Json<Value>, CoreError> {
    ensure_snapshot(&state).await?;
    let detail = state
        .intel
        .district_intel(&district)
        .ok_or_else(|| CoreError::UnknownDistrict(district))?;
    Ok(Json(detail))
}

/// GET /api/intel/actions - the ranked action recommendations.
#[instrument(skip(state))]
pub async fn get_actions(State(state): State<AppState>) -> Result<Json<Value>, CoreError> {
    ensure_snapshot(&state).await?;
    let actions = state.intel.actions();
    let generated_at = state.intel.snapshot().map(|s| s.analyzed_at);
    Ok(Json(json!({
        "generated_at": generated_at,
        "total_actions": actions.len(),
        "actions": actions,
    })))
}

/// POST /api/intel/refresh - force an immediate analysis cycle.
#[instrument(skip(state))]
pub async fn refresh_analysis(State(state): State<AppState>) -> Result<Json<Value>, CoreError> {
    state.intel.run_analysis(true).await?;
    info!("intel analysis refreshed via API");
    Ok(Json(json!({
        "status": "refreshed",
        "summary": state.intel.summary(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct RawSosQuery {
    #[serde(default = "default_raw_limit")]
    pub limit: usize,
}

fn default_raw_limit() -> usize {
    100
}

/// GET /api/intel/raw-sos - the raw normalised SOS feed (debugging aid).
#[instrument(skip(state))]
pub async fn get_raw_sos(
    State(state): State<AppState>,
    Query(query): Query<RawSosQuery>,
) -> Result<Json<Value>, CoreError> {
    if query.limit > 200 {
        return Err(CoreError::Validation("limit must be <= 200".to_string()));
    }
    let reports: Vec<_> = state.sos.all().into_iter().take(query.limit).collect();
    Ok(Json(json!({
        "count": reports.len(),
        "cache": state.sos.cache_info(),
        "reports": reports,
    })))
}

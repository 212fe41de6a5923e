//! Emergency facility endpoints.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::api::AppState;
use crate::cache::RefreshOutcome;
use crate::error::CoreError;
use crate::sources::ManagedSource;

/// GET /api/facilities - every known facility with per-kind counts.
#[instrument(skip(state))]
pub async fn get_all(State(state): State<AppState>) -> Json<Value> {
    let facilities = state.facilities.all();
    Json(json!({
        "count": facilities.len(),
        "summary": state.facilities.counts(),
        "cache": state.facilities.cache_info(),
        "facilities": facilities,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_radius_km() -> f64 {
    10.0
}

fn default_limit() -> usize {
    5
}

/// GET /api/facilities/nearby - nearest facilities per kind within a radius.
#[instrument(skip(state))]
pub async fn get_nearby(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Value>, CoreError> {
    if !(-90.0..=90.0).contains(&query.lat) || !(-180.0..=180.0).contains(&query.lon) {
        return Err(CoreError::Validation("invalid coordinates".to_string()));
    }
    if query.radius_km <= 0.0 || query.radius_km > 500.0 {
        return Err(CoreError::Validation(
            "radius_km must be in (0, 500]".to_string(),
        ));
    }

    let nearby = state
        .facilities
        .find_nearby(query.lat, query.lon, query.radius_km, query.limit);
    Ok(Json(json!({
        "origin": {"lat": query.lat, "lon": query.lon},
        "radius_km": query.radius_km,
        "cache": state.facilities.cache_info(),
        "nearby": nearby,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PointQuery {
    pub lat: f64,
    pub lon: f64,
}

/// GET /api/facilities/nearest-hospital - the single closest hospital.
#[instrument(skip(state))]
pub async fn get_nearest_hospital(
    State(state): State<AppState>,
    Query(query): Query<PointQuery>,
) -> Result<Json<Value>, CoreError> {
    if !(-90.0..=90.0).contains(&query.lat) || !(-180.0..=180.0).contains(&query.lon) {
        return Err(CoreError::Validation("invalid coordinates".to_string()));
    }
    let nearest = state.facilities.nearest_hospital(query.lat, query.lon);
    Ok(Json(json!({
        "origin": {"lat": query.lat, "lon": query.lon},
        "hospital": nearest,
    })))
}

/// POST /api/facilities/refresh - force one facility re-fetch.
#[instrument(skip(state))]
pub async fn refresh(State(state): State<AppState>) -> Result<Json<Value>, CoreError> {
    let outcome = state.facilities.refresh(true).await?;
    state.facilities.persist();
    Ok(Json(json!({
        "refreshed": outcome == RefreshOutcome::Refreshed,
        "summary": state.facilities.counts(),
    })))
}

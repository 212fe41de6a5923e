//! River endpoints, routed through the provider factory.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::api::AppState;
use crate::error::CoreError;
use crate::geo::BoundingBox;
use crate::model::RiverStation;

/// GET /api/rivers/by-region/:region_id - live stations from every provider
/// configured for the region.
#[instrument(skip(state))]
pub async fn get_by_region(
    State(state): State<AppState>,
    Path(region_id): Path<String>,
) -> Result<Json<Value>, CoreError> {
    // Unknown region is a caller error; a region without providers is not
    if !state.registry.contains(&region_id) {
        return Err(CoreError::UnknownRegion(region_id));
    }

    let providers = state.factory.providers_for_region(&region_id);
    let mut stations: Vec<RiverStation> = Vec::new();
    for provider in &providers {
        match provider.fetch_stations(None).await {
            Ok(batch) => stations.extend(batch),
            Err(err) => {
                warn!(provider = provider.id(), error = %err, "provider fetch failed");
            }
        }
    }

    Ok(Json(json!({
        "region": region_id,
        "providers": providers.iter().map(|p| p.id().to_string()).collect::<Vec<_>>(),
        "total_stations": stations.len(),
        "stations": stations,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BoundsQuery {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// GET /api/rivers/by-bounds - stations inside a bounding box, routed to
/// whichever providers cover the overlapping regions.
#[instrument(skip(state))]
pub async fn get_by_bounds(
    State(state): State<AppState>,
    Query(query): Query<BoundsQuery>,
) -> Result<Json<Value>, CoreError> {
    let bounds = BoundingBox::new(query.min_lat, query.max_lat, query.min_lon, query.max_lon);
    if !bounds.is_well_formed() {
        return Err(CoreError::Validation(
            "bounding box must satisfy min <= max on both axes".to_string(),
        ));
    }

    let providers = state.factory.providers_for_bounds(&bounds);
    let mut stations: Vec<RiverStation> = Vec::new();
    for provider in &providers {
        match provider.fetch_stations(Some(bounds)).await {
            Ok(batch) => stations.extend(batch),
            Err(err) => {
                warn!(provider = provider.id(), error = %err, "provider fetch failed");
            }
        }
    }

    Ok(Json(json!({
        "bounds": bounds,
        "providers": providers.iter().map(|p| p.id().to_string()).collect::<Vec<_>>(),
        "total_stations": stations.len(),
        "stations": stations,
    })))
}

/// GET /api/rivers/providers/status - concurrent health probe of every
/// registered provider.
#[instrument(skip(state))]
pub async fn get_provider_status(State(state): State<AppState>) -> Json<Value> {
    let health = state.factory.health_all().await;
    let connected = health.iter().filter(|h| h.connected).count();
    Json(json!({
        "total": health.len(),
        "connected": connected,
        "providers": health,
        "available_providers": state
            .factory
            .list()
            .into_iter()
            .map(|(id, name)| json!({"id": id, "name": name}))
            .collect::<Vec<_>>(),
    }))
}

/// GET /api/rivers/region-status/:region_id - provider health for one region.
#[instrument(skip(state))]
pub async fn get_region_status(
    State(state): State<AppState>,
    Path(region_id): Path<String>,
) -> Result<Json<Value>, CoreError> {
    if !state.registry.contains(&region_id) {
        return Err(CoreError::UnknownRegion(region_id));
    }
    let (providers, active) = state.factory.region_status(&region_id).await;
    Ok(Json(json!({
        "region": region_id,
        "active": active,
        "providers": providers,
    })))
}

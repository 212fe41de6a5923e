//! Region and district endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::api::AppState;
use crate::error::CoreError;
use crate::model::AlertLevel;
use crate::region::Region;

/// GET /api/regions - all configured regions.
#[instrument(skip(state))]
pub async fn list_regions(State(state): State<AppState>) -> Json<Value> {
    let regions = state.registry.all();
    Json(json!({
        "count": regions.len(),
        "current": state.current_region(),
        "regions": regions,
    }))
}

/// GET /api/regions/active - only regions flagged active.
#[instrument(skip(state))]
pub async fn list_active_regions(State(state): State<AppState>) -> Json<Value> {
    let regions = state.registry.active();
    Json(json!({
        "count": regions.len(),
        "regions": regions,
    }))
}

/// GET /api/regions/:region_id - one region definition.
#[instrument(skip(state))]
pub async fn get_region(
    State(state): State<AppState>,
    Path(region_id): Path<String>,
) -> Result<Json<Region>, CoreError> {
    Ok(Json(state.registry.get(&region_id)?))
}

#[derive(Debug, Deserialize)]
pub struct SetRegionRequest {
    pub region_id: String,
}

/// POST /api/regions/current - switch the region served by the district and
/// alert-level endpoints.
#[instrument(skip(state))]
pub async fn set_current_region(
    State(state): State<AppState>,
    Json(request): Json<SetRegionRequest>,
) -> Result<Json<Value>, CoreError> {
    // Validation doubles as the 404 for unknown ids
    let region = state.registry.get(&request.region_id)?;
    if !region.active {
        return Err(CoreError::Validation(format!(
            "region {} is not active",
            request.region_id
        )));
    }

    *state
        .current_region
        .write()
        .expect("region lock poisoned") = request.region_id.clone();
    info!(region = %request.region_id, "current region switched");

    Ok(Json(json!({
        "current": request.region_id,
        "region": region,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DistrictsQuery {
    pub region: Option<String>,
}

/// GET /api/districts - monitored districts with their current alert level.
///
/// The alert level comes from the latest persisted weather log when one
/// exists, falling back to the live weather cache.
#[instrument(skip(state))]
pub async fn get_districts(
    State(state): State<AppState>,
    Query(query): Query<DistrictsQuery>,
) -> Result<Json<Value>, CoreError> {
    let region_id = query.region.unwrap_or_else(|| state.current_region());
    let districts = state.registry.districts(&region_id)?;

    let mut items = Vec::with_capacity(districts.len());
    for district in districts {
        let rainfall = match &state.storage {
            Some(storage) => storage
                .latest_weather_log(&district.name, 24)
                .await
                .ok()
                .flatten()
                .map(|log| log.rainfall_mm),
            None => None,
        };
        // No log yet: fall back to the live weather snapshot
        let rainfall = rainfall.unwrap_or_else(|| {
            state
                .weather
                .for_district(&district.name)
                .map(|w| w.rainfall_24h_mm)
                .unwrap_or(0.0)
        });

        let alert_level = state
            .registry
            .alert_level(&region_id, rainfall)
            .unwrap_or(AlertLevel::Green);

        items.push(json!({
            "name": district.name,
            "latitude": district.latitude,
            "longitude": district.longitude,
            "current_alert_level": alert_level,
            "rainfall_24h_mm": rainfall,
        }));
    }

    Ok(Json(json!({
        "region": region_id,
        "count": items.len(),
        "districts": items,
    })))
}

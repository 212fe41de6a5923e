//! Traffic incident and flow endpoints.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::api::AppState;
use crate::error::CoreError;
use crate::model::IncidentCategory;
use crate::sources::ManagedSource;

#[derive(Debug, Deserialize)]
pub struct IncidentsQuery {
    pub category: Option<String>,
}

/// GET /api/traffic/incidents - road incidents, optionally filtered by
/// category, with the headline summary.
#[instrument(skip(state))]
pub async fn get_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentsQuery>,
) -> Result<Json<Value>, CoreError> {
    let incidents = match &query.category {
        Some(raw) => {
            let category = IncidentCategory::parse(raw)
                .ok_or_else(|| CoreError::Validation(format!("unknown category: {raw}")))?;
            state.traffic_incidents.by_category(category)
        }
        None => state.traffic_incidents.all(),
    };

    Ok(Json(json!({
        "count": incidents.len(),
        "summary": state.traffic_incidents.summary(),
        "cache": state.traffic_incidents.cache_info(),
        "incidents": incidents,
    })))
}

/// GET /api/traffic/flow - monitored corridor flow with congestion buckets.
#[instrument(skip(state))]
pub async fn get_flow(State(state): State<AppState>) -> Json<Value> {
    let segments = state.traffic_flow.all();
    Json(json!({
        "count": segments.len(),
        "cache": state.traffic_flow.cache_info(),
        "segments": segments,
    }))
}

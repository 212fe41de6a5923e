//! Weather, early-warning, marine, climate, and environmental endpoints.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use crate::api::{AppState, ListResponse};
use crate::error::CoreError;
use crate::model::DistrictWeather;
use crate::sources::ManagedSource;
use crate::sources::early_warning::RiskLevel;

/// GET /api/weather - current weather for every monitored district.
#[instrument(skip(state))]
pub async fn get_all_weather(
    State(state): State<AppState>,
) -> Json<ListResponse<DistrictWeather>> {
    let items = state.weather.all();
    Json(ListResponse {
        count: items.len(),
        cache: state.weather.cache_info(),
        items,
    })
}

/// GET /api/weather/:district - one district's weather.
#[instrument(skip(state))]
pub async fn get_district_weather(
    State(state): State<AppState>,
    Path(district): Path<String>,
) -> Result<Json<Value>, CoreError> {
    let weather = state
        .weather
        .for_district(&district)
        .ok_or_else(|| CoreError::UnknownDistrict(district))?;
    Ok(Json(json!({
        "cache": state.weather.cache_info(),
        "weather": weather,
    })))
}

/// GET /api/weather/alerts - severe weather alerts by severity bucket.
#[instrument(skip(state))]
pub async fn get_weather_alerts(State(state): State<AppState>) -> Json<Value> {
    let alerts = state.weather_alerts.all();
    Json(json!({
        "count": alerts.len(),
        "summary": state.weather_alerts.buckets(),
        "cache": state.weather_alerts.cache_info(),
        "alerts": alerts,
    }))
}

/// GET /api/marine - coastal wave and swell conditions.
#[instrument(skip(state))]
pub async fn get_marine(State(state): State<AppState>) -> Json<Value> {
    let conditions = state.marine.all();
    Json(json!({
        "count": conditions.len(),
        "cache": state.marine.cache_info(),
        "conditions": conditions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClimateQuery {
    pub district: String,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_end_year")]
    pub end_year: i32,
}

fn default_start_year() -> i32 {
    1994
}

fn default_end_year() -> i32 {
    2024
}

/// GET /api/climate - historical yearly climate for a district.
///
/// Archive responses are cached for a week and persisted, so only the first
/// query for a (district, range) key touches the upstream archive.
#[instrument(skip(state))]
pub async fn get_climate_history(
    State(state): State<AppState>,
    Query(query): Query<ClimateQuery>,
) -> Result<Json<Value>, CoreError> {
    if query.start_year > query.end_year {
        return Err(CoreError::Validation(
            "start_year must not exceed end_year".to_string(),
        ));
    }
    let series = state
        .climate
        .history(&query.district, query.start_year, query.end_year)
        .await?;
    Ok(Json(json!({
        "cache": state.climate.cache_info(),
        "series": series,
    })))
}

/// GET /api/environmental - environmental indicator trends and their flood
/// risk synthesis. A cold miss triggers one forced refresh.
#[instrument(skip(state))]
pub async fn get_environmental(State(state): State<AppState>) -> Result<Json<Value>, CoreError> {
    if state.environmental.trends().is_none() {
        state.environmental.refresh(true).await?;
    }
    let trends = state
        .environmental
        .trends()
        .ok_or_else(|| CoreError::provider("environmental", "no data after refresh"))?;
    Ok(Json(json!({
        "cache": state.environmental.cache_info(),
        "trends": trends,
    })))
}

// ============================================================================
// Early warning
// ============================================================================

/// GET /api/early-warning - overview with risk distribution per district.
#[instrument(skip(state))]
pub async fn get_early_warning_overview(State(state): State<AppState>) -> Json<Value> {
    let districts = state.early_warning.all();

    let mut risk_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut total_alerts = 0usize;
    let mut at_risk = 0usize;
    for district in &districts {
        let label = match district.risk_level {
            RiskLevel::Extreme => "extreme",
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
            RiskLevel::Unknown => "unknown",
        };
        *risk_counts.entry(label).or_default() += 1;
        total_alerts += district.alert_count;
        if district.risk_level.at_risk() {
            at_risk += 1;
        }
    }

    Json(json!({
        "summary": {
            "total_districts": districts.len(),
            "risk_distribution": risk_counts,
            "total_government_alerts": total_alerts,
            "districts_at_risk": at_risk,
        },
        "cache": state.early_warning.cache_info(),
        "districts": districts,
    }))
}

/// GET /api/early-warning/district/:district - full early-warning record.
#[instrument(skip(state))]
pub async fn get_early_warning_district(
    State(state): State<AppState>,
    Path(district): Path<String>,
) -> Result<Json<Value>, CoreError> {
    let warning = state
        .early_warning
        .for_district(&district)
        .ok_or_else(|| CoreError::UnknownDistrict(district))?;
    Ok(Json(json!({
        "cache": state.early_warning.cache_info(),
        "warning": warning,
    })))
}

/// GET /api/early-warning/alerts - all active government alerts, newest first.
#[instrument(skip(state))]
pub async fn get_early_warning_alerts(State(state): State<AppState>) -> Json<Value> {
    let mut alerts: Vec<Value> = Vec::new();
    for district in state.early_warning.all() {
        for alert in &district.alerts {
            alerts.push(json!({
                "district": district.district,
                "sender": alert.sender,
                "event": alert.event,
                "start": alert.start,
                "end": alert.end,
                "description": alert.description,
                "tags": alert.tags,
            }));
        }
    }
    alerts.sort_by(|a, b| {
        b["start"]
            .as_str()
            .unwrap_or("")
            .cmp(a["start"].as_str().unwrap_or(""))
    });

    Json(json!({
        "total_alerts": alerts.len(),
        "cache": state.early_warning.cache_info(),
        "alerts": alerts,
    }))
}

/// GET /api/early-warning/high-risk - districts at high or extreme risk.
#[instrument(skip(state))]
pub async fn get_high_risk_districts(State(state): State<AppState>) -> Json<Value> {
    let high_risk: Vec<_> = state
        .early_warning
        .all()
        .into_iter()
        .filter(|d| d.risk_level.at_risk())
        .collect();
    Json(json!({
        "count": high_risk.len(),
        "cache": state.early_warning.cache_info(),
        "districts": high_risk,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    #[serde(default = "default_days")]
    pub days: usize,
}

fn default_days() -> usize {
    8
}

/// GET /api/early-warning/forecast/daily - daily forecast grouped by date.
#[instrument(skip(state))]
pub async fn get_daily_forecast(
    State(state): State<AppState>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<Value>, CoreError> {
    if query.days == 0 || query.days > 8 {
        return Err(CoreError::Validation("days must be 1..=8".to_string()));
    }

    // BTreeMap keeps the days in date order
    let mut by_date: BTreeMap<String, Value> = BTreeMap::new();
    for district in state.early_warning.all() {
        for day in district.daily_forecast.iter().take(query.days) {
            let entry = by_date.entry(day.date.clone()).or_insert_with(|| {
                json!({
                    "date": day.date,
                    "day_name": day.day_name,
                    "districts": [],
                })
            });
            if let Some(districts) = entry["districts"].as_array_mut() {
                districts.push(json!({
                    "district": district.district,
                    "temp_min_c": day.temp_min_c,
                    "temp_max_c": day.temp_max_c,
                    "rain_mm": day.rain_mm,
                    "pop": day.pop,
                    "description": day.description,
                    "alert_level": day.alert_level,
                }));
            }
        }
    }

    let forecast: Vec<Value> = by_date.into_values().collect();
    Ok(Json(json!({
        "days": forecast.len(),
        "cache": state.early_warning.cache_info(),
        "forecast": forecast,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HourlyQuery {
    #[serde(default = "default_hours")]
    pub hours: usize,
}

fn default_hours() -> usize {
    48
}

/// GET /api/early-warning/forecast/hourly/:district - hourly forecast.
#[instrument(skip(state))]
pub async fn get_hourly_forecast(
    State(state): State<AppState>,
    Path(district): Path<String>,
    Query(query): Query<HourlyQuery>,
) -> Result<Json<Value>, CoreError> {
    if query.hours == 0 || query.hours > 48 {
        return Err(CoreError::Validation("hours must be 1..=48".to_string()));
    }
    let warning = state
        .early_warning
        .for_district(&district)
        .ok_or_else(|| CoreError::UnknownDistrict(district.clone()))?;

    let hourly: Vec<_> = warning
        .hourly_forecast
        .into_iter()
        .take(query.hours)
        .collect();
    Ok(Json(json!({
        "district": district,
        "hours": hourly.len(),
        "cache": state.early_warning.cache_info(),
        "forecast": hourly,
    })))
}

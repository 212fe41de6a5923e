//! Early-warning fetcher: government weather alerts, 48-hour hourly and
//! 8-day daily forecasts per district, with a derived flood risk level.
//!
//! One upstream call per district. A failed district still gets an entry
//! carrying the error and `risk_level = unknown`, so the overview always
//! lists every district. The snapshot is sorted most severe first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::warn;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::AlertLevel;
use crate::region::DistrictInfo;
use crate::sources::{ManagedSource, get_json, http_client};

const ONECALL_BASE: &str = "https://api.openweathermap.org/data/3.0/onecall";

// ============================================================================
// Normalised types
// ============================================================================

/// Flood risk level for a district, most severe first in sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Extreme,
    High,
    Medium,
    Low,
    Unknown,
}

impl RiskLevel {
    /// Thresholds: extreme >= 60, high >= 40, medium >= 20, else low.
    pub fn from_score(score: u32) -> Self {
        if score >= 60 {
            RiskLevel::Extreme
        } else if score >= 40 {
            RiskLevel::High
        } else if score >= 20 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Sort key: extreme sorts before low, unknown last.
    pub fn sort_order(&self) -> u8 {
        match self {
            RiskLevel::Extreme => 0,
            RiskLevel::High => 1,
            RiskLevel::Medium => 2,
            RiskLevel::Low => 3,
            RiskLevel::Unknown => 4,
        }
    }

    pub fn at_risk(&self) -> bool {
        matches!(self, RiskLevel::Extreme | RiskLevel::High)
    }
}

/// A contributing factor in the risk score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub detail: String,
    pub severity: String,
}

/// A government weather alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernmentAlert {
    pub sender: String,
    pub event: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One hour of forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyForecastEntry {
    pub time: DateTime<Utc>,
    pub temp_c: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_gust_ms: Option<f64>,
    /// Probability of precipitation in percent.
    pub pop: f64,
    pub rain_mm: f64,
    pub description: String,
}

/// One day of forecast with its own alert level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecastEntry {
    pub date: String,
    pub day_name: String,
    pub temp_min_c: Option<f64>,
    pub temp_max_c: Option<f64>,
    /// Probability of precipitation in percent.
    pub pop: f64,
    pub rain_mm: f64,
    pub description: String,
    pub alert_level: AlertLevel,
}

/// Current observed conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temp_c: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_gust_ms: Option<f64>,
    pub clouds: Option<f64>,
    pub rain_1h_mm: f64,
    pub description: String,
}

/// Forecast precipitation totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecipitationOutlook {
    pub next_24h_mm: f64,
    pub next_48h_mm: f64,
}

/// Full early-warning record for one district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictEarlyWarning {
    pub district: String,
    pub latitude: f64,
    pub longitude: f64,
    pub fetched_at: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub risk_factors: Vec<RiskFactor>,
    pub current: CurrentConditions,
    pub precipitation: PrecipitationOutlook,
    pub alerts: Vec<GovernmentAlert>,
    pub alert_count: usize,
    pub hourly_forecast: Vec<HourlyForecastEntry>,
    pub daily_forecast: Vec<DailyForecastEntry>,
    /// Set when the upstream call for this district failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DistrictEarlyWarning {
    fn failed(district: &DistrictInfo, error: String) -> Self {
        Self {
            district: district.name.clone(),
            latitude: district.latitude,
            longitude: district.longitude,
            fetched_at: Utc::now(),
            risk_level: RiskLevel::Unknown,
            risk_score: 0,
            risk_factors: Vec::new(),
            current: CurrentConditions::default(),
            precipitation: PrecipitationOutlook::default(),
            alerts: Vec::new(),
            alert_count: 0,
            hourly_forecast: Vec::new(),
            daily_forecast: Vec::new(),
            error: Some(error),
        }
    }
}

// ============================================================================
// Wire types (One Call 3.0)
// ============================================================================

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    current: Option<RawCurrent>,
    #[serde(default)]
    hourly: Vec<RawHourly>,
    #[serde(default)]
    daily: Vec<RawDaily>,
    #[serde(default)]
    alerts: Vec<RawAlert>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCurrent {
    #[serde(default)]
    temp: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    pressure: Option<f64>,
    #[serde(default)]
    wind_speed: Option<f64>,
    #[serde(default)]
    wind_gust: Option<f64>,
    #[serde(default)]
    clouds: Option<f64>,
    #[serde(default)]
    rain: Option<RawRainVolume>,
    #[serde(default)]
    weather: Vec<RawWeatherDesc>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRainVolume {
    #[serde(default, rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWeatherDesc {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawHourly {
    #[serde(default)]
    dt: i64,
    #[serde(default)]
    temp: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    pressure: Option<f64>,
    #[serde(default)]
    wind_speed: Option<f64>,
    #[serde(default)]
    wind_gust: Option<f64>,
    /// Probability of precipitation, 0.0-1.0.
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    rain: Option<RawRainVolume>,
    #[serde(default)]
    weather: Vec<RawWeatherDesc>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDaily {
    #[serde(default)]
    dt: i64,
    #[serde(default)]
    temp: Option<RawDailyTemp>,
    #[serde(default)]
    pop: f64,
    /// Daily rain volume in millimeters.
    #[serde(default)]
    rain: Option<f64>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    weather: Vec<RawWeatherDesc>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDailyTemp {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAlert {
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    start: i64,
    #[serde(default)]
    end: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
}

// ============================================================================
// Risk scoring
// ============================================================================

/// Score flood risk for one district from alerts, forecast, and current
/// conditions. The score is capped at 100.
fn calculate_risk(
    alerts: &[GovernmentAlert],
    hourly: &[HourlyForecastEntry],
    current: &CurrentConditions,
    precip_24h: f64,
) -> (RiskLevel, u32, Vec<RiskFactor>) {
    let mut score = 0u32;
    let mut factors = Vec::new();

    // Government alerts dominate
    if !alerts.is_empty() {
        score += (alerts.len() as u32 * 20).min(40);
        for alert in alerts {
            factors.push(RiskFactor {
                factor: "Government Alert".to_string(),
                detail: alert.event.clone(),
                severity: "high".to_string(),
            });
        }
    }

    if precip_24h >= 150.0 {
        score += 30;
        factors.push(RiskFactor {
            factor: "Extreme rainfall forecast".to_string(),
            detail: format!("{precip_24h:.1}mm in next 24h"),
            severity: "high".to_string(),
        });
    } else if precip_24h >= 100.0 {
        score += 25;
        factors.push(RiskFactor {
            factor: "Heavy rainfall forecast".to_string(),
            detail: format!("{precip_24h:.1}mm in next 24h"),
            severity: "high".to_string(),
        });
    } else if precip_24h >= 50.0 {
        score += 15;
        factors.push(RiskFactor {
            factor: "Significant rainfall forecast".to_string(),
            detail: format!("{precip_24h:.1}mm in next 24h"),
            severity: "medium".to_string(),
        });
    } else if precip_24h >= 25.0 {
        score += 8;
        factors.push(RiskFactor {
            factor: "Moderate rainfall forecast".to_string(),
            detail: format!("{precip_24h:.1}mm in next 24h"),
            severity: "low".to_string(),
        });
    }

    let high_pop_hours = hourly.iter().take(24).filter(|h| h.pop > 80.0).count();
    if high_pop_hours >= 12 {
        score += 15;
        factors.push(RiskFactor {
            factor: "Sustained high rain probability".to_string(),
            detail: format!("{high_pop_hours} hours with >80% chance"),
            severity: "medium".to_string(),
        });
    } else if high_pop_hours >= 6 {
        score += 8;
        factors.push(RiskFactor {
            factor: "High rain probability".to_string(),
            detail: format!("{high_pop_hours} hours with >80% chance"),
            severity: "low".to_string(),
        });
    }

    let max_wind = hourly
        .iter()
        .take(24)
        .filter_map(|h| h.wind_speed_ms)
        .fold(0.0_f64, f64::max);
    let max_gust = hourly
        .iter()
        .take(24)
        .filter_map(|h| h.wind_gust_ms)
        .fold(0.0_f64, f64::max);
    if max_gust >= 25.0 || max_wind >= 15.0 {
        score += 10;
        factors.push(RiskFactor {
            factor: "Strong winds".to_string(),
            detail: format!("Gusts up to {max_gust:.1} m/s"),
            severity: "medium".to_string(),
        });
    }

    if current.rain_1h_mm >= 10.0 {
        score += 10;
        factors.push(RiskFactor {
            factor: "Heavy rain occurring now".to_string(),
            detail: format!("{:.1}mm in last hour", current.rain_1h_mm),
            severity: "high".to_string(),
        });
    }

    let score = score.min(100);
    (RiskLevel::from_score(score), score, factors)
}

/// Per-day alert level from the rain volume and precipitation probability.
fn daily_alert_level(rain_mm: f64, pop_percent: f64) -> AlertLevel {
    if rain_mm >= 150.0 || (rain_mm >= 100.0 && pop_percent >= 80.0) {
        AlertLevel::Red
    } else if rain_mm >= 100.0 || (rain_mm >= 50.0 && pop_percent >= 70.0) {
        AlertLevel::Orange
    } else if rain_mm >= 50.0 || pop_percent >= 60.0 {
        AlertLevel::Yellow
    } else {
        AlertLevel::Green
    }
}

fn normalise(district: &DistrictInfo, response: OneCallResponse) -> DistrictEarlyWarning {
    let raw_current = response.current.unwrap_or_default();
    let current = CurrentConditions {
        temp_c: raw_current.temp,
        humidity: raw_current.humidity,
        pressure: raw_current.pressure,
        wind_speed_ms: raw_current.wind_speed,
        wind_gust_ms: raw_current.wind_gust,
        clouds: raw_current.clouds,
        rain_1h_mm: raw_current.rain.and_then(|r| r.one_hour).unwrap_or(0.0),
        description: raw_current
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_default(),
    };

    let hourly: Vec<HourlyForecastEntry> = response
        .hourly
        .iter()
        .take(48)
        .map(|h| HourlyForecastEntry {
            time: DateTime::from_timestamp(h.dt, 0).unwrap_or_default(),
            temp_c: h.temp,
            humidity: h.humidity,
            pressure: h.pressure,
            wind_speed_ms: h.wind_speed,
            wind_gust_ms: h.wind_gust,
            pop: h.pop * 100.0,
            rain_mm: h.rain.as_ref().and_then(|r| r.one_hour).unwrap_or(0.0),
            description: h
                .weather
                .first()
                .map(|w| w.description.clone())
                .unwrap_or_default(),
        })
        .collect();

    let daily: Vec<DailyForecastEntry> = response
        .daily
        .iter()
        .take(8)
        .map(|d| {
            let date = DateTime::from_timestamp(d.dt, 0).unwrap_or_default();
            let rain_mm = d.rain.unwrap_or(0.0);
            let pop = d.pop * 100.0;
            DailyForecastEntry {
                date: date.format("%Y-%m-%d").to_string(),
                day_name: date.format("%A").to_string(),
                temp_min_c: d.temp.as_ref().and_then(|t| t.min),
                temp_max_c: d.temp.as_ref().and_then(|t| t.max),
                pop,
                rain_mm,
                description: d.summary.clone().unwrap_or_else(|| {
                    d.weather
                        .first()
                        .map(|w| w.description.clone())
                        .unwrap_or_default()
                }),
                alert_level: daily_alert_level(rain_mm, pop),
            }
        })
        .collect();

    let alerts: Vec<GovernmentAlert> = response
        .alerts
        .into_iter()
        .map(|a| GovernmentAlert {
            sender: if a.sender_name.is_empty() {
                "Unknown".to_string()
            } else {
                a.sender_name
            },
            event: if a.event.is_empty() {
                "Weather Alert".to_string()
            } else {
                a.event
            },
            start: DateTime::from_timestamp(a.start, 0),
            end: DateTime::from_timestamp(a.end, 0),
            description: a.description,
            tags: a.tags,
        })
        .collect();

    let precip_24h: f64 = hourly.iter().take(24).map(|h| h.rain_mm).sum();
    let precip_48h: f64 = hourly.iter().take(48).map(|h| h.rain_mm).sum();

    let (risk_level, risk_score, risk_factors) =
        calculate_risk(&alerts, &hourly, &current, precip_24h);

    DistrictEarlyWarning {
        district: district.name.clone(),
        latitude: district.latitude,
        longitude: district.longitude,
        fetched_at: Utc::now(),
        risk_level,
        risk_score,
        risk_factors,
        current,
        precipitation: PrecipitationOutlook {
            next_24h_mm: (precip_24h * 100.0).round() / 100.0,
            next_48h_mm: (precip_48h * 100.0).round() / 100.0,
        },
        alert_count: alerts.len(),
        alerts,
        hourly_forecast: hourly,
        daily_forecast: daily,
        error: None,
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Fetcher for the early-warning feed. Disabled without an API key.
pub struct EarlyWarningFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    districts: Vec<DistrictInfo>,
    cache: SourceCache<Vec<DistrictEarlyWarning>>,
}

impl EarlyWarningFetcher {
    pub fn new(config: &CoreConfig, districts: Vec<DistrictInfo>) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: ONECALL_BASE.to_string(),
            api_key: config.api_keys.openweathermap.clone(),
            districts,
            cache: SourceCache::new("early_warning", config.ttls.early_warning)
                .with_freeze(config.freeze_mode)
                .with_snapshot_dir(config.snapshot_dir.as_ref()),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn all(&self) -> Vec<DistrictEarlyWarning> {
        self.cache.get().map(|w| w.as_ref().clone()).unwrap_or_default()
    }

    pub fn for_district(&self, district: &str) -> Option<DistrictEarlyWarning> {
        self.cache.get().and_then(|all| {
            all.iter()
                .find(|w| w.district.eq_ignore_ascii_case(district))
                .cloned()
        })
    }

    async fn fetch_upstream(&self) -> Result<Vec<DistrictEarlyWarning>, CoreError> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| CoreError::SourceDisabled("early_warning".to_string()))?;

        let mut tasks: JoinSet<DistrictEarlyWarning> = JoinSet::new();
        for district in self.districts.clone() {
            let client = self.client.clone();
            let base = self.base_url.clone();
            let key = key.clone();
            tasks.spawn(async move {
                let url = format!(
                    "{}?lat={}&lon={}&appid={}&units=metric",
                    base, district.latitude, district.longitude, key
                );
                match get_json::<OneCallResponse>(&client, &url, "early_warning").await {
                    Ok(response) => normalise(&district, response),
                    Err(err) => {
                        warn!(district = %district.name, error = %err, "early warning fetch failed");
                        DistrictEarlyWarning::failed(&district, err.to_string())
                    }
                }
            });
        }

        let mut snapshot = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(entry) = joined {
                snapshot.push(entry);
            }
        }

        if snapshot.iter().all(|e| e.error.is_some()) {
            return Err(CoreError::provider(
                "early_warning",
                "all district fetches failed",
            ));
        }

        // Most severe first, then by name for a stable order
        snapshot.sort_by(|a, b| {
            a.risk_level
                .sort_order()
                .cmp(&b.risk_level.sort_order())
                .then_with(|| a.district.cmp(&b.district))
        });
        Ok(snapshot)
    }
}

#[async_trait]
impl ManagedSource for EarlyWarningFetcher {
    fn name(&self) -> &'static str {
        "early_warning"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl().num_seconds().max(0) as u64)
    }

    fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn cache_info(&self) -> CacheInfo {
        self.cache.cache_info()
    }

    async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        if self.api_key.is_none() {
            return Err(CoreError::SourceDisabled("early_warning".to_string()));
        }
        self.cache
            .refresh_with(force, || self.fetch_upstream())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly_with(pop: f64, rain: f64, wind: f64) -> HourlyForecastEntry {
        HourlyForecastEntry {
            time: Utc::now(),
            temp_c: Some(27.0),
            humidity: Some(80.0),
            pressure: Some(1006.0),
            wind_speed_ms: Some(wind),
            wind_gust_ms: None,
            pop,
            rain_mm: rain,
            description: String::new(),
        }
    }

    fn calm_current() -> CurrentConditions {
        CurrentConditions::default()
    }

    #[test]
    fn test_risk_low_when_calm() {
        let (level, score, factors) = calculate_risk(&[], &[], &calm_current(), 0.0);
        assert_eq!(level, RiskLevel::Low);
        assert_eq!(score, 0);
        assert!(factors.is_empty());
    }

    #[test]
    fn test_risk_alerts_capped_at_40() {
        let alerts: Vec<GovernmentAlert> = (0..5)
            .map(|i| GovernmentAlert {
                sender: "DoM".to_string(),
                event: format!("Alert {i}"),
                start: None,
                end: None,
                description: String::new(),
                tags: vec![],
            })
            .collect();
        let (level, score, _) = calculate_risk(&alerts, &[], &calm_current(), 0.0);
        assert_eq!(score, 40);
        assert_eq!(level, RiskLevel::High);
    }

    #[test]
    fn test_risk_extreme_combination() {
        // Two alerts (40) + extreme forecast (30) + sustained pop (15)
        let alerts = vec![
            GovernmentAlert {
                sender: "DoM".to_string(),
                event: "Red rain warning".to_string(),
                start: None,
                end: None,
                description: String::new(),
                tags: vec![],
            },
            GovernmentAlert {
                sender: "DoM".to_string(),
                event: "Landslide warning".to_string(),
                start: None,
                end: None,
                description: String::new(),
                tags: vec![],
            },
        ];
        let hourly: Vec<HourlyForecastEntry> =
            (0..24).map(|_| hourly_with(90.0, 8.0, 5.0)).collect();
        let (level, score, _) = calculate_risk(&alerts, &hourly, &calm_current(), 192.0);
        assert_eq!(level, RiskLevel::Extreme);
        assert_eq!(score, 85);
    }

    #[test]
    fn test_risk_score_capped_at_100() {
        let alerts: Vec<GovernmentAlert> = (0..3)
            .map(|_| GovernmentAlert {
                sender: String::new(),
                event: String::new(),
                start: None,
                end: None,
                description: String::new(),
                tags: vec![],
            })
            .collect();
        let hourly: Vec<HourlyForecastEntry> =
            (0..24).map(|_| hourly_with(95.0, 10.0, 20.0)).collect();
        let mut current = calm_current();
        current.rain_1h_mm = 25.0;
        let (_, score, _) = calculate_risk(&alerts, &hourly, &current, 300.0);
        assert_eq!(score, 100);
    }

    #[test]
    fn test_daily_alert_level_matrix() {
        assert_eq!(daily_alert_level(160.0, 10.0), AlertLevel::Red);
        assert_eq!(daily_alert_level(110.0, 85.0), AlertLevel::Red);
        assert_eq!(daily_alert_level(110.0, 40.0), AlertLevel::Orange);
        assert_eq!(daily_alert_level(60.0, 75.0), AlertLevel::Orange);
        assert_eq!(daily_alert_level(60.0, 20.0), AlertLevel::Yellow);
        assert_eq!(daily_alert_level(5.0, 65.0), AlertLevel::Yellow);
        assert_eq!(daily_alert_level(5.0, 20.0), AlertLevel::Green);
    }

    #[test]
    fn test_normalise_one_call() {
        let district = DistrictInfo {
            name: "Ratnapura".to_string(),
            latitude: 6.6828,
            longitude: 80.3992,
        };
        let raw = r#"{
            "current": {
                "temp": 26.0, "humidity": 92, "pressure": 1004,
                "wind_speed": 6.0, "clouds": 90,
                "rain": {"1h": 12.5},
                "weather": [{"description": "heavy intensity rain"}]
            },
            "hourly": [
                {"dt": 1732777200, "temp": 25.0, "pop": 0.95, "rain": {"1h": 9.0},
                 "wind_speed": 7.0, "weather": [{"description": "rain"}]}
            ],
            "daily": [
                {"dt": 1732777200, "temp": {"min": 23.0, "max": 28.0}, "pop": 0.9,
                 "rain": 120.0, "summary": "Heavy rain"}
            ],
            "alerts": [
                {"sender_name": "Department of Meteorology", "event": "Severe weather",
                 "start": 1732770000, "end": 1732856400, "description": "Stay indoors",
                 "tags": ["Rain"]}
            ]
        }"#;
        let response: OneCallResponse = serde_json::from_str(raw).unwrap();
        let warning = normalise(&district, response);

        assert_eq!(warning.district, "Ratnapura");
        assert_eq!(warning.alert_count, 1);
        assert_eq!(warning.current.rain_1h_mm, 12.5);
        assert_eq!(warning.hourly_forecast.len(), 1);
        assert_eq!(warning.hourly_forecast[0].pop, 95.0);
        assert_eq!(warning.daily_forecast.len(), 1);
        // 120mm with 90% pop is a red day
        assert_eq!(warning.daily_forecast[0].alert_level, AlertLevel::Red);
        // One alert (20) + heavy rain now (10); 9mm over one hour misses the
        // 25mm forecast band
        assert_eq!(warning.risk_score, 30);
        assert_eq!(warning.risk_level, RiskLevel::Medium);
        assert!(warning.error.is_none());
    }
}

//! District weather fetcher: current observations plus daily forecast.
//!
//! The primary provider (HERE, keyed) returns observation and forecast in a
//! single report call per district; when it errors the fetcher falls back to
//! Open-Meteo, which needs no credentials. Partial failures keep whatever
//! districts were obtained; a cycle that yields nothing leaves the previous
//! snapshot untouched.

use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::{DailyForecast, DangerLevel, DistrictWeather};
use crate::region::DistrictInfo;
use crate::sources::{ManagedSource, get_json, http_client};

const HERE_BASE: &str = "https://weather.hereapi.com/v3";
const OPEN_METEO_BASE: &str = "https://api.open-meteo.com/v1";

// ============================================================================
// Danger assessment
// ============================================================================

/// Score the weather danger for a district.
///
/// | Condition | Points |
/// |---|---|
/// | rainfall 24h > 100 mm | +40 |
/// | rainfall 24h > 50 mm | +25 |
/// | rainfall 24h > 25 mm | +10 |
/// | precipitation probability > 80 % | +15 |
/// | wind speed > 60 km/h | +20 |
/// | wind speed > 40 km/h | +10 |
pub fn danger_assessment(
    rainfall_24h_mm: f64,
    precip_probability: Option<f64>,
    wind_speed_kmh: Option<f64>,
) -> (u32, DangerLevel, Vec<String>) {
    let mut score = 0u32;
    let mut factors = Vec::new();

    if rainfall_24h_mm > 100.0 {
        score += 40;
        factors.push("Heavy rainfall >100mm".to_string());
    } else if rainfall_24h_mm > 50.0 {
        score += 25;
        factors.push("Moderate rainfall >50mm".to_string());
    } else if rainfall_24h_mm > 25.0 {
        score += 10;
        factors.push("Light rainfall >25mm".to_string());
    }

    if precip_probability.unwrap_or(0.0) > 80.0 {
        score += 15;
        factors.push("High precipitation probability".to_string());
    }

    let wind = wind_speed_kmh.unwrap_or(0.0);
    if wind > 60.0 {
        score += 20;
        factors.push("Strong winds >60km/h".to_string());
    } else if wind > 40.0 {
        score += 10;
        factors.push("Moderate winds >40km/h".to_string());
    }

    (score, DangerLevel::from_score(score), factors)
}

// ============================================================================
// HERE wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HereReport {
    #[serde(default)]
    observations: Vec<HereObservation>,
    #[serde(default, rename = "dailyForecasts")]
    daily_forecasts: Vec<HereDailyForecast>,
}

#[derive(Debug, Default, Deserialize)]
struct HereObservation {
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default, rename = "barometerPressure")]
    barometer_pressure: Option<f64>,
    #[serde(default, rename = "windSpeed")]
    wind_speed: Option<f64>,
    #[serde(default, rename = "windGust")]
    wind_gust: Option<f64>,
    #[serde(default, rename = "windDirection")]
    wind_direction: Option<f64>,
    #[serde(default, rename = "precipitation24H")]
    precipitation_24h: Option<f64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HereDailyForecast {
    #[serde(default)]
    date: String,
    #[serde(default, rename = "lowTemperature")]
    low_temperature: Option<f64>,
    #[serde(default, rename = "highTemperature")]
    high_temperature: Option<f64>,
    #[serde(default, rename = "precipitationDesc")]
    precipitation_desc: Option<String>,
    #[serde(default, rename = "rainFall")]
    rain_fall: Option<f64>,
    #[serde(default, rename = "precipitationProbability")]
    precipitation_probability: Option<f64>,
}

// ============================================================================
// Open-Meteo wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    current: Option<OpenMeteoCurrent>,
    #[serde(default)]
    daily: Option<OpenMeteoDaily>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenMeteoCurrent {
    #[serde(default, rename = "temperature_2m")]
    temperature_2m: Option<f64>,
    #[serde(default, rename = "relative_humidity_2m")]
    relative_humidity_2m: Option<f64>,
    #[serde(default, rename = "surface_pressure")]
    surface_pressure: Option<f64>,
    #[serde(default, rename = "wind_speed_10m")]
    wind_speed_10m: Option<f64>,
    #[serde(default, rename = "wind_gusts_10m")]
    wind_gusts_10m: Option<f64>,
    #[serde(default, rename = "wind_direction_10m")]
    wind_direction_10m: Option<f64>,
    #[serde(default, rename = "cloud_cover")]
    cloud_cover: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenMeteoDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default, rename = "precipitation_probability_max")]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default, rename = "temperature_2m_min")]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default, rename = "temperature_2m_max")]
    temperature_2m_max: Vec<Option<f64>>,
}

// ============================================================================
// Fetcher
// ============================================================================

/// Fetcher for per-district weather observations and daily forecasts.
pub struct WeatherFetcher {
    client: reqwest::Client,
    here_base: String,
    open_meteo_base: String,
    api_key: Option<String>,
    districts: Vec<DistrictInfo>,
    cache: SourceCache<Vec<DistrictWeather>>,
}

impl WeatherFetcher {
    pub fn new(config: &CoreConfig, districts: Vec<DistrictInfo>) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            here_base: HERE_BASE.to_string(),
            open_meteo_base: OPEN_METEO_BASE.to_string(),
            api_key: config.api_keys.here.clone(),
            districts,
            cache: SourceCache::new("weather", config.ttls.weather)
                .with_freeze(config.freeze_mode)
                .with_snapshot_dir(config.snapshot_dir.as_ref()),
        }
    }

    /// Override the upstream URLs (for testing).
    pub fn with_base_urls(mut self, here: &str, open_meteo: &str) -> Self {
        self.here_base = here.to_string();
        self.open_meteo_base = open_meteo.to_string();
        self
    }

    pub fn load_snapshot(&self) {
        self.cache.load_from_disk();
    }

    /// All districts currently in the snapshot.
    pub fn all(&self) -> Vec<DistrictWeather> {
        self.cache.get().map(|w| w.as_ref().clone()).unwrap_or_default()
    }

    pub fn for_district(&self, district: &str) -> Option<DistrictWeather> {
        self.cache.get().and_then(|all| {
            all.iter()
                .find(|w| w.district.eq_ignore_ascii_case(district))
                .cloned()
        })
    }

    /// Districts that carry a daily forecast.
    pub fn forecasts(&self) -> Vec<DistrictWeather> {
        self.all()
            .into_iter()
            .filter(|w| !w.forecast_daily.is_empty())
            .collect()
    }

    pub fn is_fresh(&self) -> bool {
        self.cache.is_fresh()
    }

    async fn fetch_upstream(&self) -> Result<Vec<DistrictWeather>, CoreError> {
        // Primary provider first, fall back to the keyless one on error.
        if self.api_key.is_some() {
            match self.fetch_all_here().await {
                Ok(snapshot) if !snapshot.is_empty() => return Ok(snapshot),
                Ok(_) => debug!("primary weather provider returned nothing, falling back"),
                Err(err) => {
                    warn!(error = %err, "primary weather provider failed, falling back");
                }
            }
        }
        self.fetch_all_open_meteo().await
    }

    async fn fetch_all_here(&self) -> Result<Vec<DistrictWeather>, CoreError> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| CoreError::SourceDisabled("weather".to_string()))?;

        let mut tasks: JoinSet<Option<DistrictWeather>> = JoinSet::new();
        for district in self.districts.clone() {
            let client = self.client.clone();
            let base = self.here_base.clone();
            let key = key.clone();
            tasks.spawn(async move {
                let url = format!(
                    "{}/report?products=observation,forecast7days&location={},{}&apiKey={}",
                    base, district.latitude, district.longitude, key
                );
                match get_json::<HereReport>(&client, &url, "weather").await {
                    Ok(report) => Some(normalise_here(&district, report)),
                    Err(err) => {
                        warn!(district = %district.name, error = %err, "weather fetch failed");
                        None
                    }
                }
            });
        }

        let mut snapshot = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(weather)) = joined {
                snapshot.push(weather);
            }
        }

        if snapshot.is_empty() {
            return Err(CoreError::provider("weather", "all district fetches failed"));
        }
        snapshot.sort_by(|a, b| a.district.cmp(&b.district));
        Ok(snapshot)
    }

    async fn fetch_all_open_meteo(&self) -> Result<Vec<DistrictWeather>, CoreError> {
        let mut tasks: JoinSet<Option<DistrictWeather>> = JoinSet::new();
        for district in self.districts.clone() {
            let client = self.client.clone();
            let base = self.open_meteo_base.clone();
            tasks.spawn(async move {
                let url = format!(
                    "{}/forecast?latitude={}&longitude={}\
                     &current=temperature_2m,relative_humidity_2m,surface_pressure,wind_speed_10m,wind_gusts_10m,wind_direction_10m,cloud_cover\
                     &daily=precipitation_sum,precipitation_probability_max,temperature_2m_min,temperature_2m_max\
                     &forecast_days=8&timezone=UTC",
                    base, district.latitude, district.longitude
                );
                match get_json::<OpenMeteoResponse>(&client, &url, "weather").await {
                    Ok(response) => Some(normalise_open_meteo(&district, response)),
                    Err(err) => {
                        warn!(district = %district.name, error = %err, "fallback weather fetch failed");
                        None
                    }
                }
            });
        }

        let mut snapshot = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(weather)) = joined {
                snapshot.push(weather);
            }
        }

        if snapshot.is_empty() {
            return Err(CoreError::provider("weather", "all district fetches failed"));
        }
        snapshot.sort_by(|a, b| a.district.cmp(&b.district));
        Ok(snapshot)
    }
}

/// Assemble the normalised record from forecast totals and an observation.
fn build_district_weather(
    district: &DistrictInfo,
    temperature_c: Option<f64>,
    humidity_percent: Option<f64>,
    pressure_hpa: Option<f64>,
    wind_speed_kmh: Option<f64>,
    wind_gust_kmh: Option<f64>,
    wind_direction_deg: Option<f64>,
    cloud_cover_percent: Option<f64>,
    observed_24h_mm: Option<f64>,
    forecast_daily: Vec<DailyForecast>,
) -> DistrictWeather {
    let day_total = |n: usize| -> f64 {
        forecast_daily
            .iter()
            .take(n)
            .map(|d| d.precipitation_mm)
            .sum()
    };
    let forecast_24h = day_total(1);
    let forecast_48h = day_total(2);
    let forecast_72h = day_total(3);

    let rainfall_24h = observed_24h_mm.unwrap_or(forecast_24h);
    let precip_probability = forecast_daily
        .first()
        .and_then(|d| d.precipitation_probability);

    let (danger_score, danger_level, danger_factors) =
        danger_assessment(rainfall_24h, precip_probability, wind_speed_kmh);

    DistrictWeather {
        district: district.name.clone(),
        latitude: district.latitude,
        longitude: district.longitude,
        temperature_c,
        humidity_percent,
        pressure_hpa,
        wind_speed_kmh,
        wind_gust_kmh,
        wind_direction_deg,
        cloud_cover_percent,
        rainfall_24h_mm: rainfall_24h,
        rainfall_48h_mm: forecast_48h,
        rainfall_72h_mm: forecast_72h,
        forecast_precip_24h_mm: forecast_24h,
        forecast_precip_48h_mm: forecast_48h,
        precipitation_probability: precip_probability,
        danger_level,
        danger_score,
        danger_factors,
        forecast_daily,
    }
}

fn normalise_here(district: &DistrictInfo, report: HereReport) -> DistrictWeather {
    let obs = report.observations.into_iter().next().unwrap_or_default();

    let forecast_daily: Vec<DailyForecast> = report
        .daily_forecasts
        .into_iter()
        .take(8)
        .map(|day| DailyForecast {
            date: day.date,
            temp_min_c: day.low_temperature,
            temp_max_c: day.high_temperature,
            precipitation_mm: day.rain_fall.unwrap_or(0.0),
            precipitation_probability: day.precipitation_probability,
            description: day.precipitation_desc,
        })
        .collect();

    build_district_weather(
        district,
        obs.temperature,
        obs.humidity,
        obs.barometer_pressure,
        obs.wind_speed,
        obs.wind_gust,
        obs.wind_direction,
        None,
        obs.precipitation_24h,
        forecast_daily,
    )
}

fn normalise_open_meteo(district: &DistrictInfo, response: OpenMeteoResponse) -> DistrictWeather {
    let current = response.current.unwrap_or_default();
    let daily = response.daily.unwrap_or_default();

    let days = daily.time.len();
    let mut forecast_daily = Vec::with_capacity(days.min(8));
    for i in 0..days.min(8) {
        forecast_daily.push(DailyForecast {
            date: daily.time[i].clone(),
            temp_min_c: daily.temperature_2m_min.get(i).copied().flatten(),
            temp_max_c: daily.temperature_2m_max.get(i).copied().flatten(),
            precipitation_mm: daily
                .precipitation_sum
                .get(i)
                .copied()
                .flatten()
                .unwrap_or(0.0),
            precipitation_probability: daily
                .precipitation_probability_max
                .get(i)
                .copied()
                .flatten(),
            description: None,
        });
    }

    build_district_weather(
        district,
        current.temperature_2m,
        current.relative_humidity_2m,
        current.surface_pressure,
        current.wind_speed_10m,
        current.wind_gusts_10m,
        current.wind_direction_10m,
        current.cloud_cover,
        None,
        forecast_daily,
    )
}

#[async_trait]
impl ManagedSource for WeatherFetcher {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl().num_seconds().max(0) as u64)
    }

    fn cache_info(&self) -> CacheInfo {
        self.cache.cache_info()
    }

    async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        self.cache
            .refresh_with(force, || self.fetch_upstream())
            .await
    }

    fn persist(&self) {
        if let Err(err) = self.cache.snapshot_to_disk() {
            tracing::warn!(error = %err, "weather snapshot write failed");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn colombo() -> DistrictInfo {
        DistrictInfo {
            name: "Colombo".to_string(),
            latitude: 6.9271,
            longitude: 79.8612,
        }
    }

    #[test]
    fn test_danger_assessment_table() {
        // Heavy rain alone
        let (score, level, factors) = danger_assessment(120.0, None, None);
        assert_eq!(score, 40);
        assert_eq!(level, DangerLevel::High);
        assert_eq!(factors, vec!["Heavy rainfall >100mm"]);

        // Moderate rain + high probability + strong wind
        let (score, level, factors) = danger_assessment(60.0, Some(90.0), Some(65.0));
        assert_eq!(score, 25 + 15 + 20);
        assert_eq!(level, DangerLevel::Critical);
        assert_eq!(factors.len(), 3);

        // Calm day
        let (score, level, factors) = danger_assessment(2.0, Some(10.0), Some(8.0));
        assert_eq!(score, 0);
        assert_eq!(level, DangerLevel::Low);
        assert!(factors.is_empty());
    }

    #[test]
    fn test_danger_boundaries_are_exclusive() {
        // Exactly at a boundary does not trip the band
        let (score, _, _) = danger_assessment(100.0, None, None);
        assert_eq!(score, 25);
        let (score, _, _) = danger_assessment(25.0, None, None);
        assert_eq!(score, 0);
        let (score, _, _) = danger_assessment(0.0, Some(80.0), Some(40.0));
        assert_eq!(score, 0);
    }

    #[test]
    fn test_normalise_here_report() {
        let raw = r#"{
            "observations": [{
                "temperature": 29.4,
                "humidity": 82,
                "barometerPressure": 1007.2,
                "windSpeed": 18.0,
                "windGust": 32.0,
                "windDirection": 225,
                "precipitation24H": 64.0,
                "description": "Rain showers"
            }],
            "dailyForecasts": [
                {"date": "2024-11-28", "lowTemperature": 24.1, "highTemperature": 29.8,
                 "rainFall": 45.0, "precipitationProbability": 85},
                {"date": "2024-11-29", "rainFall": 30.0, "precipitationProbability": 70}
            ]
        }"#;
        let report: HereReport = serde_json::from_str(raw).unwrap();
        let weather = normalise_here(&colombo(), report);

        assert_eq!(weather.district, "Colombo");
        // Observed 24h rainfall is preferred over the forecast total
        assert_eq!(weather.rainfall_24h_mm, 64.0);
        assert_eq!(weather.forecast_precip_24h_mm, 45.0);
        assert_eq!(weather.forecast_precip_48h_mm, 75.0);
        assert_eq!(weather.forecast_daily.len(), 2);
        // 64mm -> +25, probability 85% -> +15; total 40
        assert_eq!(weather.danger_score, 40);
        assert_eq!(weather.danger_level, DangerLevel::High);
    }

    #[test]
    fn test_normalise_open_meteo_response() {
        let raw = r#"{
            "current": {
                "temperature_2m": 27.5,
                "relative_humidity_2m": 88,
                "surface_pressure": 1005.0,
                "wind_speed_10m": 14.0,
                "cloud_cover": 75
            },
            "daily": {
                "time": ["2024-11-28", "2024-11-29", "2024-11-30"],
                "precipitation_sum": [20.0, 35.0, 10.0],
                "precipitation_probability_max": [60, 80, 40],
                "temperature_2m_min": [24.0, 23.5, 24.2],
                "temperature_2m_max": [30.0, 29.0, 31.0]
            }
        }"#;
        let response: OpenMeteoResponse = serde_json::from_str(raw).unwrap();
        let weather = normalise_open_meteo(&colombo(), response);

        // No separate observation total, so 24h rainfall falls back to day 0
        assert_eq!(weather.rainfall_24h_mm, 20.0);
        assert_eq!(weather.rainfall_48h_mm, 55.0);
        assert_eq!(weather.rainfall_72h_mm, 65.0);
        assert_eq!(weather.forecast_daily.len(), 3);
        assert_eq!(weather.forecast_daily[1].precipitation_mm, 35.0);
    }

    #[test]
    fn test_missing_observation_defaults() {
        let report: HereReport = serde_json::from_str(r#"{"dailyForecasts": []}"#).unwrap();
        let weather = normalise_here(&colombo(), report);
        assert_eq!(weather.rainfall_24h_mm, 0.0);
        assert_eq!(weather.danger_level, DangerLevel::Low);
        assert!(weather.forecast_daily.is_empty());
    }
}

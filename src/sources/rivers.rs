//! River level fetchers.
//!
//! Two upstream gauge networks feed the same normalised [`RiverStation`]
//! records: the Irrigation Department hydrology API (rich thresholds and
//! district tags) and the Navy water level recording system. Both refresh on
//! a five-minute cadence and retry once with a short backoff, since the
//! gauges are the highest-value signal during an active flood.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::{FloodStatus, RiverStation, RiverSummary, WaterReading};
use crate::sources::{ManagedSource, get_json_with_retry, http_client};

const IRRIGATION_BASE: &str = "https://irrigation.gov.lk/hydro/api";
const NAVY_BASE: &str = "https://floodms.navy.lk/wlrs/api";

const RETRY_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

// ============================================================================
// Wire types
// ============================================================================

/// Station entry from the Irrigation Department hydrology feed.
#[derive(Debug, Clone, Deserialize)]
struct IrrigationStationRaw {
    #[serde(default)]
    station: String,
    #[serde(default)]
    river: String,
    #[serde(default)]
    river_code: Option<String>,
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
    #[serde(default)]
    catchment_area_km2: Option<f64>,
    #[serde(default)]
    water_level_m: f64,
    #[serde(default)]
    water_level_1hr_ago_m: Option<f64>,
    #[serde(default)]
    rainfall_24h_mm: Option<f64>,
    #[serde(default)]
    alert_level_m: Option<f64>,
    #[serde(default)]
    minor_flood_level_m: Option<f64>,
    #[serde(default)]
    major_flood_level_m: Option<f64>,
    #[serde(default)]
    districts: Vec<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IrrigationResponse {
    #[serde(default)]
    stations: Vec<IrrigationStationRaw>,
}

/// Station entry from the Navy WLRS feed. Field names follow the upstream
/// payload; thresholds come back as strings on some gauges.
#[derive(Debug, Clone, Deserialize)]
struct NavyStationRaw {
    #[serde(default)]
    station: String,
    #[serde(default)]
    river: String,
    #[serde(default)]
    river_code: Option<String>,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    water_level_m: f64,
    #[serde(default)]
    water_level_1hr_ago_m: Option<f64>,
    #[serde(default)]
    rainfall_24h_mm: Option<f64>,
    #[serde(default)]
    alert_m: Option<f64>,
    #[serde(default)]
    minor_flood_m: Option<f64>,
    #[serde(default)]
    major_flood_m: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    districts: Vec<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NavyResponse {
    #[serde(default)]
    data: Vec<NavyStationRaw>,
}

// ============================================================================
// Normalisation
// ============================================================================

/// Build the globally unique station id `<region>_<river>_<station>`.
fn station_id(region_id: &str, river: &str, station: &str) -> String {
    format!(
        "{}_{}_{}",
        region_id,
        slug(river),
        slug(station)
    )
}

fn slug(value: &str) -> String {
    value
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn parse_updated(raw: &Option<String>) -> DateTime<Utc> {
    raw.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Count stations per threshold band and pick the worst gauge.
pub fn summarize(stations: &[RiverStation]) -> RiverSummary {
    let mut summary = RiverSummary {
        total_stations: stations.len(),
        ..RiverSummary::default()
    };

    let mut worst: Option<&RiverStation> = None;
    for station in stations {
        match station.status {
            FloodStatus::MajorFlood => summary.major_flood += 1,
            FloodStatus::MinorFlood => summary.minor_flood += 1,
            FloodStatus::Alert => summary.alert += 1,
            _ => {}
        }
        let is_worse = match worst {
            None => true,
            Some(current) => {
                let by_status = station
                    .status
                    .severity_rank()
                    .cmp(&current.status.severity_rank());
                by_status == std::cmp::Ordering::Greater
                    || (by_status == std::cmp::Ordering::Equal
                        && station.pct_to_alert().unwrap_or(f64::MAX)
                            < current.pct_to_alert().unwrap_or(f64::MAX))
            }
        };
        if is_worse {
            worst = Some(station);
        }
    }

    summary.highest_risk_station = worst
        .filter(|s| s.status.severity_rank() >= FloodStatus::Alert.severity_rank())
        .map(|s| s.station_name.clone());
    summary
}

// ============================================================================
// Irrigation Department fetcher
// ============================================================================

/// Fetcher for the Irrigation Department gauge network.
pub struct IrrigationFetcher {
    client: reqwest::Client,
    base_url: String,
    region_id: String,
    cache: SourceCache<Vec<RiverStation>>,
}

impl IrrigationFetcher {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: IRRIGATION_BASE.to_string(),
            region_id: config.current_region.clone(),
            cache: SourceCache::new("irrigation_rivers", config.ttls.rivers)
                .with_freeze(config.freeze_mode),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn stations(&self) -> Vec<RiverStation> {
        self.cache.get().map(|s| s.as_ref().clone()).unwrap_or_default()
    }

    pub fn summary(&self) -> RiverSummary {
        summarize(&self.stations())
    }

    pub fn is_fresh(&self) -> bool {
        self.cache.is_fresh()
    }

    async fn fetch_upstream(&self) -> Result<Vec<RiverStation>, CoreError> {
        let url = format!("{}/water-levels", self.base_url);
        let response: IrrigationResponse = get_json_with_retry(
            &self.client,
            &url,
            "irrigation_rivers",
            RETRY_ATTEMPTS,
            RETRY_BACKOFF,
        )
        .await?;

        let region_id = self.region_id.clone();
        let stations = response
            .stations
            .into_iter()
            .filter(|raw| !raw.station.is_empty())
            .map(|raw| {
                let status = FloodStatus::classify(
                    raw.water_level_m,
                    raw.water_level_1hr_ago_m,
                    raw.alert_level_m,
                    raw.minor_flood_level_m,
                    raw.major_flood_level_m,
                );
                RiverStation {
                    station_id: station_id(&region_id, &raw.river, &raw.station),
                    river_name: raw.river,
                    river_code: raw.river_code,
                    station_name: raw.station,
                    latitude: raw.latitude,
                    longitude: raw.longitude,
                    catchment_area_km2: raw.catchment_area_km2,
                    water_level_m: raw.water_level_m,
                    water_level_previous_m: raw.water_level_1hr_ago_m,
                    rainfall_24h_mm: raw.rainfall_24h_mm,
                    alert_level_m: raw.alert_level_m,
                    minor_flood_m: raw.minor_flood_level_m,
                    major_flood_m: raw.major_flood_level_m,
                    status,
                    districts: raw.districts,
                    last_updated: parse_updated(&raw.last_updated),
                    region_id: region_id.clone(),
                }
            })
            .collect();

        Ok(stations)
    }
}

#[async_trait]
impl ManagedSource for IrrigationFetcher {
    fn name(&self) -> &'static str {
        "irrigation_rivers"
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
}

// ============================================================================
// Navy fetcher
// ============================================================================

/// Fetcher for the Navy water level recording system.
pub struct NavyRiverFetcher {
    client: reqwest::Client,
    base_url: String,
    region_id: String,
    cache: SourceCache<Vec<RiverStation>>,
}

impl NavyRiverFetcher {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: NAVY_BASE.to_string(),
            region_id: config.current_region.clone(),
            cache: SourceCache::new("navy_rivers", config.ttls.rivers)
                .with_freeze(config.freeze_mode),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn stations(&self) -> Vec<RiverStation> {
        self.cache.get().map(|s| s.as_ref().clone()).unwrap_or_default()
    }

    pub fn is_fresh(&self) -> bool {
        self.cache.is_fresh()
    }

    async fn fetch_upstream(&self) -> Result<Vec<RiverStation>, CoreError> {
        let url = format!("{}/river-levels", self.base_url);
        let response: NavyResponse = get_json_with_retry(
            &self.client,
            &url,
            "navy_rivers",
            RETRY_ATTEMPTS,
            RETRY_BACKOFF,
        )
        .await?;

        let region_id = self.region_id.clone();
        let stations = response
            .data
            .into_iter()
            .filter(|raw| !raw.station.is_empty())
            .map(|raw| {
                // Upstream sends its own status word; fall back to threshold
                // classification when it is absent.
                let status = raw
                    .status
                    .as_deref()
                    .map(FloodStatus::parse)
                    .unwrap_or_else(|| {
                        FloodStatus::classify(
                            raw.water_level_m,
                            raw.water_level_1hr_ago_m,
                            raw.alert_m,
                            raw.minor_flood_m,
                            raw.major_flood_m,
                        )
                    });
                RiverStation {
                    station_id: station_id(&region_id, &raw.river, &raw.station),
                    river_name: raw.river,
                    river_code: raw.river_code,
                    station_name: raw.station,
                    latitude: raw.lat,
                    longitude: raw.lon,
                    catchment_area_km2: None,
                    water_level_m: raw.water_level_m,
                    water_level_previous_m: raw.water_level_1hr_ago_m,
                    rainfall_24h_mm: raw.rainfall_24h_mm,
                    alert_level_m: raw.alert_m,
                    minor_flood_m: raw.minor_flood_m,
                    major_flood_m: raw.major_flood_m,
                    status,
                    districts: raw.districts,
                    last_updated: parse_updated(&raw.last_updated),
                    region_id: region_id.clone(),
                }
            })
            .collect();

        Ok(stations)
    }
}

#[async_trait]
impl ManagedSource for NavyRiverFetcher {
    fn name(&self) -> &'static str {
        "navy_rivers"
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
}

/// Current reading derived from a cached station list.
pub fn reading_for(stations: &[RiverStation], target_id: &str) -> Option<WaterReading> {
    stations
        .iter()
        .find(|s| s.station_id == target_id)
        .map(|s| WaterReading {
            station_id: s.station_id.clone(),
            water_level_m: s.water_level_m,
            rainfall_mm: s.rainfall_24h_mm,
            status: s.status,
            timestamp: s.last_updated,
        })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub fn station(
        name: &str,
        river: &str,
        level: f64,
        alert: f64,
        minor: f64,
        major: f64,
        districts: &[&str],
    ) -> RiverStation {
        let status = FloodStatus::classify(level, None, Some(alert), Some(minor), Some(major));
        RiverStation {
            station_id: station_id("srilanka", river, name),
            river_name: river.to_string(),
            river_code: None,
            station_name: name.to_string(),
            latitude: 6.95,
            longitude: 79.88,
            catchment_area_km2: None,
            water_level_m: level,
            water_level_previous_m: None,
            rainfall_24h_mm: None,
            alert_level_m: Some(alert),
            minor_flood_m: Some(minor),
            major_flood_m: Some(major),
            status,
            districts: districts.iter().map(|d| d.to_string()).collect(),
            last_updated: Utc::now(),
            region_id: "srilanka".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::station;
    use super::*;

    #[test]
    fn test_station_id_format() {
        assert_eq!(
            station_id("srilanka", "Kelani Ganga", "Nagalagam Street"),
            "srilanka_kelani_ganga_nagalagam_street"
        );
    }

    #[test]
    fn test_summarize_counts() {
        let stations = vec![
            station("Nagalagam", "Kelani", 8.0, 5.0, 6.5, 7.5, &["Colombo"]),
            station("Hanwella", "Kelani", 6.8, 5.0, 6.5, 7.5, &["Colombo"]),
            station("Putupaula", "Kalu", 5.2, 5.0, 6.5, 7.5, &["Kalutara"]),
            station("Ellagawa", "Kalu", 2.0, 5.0, 6.5, 7.5, &["Ratnapura"]),
        ];

        let summary = summarize(&stations);
        assert_eq!(summary.total_stations, 4);
        assert_eq!(summary.major_flood, 1);
        assert_eq!(summary.minor_flood, 1);
        assert_eq!(summary.alert, 1);
        assert_eq!(summary.highest_risk_station.as_deref(), Some("Nagalagam"));
    }

    #[test]
    fn test_summarize_no_risk_station_when_all_normal() {
        let stations = vec![
            station("Ellagawa", "Kalu", 2.0, 5.0, 6.5, 7.5, &["Ratnapura"]),
            station("Magura", "Kalu", 1.5, 5.0, 6.5, 7.5, &["Ratnapura"]),
        ];
        let summary = summarize(&stations);
        assert_eq!(summary.major_flood, 0);
        assert!(summary.highest_risk_station.is_none());
    }

    #[test]
    fn test_reading_for_known_station() {
        let stations = vec![station(
            "Nagalagam",
            "Kelani",
            5.5,
            5.0,
            6.5,
            7.5,
            &["Colombo"],
        )];
        let reading = reading_for(&stations, "srilanka_kelani_nagalagam").unwrap();
        assert_eq!(reading.water_level_m, 5.5);
        assert_eq!(reading.status, FloodStatus::Alert);

        assert!(reading_for(&stations, "srilanka_kelani_missing").is_none());
    }

    #[test]
    fn test_irrigation_normalisation() {
        let raw = r#"{
            "stations": [
                {
                    "station": "Hanwella",
                    "river": "Kelani Ganga",
                    "river_code": "RB 01",
                    "latitude": 6.909,
                    "longitude": 80.082,
                    "water_level_m": 7.6,
                    "water_level_1hr_ago_m": 7.1,
                    "alert_level_m": 5.0,
                    "minor_flood_level_m": 6.5,
                    "major_flood_level_m": 7.5,
                    "districts": ["Colombo", "Gampaha"],
                    "last_updated": "2024-11-28T06:30:00+05:30"
                },
                {"station": "", "river": "ignored"}
            ]
        }"#;
        let parsed: IrrigationResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.stations.len(), 2);
        let s = &parsed.stations[0];
        assert_eq!(s.river_code.as_deref(), Some("RB 01"));
        assert_eq!(s.districts, vec!["Colombo", "Gampaha"]);

        // At 7.6m with a 7.5m major threshold the station is in major flood
        let status = FloodStatus::classify(
            s.water_level_m,
            s.water_level_1hr_ago_m,
            s.alert_level_m,
            s.minor_flood_level_m,
            s.major_flood_level_m,
        );
        assert_eq!(status, FloodStatus::MajorFlood);
    }

    #[test]
    fn test_navy_status_word_preferred() {
        let raw = r#"{
            "data": [{
                "station": "Glencourse",
                "river": "Kelani Ganga",
                "lat": 6.98, "lon": 80.19,
                "water_level_m": 3.1,
                "status": "rising",
                "alert_m": 5.0
            }]
        }"#;
        let parsed: NavyResponse = serde_json::from_str(raw).unwrap();
        let s = &parsed.data[0];
        let status = s
            .status
            .as_deref()
            .map(FloodStatus::parse)
            .unwrap();
        assert_eq!(status, FloodStatus::Rising);
    }
}

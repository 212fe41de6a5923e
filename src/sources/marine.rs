//! Marine conditions fetcher for coastal districts.
//!
//! Wave height and swell from the marine forecast API, with a derived risk
//! level for small-craft and coastal-flooding advisories. TTL 30 minutes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::warn;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::region::DistrictInfo;
use crate::sources::{ManagedSource, get_json, http_client};

const MARINE_BASE: &str = "https://marine-api.open-meteo.com/v1";

/// Sea-state risk for a coastal district.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarineRisk {
    Low,
    Moderate,
    High,
    Severe,
}

impl MarineRisk {
    /// Classify by significant wave height:
    /// severe >= 4 m, high >= 2.5 m, moderate >= 1.5 m, else low.
    pub fn from_wave_height(wave_height_m: f64) -> Self {
        if wave_height_m >= 4.0 {
            MarineRisk::Severe
        } else if wave_height_m >= 2.5 {
            MarineRisk::High
        } else if wave_height_m >= 1.5 {
            MarineRisk::Moderate
        } else {
            MarineRisk::Low
        }
    }
}

/// Normalised marine conditions for one coastal district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarineConditions {
    pub district: String,
    pub latitude: f64,
    pub longitude: f64,
    pub wave_height_m: f64,
    pub wave_direction_deg: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub swell_height_m: Option<f64>,
    pub swell_direction_deg: Option<f64>,
    pub risk: MarineRisk,
}

// Wire types

#[derive(Debug, Deserialize)]
struct MarineResponse {
    #[serde(default)]
    current: Option<RawMarineCurrent>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMarineCurrent {
    #[serde(default)]
    wave_height: Option<f64>,
    #[serde(default)]
    wave_direction: Option<f64>,
    #[serde(default)]
    wave_period: Option<f64>,
    #[serde(default)]
    swell_wave_height: Option<f64>,
    #[serde(default)]
    swell_wave_direction: Option<f64>,
}

/// Fetcher for coastal marine conditions.
pub struct MarineFetcher {
    client: reqwest::Client,
    base_url: String,
    coastal_districts: Vec<DistrictInfo>,
    cache: SourceCache<Vec<MarineConditions>>,
}

impl MarineFetcher {
    pub fn new(config: &CoreConfig, coastal_districts: Vec<DistrictInfo>) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: MARINE_BASE.to_string(),
            coastal_districts,
            cache: SourceCache::new("marine", config.ttls.marine).with_freeze(config.freeze_mode),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn all(&self) -> Vec<MarineConditions> {
        self.cache.get().map(|m| m.as_ref().clone()).unwrap_or_default()
    }

    async fn fetch_upstream(&self) -> Result<Vec<MarineConditions>, CoreError> {
        let mut tasks: JoinSet<Option<MarineConditions>> = JoinSet::new();
        for district in self.coastal_districts.clone() {
            let client = self.client.clone();
            let base = self.base_url.clone();
            tasks.spawn(async move {
                let url = format!(
                    "{}/marine?latitude={}&longitude={}\
                     &current=wave_height,wave_direction,wave_period,swell_wave_height,swell_wave_direction",
                    base, district.latitude, district.longitude
                );
                match get_json::<MarineResponse>(&client, &url, "marine").await {
                    Ok(response) => {
                        let current = response.current.unwrap_or_default();
                        let wave_height = current.wave_height.unwrap_or(0.0);
                        Some(MarineConditions {
                            district: district.name.clone(),
                            latitude: district.latitude,
                            longitude: district.longitude,
                            wave_height_m: wave_height,
                            wave_direction_deg: current.wave_direction,
                            wave_period_s: current.wave_period,
                            swell_height_m: current.swell_wave_height,
                            swell_direction_deg: current.swell_wave_direction,
                            risk: MarineRisk::from_wave_height(wave_height),
                        })
                    }
                    Err(err) => {
                        warn!(district = %district.name, error = %err, "marine fetch failed");
                        None
                    }
                }
            });
        }

        let mut snapshot = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(conditions)) = joined {
                snapshot.push(conditions);
            }
        }

        if snapshot.is_empty() {
            return Err(CoreError::provider("marine", "all coastal fetches failed"));
        }
        snapshot.sort_by(|a, b| a.district.cmp(&b.district));
        Ok(snapshot)
    }
}

#[async_trait]
impl ManagedSource for MarineFetcher {
    fn name(&self) -> &'static str {
        "marine"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marine_risk_bands() {
        assert_eq!(MarineRisk::from_wave_height(0.8), MarineRisk::Low);
        assert_eq!(MarineRisk::from_wave_height(1.5), MarineRisk::Moderate);
        assert_eq!(MarineRisk::from_wave_height(2.5), MarineRisk::High);
        assert_eq!(MarineRisk::from_wave_height(4.0), MarineRisk::Severe);
        assert_eq!(MarineRisk::from_wave_height(6.2), MarineRisk::Severe);
    }

    #[test]
    fn test_parse_marine_current() {
        let raw = r#"{
            "current": {
                "wave_height": 2.7,
                "wave_direction": 210,
                "wave_period": 9.5,
                "swell_wave_height": 1.9,
                "swell_wave_direction": 195
            }
        }"#;
        let response: MarineResponse = serde_json::from_str(raw).unwrap();
        let current = response.current.unwrap();
        assert_eq!(current.wave_height, Some(2.7));
        assert_eq!(
            MarineRisk::from_wave_height(current.wave_height.unwrap()),
            MarineRisk::High
        );
    }
}

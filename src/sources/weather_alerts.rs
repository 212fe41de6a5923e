//! Severe-weather alert fetcher, bucketed by severity.
//!
//! Queries the alert provider per district and groups active alerts into the
//! severity categories {Extreme, Severe, Moderate, Minor}. TTL 15 minutes.

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

const WEATHERAPI_BASE: &str = "https://api.weatherapi.com/v1";

/// Alert severity as reported upstream; unrecognised values map to Unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Unknown,
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl AlertSeverity {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "extreme" => AlertSeverity::Extreme,
            "severe" => AlertSeverity::Severe,
            "moderate" => AlertSeverity::Moderate,
            "minor" => AlertSeverity::Minor,
            _ => AlertSeverity::Unknown,
        }
    }
}

/// A normalised severe-weather alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub district: String,
    pub headline: String,
    pub severity: AlertSeverity,
    pub event: String,
    pub areas: String,
    pub effective: Option<String>,
    pub expires: Option<String>,
    pub description: String,
}

/// Alert counts per severity bucket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertBuckets {
    pub extreme: usize,
    pub severe: usize,
    pub moderate: usize,
    pub minor: usize,
    pub unknown: usize,
}

pub fn bucket_counts(alerts: &[WeatherAlert]) -> AlertBuckets {
    let mut buckets = AlertBuckets::default();
    for alert in alerts {
        match alert.severity {
            AlertSeverity::Extreme => buckets.extreme += 1,
            AlertSeverity::Severe => buckets.severe += 1,
            AlertSeverity::Moderate => buckets.moderate += 1,
            AlertSeverity::Minor => buckets.minor += 1,
            AlertSeverity::Unknown => buckets.unknown += 1,
        }
    }
    buckets
}

// Wire types

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    alerts: Option<AlertsEnvelope>,
}

#[derive(Debug, Default, Deserialize)]
struct AlertsEnvelope {
    #[serde(default)]
    alert: Vec<RawAlert>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAlert {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    areas: String,
    #[serde(default)]
    effective: Option<String>,
    #[serde(default)]
    expires: Option<String>,
    #[serde(default)]
    desc: String,
}

/// Fetcher for per-location severe-weather alerts. Disabled without a key.
pub struct WeatherAlertsFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    districts: Vec<DistrictInfo>,
    cache: SourceCache<Vec<WeatherAlert>>,
}

impl WeatherAlertsFetcher {
    pub fn new(config: &CoreConfig, districts: Vec<DistrictInfo>) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: WEATHERAPI_BASE.to_string(),
            api_key: config.api_keys.weatherapi.clone(),
            districts,
            cache: SourceCache::new("weather_alerts", config.ttls.weather_alerts)
                .with_freeze(config.freeze_mode),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn all(&self) -> Vec<WeatherAlert> {
        self.cache.get().map(|a| a.as_ref().clone()).unwrap_or_default()
    }

    pub fn buckets(&self) -> AlertBuckets {
        bucket_counts(&self.all())
    }

    async fn fetch_upstream(&self) -> Result<Vec<WeatherAlert>, CoreError> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| CoreError::SourceDisabled("weather_alerts".to_string()))?;

        let mut tasks: JoinSet<Vec<WeatherAlert>> = JoinSet::new();
        for district in self.districts.clone() {
            let client = self.client.clone();
            let base = self.base_url.clone();
            let key = key.clone();
            tasks.spawn(async move {
                let url = format!(
                    "{}/alerts.json?key={}&q={},{}",
                    base, key, district.latitude, district.longitude
                );
                match get_json::<AlertsResponse>(&client, &url, "weather_alerts").await {
                    Ok(response) => response
                        .alerts
                        .unwrap_or_default()
                        .alert
                        .into_iter()
                        .map(|raw| WeatherAlert {
                            district: district.name.clone(),
                            headline: raw.headline,
                            severity: AlertSeverity::parse(&raw.severity),
                            event: raw.event,
                            areas: raw.areas,
                            effective: raw.effective,
                            expires: raw.expires,
                            description: raw.desc,
                        })
                        .collect(),
                    Err(err) => {
                        warn!(district = %district.name, error = %err, "alert fetch failed");
                        Vec::new()
                    }
                }
            });
        }

        let mut alerts = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(mut batch) = joined {
                alerts.append(&mut batch);
            }
        }

        // Most severe first, stable within a severity
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.district.cmp(&b.district))
        });
        Ok(alerts)
    }
}

#[async_trait]
impl ManagedSource for WeatherAlertsFetcher {
    fn name(&self) -> &'static str {
        "weather_alerts"
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
            return Err(CoreError::SourceDisabled("weather_alerts".to_string()));
        }
        self.cache
            .refresh_with(force, || self.fetch_upstream())
            .await
    }
}

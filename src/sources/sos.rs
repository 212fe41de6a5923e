//! Crowdsourced SOS report fetcher.
//!
//! Pulls distress reports from the crowdsource API, deduplicates by id, and
//! normalises the loosely-typed upstream fields. The intelligence engine
//! forces a pull at the start of every analysis cycle, so the cache TTL only
//! matters for ad-hoc raw reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::{SosReport, UrgencyTier, WaterLevelBand};
use crate::sources::{ManagedSource, get_json, http_client};

const SOS_BASE: &str = "https://api.floodsupport.org/v2";

// Wire types: the crowdsource schema is loose, so everything is optional
// and normalisation fills the gaps.

#[derive(Debug, Deserialize)]
struct SosResponse {
    #[serde(default)]
    reports: Vec<RawSosReport>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSosReport {
    #[serde(default)]
    id: String,
    #[serde(default)]
    district: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default, rename = "number_of_people")]
    number_of_people: Option<u32>,
    #[serde(default, rename = "water_level")]
    water_level: Option<String>,
    #[serde(default, rename = "has_medical_emergency")]
    has_medical_emergency: bool,
    #[serde(default, rename = "has_elderly")]
    has_elderly: bool,
    #[serde(default, rename = "has_disabled")]
    has_disabled: bool,
    #[serde(default, rename = "has_children")]
    has_children: bool,
    #[serde(default, rename = "needs_food")]
    needs_food: bool,
    #[serde(default, rename = "needs_water")]
    needs_water: bool,
    #[serde(default, rename = "safe_hours")]
    safe_hours: Option<f64>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default, rename = "created_at")]
    created_at: Option<String>,
}

fn normalise(raw: RawSosReport) -> SosReport {
    SosReport {
        id: raw.id,
        district: raw.district,
        address: raw.address,
        lat: raw.latitude,
        lon: raw.longitude,
        people_count: raw.number_of_people.unwrap_or(1),
        water_level: raw.water_level.as_deref().and_then(WaterLevelBand::parse),
        has_medical_emergency: raw.has_medical_emergency,
        has_elderly: raw.has_elderly,
        has_disabled: raw.has_disabled,
        has_children: raw.has_children,
        needs_food: raw.needs_food,
        needs_water: raw.needs_water,
        safe_hours: raw.safe_hours,
        phone: raw.phone,
        reported_at: raw
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
        // Scored by the intelligence engine
        urgency_score: 0,
        urgency_tier: UrgencyTier::Low,
    }
}

/// Fetcher for crowdsourced emergency reports.
pub struct SosFetcher {
    client: reqwest::Client,
    base_url: String,
    cache: SourceCache<Vec<SosReport>>,
}

impl SosFetcher {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: SOS_BASE.to_string(),
            // Pulled fresh by every intel cycle; the TTL mirrors that cadence
            cache: SourceCache::new("sos_reports", config.intervals.intel.as_secs())
                .with_freeze(config.freeze_mode),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn all(&self) -> Vec<SosReport> {
        self.cache.get().map(|r| r.as_ref().clone()).unwrap_or_default()
    }

    async fn fetch_upstream(&self) -> Result<Vec<SosReport>, CoreError> {
        let url = format!("{}/sos?limit=200", self.base_url);
        let response: SosResponse = get_json(&self.client, &url, "sos_reports").await?;

        let mut seen = HashSet::new();
        let reports = response
            .reports
            .into_iter()
            .filter(|raw| !raw.id.is_empty())
            .filter(|raw| seen.insert(raw.id.clone()))
            .map(normalise)
            .collect();

        Ok(reports)
    }
}

#[async_trait]
impl ManagedSource for SosFetcher {
    fn name(&self) -> &'static str {
        "sos_reports"
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
    fn test_normalise_full_report() {
        let raw: RawSosReport = serde_json::from_str(
            r#"{
                "id": "sos-9",
                "district": "Kalutara",
                "address": "12 Temple Rd",
                "latitude": 6.58,
                "longitude": 79.96,
                "number_of_people": 4,
                "water_level": "chest",
                "has_medical_emergency": true,
                "needs_water": true,
                "safe_hours": 2.0,
                "phone": "+94771234567",
                "created_at": "2024-11-28T04:15:00+05:30"
            }"#,
        )
        .unwrap();

        let report = normalise(raw);
        assert_eq!(report.id, "sos-9");
        assert_eq!(report.people_count, 4);
        assert_eq!(report.water_level, Some(WaterLevelBand::Chest));
        assert!(report.has_medical_emergency);
        assert_eq!(report.safe_hours, Some(2.0));
        // Offset timestamp converted to UTC
        assert_eq!(report.reported_at.to_rfc3339(), "2024-11-27T22:45:00+00:00");
    }

    #[test]
    fn test_normalise_minimal_report() {
        let raw: RawSosReport = serde_json::from_str(r#"{"id": "sos-1"}"#).unwrap();
        let report = normalise(raw);
        // Missing people count defaults to one person
        assert_eq!(report.people_count, 1);
        assert!(report.water_level.is_none());
        assert!(report.lat.is_none());
    }

    #[test]
    fn test_unknown_water_level_maps_to_none() {
        let raw: RawSosReport =
            serde_json::from_str(r#"{"id": "sos-2", "water_level": "submerged"}"#).unwrap();
        assert!(normalise(raw).water_level.is_none());
    }
}

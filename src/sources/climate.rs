//! Historical climate archive fetcher.
//!
//! Yearly rainfall and temperature aggregates per district, keyed by
//! (district, year range). Archive responses change only when the archive
//! grows, so entries live for a week and are persisted to disk across
//! restarts. Archive calls get the wide timeout and are never retried within
//! a cycle; a failed range yields an empty series.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::region::DistrictInfo;
use crate::sources::{ManagedSource, get_json, http_client};

const ARCHIVE_BASE: &str = "https://archive-api.open-meteo.com/v1";

/// One year of aggregated climate for a district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearlyClimate {
    pub year: i32,
    pub total_precipitation_mm: f64,
    pub max_daily_precipitation_mm: f64,
    pub avg_temperature_c: Option<f64>,
    /// Days with more than 100 mm of rain.
    pub extreme_rain_days: u32,
}

/// Archive series for one (district, year range) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateSeries {
    pub district: String,
    pub start_year: i32,
    pub end_year: i32,
    pub yearly: Vec<YearlyClimate>,
    pub fetched_at: DateTime<Utc>,
}

// Wire types

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    daily: Option<ArchiveDaily>,
}

#[derive(Debug, Default, Deserialize)]
struct ArchiveDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default, rename = "temperature_2m_mean")]
    temperature_2m_mean: Vec<Option<f64>>,
}

/// Aggregate the daily archive arrays into per-year records.
fn aggregate_yearly(daily: &ArchiveDaily) -> Vec<YearlyClimate> {
    struct Accumulator {
        total_precip: f64,
        max_daily: f64,
        temp_sum: f64,
        temp_days: u32,
        extreme_days: u32,
    }

    let mut years: HashMap<i32, Accumulator> = HashMap::new();
    for (i, date) in daily.time.iter().enumerate() {
        let Some(year) = date.get(0..4).and_then(|y| y.parse::<i32>().ok()) else {
            continue;
        };
        let entry = years.entry(year).or_insert(Accumulator {
            total_precip: 0.0,
            max_daily: 0.0,
            temp_sum: 0.0,
            temp_days: 0,
            extreme_days: 0,
        });
        if let Some(Some(precip)) = daily.precipitation_sum.get(i) {
            entry.total_precip += precip;
            entry.max_daily = entry.max_daily.max(*precip);
            if *precip > 100.0 {
                entry.extreme_days += 1;
            }
        }
        if let Some(Some(temp)) = daily.temperature_2m_mean.get(i) {
            entry.temp_sum += temp;
            entry.temp_days += 1;
        }
    }

    let mut yearly: Vec<YearlyClimate> = years
        .into_iter()
        .map(|(year, acc)| YearlyClimate {
            year,
            total_precipitation_mm: (acc.total_precip * 10.0).round() / 10.0,
            max_daily_precipitation_mm: (acc.max_daily * 10.0).round() / 10.0,
            avg_temperature_c: if acc.temp_days > 0 {
                Some(((acc.temp_sum / acc.temp_days as f64) * 100.0).round() / 100.0)
            } else {
                None
            },
            extreme_rain_days: acc.extreme_days,
        })
        .collect();
    yearly.sort_by_key(|y| y.year);
    yearly
}

fn series_key(district: &str, start_year: i32, end_year: i32) -> String {
    format!("{}_{}_{}", district.to_ascii_lowercase(), start_year, end_year)
}

/// Fetcher for the historical climate archive.
pub struct ClimateFetcher {
    client: reqwest::Client,
    base_url: String,
    districts: Vec<DistrictInfo>,
    cache: SourceCache<HashMap<String, ClimateSeries>>,
}

impl ClimateFetcher {
    pub fn new(config: &CoreConfig, districts: Vec<DistrictInfo>) -> Self {
        Self {
            client: http_client(config.timeouts.archive),
            base_url: ARCHIVE_BASE.to_string(),
            districts,
            cache: SourceCache::new("climate_history", config.ttls.climate)
                .with_freeze(config.freeze_mode)
                .with_snapshot_dir(config.snapshot_dir.as_ref()),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn load_snapshot(&self) {
        self.cache.load_from_disk();
    }

    /// Cached series for a key, if present.
    pub fn cached_history(
        &self,
        district: &str,
        start_year: i32,
        end_year: i32,
    ) -> Option<ClimateSeries> {
        self.cache
            .get()
            .and_then(|map| map.get(&series_key(district, start_year, end_year)).cloned())
    }

    /// Series for a (district, year range) key, fetching from the archive on
    /// a cache miss. A failed fetch returns an empty series rather than an
    /// error; the archive is not retried within a cycle.
    pub async fn history(
        &self,
        district: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<ClimateSeries, CoreError> {
        if let Some(series) = self.cached_history(district, start_year, end_year) {
            return Ok(series);
        }

        let info = self
            .districts
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(district))
            .ok_or_else(|| CoreError::UnknownDistrict(district.to_string()))?
            .clone();

        let series = match self.fetch_series(&info, start_year, end_year).await {
            Ok(series) => series,
            Err(err) => {
                warn!(district = %district, error = %err, "archive fetch failed");
                ClimateSeries {
                    district: info.name.clone(),
                    start_year,
                    end_year,
                    yearly: Vec::new(),
                    fetched_at: Utc::now(),
                }
            }
        };

        // Merge the new key into the snapshot
        let mut map = self
            .cache
            .get()
            .map(|m| m.as_ref().clone())
            .unwrap_or_default();
        map.insert(series_key(district, start_year, end_year), series.clone());
        self.cache.store(map);
        self.persist();

        Ok(series)
    }

    async fn fetch_series(
        &self,
        district: &DistrictInfo,
        start_year: i32,
        end_year: i32,
    ) -> Result<ClimateSeries, CoreError> {
        let end_year = end_year.min(Utc::now().year());
        let url = format!(
            "{}/archive?latitude={}&longitude={}&start_date={}-01-01&end_date={}-12-31\
             &daily=precipitation_sum,temperature_2m_mean&timezone=UTC",
            self.base_url, district.latitude, district.longitude, start_year, end_year
        );

        let response: ArchiveResponse = get_json(&self.client, &url, "climate_history").await?;
        let yearly = response
            .daily
            .as_ref()
            .map(aggregate_yearly)
            .unwrap_or_default();

        Ok(ClimateSeries {
            district: district.name.clone(),
            start_year,
            end_year,
            yearly,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl ManagedSource for ClimateFetcher {
    fn name(&self) -> &'static str {
        "climate_history"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl().num_seconds().max(0) as u64)
    }

    fn cache_info(&self) -> CacheInfo {
        self.cache.cache_info()
    }

    /// Re-fetch every keyed range already in the cache. New keys are only
    /// created by [`ClimateFetcher::history`].
    async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        let keys: Vec<(String, i32, i32)> = self
            .cache
            .get()
            .map(|map| {
                map.values()
                    .map(|s| (s.district.clone(), s.start_year, s.end_year))
                    .collect()
            })
            .unwrap_or_default();

        if keys.is_empty() {
            return Ok(RefreshOutcome::Skipped);
        }

        self.cache
            .refresh_with(force, || async move {
                let mut map = HashMap::new();
                for (district, start_year, end_year) in keys {
                    let Some(info) = self
                        .districts
                        .iter()
                        .find(|d| d.name.eq_ignore_ascii_case(&district))
                    else {
                        continue;
                    };
                    match self.fetch_series(info, start_year, end_year).await {
                        Ok(series) => {
                            map.insert(series_key(&district, start_year, end_year), series);
                        }
                        Err(err) => {
                            warn!(district = %district, error = %err, "archive refresh failed");
                        }
                    }
                }
                if map.is_empty() {
                    return Err(CoreError::provider("climate_history", "all ranges failed"));
                }
                Ok(map)
            })
            .await
    }

    fn persist(&self) {
        if let Err(err) = self.cache.snapshot_to_disk() {
            tracing::warn!(error = %err, "climate snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_yearly() {
        let daily = ArchiveDaily {
            time: vec![
                "2022-05-01".to_string(),
                "2022-05-02".to_string(),
                "2023-01-01".to_string(),
            ],
            precipitation_sum: vec![Some(110.0), Some(20.0), Some(5.0)],
            temperature_2m_mean: vec![Some(28.0), Some(30.0), Some(26.0)],
        };

        let yearly = aggregate_yearly(&daily);
        assert_eq!(yearly.len(), 2);

        let y2022 = &yearly[0];
        assert_eq!(y2022.year, 2022);
        assert_eq!(y2022.total_precipitation_mm, 130.0);
        assert_eq!(y2022.max_daily_precipitation_mm, 110.0);
        assert_eq!(y2022.extreme_rain_days, 1);
        assert_eq!(y2022.avg_temperature_c, Some(29.0));

        let y2023 = &yearly[1];
        assert_eq!(y2023.year, 2023);
        assert_eq!(y2023.extreme_rain_days, 0);
    }

    #[test]
    fn test_aggregate_skips_null_entries() {
        let daily = ArchiveDaily {
            time: vec!["2022-05-01".to_string(), "2022-05-02".to_string()],
            precipitation_sum: vec![None, Some(10.0)],
            temperature_2m_mean: vec![None, None],
        };
        let yearly = aggregate_yearly(&daily);
        assert_eq!(yearly.len(), 1);
        assert_eq!(yearly[0].total_precipitation_mm, 10.0);
        assert!(yearly[0].avg_temperature_c.is_none());
    }

    #[test]
    fn test_series_key_case_insensitive() {
        assert_eq!(
            series_key("Colombo", 1994, 2024),
            series_key("colombo", 1994, 2024)
        );
    }
}

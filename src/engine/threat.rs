//! Composite flood threat engine.
//!
//! Joins district rainfall, river gauge levels, and forecast totals into a
//! 0-100 threat score per district and a national aggregate. The result is a
//! pre-computed [`ThreatSnapshot`] held in its own cache: the scheduler
//! recomputes it on a fixed cadence and API reads serve it instantly.
//!
//! Scoring is deterministic: identical inputs produce identical output up to
//! the `analyzed_at` stamp.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::model::{
    DistrictThreat, DistrictWeather, RiverStation, ThreatFactor, ThreatLevel, ThreatSnapshot,
    ThreatSummary,
};
use crate::region::RegionRegistry;
use crate::sources::ManagedSource;
use crate::sources::rivers::{IrrigationFetcher, summarize};
use crate::sources::weather::WeatherFetcher;

/// Weights of the three subscores in the composite.
const RAINFALL_WEIGHT: f64 = 0.30;
const RIVER_WEIGHT: f64 = 0.40;
const FORECAST_WEIGHT: f64 = 0.30;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rainfall subscore from accumulated totals.
///
/// 100 if 24h > 100 or 48h > 150 or 72h > 200; 70 if 24h > 50 or 48h > 100;
/// 40 if 24h > 25; else 10.
fn rainfall_subscore(weather: &DistrictWeather, factors: &mut Vec<ThreatFactor>) -> f64 {
    let r24 = weather.rainfall_24h_mm;
    let r48 = weather.rainfall_48h_mm;
    let r72 = weather.rainfall_72h_mm;

    if r24 > 100.0 || r48 > 150.0 || r72 > 200.0 {
        factors.push(ThreatFactor {
            factor: "Heavy Rainfall".to_string(),
            value: format!("{r24:.1}mm in 24h"),
            score: 100.0,
            station: None,
            river: None,
        });
        100.0
    } else if r24 > 50.0 || r48 > 100.0 {
        factors.push(ThreatFactor {
            factor: "Moderate Rainfall".to_string(),
            value: format!("{r24:.1}mm in 24h"),
            score: 70.0,
            station: None,
            river: None,
        });
        70.0
    } else if r24 > 25.0 {
        factors.push(ThreatFactor {
            factor: "Light Rainfall".to_string(),
            value: format!("{r24:.1}mm in 24h"),
            score: 40.0,
            station: None,
            river: None,
        });
        40.0
    } else {
        10.0
    }
}

/// River subscore: the worst station among rivers tagged with this district.
///
/// 100 already past major flood, 85 past minor flood, 60 past alert, 40 when
/// within 20% of alert, else 10. No rivers in the district scores 0.
fn river_subscore(
    district: &str,
    rivers: &[RiverStation],
    factors: &mut Vec<ThreatFactor>,
) -> f64 {
    let district_rivers: Vec<&RiverStation> = rivers
        .iter()
        .filter(|r| r.districts.iter().any(|d| d.eq_ignore_ascii_case(district)))
        .collect();

    if district_rivers.is_empty() {
        return 0.0;
    }

    let mut max_score = 0.0_f64;
    for river in district_rivers {
        let pct_alert = river.pct_to_alert().unwrap_or(100.0);
        let pct_minor = river.pct_to_minor_flood().unwrap_or(100.0);
        let pct_major = river.pct_to_major_flood().unwrap_or(100.0);

        let score = if pct_major < 0.0 {
            factors.push(ThreatFactor {
                factor: "Major Flood Level".to_string(),
                value: format!("{} at {}m", river.station_name, river.water_level_m),
                score: 100.0,
                station: Some(river.station_name.clone()),
                river: Some(river.river_name.clone()),
            });
            100.0
        } else if pct_minor < 0.0 {
            factors.push(ThreatFactor {
                factor: "Minor Flood Level".to_string(),
                value: format!("{} at {}m", river.station_name, river.water_level_m),
                score: 85.0,
                station: Some(river.station_name.clone()),
                river: Some(river.river_name.clone()),
            });
            85.0
        } else if pct_alert < 0.0 {
            factors.push(ThreatFactor {
                factor: "River Alert Level".to_string(),
                value: format!("{} at {}m", river.station_name, river.water_level_m),
                score: 60.0,
                station: Some(river.station_name.clone()),
                river: Some(river.river_name.clone()),
            });
            60.0
        } else if pct_alert < 20.0 {
            factors.push(ThreatFactor {
                factor: "River Rising".to_string(),
                value: format!(
                    "{} at {:.0}% capacity",
                    river.station_name,
                    100.0 - pct_alert
                ),
                score: 40.0,
                station: Some(river.station_name.clone()),
                river: Some(river.river_name.clone()),
            });
            40.0
        } else {
            10.0
        };

        max_score = max_score.max(score);
    }
    max_score
}

/// Forecast subscore. 100 if 24h > 75 or 48h > 125; 65 if 24h > 50 or
/// 48h > 75; 35 if 24h > 25; else 5. A district with no forecast scores 0.
fn forecast_subscore(forecast: Option<&DistrictWeather>, factors: &mut Vec<ThreatFactor>) -> f64 {
    let Some(forecast) = forecast else {
        return 0.0;
    };
    let f24 = forecast.forecast_precip_24h_mm;
    let f48 = forecast.forecast_precip_48h_mm;

    if f24 > 75.0 || f48 > 125.0 {
        factors.push(ThreatFactor {
            factor: "Heavy Rain Forecast".to_string(),
            value: format!("{f24:.1}mm expected in 24h"),
            score: 100.0,
            station: None,
            river: None,
        });
        100.0
    } else if f24 > 50.0 || f48 > 75.0 {
        factors.push(ThreatFactor {
            factor: "Moderate Rain Forecast".to_string(),
            value: format!("{f24:.1}mm expected in 24h"),
            score: 65.0,
            station: None,
            river: None,
        });
        65.0
    } else if f24 > 25.0 {
        factors.push(ThreatFactor {
            factor: "Light Rain Forecast".to_string(),
            value: format!("{f24:.1}mm expected in 24h"),
            score: 35.0,
            station: None,
            river: None,
        });
        35.0
    } else {
        5.0
    }
}

/// Score one district from its weather, the river list, and its forecast.
pub fn district_threat(
    weather: &DistrictWeather,
    rivers: &[RiverStation],
    forecast: Option<&DistrictWeather>,
    alert_level: crate::model::AlertLevel,
) -> DistrictThreat {
    let mut factors = Vec::new();

    let rainfall_score = rainfall_subscore(weather, &mut factors);
    let river_score = river_subscore(&weather.district, rivers, &mut factors);
    let forecast_score = forecast_subscore(forecast, &mut factors);

    let composite = rainfall_score * RAINFALL_WEIGHT
        + river_score * RIVER_WEIGHT
        + forecast_score * FORECAST_WEIGHT;
    let threat_score = round1(composite);

    DistrictThreat {
        district: weather.district.clone(),
        threat_score,
        threat_level: ThreatLevel::from_score(threat_score),
        rainfall_score: round1(rainfall_score),
        river_score: round1(river_score),
        forecast_score: round1(forecast_score),
        factors,
        current_alert_level: alert_level,
        lat: weather.latitude,
        lon: weather.longitude,
    }
}

/// National score: `0.3 * avg + 0.7 * max` over the district scores, so a
/// single emergency dominates the aggregate.
pub fn national_score(districts: &[DistrictThreat]) -> f64 {
    if districts.is_empty() {
        return 0.0;
    }
    let sum: f64 = districts.iter().map(|d| d.threat_score).sum();
    let avg = sum / districts.len() as f64;
    let max = districts
        .iter()
        .map(|d| d.threat_score)
        .fold(f64::NEG_INFINITY, f64::max);
    round1(avg * 0.3 + max * 0.7)
}

/// The composite threat engine and its snapshot cache.
pub struct ThreatEngine {
    weather: Arc<WeatherFetcher>,
    irrigation: Arc<IrrigationFetcher>,
    registry: Arc<RegionRegistry>,
    region_id: String,
    cache: SourceCache<ThreatSnapshot>,
}

impl ThreatEngine {
    pub fn new(
        config: &CoreConfig,
        weather: Arc<WeatherFetcher>,
        irrigation: Arc<IrrigationFetcher>,
        registry: Arc<RegionRegistry>,
    ) -> Self {
        Self {
            weather,
            irrigation,
            registry,
            region_id: config.current_region.clone(),
            cache: SourceCache::new("threat", config.ttls.threat).with_freeze(config.freeze_mode),
        }
    }

    /// Current snapshot, if one has been computed.
    pub fn snapshot(&self) -> Option<ThreatSnapshot> {
        self.cache.get().map(|s| s.as_ref().clone())
    }

    pub fn is_fresh(&self) -> bool {
        self.cache.is_fresh()
    }

    /// Compute a snapshot from whatever the source caches hold right now.
    /// Missing inputs contribute nothing; there are no upstream calls here.
    fn compute(&self) -> Result<ThreatSnapshot, CoreError> {
        let weather_data = self.weather.all();
        if weather_data.is_empty() {
            return Err(CoreError::provider("threat", "no weather data available"));
        }
        let forecasts = self.weather.forecasts();
        let rivers = self.irrigation.stations();

        let mut districts: Vec<DistrictThreat> = weather_data
            .iter()
            .filter(|w| !w.district.is_empty())
            .map(|weather| {
                let forecast = forecasts.iter().find(|f| f.district == weather.district);
                let alert_level = self
                    .registry
                    .alert_level(&self.region_id, weather.rainfall_24h_mm)
                    .unwrap_or(crate::model::AlertLevel::Green);
                district_threat(weather, &rivers, forecast, alert_level)
            })
            .collect();

        districts.sort_by(|a, b| {
            b.threat_score
                .total_cmp(&a.threat_score)
                .then_with(|| a.district.cmp(&b.district))
        });

        let national = national_score(&districts);
        let river_summary = summarize(&rivers);

        let summary = ThreatSummary {
            critical_districts: districts
                .iter()
                .filter(|d| d.threat_level == ThreatLevel::Critical)
                .count(),
            high_risk_districts: districts
                .iter()
                .filter(|d| d.threat_level == ThreatLevel::High)
                .count(),
            medium_risk_districts: districts
                .iter()
                .filter(|d| d.threat_level == ThreatLevel::Medium)
                .count(),
            rivers_at_major_flood: river_summary.major_flood,
            rivers_at_minor_flood: river_summary.minor_flood,
            rivers_at_alert: river_summary.alert,
        };

        Ok(ThreatSnapshot {
            national_threat_level: ThreatLevel::from_score(national),
            national_threat_score: national,
            summary,
            top_risk_districts: districts.iter().take(10).cloned().collect(),
            highest_risk_river: river_summary.highest_risk_station.clone(),
            river_summary,
            all_districts: districts,
            analyzed_at: Utc::now(),
        })
    }

    /// One refresh cycle: make sure the inputs are fresh (triggering their
    /// own single-flight refreshes when not), then recompute the snapshot.
    pub async fn refresh_cycle(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        if !self.weather.is_fresh() {
            let _ = self.weather.refresh(false).await;
        }
        if !self.irrigation.is_fresh() {
            let _ = self.irrigation.refresh(false).await;
        }

        let outcome = self
            .cache
            .refresh_with(force, || async move { self.compute() })
            .await?;

        if outcome == RefreshOutcome::Refreshed {
            if let Some(snapshot) = self.cache.get() {
                info!(
                    national_level = ?snapshot.national_threat_level,
                    national_score = snapshot.national_threat_score,
                    districts = snapshot.all_districts.len(),
                    "threat snapshot recomputed"
                );
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl ManagedSource for ThreatEngine {
    fn name(&self) -> &'static str {
        "threat"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl().num_seconds().max(0) as u64)
    }

    fn cache_info(&self) -> CacheInfo {
        self.cache.cache_info()
    }

    async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        self.refresh_cycle(force).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertLevel;
    use crate::sources::rivers::test_fixtures::station;
    use crate::sources::weather::test_fixtures::district_weather;

    #[test]
    fn test_composite_worked_example() {
        // rainfall24h=60 (score 70), one river 5% past alert (score 60),
        // forecast24h=30 (score 35):
        // 0.30*70 + 0.40*60 + 0.30*35 = 21 + 24 + 10.5 = 55.5 -> HIGH
        let weather = district_weather("Colombo", 60.0, 60.0, 60.0, 30.0, 30.0);
        // 5.25m against a 5.0m alert line is 5% over it
        let river = station("Nagalagam", "Kelani", 5.25, 5.0, 6.5, 7.5, &["Colombo"]);
        let forecast = weather.clone();

        let threat = district_threat(&weather, &[river], Some(&forecast), AlertLevel::Orange);

        assert_eq!(threat.rainfall_score, 70.0);
        assert_eq!(threat.river_score, 60.0);
        assert_eq!(threat.forecast_score, 35.0);
        assert_eq!(threat.threat_score, 55.5);
        assert_eq!(threat.threat_level, ThreatLevel::High);
        assert_eq!(threat.factors.len(), 3);
    }

    #[test]
    fn test_no_rivers_scores_zero() {
        let weather = district_weather("Matale", 10.0, 10.0, 10.0, 10.0, 10.0);
        let threat = district_threat(&weather, &[], Some(&weather), AlertLevel::Green);
        assert_eq!(threat.river_score, 0.0);
        // 0.30*10 + 0 + 0.30*5 = 4.5
        assert_eq!(threat.threat_score, 4.5);
        assert_eq!(threat.threat_level, ThreatLevel::Low);
    }

    #[test]
    fn test_missing_forecast_scores_zero() {
        let weather = district_weather("Jaffna", 10.0, 10.0, 10.0, 0.0, 0.0);
        let threat = district_threat(&weather, &[], None, AlertLevel::Green);
        assert_eq!(threat.forecast_score, 0.0);
        // Threat is still computable without a forecast
        assert_eq!(threat.threat_score, 3.0);
    }

    #[test]
    fn test_river_subscore_picks_worst_station() {
        let weather = district_weather("Colombo", 0.0, 0.0, 0.0, 0.0, 0.0);
        let rivers = vec![
            station("Hanwella", "Kelani", 4.2, 5.0, 6.5, 7.5, &["Colombo"]),
            station("Nagalagam", "Kelani", 7.6, 5.0, 6.5, 7.5, &["Colombo"]),
            station("Ellagawa", "Kalu", 8.0, 5.0, 6.5, 7.5, &["Ratnapura"]),
        ];
        let threat = district_threat(&weather, &rivers, None, AlertLevel::Green);
        // Nagalagam is past major flood; Ellagawa is in another district
        assert_eq!(threat.river_score, 100.0);
        assert!(
            threat
                .factors
                .iter()
                .any(|f| f.factor == "Major Flood Level")
        );
    }

    #[test]
    fn test_river_rising_band() {
        let weather = district_weather("Colombo", 0.0, 0.0, 0.0, 0.0, 0.0);
        // 4.2m of a 5.0m alert line: 84% of capacity, 16% headroom
        let rivers = vec![station("Hanwella", "Kelani", 4.2, 5.0, 6.5, 7.5, &["Colombo"])];
        let threat = district_threat(&weather, &rivers, None, AlertLevel::Green);
        assert_eq!(threat.river_score, 40.0);
        let rising = threat
            .factors
            .iter()
            .find(|f| f.factor == "River Rising")
            .unwrap();
        assert!(rising.value.contains("84% capacity"));
    }

    #[test]
    fn test_threat_score_bounds() {
        // Even the worst case stays inside [0, 100]
        let weather = district_weather("Colombo", 500.0, 500.0, 500.0, 500.0, 500.0);
        let rivers = vec![station("Nagalagam", "Kelani", 20.0, 5.0, 6.5, 7.5, &["Colombo"])];
        let threat = district_threat(&weather, &rivers, Some(&weather), AlertLevel::Red);
        assert_eq!(threat.threat_score, 100.0);
        assert_eq!(threat.threat_level, ThreatLevel::Critical);
    }

    #[test]
    fn test_national_score_weighted_to_max() {
        let weather = district_weather("A", 0.0, 0.0, 0.0, 0.0, 0.0);
        let mut low = district_threat(&weather, &[], None, AlertLevel::Green);
        low.threat_score = 10.0;
        let mut high = low.clone();
        high.threat_score = 90.0;

        // avg = 50, max = 90 -> 0.3*50 + 0.7*90 = 78
        let score = national_score(&[low, high]);
        assert_eq!(score, 78.0);
        assert_eq!(ThreatLevel::from_score(score), ThreatLevel::Critical);
    }

    #[test]
    fn test_national_score_empty() {
        assert_eq!(national_score(&[]), 0.0);
    }
}

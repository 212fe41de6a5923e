//! Environmental indicator fetcher.
//!
//! Yearly country-level series from the World Bank open data API: forest
//! cover, population density and totals, urbanisation, agricultural land.
//! The trends are analysed for their contribution to flood vulnerability.
//! Data changes yearly, so the cache lives for a week.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::sources::{ManagedSource, get_json, http_client};

const WORLD_BANK_BASE: &str = "https://api.worldbank.org/v2";

const DEFAULT_START_YEAR: i32 = 1994;

/// World Bank indicator codes tracked by this fetcher.
const INDICATORS: [(&str, &str); 5] = [
    ("forest_area_pct", "AG.LND.FRST.ZS"),
    ("population_density", "EN.POP.DNST"),
    ("population_total", "SP.POP.TOTL"),
    ("urban_population_pct", "SP.URB.TOTL.IN.ZS"),
    ("agricultural_land_pct", "AG.LND.AGRI.ZS"),
];

/// One (year, value) observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct YearValue {
    pub year: i32,
    pub value: f64,
}

/// Trend statistics over a yearly series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub first_year: i32,
    pub last_year: i32,
    pub first_value: f64,
    pub last_value: f64,
    pub absolute_change: f64,
    pub percent_change: f64,
    pub annual_rate: f64,
    /// "increasing", "decreasing", or "stable".
    pub trend: String,
    pub min_value: f64,
    pub max_value: f64,
    pub avg_value: f64,
}

/// A named indicator series with its analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub name: String,
    pub unit: String,
    pub data: Vec<YearValue>,
    pub analysis: Option<TrendAnalysis>,
}

/// One environmental contribution to flood risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalRiskFactor {
    pub factor: String,
    pub description: String,
    pub impact: String,
    pub risk_contribution: f64,
}

/// Synthesis of how environmental change affects flood vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodRiskFactors {
    pub overall_risk_level: String,
    pub risk_score: f64,
    pub factors: Vec<EnvironmentalRiskFactor>,
    pub summary: String,
}

/// Full environmental trends snapshot for the monitored country.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalTrends {
    pub country_code: String,
    pub period: String,
    pub indicators: Vec<IndicatorSeries>,
    pub flood_risk_factors: FloodRiskFactors,
    pub analyzed_at: DateTime<Utc>,
}

// Wire types: the World Bank API returns [metadata, observations].

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorldBankEntry {
    Observations(Vec<RawObservation>),
    Metadata(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    #[serde(default)]
    date: String,
    #[serde(default)]
    value: Option<f64>,
}

/// Analyse a yearly series; `None` when fewer than two points exist.
pub fn analyze_trend(data: &[YearValue]) -> Option<TrendAnalysis> {
    if data.len() < 2 {
        return None;
    }
    let first = data.first()?;
    let last = data.last()?;

    let absolute_change = last.value - first.value;
    let percent_change = if first.value != 0.0 {
        (absolute_change / first.value) * 100.0
    } else {
        0.0
    };
    let years_span = last.year - first.year;
    let annual_rate = if years_span > 0 {
        percent_change / years_span as f64
    } else {
        0.0
    };

    let trend = if percent_change > 5.0 {
        "increasing"
    } else if percent_change < -5.0 {
        "decreasing"
    } else {
        "stable"
    };

    let values: Vec<f64> = data.iter().map(|d| d.value).collect();
    let min_value = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max_value = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg_value = values.iter().sum::<f64>() / values.len() as f64;

    Some(TrendAnalysis {
        first_year: first.year,
        last_year: last.year,
        first_value: round2(first.value),
        last_value: round2(last.value),
        absolute_change: round2(absolute_change),
        percent_change: round2(percent_change),
        annual_rate: (annual_rate * 1000.0).round() / 1000.0,
        trend: trend.to_string(),
        min_value: round2(min_value),
        max_value: round2(max_value),
        avg_value: round2(avg_value),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Deforestation, densification, and urbanisation each add to the flood
/// vulnerability score; contributions are capped per factor.
pub fn flood_risk_factors(
    forest: &[YearValue],
    density: &[YearValue],
    urban: &[YearValue],
) -> FloodRiskFactors {
    let mut factors = Vec::new();
    let mut risk_score = 0.0;

    if let (Some(first), Some(last)) = (forest.first(), forest.last()) {
        if forest.len() >= 2 && first.value > 0.0 {
            let loss = first.value - last.value;
            let loss_pct = (loss / first.value) * 100.0;
            if loss_pct > 5.0 {
                let contribution = (loss_pct * 2.0).min(30.0);
                risk_score += contribution;
                factors.push(EnvironmentalRiskFactor {
                    factor: "Deforestation".to_string(),
                    description: format!(
                        "Forest cover reduced from {:.1}% to {:.1}% ({:.1}% loss)",
                        first.value, last.value, loss_pct
                    ),
                    impact: if loss_pct > 10.0 { "High" } else { "Medium" }.to_string(),
                    risk_contribution: round1(contribution),
                });
            }
        }
    }

    if let (Some(first), Some(last)) = (density.first(), density.last()) {
        if density.len() >= 2 && first.value > 0.0 {
            let increase_pct = ((last.value - first.value) / first.value) * 100.0;
            if increase_pct > 5.0 {
                let contribution = increase_pct.min(25.0);
                risk_score += contribution;
                factors.push(EnvironmentalRiskFactor {
                    factor: "Population Growth".to_string(),
                    description: format!(
                        "Population density increased from {:.0} to {:.0} people/km2 ({:.1}% increase)",
                        first.value, last.value, increase_pct
                    ),
                    impact: if increase_pct > 15.0 { "High" } else { "Medium" }.to_string(),
                    risk_contribution: round1(contribution),
                });
            }
        }
    }

    if let (Some(first), Some(last)) = (urban.first(), urban.last()) {
        if urban.len() >= 2 {
            let increase = last.value - first.value;
            if increase > 2.0 {
                let contribution = (increase * 2.0).min(25.0);
                risk_score += contribution;
                factors.push(EnvironmentalRiskFactor {
                    factor: "Urbanization".to_string(),
                    description: format!(
                        "Urban population increased from {:.1}% to {:.1}% of total",
                        first.value, last.value
                    ),
                    impact: if increase > 5.0 { "High" } else { "Medium" }.to_string(),
                    risk_contribution: round1(contribution),
                });
            }
        }
    }

    let (overall, summary) = if risk_score >= 50.0 {
        (
            "HIGH",
            "Environmental changes have significantly increased flood vulnerability",
        )
    } else if risk_score >= 25.0 {
        (
            "MEDIUM",
            "Environmental changes have moderately increased flood vulnerability",
        )
    } else {
        (
            "LOW",
            "Environmental changes have had limited impact on flood vulnerability",
        )
    };

    FloodRiskFactors {
        overall_risk_level: overall.to_string(),
        risk_score: round1(risk_score),
        factors,
        summary: summary.to_string(),
    }
}

/// Fetcher for World Bank environmental indicator series.
pub struct EnvironmentalFetcher {
    client: reqwest::Client,
    base_url: String,
    country_code: String,
    cache: SourceCache<EnvironmentalTrends>,
}

impl EnvironmentalFetcher {
    pub fn new(config: &CoreConfig, country_code: &str) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: WORLD_BANK_BASE.to_string(),
            country_code: country_code.to_string(),
            cache: SourceCache::new("environmental", config.ttls.environmental)
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

    pub fn trends(&self) -> Option<EnvironmentalTrends> {
        self.cache.get().map(|t| t.as_ref().clone())
    }

    async fn fetch_indicator(&self, code: &str, end_year: i32) -> Vec<YearValue> {
        let url = format!(
            "{}/country/{}/indicator/{}?format=json&date={}:{}&per_page=100",
            self.base_url, self.country_code, code, DEFAULT_START_YEAR, end_year
        );

        let entries: Vec<WorldBankEntry> =
            match get_json(&self.client, &url, "environmental").await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(indicator = code, error = %err, "indicator fetch failed");
                    return Vec::new();
                }
            };

        let mut values: Vec<YearValue> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                WorldBankEntry::Observations(obs) => Some(obs),
                WorldBankEntry::Metadata(_) => None,
            })
            .flatten()
            .filter_map(|obs| {
                Some(YearValue {
                    year: obs.date.parse().ok()?,
                    value: obs.value?,
                })
            })
            .collect();
        values.sort_by_key(|v| v.year);
        values
    }

    async fn fetch_upstream(&self) -> Result<EnvironmentalTrends, CoreError> {
        let end_year = Utc::now().year();

        let mut indicators = Vec::with_capacity(INDICATORS.len());
        for (name, code) in INDICATORS {
            let data = self.fetch_indicator(code, end_year).await;
            let analysis = analyze_trend(&data);
            indicators.push(IndicatorSeries {
                name: name.to_string(),
                unit: indicator_unit(name).to_string(),
                data,
                analysis,
            });
        }

        if indicators.iter().all(|i| i.data.is_empty()) {
            return Err(CoreError::provider("environmental", "no indicator data"));
        }

        let series = |name: &str| -> Vec<YearValue> {
            indicators
                .iter()
                .find(|i| i.name == name)
                .map(|i| i.data.clone())
                .unwrap_or_default()
        };
        let risk = flood_risk_factors(
            &series("forest_area_pct"),
            &series("population_density"),
            &series("urban_population_pct"),
        );

        Ok(EnvironmentalTrends {
            country_code: self.country_code.clone(),
            period: format!("{DEFAULT_START_YEAR}-{end_year}"),
            indicators,
            flood_risk_factors: risk,
            analyzed_at: Utc::now(),
        })
    }
}

fn indicator_unit(name: &str) -> &'static str {
    match name {
        "forest_area_pct" | "urban_population_pct" | "agricultural_land_pct" => "% of land area",
        "population_density" => "people per km2",
        "population_total" => "people",
        _ => "",
    }
}

#[async_trait]
impl ManagedSource for EnvironmentalFetcher {
    fn name(&self) -> &'static str {
        "environmental"
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
            tracing::warn!(error = %err, "environmental snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(i32, f64)]) -> Vec<YearValue> {
        points
            .iter()
            .map(|(year, value)| YearValue {
                year: *year,
                value: *value,
            })
            .collect()
    }

    #[test]
    fn test_analyze_trend_decreasing() {
        let data = series(&[(1994, 36.4), (2004, 33.7), (2014, 33.4), (2024, 32.1)]);
        let analysis = analyze_trend(&data).unwrap();
        assert_eq!(analysis.first_year, 1994);
        assert_eq!(analysis.last_year, 2024);
        assert_eq!(analysis.trend, "decreasing");
        assert!(analysis.percent_change < -5.0);
        assert_eq!(analysis.max_value, 36.4);
        assert_eq!(analysis.min_value, 32.1);
    }

    #[test]
    fn test_analyze_trend_stable() {
        let data = series(&[(2000, 100.0), (2010, 102.0)]);
        let analysis = analyze_trend(&data).unwrap();
        assert_eq!(analysis.trend, "stable");
    }

    #[test]
    fn test_analyze_trend_insufficient_data() {
        assert!(analyze_trend(&series(&[(2020, 50.0)])).is_none());
        assert!(analyze_trend(&[]).is_none());
    }

    #[test]
    fn test_flood_risk_factors_accumulate() {
        let forest = series(&[(1994, 36.0), (2024, 29.0)]); // ~19% loss
        let density = series(&[(1994, 270.0), (2024, 350.0)]); // ~30% increase
        let urban = series(&[(1994, 16.0), (2024, 22.0)]); // +6 points

        let risk = flood_risk_factors(&forest, &density, &urban);
        assert_eq!(risk.factors.len(), 3);
        // 30 (forest, capped) + 25 (density, capped) + 12 (urban)
        assert!(risk.risk_score > 50.0);
        assert_eq!(risk.overall_risk_level, "HIGH");
        assert_eq!(risk.factors[0].factor, "Deforestation");
        assert_eq!(risk.factors[0].impact, "High");
    }

    #[test]
    fn test_flood_risk_factors_quiet_series() {
        let forest = series(&[(1994, 30.0), (2024, 29.5)]);
        let density = series(&[(1994, 300.0), (2024, 305.0)]);
        let urban = series(&[(1994, 18.0), (2024, 18.5)]);

        let risk = flood_risk_factors(&forest, &density, &urban);
        assert!(risk.factors.is_empty());
        assert_eq!(risk.risk_score, 0.0);
        assert_eq!(risk.overall_risk_level, "LOW");
    }

    #[test]
    fn test_world_bank_payload_parsing() {
        let raw = r#"[
            {"page": 1, "pages": 1, "per_page": 100, "total": 3},
            [
                {"date": "2022", "value": 33.1},
                {"date": "2021", "value": null},
                {"date": "2020", "value": 33.4}
            ]
        ]"#;
        let entries: Vec<WorldBankEntry> = serde_json::from_str(raw).unwrap();
        let values: Vec<YearValue> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                WorldBankEntry::Observations(obs) => Some(obs),
                WorldBankEntry::Metadata(_) => None,
            })
            .flatten()
            .filter_map(|obs| {
                Some(YearValue {
                    year: obs.date.parse().ok()?,
                    value: obs.value?,
                })
            })
            .collect();
        // Null observation dropped
        assert_eq!(values.len(), 2);
    }
}

//! Intelligence engine for crowdsourced emergency reports.
//!
//! Every cycle pulls the SOS feed fresh, scores each report's urgency,
//! groups nearby reports into rescue clusters, aggregates district
//! summaries with a weather overlay, and emits ranked action
//! recommendations. Clustering is deterministic: reports are sorted by
//! (reported_at, id) before any geometry runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::geo::haversine_km;
use crate::model::{ReportCluster, SosReport, UrgencyTier};
use crate::sources::ManagedSource;
use crate::sources::sos::SosFetcher;
use crate::sources::weather::WeatherFetcher;

/// Two reports chained within this distance share a cluster.
const CLUSTER_DISTANCE_KM: f64 = 2.0;

/// Clusters whose mean urgency reaches this level get a rescue action.
const CLUSTER_RESCUE_URGENCY: f64 = 50.0;

/// Districts expecting more than this much rain get a warning action.
const WEATHER_ALERT_FORECAST_MM: f64 = 50.0;

// ============================================================================
// Urgency scoring
// ============================================================================

/// Compute the 0-100 urgency score for a report.
///
/// | Factor | Points |
/// |---|---|
/// | water level ROOF/NECK/CHEST/WAIST/ANKLE | 40/35/25/15/5 |
/// | medical emergency | +15 |
/// | disabled people | +8 |
/// | elderly people | +5 |
/// | children | +2 |
/// | safe hours <= 1 | +20 |
/// | people count | +min(count, 10) |
/// | no food | +3 |
/// | no water | +5 |
/// | district forecast rain 24h > 100 mm | +15 |
pub fn urgency_score(report: &SosReport, district_forecast_24h_mm: f64) -> u32 {
    let mut score = 0u32;

    if let Some(level) = report.water_level {
        score += level.urgency_points();
    }
    if report.has_medical_emergency {
        score += 15;
    }
    if report.has_disabled {
        score += 8;
    }
    if report.has_elderly {
        score += 5;
    }
    if report.has_children {
        score += 2;
    }
    if report.safe_hours.is_some_and(|h| h <= 1.0) {
        score += 20;
    }
    score += report.people_count.min(10);
    if report.needs_food {
        score += 3;
    }
    if report.needs_water {
        score += 5;
    }
    if district_forecast_24h_mm > 100.0 {
        score += 15;
    }

    score.min(100)
}

// ============================================================================
// Clustering
// ============================================================================

/// Single-link clustering: reports with coordinates belong to the same
/// cluster when chained within [`CLUSTER_DISTANCE_KM`]. The relation is an
/// equivalence class, so transitively linked reports merge even when the
/// endpoints are far apart. Reports without coordinates are excluded.
pub fn cluster_reports(reports: &[SosReport]) -> Vec<ReportCluster> {
    let located: Vec<(&SosReport, f64, f64)> = reports
        .iter()
        .filter_map(|r| match (r.lat, r.lon) {
            (Some(lat), Some(lon)) => Some((r, lat, lon)),
            _ => None,
        })
        .collect();

    if located.is_empty() {
        return Vec::new();
    }

    // Union-find over the located reports
    let mut parent: Vec<usize> = (0..located.len()).collect();

    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        if parent[i] != i {
            let root = find(parent, parent[i]);
            parent[i] = root;
        }
        parent[i]
    }

    for i in 0..located.len() {
        for j in (i + 1)..located.len() {
            let (_, lat_i, lon_i) = located[i];
            let (_, lat_j, lon_j) = located[j];
            if haversine_km(lat_i, lon_i, lat_j, lon_j) <= CLUSTER_DISTANCE_KM {
                let root_i = find(&mut parent, i);
                let root_j = find(&mut parent, j);
                if root_i != root_j {
                    parent[root_j] = root_i;
                }
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..located.len() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }

    let mut clusters: Vec<ReportCluster> = groups
        .into_values()
        .map(|members| {
            let reports: Vec<&SosReport> = members.iter().map(|&i| located[i].0).collect();
            let count = reports.len();

            let centroid_lat =
                members.iter().map(|&i| located[i].1).sum::<f64>() / count as f64;
            let centroid_lon =
                members.iter().map(|&i| located[i].2).sum::<f64>() / count as f64;

            // Modal district names the cluster; ties break alphabetically
            let mut district_counts: HashMap<&str, usize> = HashMap::new();
            for report in &reports {
                *district_counts.entry(report.district.as_str()).or_default() += 1;
            }
            let name = district_counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(district, _)| district.to_string())
                .unwrap_or_default();

            let mut districts: Vec<String> = district_counts
                .keys()
                .map(|d| d.to_string())
                .filter(|d| !d.is_empty())
                .collect();
            districts.sort();

            let tier_count = |tier: UrgencyTier| {
                reports.iter().filter(|r| r.urgency_tier == tier).count()
            };
            let avg_urgency = reports.iter().map(|r| r.urgency_score as f64).sum::<f64>()
                / count as f64;

            ReportCluster {
                cluster_id: String::new(), // assigned after sorting
                name,
                centroid_lat,
                centroid_lon,
                report_ids: reports.iter().map(|r| r.id.clone()).collect(),
                districts,
                report_count: count,
                total_people: reports.iter().map(|r| r.people_count).sum(),
                critical_count: tier_count(UrgencyTier::Critical),
                high_count: tier_count(UrgencyTier::High),
                medium_count: tier_count(UrgencyTier::Medium),
                low_count: tier_count(UrgencyTier::Low),
                avg_urgency: (avg_urgency * 10.0).round() / 10.0,
            }
        })
        .collect();

    // Most urgent, then largest, then stable by first report id
    clusters.sort_by(|a, b| {
        b.avg_urgency
            .total_cmp(&a.avg_urgency)
            .then_with(|| b.report_count.cmp(&a.report_count))
            .then_with(|| a.report_ids.cmp(&b.report_ids))
    });
    for (index, cluster) in clusters.iter_mut().enumerate() {
        cluster.cluster_id = format!("cluster_{}", index + 1);
    }
    clusters
}

// ============================================================================
// Summaries and actions
// ============================================================================

/// Aggregate for one district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictIntel {
    pub district: String,
    pub count: usize,
    pub total_people: u32,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub needs_food: usize,
    pub needs_water: usize,
    pub medical_emergencies: usize,
    /// Forecast rainfall overlay from the weather cache.
    pub forecast_rain_24h: f64,
}

/// Headline intelligence summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelSummary {
    pub total_reports: usize,
    pub total_people: u32,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub needs_food: usize,
    pub needs_water: usize,
    pub medical_emergencies: usize,
    pub with_elderly: usize,
    pub with_disabled: usize,
    pub with_children: usize,
    pub most_affected_districts: Vec<DistrictIntel>,
    pub analyzed_at: DateTime<Utc>,
}

/// One recommended action with its top targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub priority: u32,
    pub action: String,
    pub description: String,
    pub targets: Vec<serde_json::Value>,
}

/// Full output of one analysis cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelSnapshot {
    pub priorities: Vec<SosReport>,
    pub clusters: Vec<ReportCluster>,
    pub summary: IntelSummary,
    pub analyzed_at: DateTime<Utc>,
}

fn district_summaries(
    reports: &[SosReport],
    forecast_by_district: &HashMap<String, f64>,
) -> Vec<DistrictIntel> {
    let mut by_district: HashMap<&str, Vec<&SosReport>> = HashMap::new();
    for report in reports {
        if !report.district.is_empty() {
            by_district.entry(report.district.as_str()).or_default().push(report);
        }
    }

    let mut summaries: Vec<DistrictIntel> = by_district
        .into_iter()
        .map(|(district, reports)| {
            let tier_count =
                |tier: UrgencyTier| reports.iter().filter(|r| r.urgency_tier == tier).count();
            DistrictIntel {
                district: district.to_string(),
                count: reports.len(),
                total_people: reports.iter().map(|r| r.people_count).sum(),
                critical_count: tier_count(UrgencyTier::Critical),
                high_count: tier_count(UrgencyTier::High),
                medium_count: tier_count(UrgencyTier::Medium),
                low_count: tier_count(UrgencyTier::Low),
                needs_food: reports.iter().filter(|r| r.needs_food).count(),
                needs_water: reports.iter().filter(|r| r.needs_water).count(),
                medical_emergencies: reports
                    .iter()
                    .filter(|r| r.has_medical_emergency)
                    .count(),
                forecast_rain_24h: forecast_by_district
                    .get(&district.to_lowercase())
                    .copied()
                    .unwrap_or(0.0),
            }
        })
        .collect();

    // Worst district first
    summaries.sort_by(|a, b| {
        b.critical_count
            .cmp(&a.critical_count)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.district.cmp(&b.district))
    });
    summaries
}

/// Apply the fixed, ordered action rule set. Emits at most five actions.
pub fn recommended_actions(snapshot: &IntelSnapshot) -> Vec<RecommendedAction> {
    let mut actions = Vec::new();

    let critical: Vec<&SosReport> = snapshot
        .priorities
        .iter()
        .filter(|p| p.urgency_tier == UrgencyTier::Critical)
        .collect();
    if !critical.is_empty() {
        actions.push(RecommendedAction {
            priority: 1,
            action: "IMMEDIATE_RESCUE".to_string(),
            description: format!(
                "Deploy rescue teams to {} CRITICAL cases immediately",
                critical.len()
            ),
            targets: critical
                .iter()
                .take(10)
                .map(|c| {
                    json!({
                        "id": c.id,
                        "location": c.address.clone().unwrap_or_else(|| c.district.clone()),
                        "people": c.people_count,
                        "water_level": c.water_level,
                        "contact": c.phone,
                    })
                })
                .collect(),
        });
    }

    let medical: Vec<&SosReport> = snapshot
        .priorities
        .iter()
        .filter(|p| p.has_medical_emergency)
        .collect();
    if !medical.is_empty() {
        actions.push(RecommendedAction {
            priority: 2,
            action: "MEDICAL_RESPONSE".to_string(),
            description: format!(
                "Dispatch medical teams to {} cases with medical emergencies",
                medical.len()
            ),
            targets: medical
                .iter()
                .take(10)
                .map(|m| {
                    json!({
                        "id": m.id,
                        "location": m.address.clone().unwrap_or_else(|| m.district.clone()),
                        "people": m.people_count,
                        "contact": m.phone,
                    })
                })
                .collect(),
        });
    }

    let needs_water: usize = snapshot.summary.needs_water;
    let needs_food: usize = snapshot.summary.needs_food;
    if needs_water > 0 || needs_food > 0 {
        let mut districts = snapshot.summary.most_affected_districts.clone();
        districts.sort_by(|a, b| {
            (b.needs_water + b.needs_food).cmp(&(a.needs_water + a.needs_food))
        });
        actions.push(RecommendedAction {
            priority: 3,
            action: "SUPPLY_DISTRIBUTION".to_string(),
            description: format!(
                "Distribute supplies: {needs_water} need water, {needs_food} need food"
            ),
            targets: districts
                .iter()
                .take(5)
                .map(|d| {
                    json!({
                        "district": d.district,
                        "needs_water": d.needs_water,
                        "needs_food": d.needs_food,
                        "total_people": d.total_people,
                    })
                })
                .collect(),
        });
    }

    let urgent_clusters: Vec<&ReportCluster> = snapshot
        .clusters
        .iter()
        .filter(|c| c.avg_urgency >= CLUSTER_RESCUE_URGENCY)
        .collect();
    if !urgent_clusters.is_empty() {
        actions.push(RecommendedAction {
            priority: 4,
            action: "CLUSTER_RESCUE".to_string(),
            description: format!(
                "Coordinate rescue operations for {} high-urgency clusters",
                urgent_clusters.len()
            ),
            targets: urgent_clusters
                .iter()
                .take(5)
                .map(|c| {
                    json!({
                        "cluster_id": c.cluster_id,
                        "name": c.name,
                        "report_count": c.report_count,
                        "total_people": c.total_people,
                        "centroid": {"lat": c.centroid_lat, "lon": c.centroid_lon},
                        "critical_count": c.critical_count,
                    })
                })
                .collect(),
        });
    }

    let escalating: Vec<&DistrictIntel> = snapshot
        .summary
        .most_affected_districts
        .iter()
        .filter(|d| d.forecast_rain_24h > WEATHER_ALERT_FORECAST_MM)
        .collect();
    if !escalating.is_empty() {
        actions.push(RecommendedAction {
            priority: 5,
            action: "WEATHER_ALERT".to_string(),
            description: format!(
                "Issue warnings for {} districts expecting >50mm rain in 24hrs",
                escalating.len()
            ),
            targets: escalating
                .iter()
                .map(|d| {
                    json!({
                        "district": d.district,
                        "forecast_rain_24h": d.forecast_rain_24h,
                        "current_cases": d.count,
                    })
                })
                .collect(),
        });
    }

    actions
}

// ============================================================================
// Engine
// ============================================================================

/// The intelligence engine and its snapshot cache.
pub struct IntelEngine {
    sos: Arc<SosFetcher>,
    weather: Arc<WeatherFetcher>,
    cache: SourceCache<IntelSnapshot>,
}

impl IntelEngine {
    pub fn new(config: &CoreConfig, sos: Arc<SosFetcher>, weather: Arc<WeatherFetcher>) -> Self {
        Self {
            sos,
            weather,
            cache: SourceCache::new("intel", config.intervals.intel.as_secs())
                .with_freeze(config.freeze_mode),
        }
    }

    pub fn snapshot(&self) -> Option<IntelSnapshot> {
        self.cache.get().map(|s| s.as_ref().clone())
    }

    /// Priorities filtered by district and tier, capped at `limit`.
    pub fn priorities(
        &self,
        district: Option<&str>,
        tier: Option<UrgencyTier>,
        limit: usize,
    ) -> Vec<SosReport> {
        let Some(snapshot) = self.cache.get() else {
            return Vec::new();
        };
        snapshot
            .priorities
            .iter()
            .filter(|r| district.is_none_or(|d| r.district.eq_ignore_ascii_case(d)))
            .filter(|r| tier.is_none_or(|t| r.urgency_tier == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clusters(&self, district: Option<&str>) -> Vec<ReportCluster> {
        let Some(snapshot) = self.cache.get() else {
            return Vec::new();
        };
        snapshot
            .clusters
            .iter()
            .filter(|c| {
                district.is_none_or(|d| c.districts.iter().any(|cd| cd.eq_ignore_ascii_case(d)))
            })
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> Option<IntelSummary> {
        self.cache.get().map(|s| s.summary.clone())
    }

    pub fn actions(&self) -> Vec<RecommendedAction> {
        self.cache
            .get()
            .map(|s| recommended_actions(&s))
            .unwrap_or_default()
    }

    /// Detailed intelligence for one district.
    pub fn district_intel(&self, district: &str) -> Option<serde_json::Value> {
        let snapshot = self.cache.get()?;
        let reports: Vec<&SosReport> = snapshot
            .priorities
            .iter()
            .filter(|r| r.district.eq_ignore_ascii_case(district))
            .collect();
        let clusters: Vec<&ReportCluster> = snapshot
            .clusters
            .iter()
            .filter(|c| c.districts.iter().any(|d| d.eq_ignore_ascii_case(district)))
            .collect();
        let stats = snapshot
            .summary
            .most_affected_districts
            .iter()
            .find(|d| d.district.eq_ignore_ascii_case(district));

        Some(json!({
            "district": district,
            "report_count": reports.len(),
            "reports": reports,
            "clusters": clusters,
            "stats": stats,
        }))
    }

    fn compute(&self, mut reports: Vec<SosReport>) -> IntelSnapshot {
        // Stable input order makes clustering reproducible
        reports.sort_by(|a, b| a.reported_at.cmp(&b.reported_at).then_with(|| a.id.cmp(&b.id)));

        let forecast_by_district: HashMap<String, f64> = self
            .weather
            .forecasts()
            .into_iter()
            .map(|w| (w.district.to_lowercase(), w.forecast_precip_24h_mm))
            .collect();

        for report in &mut reports {
            let forecast = forecast_by_district
                .get(&report.district.to_lowercase())
                .copied()
                .unwrap_or(0.0);
            report.urgency_score = urgency_score(report, forecast);
            report.urgency_tier = UrgencyTier::from_score(report.urgency_score);
        }

        let clusters = cluster_reports(&reports);

        let tier_count =
            |tier: UrgencyTier| reports.iter().filter(|r| r.urgency_tier == tier).count();
        let analyzed_at = Utc::now();
        let summary = IntelSummary {
            total_reports: reports.len(),
            total_people: reports.iter().map(|r| r.people_count).sum(),
            critical_count: tier_count(UrgencyTier::Critical),
            high_count: tier_count(UrgencyTier::High),
            medium_count: tier_count(UrgencyTier::Medium),
            low_count: tier_count(UrgencyTier::Low),
            needs_food: reports.iter().filter(|r| r.needs_food).count(),
            needs_water: reports.iter().filter(|r| r.needs_water).count(),
            medical_emergencies: reports
                .iter()
                .filter(|r| r.has_medical_emergency)
                .count(),
            with_elderly: reports.iter().filter(|r| r.has_elderly).count(),
            with_disabled: reports.iter().filter(|r| r.has_disabled).count(),
            with_children: reports.iter().filter(|r| r.has_children).count(),
            most_affected_districts: district_summaries(&reports, &forecast_by_district),
            analyzed_at,
        };

        // Highest urgency first for the priority list
        let mut priorities = reports;
        priorities.sort_by(|a, b| {
            b.urgency_score
                .cmp(&a.urgency_score)
                .then_with(|| a.id.cmp(&b.id))
        });

        IntelSnapshot {
            priorities,
            clusters,
            summary,
            analyzed_at,
        }
    }

    /// One analysis cycle: pull SOS fresh, score, cluster, summarise.
    pub async fn run_analysis(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        // The SOS feed has no meaningful TTL of its own; pull it every cycle
        let _ = self.sos.refresh(true).await;
        let reports = self.sos.all();

        let outcome = self
            .cache
            .refresh_with(force, || async move { Ok(self.compute(reports)) })
            .await?;

        if outcome == RefreshOutcome::Refreshed {
            if let Some(snapshot) = self.cache.get() {
                info!(
                    reports = snapshot.summary.total_reports,
                    critical = snapshot.summary.critical_count,
                    clusters = snapshot.clusters.len(),
                    "intelligence snapshot recomputed"
                );
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl ManagedSource for IntelEngine {
    fn name(&self) -> &'static str {
        "intel"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl().num_seconds().max(0) as u64)
    }

    fn cache_info(&self) -> CacheInfo {
        self.cache.cache_info()
    }

    async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        self.run_analysis(force).await
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use crate::model::WaterLevelBand;

    pub fn report(id: &str, district: &str, lat: Option<f64>, lon: Option<f64>) -> SosReport {
        SosReport {
            id: id.to_string(),
            district: district.to_string(),
            address: None,
            lat,
            lon,
            people_count: 1,
            water_level: Some(WaterLevelBand::Waist),
            has_medical_emergency: false,
            has_elderly: false,
            has_disabled: false,
            has_children: false,
            needs_food: false,
            needs_water: false,
            safe_hours: None,
            phone: None,
            reported_at: Utc::now(),
            urgency_score: 0,
            urgency_tier: UrgencyTier::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::report;
    use super::*;
    use crate::model::WaterLevelBand;

    #[test]
    fn test_urgency_worked_example() {
        // NECK (35) + medical (15) + safe_hours 1 (20) + 4 people (4)
        // + no water (5) + forecast 120mm (15) = 94 -> CRITICAL
        let mut r = report("sos-1", "Kalutara", None, None);
        r.water_level = Some(WaterLevelBand::Neck);
        r.has_medical_emergency = true;
        r.safe_hours = Some(1.0);
        r.people_count = 4;
        r.needs_water = true;

        let score = urgency_score(&r, 120.0);
        assert_eq!(score, 94);
        assert_eq!(UrgencyTier::from_score(score), UrgencyTier::Critical);
    }

    #[test]
    fn test_urgency_capped_at_100() {
        let mut r = report("sos-2", "Colombo", None, None);
        r.water_level = Some(WaterLevelBand::Roof);
        r.has_medical_emergency = true;
        r.has_disabled = true;
        r.has_elderly = true;
        r.has_children = true;
        r.safe_hours = Some(0.5);
        r.people_count = 50;
        r.needs_food = true;
        r.needs_water = true;

        assert_eq!(urgency_score(&r, 150.0), 100);
    }

    #[test]
    fn test_urgency_people_count_capped() {
        let mut r = report("sos-3", "Colombo", None, None);
        r.water_level = None;
        r.people_count = 40;
        // min(40, 10) people points only
        assert_eq!(urgency_score(&r, 0.0), 10);
    }

    #[test]
    fn test_clustering_scenario() {
        // Reports at (6.90,79.86) and (6.905,79.862) chain together; the
        // third sits ~2.3km from the second; the fourth is far away.
        // Expected: 3 clusters of sizes 2, 1, 1.
        let reports = vec![
            report("a", "Colombo", Some(6.90), Some(79.86)),
            report("b", "Colombo", Some(6.905), Some(79.862)),
            report("c", "Colombo", Some(6.92), Some(79.88)),
            report("d", "Gampaha", Some(7.05), Some(80.05)),
        ];

        let clusters = cluster_reports(&reports);
        assert_eq!(clusters.len(), 3);
        let mut sizes: Vec<usize> = clusters.iter().map(|c| c.report_count).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 1, 2]);
    }

    #[test]
    fn test_clustering_transitive_chain() {
        // a-b within 2km, b-c within 2km, a-c beyond: all one cluster
        let reports = vec![
            report("a", "Colombo", Some(6.900), Some(79.860)),
            report("b", "Colombo", Some(6.915), Some(79.860)),
            report("c", "Colombo", Some(6.930), Some(79.860)),
        ];
        let clusters = cluster_reports(&reports);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].report_count, 3);
    }

    #[test]
    fn test_clustering_excludes_reports_without_coordinates() {
        let reports = vec![
            report("a", "Colombo", Some(6.90), Some(79.86)),
            report("b", "Colombo", None, None),
        ];
        let clusters = cluster_reports(&reports);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].report_count, 1);
    }

    #[test]
    fn test_cluster_centroid_and_name() {
        let mut reports = vec![
            report("a", "Colombo", Some(6.90), Some(79.86)),
            report("b", "Colombo", Some(6.91), Some(79.87)),
            report("c", "Kalutara", Some(6.905), Some(79.865)),
        ];
        for r in &mut reports {
            r.urgency_score = 60;
            r.urgency_tier = UrgencyTier::High;
        }

        let clusters = cluster_reports(&reports);
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        // Modal district wins the name
        assert_eq!(cluster.name, "Colombo");
        assert_eq!(cluster.districts, vec!["Colombo", "Kalutara"]);
        assert!((cluster.centroid_lat - 6.905).abs() < 1e-9);
        assert_eq!(cluster.high_count, 3);
        assert_eq!(cluster.avg_urgency, 60.0);
        assert_eq!(cluster.cluster_id, "cluster_1");
    }

    #[test]
    fn test_district_summary_no_coordinates_still_counted() {
        let mut r = report("a", "Galle", None, None);
        r.needs_food = true;
        let summaries = district_summaries(&[r], &HashMap::new());
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].count, 1);
        assert_eq!(summaries[0].needs_food, 1);
    }

    fn snapshot_with(reports: Vec<SosReport>, clusters: Vec<ReportCluster>) -> IntelSnapshot {
        let analyzed_at = Utc::now();
        let tier_count =
            |tier: UrgencyTier| reports.iter().filter(|r| r.urgency_tier == tier).count();
        IntelSnapshot {
            summary: IntelSummary {
                total_reports: reports.len(),
                total_people: reports.iter().map(|r| r.people_count).sum(),
                critical_count: tier_count(UrgencyTier::Critical),
                high_count: tier_count(UrgencyTier::High),
                medium_count: tier_count(UrgencyTier::Medium),
                low_count: tier_count(UrgencyTier::Low),
                needs_food: reports.iter().filter(|r| r.needs_food).count(),
                needs_water: reports.iter().filter(|r| r.needs_water).count(),
                medical_emergencies: reports
                    .iter()
                    .filter(|r| r.has_medical_emergency)
                    .count(),
                with_elderly: 0,
                with_disabled: 0,
                with_children: 0,
                most_affected_districts: district_summaries(&reports, &HashMap::new()),
                analyzed_at,
            },
            priorities: reports,
            clusters,
            analyzed_at,
        }
    }

    #[test]
    fn test_actions_ordered_rule_set() {
        let mut critical = report("crit-1", "Colombo", None, None);
        critical.urgency_score = 90;
        critical.urgency_tier = UrgencyTier::Critical;
        critical.has_medical_emergency = true;
        critical.needs_water = true;

        let mut cluster = ReportCluster {
            cluster_id: "cluster_1".to_string(),
            name: "Colombo".to_string(),
            centroid_lat: 6.9,
            centroid_lon: 79.86,
            report_ids: vec!["crit-1".to_string()],
            districts: vec!["Colombo".to_string()],
            report_count: 1,
            total_people: 1,
            critical_count: 1,
            high_count: 0,
            medium_count: 0,
            low_count: 0,
            avg_urgency: 90.0,
        };
        cluster.avg_urgency = 90.0;

        let snapshot = snapshot_with(vec![critical], vec![cluster]);
        let actions = recommended_actions(&snapshot);

        let names: Vec<&str> = actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "IMMEDIATE_RESCUE",
                "MEDICAL_RESPONSE",
                "SUPPLY_DISTRIBUTION",
                "CLUSTER_RESCUE"
            ]
        );
        // Priorities are the fixed rule order
        let priorities: Vec<u32> = actions.iter().map(|a| a.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_actions_empty_when_quiet() {
        let snapshot = snapshot_with(vec![], vec![]);
        assert!(recommended_actions(&snapshot).is_empty());
    }

    #[test]
    fn test_weather_alert_action() {
        let r = report("a", "Ratnapura", None, None);
        let mut snapshot = snapshot_with(vec![r], vec![]);
        snapshot.summary.most_affected_districts[0].forecast_rain_24h = 80.0;

        let actions = recommended_actions(&snapshot);
        let weather = actions.iter().find(|a| a.action == "WEATHER_ALERT").unwrap();
        assert_eq!(weather.priority, 5);
        assert_eq!(weather.targets.len(), 1);
    }
}

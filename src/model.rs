//! Normalised domain types shared across fetchers, engines, and the API.
//!
//! Every fetcher defines its own upstream wire types next to its client and
//! converts them into these records at the boundary. Unknown upstream codes
//! map to an explicit `Unknown` variant rather than being dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Severity scales
// ============================================================================

/// Rainfall alert level, ordered least to most severe.
///
/// Derived from a region's threshold bands; see `region::Region::alert_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl AlertLevel {
    pub fn label(&self) -> &'static str {
        match self {
            AlertLevel::Green => "green",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Orange => "orange",
            AlertLevel::Red => "red",
        }
    }
}

/// Weather danger level for a district, derived from the danger score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl DangerLevel {
    /// Thresholds: critical >= 50, high >= 30, moderate >= 15, else low.
    pub fn from_score(score: u32) -> Self {
        if score >= 50 {
            DangerLevel::Critical
        } else if score >= 30 {
            DangerLevel::High
        } else if score >= 15 {
            DangerLevel::Moderate
        } else {
            DangerLevel::Low
        }
    }
}

/// Composite threat level for a district or the nation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Thresholds: CRITICAL >= 70, HIGH >= 50, MEDIUM >= 30, else LOW.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            ThreatLevel::Critical
        } else if score >= 50.0 {
            ThreatLevel::High
        } else if score >= 30.0 {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }
}

/// Urgency tier for an SOS report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyTier {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyTier {
    /// Thresholds: CRITICAL >= 75, HIGH >= 50, MEDIUM >= 25, else LOW.
    pub fn from_score(score: u32) -> Self {
        if score >= 75 {
            UrgencyTier::Critical
        } else if score >= 50 {
            UrgencyTier::High
        } else if score >= 25 {
            UrgencyTier::Medium
        } else {
            UrgencyTier::Low
        }
    }

    /// Parse a user-supplied tier filter, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "LOW" => Some(UrgencyTier::Low),
            "MEDIUM" => Some(UrgencyTier::Medium),
            "HIGH" => Some(UrgencyTier::High),
            "CRITICAL" => Some(UrgencyTier::Critical),
            _ => None,
        }
    }
}

// ============================================================================
// Rivers
// ============================================================================

/// Water level status relative to a station's flood thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodStatus {
    Normal,
    Rising,
    Falling,
    Alert,
    MinorFlood,
    MajorFlood,
}

impl FloodStatus {
    /// Classify a level against thresholds. A station exactly at a threshold
    /// is in that band (`water >= major` is a major flood).
    ///
    /// When the level sits below the alert line, the trend against the
    /// previous reading decides between `Rising`, `Falling`, and `Normal`.
    pub fn classify(
        water_level_m: f64,
        previous_m: Option<f64>,
        alert_m: Option<f64>,
        minor_flood_m: Option<f64>,
        major_flood_m: Option<f64>,
    ) -> Self {
        if let Some(major) = major_flood_m {
            if water_level_m >= major {
                return FloodStatus::MajorFlood;
            }
        }
        if let Some(minor) = minor_flood_m {
            if water_level_m >= minor {
                return FloodStatus::MinorFlood;
            }
        }
        if let Some(alert) = alert_m {
            if water_level_m >= alert {
                return FloodStatus::Alert;
            }
        }
        match previous_m {
            Some(prev) if water_level_m > prev + 0.05 => FloodStatus::Rising,
            Some(prev) if water_level_m < prev - 0.05 => FloodStatus::Falling,
            _ => FloodStatus::Normal,
        }
    }

    /// Numeric rank used for sorting; higher is more severe.
    pub fn severity_rank(&self) -> u8 {
        match self {
            FloodStatus::Normal => 0,
            FloodStatus::Falling => 1,
            FloodStatus::Rising => 2,
            FloodStatus::Alert => 3,
            FloodStatus::MinorFlood => 4,
            FloodStatus::MajorFlood => 5,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "alert" => FloodStatus::Alert,
            "rising" => FloodStatus::Rising,
            "falling" => FloodStatus::Falling,
            "minor_flood" | "minor flood" => FloodStatus::MinorFlood,
            "major_flood" | "major flood" => FloodStatus::MajorFlood,
            _ => FloodStatus::Normal,
        }
    }
}

/// A river gauging station with its latest reading.
///
/// `station_id` is globally unique in the form `<region>_<river>_<station>`.
/// Invariant when all thresholds are present: `alert <= minor <= major`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiverStation {
    pub station_id: String,
    pub river_name: String,
    pub river_code: Option<String>,
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub catchment_area_km2: Option<f64>,
    pub water_level_m: f64,
    pub water_level_previous_m: Option<f64>,
    pub rainfall_24h_mm: Option<f64>,
    pub alert_level_m: Option<f64>,
    pub minor_flood_m: Option<f64>,
    pub major_flood_m: Option<f64>,
    pub status: FloodStatus,
    /// Districts this station's river runs through; joins threat scoring.
    #[serde(default)]
    pub districts: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub region_id: String,
}

impl RiverStation {
    /// Percent headroom remaining before a threshold:
    /// `100 - (level/threshold)*100`. Negative once the level has crossed
    /// the threshold.
    fn pct_to(&self, threshold: Option<f64>) -> Option<f64> {
        match threshold {
            Some(t) if t > 0.0 => Some(100.0 - (self.water_level_m / t) * 100.0),
            _ => None,
        }
    }

    pub fn pct_to_alert(&self) -> Option<f64> {
        self.pct_to(self.alert_level_m)
    }

    pub fn pct_to_minor_flood(&self) -> Option<f64> {
        self.pct_to(self.minor_flood_m)
    }

    pub fn pct_to_major_flood(&self) -> Option<f64> {
        self.pct_to(self.major_flood_m)
    }
}

/// A single water level reading. Append-only history stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterReading {
    pub station_id: String,
    pub water_level_m: f64,
    pub rainfall_mm: Option<f64>,
    pub status: FloodStatus,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Weather
// ============================================================================

/// One day of forecast for a district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: String,
    pub temp_min_c: Option<f64>,
    pub temp_max_c: Option<f64>,
    pub precipitation_mm: f64,
    pub precipitation_probability: Option<f64>,
    pub description: Option<String>,
}

/// Normalised per-district weather snapshot: current observation, accumulated
/// rainfall, forecast totals, and the derived danger assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictWeather {
    pub district: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub wind_gust_kmh: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub cloud_cover_percent: Option<f64>,
    pub rainfall_24h_mm: f64,
    pub rainfall_48h_mm: f64,
    pub rainfall_72h_mm: f64,
    pub forecast_precip_24h_mm: f64,
    pub forecast_precip_48h_mm: f64,
    pub precipitation_probability: Option<f64>,
    pub danger_level: DangerLevel,
    pub danger_score: u32,
    pub danger_factors: Vec<String>,
    #[serde(default)]
    pub forecast_daily: Vec<DailyForecast>,
}

// ============================================================================
// Traffic
// ============================================================================

/// Incident category from the provider's fixed icon codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    Accident,
    Fog,
    DangerousConditions,
    Rain,
    Ice,
    Jam,
    LaneClosed,
    RoadClosed,
    Roadworks,
    Wind,
    Flooding,
    BrokenDownVehicle,
    Unknown,
}

impl IncidentCategory {
    /// Fixed mapping from the provider's `iconCategory` codes. Codes outside
    /// the table map to `Unknown`, never dropped.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => IncidentCategory::Accident,
            2 => IncidentCategory::Fog,
            3 => IncidentCategory::DangerousConditions,
            4 => IncidentCategory::Rain,
            5 => IncidentCategory::Ice,
            6 => IncidentCategory::Jam,
            7 => IncidentCategory::LaneClosed,
            8 => IncidentCategory::RoadClosed,
            9 => IncidentCategory::Roadworks,
            10 => IncidentCategory::Wind,
            11 => IncidentCategory::Flooding,
            14 => IncidentCategory::BrokenDownVehicle,
            _ => IncidentCategory::Unknown,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "accident" => Some(IncidentCategory::Accident),
            "jam" => Some(IncidentCategory::Jam),
            "road_closed" | "roadclosed" => Some(IncidentCategory::RoadClosed),
            "lane_closed" | "laneclosed" => Some(IncidentCategory::LaneClosed),
            "roadworks" => Some(IncidentCategory::Roadworks),
            "flooding" => Some(IncidentCategory::Flooding),
            "fog" => Some(IncidentCategory::Fog),
            "rain" => Some(IncidentCategory::Rain),
            "ice" => Some(IncidentCategory::Ice),
            "wind" => Some(IncidentCategory::Wind),
            "dangerous_conditions" => Some(IncidentCategory::DangerousConditions),
            "broken_down_vehicle" => Some(IncidentCategory::BrokenDownVehicle),
            "unknown" => Some(IncidentCategory::Unknown),
            _ => None,
        }
    }
}

/// Incident severity derived from the provider's magnitude-of-delay value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Unknown,
    Minor,
    Moderate,
    Major,
    Critical,
}

impl IncidentSeverity {
    pub fn from_magnitude(magnitude: u32) -> Self {
        match magnitude {
            0 => IncidentSeverity::Unknown,
            1 => IncidentSeverity::Minor,
            2 => IncidentSeverity::Moderate,
            3 => IncidentSeverity::Major,
            _ => IncidentSeverity::Critical,
        }
    }
}

/// A road incident, deduplicated by `id` across sub-region tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficIncident {
    pub id: String,
    pub icon_category: u32,
    pub category: IncidentCategory,
    pub severity: IncidentSeverity,
    pub lat: f64,
    pub lon: f64,
    pub description: String,
    pub from_location: String,
    pub to_location: String,
    pub road_name: String,
    pub delay_seconds: i64,
    pub length_meters: i64,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Congestion bucket from the ratio of current to free-flow speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Free,
    Light,
    Moderate,
    Heavy,
    Severe,
}

impl CongestionLevel {
    /// Buckets: free > 0.9, light 0.7-0.9, moderate 0.5-0.7, heavy 0.3-0.5,
    /// severe < 0.3.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 0.9 {
            CongestionLevel::Free
        } else if ratio > 0.7 {
            CongestionLevel::Light
        } else if ratio > 0.5 {
            CongestionLevel::Moderate
        } else if ratio > 0.3 {
            CongestionLevel::Heavy
        } else {
            CongestionLevel::Severe
        }
    }
}

/// A monitored road segment with current vs free-flow speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSegment {
    pub segment_id: String,
    pub road_name: String,
    pub lat: f64,
    pub lon: f64,
    pub current_speed_kmh: f64,
    pub free_flow_speed_kmh: f64,
    pub congestion: CongestionLevel,
    pub provider: String,
}

// ============================================================================
// SOS reports and clusters
// ============================================================================

/// Flood water depth reported by a person in distress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WaterLevelBand {
    Ankle,
    Waist,
    Chest,
    Neck,
    Roof,
}

impl WaterLevelBand {
    /// Urgency points contributed by the water depth alone.
    pub fn urgency_points(&self) -> u32 {
        match self {
            WaterLevelBand::Roof => 40,
            WaterLevelBand::Neck => 35,
            WaterLevelBand::Chest => 25,
            WaterLevelBand::Waist => 15,
            WaterLevelBand::Ankle => 5,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "ANKLE" => Some(WaterLevelBand::Ankle),
            "WAIST" => Some(WaterLevelBand::Waist),
            "CHEST" => Some(WaterLevelBand::Chest),
            "NECK" => Some(WaterLevelBand::Neck),
            "ROOF" => Some(WaterLevelBand::Roof),
            _ => None,
        }
    }
}

/// A crowdsourced emergency report with its derived urgency ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosReport {
    pub id: String,
    pub district: String,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub people_count: u32,
    pub water_level: Option<WaterLevelBand>,
    pub has_medical_emergency: bool,
    pub has_elderly: bool,
    pub has_disabled: bool,
    pub has_children: bool,
    pub needs_food: bool,
    pub needs_water: bool,
    /// Hours the reporter estimates they can remain safe.
    pub safe_hours: Option<f64>,
    pub phone: Option<String>,
    pub reported_at: DateTime<Utc>,
    /// Derived 0-100 priority; see the intelligence engine.
    pub urgency_score: u32,
    pub urgency_tier: UrgencyTier,
}

/// Geographic cluster of reports for rescue routing. Membership is the
/// single-link equivalence class of reports within 2 km chained distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCluster {
    pub cluster_id: String,
    /// Most frequent district among members.
    pub name: String,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub report_ids: Vec<String>,
    pub districts: Vec<String>,
    pub report_count: usize,
    pub total_people: u32,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub avg_urgency: f64,
}

// ============================================================================
// Facilities
// ============================================================================

/// Emergency facility categories tracked from OpenStreetMap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityKind {
    Hospital,
    Police,
    Fire,
    Shelter,
}

impl FacilityKind {
    pub const ALL: [FacilityKind; 4] = [
        FacilityKind::Hospital,
        FacilityKind::Police,
        FacilityKind::Fire,
        FacilityKind::Shelter,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FacilityKind::Hospital => "hospital",
            FacilityKind::Police => "police",
            FacilityKind::Fire => "fire",
            FacilityKind::Shelter => "shelter",
        }
    }
}

/// An emergency facility (hospital, police post, fire station, shelter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub kind: FacilityKind,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

// ============================================================================
// Threat snapshot
// ============================================================================

/// A contributing factor recorded during threat scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatFactor {
    pub factor: String,
    pub value: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub river: Option<String>,
}

/// Composite flood threat for one district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictThreat {
    pub district: String,
    pub threat_score: f64,
    pub threat_level: ThreatLevel,
    pub rainfall_score: f64,
    pub river_score: f64,
    pub forecast_score: f64,
    pub factors: Vec<ThreatFactor>,
    pub current_alert_level: AlertLevel,
    pub lat: f64,
    pub lon: f64,
}

/// Counts of rivers at each threshold plus the worst station.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiverSummary {
    pub total_stations: usize,
    pub major_flood: usize,
    pub minor_flood: usize,
    pub alert: usize,
    pub highest_risk_station: Option<String>,
}

/// Headline counts for the threat snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatSummary {
    pub critical_districts: usize,
    pub high_risk_districts: usize,
    pub medium_risk_districts: usize,
    pub rivers_at_major_flood: usize,
    pub rivers_at_minor_flood: usize,
    pub rivers_at_alert: usize,
}

/// Pre-computed national flood threat assessment. Reads are O(1): the
/// scheduler refreshes this snapshot, the API only serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatSnapshot {
    pub national_threat_level: ThreatLevel,
    pub national_threat_score: f64,
    pub summary: ThreatSummary,
    pub top_risk_districts: Vec<DistrictThreat>,
    pub all_districts: Vec<DistrictThreat>,
    pub highest_risk_river: Option<String>,
    pub river_summary: RiverSummary,
    pub analyzed_at: DateTime<Utc>,
}

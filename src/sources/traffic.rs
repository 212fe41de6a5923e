//! Road traffic fetchers: incidents and flow.
//!
//! The incident provider caps bounding boxes at 10,000 km², so the island is
//! split into eight sub-regions fetched separately and deduplicated by
//! incident id. Flow comes from two providers over a fixed set of monitored
//! corridors; segments are bucketed by the ratio of current to free-flow
//! speed. Both caches refresh on a five-minute cadence with one retry.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::geo::BoundingBox;
use crate::model::{CongestionLevel, FlowSegment, IncidentCategory, IncidentSeverity, TrafficIncident};
use crate::sources::{ManagedSource, get_json_with_retry, http_client};

const TOMTOM_INCIDENTS_BASE: &str = "https://api.tomtom.com/traffic/services/5/incidentDetails";
const TOMTOM_FLOW_BASE: &str = "https://api.tomtom.com/traffic/services/4/flowSegmentData/absolute/10/json";
const HERE_FLOW_BASE: &str = "https://data.traffic.hereapi.com/v7/flow";

const RETRY_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// A named sub-region tile, kept under the provider's 10,000 km² bbox limit.
#[derive(Debug, Clone)]
pub struct SubRegion {
    pub name: &'static str,
    pub bounds: BoundingBox,
}

/// Sri Lanka split into eight tiles of roughly 8,000 km² each.
pub fn sri_lanka_subregions() -> Vec<SubRegion> {
    let tile = |name, min_lat, min_lon, max_lat, max_lon| SubRegion {
        name,
        bounds: BoundingBox::new(min_lat, max_lat, min_lon, max_lon),
    };
    vec![
        tile("Colombo", 6.7, 79.7, 7.1, 80.2),
        tile("Galle-Matara", 5.9, 80.0, 6.4, 80.6),
        tile("Kandy", 7.1, 80.4, 7.5, 80.9),
        tile("Kurunegala", 7.5, 79.9, 8.2, 80.6),
        tile("Jaffna", 9.4, 79.8, 9.9, 80.4),
        tile("Trincomalee", 8.3, 80.9, 8.8, 81.4),
        tile("Batticaloa", 7.5, 81.4, 8.0, 81.9),
        tile("Negombo", 7.1, 79.7, 7.6, 80.2),
    ]
}

/// A monitored road corridor probed for flow data.
#[derive(Debug, Clone)]
struct Corridor {
    name: &'static str,
    lat: f64,
    lon: f64,
}

fn monitored_corridors() -> Vec<Corridor> {
    let point = |name, lat, lon| Corridor { name, lat, lon };
    vec![
        point("A1 Colombo-Kandy (Kadawatha)", 7.0012, 79.9533),
        point("A2 Galle Road (Moratuwa)", 6.7730, 79.8816),
        point("A3 Negombo Road (Ja-Ela)", 7.0744, 79.8919),
        point("A4 High Level Road (Maharagama)", 6.8480, 79.9265),
        point("E01 Southern Expressway (Kahathuduwa)", 6.7648, 80.0055),
        point("E03 Airport Expressway (Peliyagoda)", 6.9672, 79.8880),
        point("Baseline Road (Borella)", 6.9146, 79.8778),
        point("A9 Kandy-Jaffna (Vavuniya)", 8.7542, 80.4982),
    ]
}

/// Incident counts by headline category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IncidentSummary {
    pub total: usize,
    pub road_closed: usize,
    pub accidents: usize,
    pub roadworks: usize,
    pub flooding: usize,
    pub jams: usize,
    pub other: usize,
}

pub fn summarize_incidents(incidents: &[TrafficIncident]) -> IncidentSummary {
    let count = |cat: IncidentCategory| incidents.iter().filter(|i| i.category == cat).count();
    let road_closed = count(IncidentCategory::RoadClosed);
    let accidents = count(IncidentCategory::Accident);
    let roadworks = count(IncidentCategory::Roadworks);
    let flooding = count(IncidentCategory::Flooding);
    let jams = count(IncidentCategory::Jam);
    IncidentSummary {
        total: incidents.len(),
        road_closed,
        accidents,
        roadworks,
        flooding,
        jams,
        other: incidents.len() - road_closed - accidents - roadworks - flooding - jams,
    }
}

// ============================================================================
// Incident wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct IncidentsResponse {
    #[serde(default)]
    incidents: Vec<RawIncident>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIncident {
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<RawIncidentProps>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGeometry {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawIncidentProps {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "iconCategory")]
    icon_category: u32,
    #[serde(default, rename = "magnitudeOfDelay")]
    magnitude_of_delay: u32,
    #[serde(default)]
    events: Vec<RawIncidentEvent>,
    #[serde(default, rename = "startTime")]
    start_time: Option<String>,
    #[serde(default, rename = "endTime")]
    end_time: Option<String>,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    length: f64,
    #[serde(default)]
    delay: f64,
    #[serde(default, rename = "roadNumbers")]
    road_numbers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIncidentEvent {
    #[serde(default)]
    description: String,
}

/// Pull a representative point out of a Point or LineString geometry.
/// LineStrings use their midpoint.
fn geometry_point(geometry: &RawGeometry) -> Option<(f64, f64)> {
    let coords = geometry.coordinates.as_array()?;
    match geometry.kind.as_str() {
        "Point" => {
            let lon = coords.first()?.as_f64()?;
            let lat = coords.get(1)?.as_f64()?;
            Some((lat, lon))
        }
        "LineString" => {
            let mid = coords.get(coords.len() / 2)?.as_array()?;
            let lon = mid.first()?.as_f64()?;
            let lat = mid.get(1)?.as_f64()?;
            Some((lat, lon))
        }
        _ => None,
    }
}

fn normalise_incident(raw: RawIncident) -> Option<TrafficIncident> {
    let props = raw.properties?;
    if props.id.is_empty() {
        return None;
    }
    let (lat, lon) = raw.geometry.as_ref().and_then(geometry_point)?;

    let road_name = if props.road_numbers.is_empty() {
        "Unknown Road".to_string()
    } else {
        props.road_numbers.join(", ")
    };

    Some(TrafficIncident {
        id: props.id,
        icon_category: props.icon_category,
        category: IncidentCategory::from_code(props.icon_category),
        severity: IncidentSeverity::from_magnitude(props.magnitude_of_delay),
        lat,
        lon,
        description: props
            .events
            .first()
            .map(|e| e.description.clone())
            .unwrap_or_default(),
        from_location: props.from,
        to_location: props.to,
        road_name,
        delay_seconds: props.delay as i64,
        length_meters: props.length as i64,
        start_time: props.start_time,
        end_time: props.end_time,
    })
}

// ============================================================================
// Incidents fetcher
// ============================================================================

/// Fetcher for road incidents across all sub-region tiles.
pub struct TrafficIncidentsFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    subregions: Vec<SubRegion>,
    cache: SourceCache<Vec<TrafficIncident>>,
}

impl TrafficIncidentsFetcher {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: TOMTOM_INCIDENTS_BASE.to_string(),
            api_key: config.api_keys.tomtom.clone(),
            subregions: sri_lanka_subregions(),
            cache: SourceCache::new("traffic_incidents", config.ttls.traffic_incidents)
                .with_freeze(config.freeze_mode),
        }
    }

    /// Override the upstream URL (for testing).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn all(&self) -> Vec<TrafficIncident> {
        self.cache.get().map(|i| i.as_ref().clone()).unwrap_or_default()
    }

    pub fn by_category(&self, category: IncidentCategory) -> Vec<TrafficIncident> {
        self.all()
            .into_iter()
            .filter(|i| i.category == category)
            .collect()
    }

    pub fn summary(&self) -> IncidentSummary {
        summarize_incidents(&self.all())
    }

    async fn fetch_subregion(&self, key: &str, subregion: &SubRegion) -> Vec<RawIncident> {
        let bbox = format!(
            "{},{},{},{}",
            subregion.bounds.min_lon,
            subregion.bounds.min_lat,
            subregion.bounds.max_lon,
            subregion.bounds.max_lat
        );
        let fields = "{incidents{type,geometry{type,coordinates},properties{id,iconCategory,magnitudeOfDelay,events{description},startTime,endTime,from,to,length,delay,roadNumbers}}}";
        let url = format!(
            "{}?key={}&bbox={}&fields={}&language=en-GB&timeValidityFilter=present",
            self.base_url,
            key,
            bbox,
            urlencoding::encode(fields)
        );

        match get_json_with_retry::<IncidentsResponse>(
            &self.client,
            &url,
            "traffic_incidents",
            RETRY_ATTEMPTS,
            RETRY_BACKOFF,
        )
        .await
        {
            Ok(response) => response.incidents,
            Err(err) => {
                warn!(subregion = subregion.name, error = %err, "incident fetch failed");
                Vec::new()
            }
        }
    }

    async fn fetch_upstream(&self) -> Result<Vec<TrafficIncident>, CoreError> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| CoreError::SourceDisabled("traffic_incidents".to_string()))?;

        let mut seen_ids = HashSet::new();
        let mut incidents = Vec::new();
        let mut any_tile_succeeded = false;

        for subregion in &self.subregions {
            let raw_incidents = self.fetch_subregion(&key, subregion).await;
            if !raw_incidents.is_empty() {
                any_tile_succeeded = true;
            }
            for raw in raw_incidents {
                if let Some(incident) = normalise_incident(raw) {
                    // The same incident shows up in overlapping tiles
                    if seen_ids.insert(incident.id.clone()) {
                        incidents.push(incident);
                    }
                }
            }
        }

        // An island-wide quiet day is indistinguishable from eight failed
        // tiles; treat the empty result as success only if a tile replied.
        if incidents.is_empty() && !any_tile_succeeded {
            return Err(CoreError::provider(
                "traffic_incidents",
                "no sub-region returned incidents",
            ));
        }

        Ok(incidents)
    }
}

#[async_trait]
impl ManagedSource for TrafficIncidentsFetcher {
    fn name(&self) -> &'static str {
        "traffic_incidents"
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
            return Err(CoreError::SourceDisabled("traffic_incidents".to_string()));
        }
        self.cache
            .refresh_with(force, || self.fetch_upstream())
            .await
    }
}

// ============================================================================
// Flow wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomTomFlowResponse {
    #[serde(rename = "flowSegmentData")]
    flow_segment_data: Option<RawTomTomFlow>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTomTomFlow {
    #[serde(default, rename = "currentSpeed")]
    current_speed: f64,
    #[serde(default, rename = "freeFlowSpeed")]
    free_flow_speed: f64,
}

#[derive(Debug, Deserialize)]
struct HereFlowResponse {
    #[serde(default)]
    results: Vec<RawHereFlowResult>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHereFlowResult {
    #[serde(default)]
    location: RawHereLocation,
    #[serde(default, rename = "currentFlow")]
    current_flow: RawHereCurrentFlow,
}

#[derive(Debug, Default, Deserialize)]
struct RawHereLocation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawHereCurrentFlow {
    #[serde(default)]
    speed: f64,
    #[serde(default, rename = "freeFlow")]
    free_flow: f64,
}

fn flow_segment(
    segment_id: String,
    road_name: String,
    lat: f64,
    lon: f64,
    current_speed: f64,
    free_flow_speed: f64,
    provider: &str,
) -> FlowSegment {
    let ratio = if free_flow_speed > 0.0 {
        current_speed / free_flow_speed
    } else {
        1.0
    };
    FlowSegment {
        segment_id,
        road_name,
        lat,
        lon,
        current_speed_kmh: current_speed,
        free_flow_speed_kmh: free_flow_speed,
        congestion: CongestionLevel::from_ratio(ratio),
        provider: provider.to_string(),
    }
}

// ============================================================================
// Flow fetcher
// ============================================================================

/// Fetcher for corridor flow from both providers. Runs with whichever keys
/// are configured.
pub struct TrafficFlowFetcher {
    client: reqwest::Client,
    tomtom_base: String,
    here_base: String,
    tomtom_key: Option<String>,
    here_key: Option<String>,
    corridors: Vec<Corridor>,
    cache: SourceCache<Vec<FlowSegment>>,
}

impl TrafficFlowFetcher {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            tomtom_base: TOMTOM_FLOW_BASE.to_string(),
            here_base: HERE_FLOW_BASE.to_string(),
            tomtom_key: config.api_keys.tomtom.clone(),
            here_key: config.api_keys.here.clone(),
            corridors: monitored_corridors(),
            cache: SourceCache::new("traffic_flow", config.ttls.traffic_flow)
                .with_freeze(config.freeze_mode),
        }
    }

    /// Override the upstream URLs (for testing).
    pub fn with_base_urls(mut self, tomtom: &str, here: &str) -> Self {
        self.tomtom_base = tomtom.to_string();
        self.here_base = here.to_string();
        self
    }

    pub fn all(&self) -> Vec<FlowSegment> {
        self.cache.get().map(|f| f.as_ref().clone()).unwrap_or_default()
    }

    async fn fetch_tomtom(&self, key: &str) -> Vec<FlowSegment> {
        let mut segments = Vec::new();
        for corridor in &self.corridors {
            let url = format!(
                "{}?key={}&point={},{}",
                self.tomtom_base, key, corridor.lat, corridor.lon
            );
            match get_json_with_retry::<TomTomFlowResponse>(
                &self.client,
                &url,
                "traffic_flow",
                RETRY_ATTEMPTS,
                RETRY_BACKOFF,
            )
            .await
            {
                Ok(response) => {
                    if let Some(flow) = response.flow_segment_data {
                        segments.push(flow_segment(
                            format!("tomtom_{}", slug_name(corridor.name)),
                            corridor.name.to_string(),
                            corridor.lat,
                            corridor.lon,
                            flow.current_speed,
                            flow.free_flow_speed,
                            "tomtom",
                        ));
                    }
                }
                Err(err) => {
                    warn!(corridor = corridor.name, error = %err, "tomtom flow fetch failed");
                }
            }
        }
        segments
    }

    async fn fetch_here(&self, key: &str) -> Vec<FlowSegment> {
        let mut segments = Vec::new();
        for corridor in &self.corridors {
            let url = format!(
                "{}?apiKey={}&in=circle:{},{};r=500&locationReferencing=none",
                self.here_base, key, corridor.lat, corridor.lon
            );
            match get_json_with_retry::<HereFlowResponse>(
                &self.client,
                &url,
                "traffic_flow",
                RETRY_ATTEMPTS,
                RETRY_BACKOFF,
            )
            .await
            {
                Ok(response) => {
                    if let Some(result) = response.results.into_iter().next() {
                        let name = if result.location.description.is_empty() {
                            corridor.name.to_string()
                        } else {
                            result.location.description
                        };
                        segments.push(flow_segment(
                            format!("here_{}", slug_name(corridor.name)),
                            name,
                            corridor.lat,
                            corridor.lon,
                            result.current_flow.speed,
                            result.current_flow.free_flow,
                            "here",
                        ));
                    }
                }
                Err(err) => {
                    warn!(corridor = corridor.name, error = %err, "here flow fetch failed");
                }
            }
        }
        segments
    }

    async fn fetch_upstream(&self) -> Result<Vec<FlowSegment>, CoreError> {
        let mut segments = Vec::new();
        if let Some(key) = &self.tomtom_key {
            segments.extend(self.fetch_tomtom(key).await);
        }
        if let Some(key) = &self.here_key {
            segments.extend(self.fetch_here(key).await);
        }
        if segments.is_empty() {
            return Err(CoreError::provider("traffic_flow", "no segments obtained"));
        }
        Ok(segments)
    }
}

fn slug_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[async_trait]
impl ManagedSource for TrafficFlowFetcher {
    fn name(&self) -> &'static str {
        "traffic_flow"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl().num_seconds().max(0) as u64)
    }

    fn enabled(&self) -> bool {
        self.tomtom_key.is_some() || self.here_key.is_some()
    }

    fn cache_info(&self) -> CacheInfo {
        self.cache.cache_info()
    }

    async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
        if self.tomtom_key.is_none() && self.here_key.is_none() {
            return Err(CoreError::SourceDisabled("traffic_flow".to_string()));
        }
        self.cache
            .refresh_with(force, || self.fetch_upstream())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subregions_within_upstream_limit() {
        // Every tile must stay under the provider's 10,000 km² bbox cap.
        // One degree of latitude is ~111 km; at this latitude a degree of
        // longitude is ~110 km.
        for subregion in sri_lanka_subregions() {
            let height_km = (subregion.bounds.max_lat - subregion.bounds.min_lat) * 111.0;
            let width_km = (subregion.bounds.max_lon - subregion.bounds.min_lon) * 110.0;
            assert!(
                height_km * width_km <= 10_000.0,
                "{} tile is {} km²",
                subregion.name,
                height_km * width_km
            );
        }
    }

    #[test]
    fn test_geometry_point_variants() {
        let point = RawGeometry {
            kind: "Point".to_string(),
            coordinates: serde_json::json!([79.86, 6.93]),
        };
        assert_eq!(geometry_point(&point), Some((6.93, 79.86)));

        let line = RawGeometry {
            kind: "LineString".to_string(),
            coordinates: serde_json::json!([[79.80, 6.90], [79.85, 6.95], [79.90, 7.00]]),
        };
        assert_eq!(geometry_point(&line), Some((6.95, 79.85)));

        let unsupported = RawGeometry {
            kind: "Polygon".to_string(),
            coordinates: serde_json::json!([]),
        };
        assert_eq!(geometry_point(&unsupported), None);
    }

    #[test]
    fn test_normalise_incident() {
        let raw: RawIncident = serde_json::from_str(
            r#"{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [80.21, 6.05]},
                "properties": {
                    "id": "inc-123",
                    "iconCategory": 11,
                    "magnitudeOfDelay": 4,
                    "events": [{"description": "Road flooded near bridge"}],
                    "from": "Galle", "to": "Matara",
                    "length": 850.0, "delay": 1200.0,
                    "roadNumbers": ["A2"]
                }
            }"#,
        )
        .unwrap();

        let incident = normalise_incident(raw).unwrap();
        assert_eq!(incident.id, "inc-123");
        assert_eq!(incident.category, IncidentCategory::Flooding);
        assert_eq!(incident.severity, IncidentSeverity::Critical);
        assert_eq!(incident.road_name, "A2");
        assert_eq!(incident.delay_seconds, 1200);
        assert_eq!((incident.lat, incident.lon), (6.05, 80.21));
    }

    #[test]
    fn test_normalise_incident_rejects_missing_id() {
        let raw: RawIncident = serde_json::from_str(
            r#"{"geometry": {"type": "Point", "coordinates": [80.0, 6.5]}, "properties": {"id": ""}}"#,
        )
        .unwrap();
        assert!(normalise_incident(raw).is_none());
    }

    #[test]
    fn test_incident_summary_counts() {
        let incident = |id: &str, code: u32| TrafficIncident {
            id: id.to_string(),
            icon_category: code,
            category: IncidentCategory::from_code(code),
            severity: IncidentSeverity::Minor,
            lat: 6.9,
            lon: 79.9,
            description: String::new(),
            from_location: String::new(),
            to_location: String::new(),
            road_name: String::new(),
            delay_seconds: 0,
            length_meters: 0,
            start_time: None,
            end_time: None,
        };
        let incidents = vec![
            incident("a", 8),
            incident("b", 8),
            incident("c", 1),
            incident("d", 11),
            incident("e", 2),
        ];
        let summary = summarize_incidents(&incidents);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.road_closed, 2);
        assert_eq!(summary.accidents, 1);
        assert_eq!(summary.flooding, 1);
        assert_eq!(summary.other, 1);
    }

    #[test]
    fn test_flow_segment_congestion() {
        let segment = flow_segment(
            "tomtom_a1".to_string(),
            "A1".to_string(),
            7.0,
            79.95,
            18.0,
            60.0,
            "tomtom",
        );
        // 18/60 = 0.3 ratio lands in the severe bucket
        assert_eq!(segment.congestion, CongestionLevel::Severe);

        // Zero free-flow speed is treated as free rather than dividing by zero
        let degenerate = flow_segment(
            "x".to_string(),
            "X".to_string(),
            0.0,
            0.0,
            30.0,
            0.0,
            "here",
        );
        assert_eq!(degenerate.congestion, CongestionLevel::Free);
    }
}

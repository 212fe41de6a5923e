//! Emergency facility fetcher backed by the OpenStreetMap Overpass API.
//!
//! Hospitals, police posts, fire stations, and shelters inside the region
//! bounds, refreshed daily. `find_nearby` answers radius queries per facility
//! kind using Haversine distance; reads never touch Overpass.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheInfo, RefreshOutcome, SourceCache};
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::geo::{BoundingBox, haversine_km};
use crate::model::{Facility, FacilityKind};
use crate::sources::{ManagedSource, http_client};

const OVERPASS_BASE: &str = "https://overpass-api.de/api/interpreter";

/// A facility with its distance from a query point.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyFacility {
    #[serde(flatten)]
    pub facility: Facility,
    pub distance_km: f64,
}

/// Nearest facilities per kind for a query point.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyFacilities {
    pub hospitals: Vec<NearbyFacility>,
    pub police: Vec<NearbyFacility>,
    pub fire: Vec<NearbyFacility>,
    pub shelters: Vec<NearbyFacility>,
}

// Overpass wire types

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Default, Deserialize)]
struct OverpassElement {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn position(&self) -> Option<(f64, f64)> {
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            return Some((lat, lon));
        }
        self.center.as_ref().map(|c| (c.lat, c.lon))
    }

    fn kind(&self) -> Option<FacilityKind> {
        match self.tags.get("amenity").map(String::as_str) {
            Some("hospital") | Some("clinic") => return Some(FacilityKind::Hospital),
            Some("police") => return Some(FacilityKind::Police),
            Some("fire_station") => return Some(FacilityKind::Fire),
            _ => {}
        }
        if self.tags.get("emergency").map(String::as_str) == Some("assembly_point")
            || self.tags.contains_key("social_facility")
        {
            return Some(FacilityKind::Shelter);
        }
        None
    }
}

/// Fetcher for emergency facilities inside the region bounds.
pub struct FacilitiesFetcher {
    client: reqwest::Client,
    base_url: String,
    bounds: BoundingBox,
    cache: SourceCache<Vec<Facility>>,
}

impl FacilitiesFetcher {
    pub fn new(config: &CoreConfig, bounds: BoundingBox) -> Self {
        Self {
            client: http_client(config.timeouts.default),
            base_url: OVERPASS_BASE.to_string(),
            bounds,
            cache: SourceCache::new("facilities", config.ttls.facilities)
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

    pub fn all(&self) -> Vec<Facility> {
        self.cache.get().map(|f| f.as_ref().clone()).unwrap_or_default()
    }

    /// Nearest facilities of each kind within `radius_km`, closest first,
    /// at most `limit_per_kind` entries per kind.
    pub fn find_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit_per_kind: usize,
    ) -> NearbyFacilities {
        let facilities = self.all();
        let mut nearby = |kind: FacilityKind| -> Vec<NearbyFacility> {
            let mut matches: Vec<NearbyFacility> = facilities
                .iter()
                .filter(|f| f.kind == kind)
                .map(|f| NearbyFacility {
                    facility: f.clone(),
                    distance_km: haversine_km(lat, lon, f.lat, f.lon),
                })
                .filter(|n| n.distance_km <= radius_km)
                .collect();
            matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
            matches.truncate(limit_per_kind);
            matches
        };

        NearbyFacilities {
            hospitals: nearby(FacilityKind::Hospital),
            police: nearby(FacilityKind::Police),
            fire: nearby(FacilityKind::Fire),
            shelters: nearby(FacilityKind::Shelter),
        }
    }

    /// The single closest hospital to a point, regardless of radius.
    pub fn nearest_hospital(&self, lat: f64, lon: f64) -> Option<NearbyFacility> {
        self.all()
            .into_iter()
            .filter(|f| f.kind == FacilityKind::Hospital)
            .map(|f| NearbyFacility {
                distance_km: haversine_km(lat, lon, f.lat, f.lon),
                facility: f,
            })
            .min_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
    }

    /// Counts per facility kind.
    pub fn counts(&self) -> HashMap<String, usize> {
        let facilities = self.all();
        FacilityKind::ALL
            .iter()
            .map(|kind| {
                (
                    kind.label().to_string(),
                    facilities.iter().filter(|f| f.kind == *kind).count(),
                )
            })
            .collect()
    }

    async fn fetch_upstream(&self) -> Result<Vec<Facility>, CoreError> {
        let bbox = format!(
            "{},{},{},{}",
            self.bounds.min_lat, self.bounds.min_lon, self.bounds.max_lat, self.bounds.max_lon
        );
        let query = format!(
            r#"[out:json][timeout:60];
(
  node["amenity"~"hospital|clinic|police|fire_station"]({bbox});
  way["amenity"~"hospital|clinic|police|fire_station"]({bbox});
  node["emergency"="assembly_point"]({bbox});
);
out center;"#
        );

        let response = self
            .client
            .post(&self.base_url)
            .body(format!("data={}", urlencoding::encode(&query)))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(|e| CoreError::provider("facilities", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::provider("facilities", format!("HTTP {status}")));
        }

        let parsed: OverpassResponse = response
            .json()
            .await
            .map_err(|e| CoreError::provider("facilities", format!("decode: {e}")))?;

        let facilities = parsed
            .elements
            .into_iter()
            .filter_map(|element| {
                let kind = element.kind()?;
                let (lat, lon) = element.position()?;
                let name = element
                    .tags
                    .get("name")
                    .cloned()
                    .unwrap_or_else(|| format!("Unnamed {}", kind.label()));
                Some(Facility {
                    kind,
                    name,
                    lat,
                    lon,
                    tags: element.tags,
                })
            })
            .collect();

        Ok(facilities)
    }
}

#[async_trait]
impl ManagedSource for FacilitiesFetcher {
    fn name(&self) -> &'static str {
        "facilities"
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
            tracing::warn!(error = %err, "facilities snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    fn fetcher_with(facilities: Vec<Facility>) -> FacilitiesFetcher {
        let mut config = CoreConfig::default();
        config.snapshot_dir = None;
        let fetcher = FacilitiesFetcher::new(
            &config,
            BoundingBox::new(5.9, 9.9, 79.5, 81.9),
        );
        fetcher.cache.store(facilities);
        fetcher
    }

    fn facility(kind: FacilityKind, name: &str, lat: f64, lon: f64) -> Facility {
        Facility {
            kind,
            name: name.to_string(),
            lat,
            lon,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn test_find_nearby_orders_by_distance() {
        let fetcher = fetcher_with(vec![
            facility(FacilityKind::Hospital, "National Hospital", 6.919, 79.866),
            facility(FacilityKind::Hospital, "Kalubowila TH", 6.873, 79.878),
            facility(FacilityKind::Hospital, "Kandy GH", 7.293, 80.637),
            facility(FacilityKind::Police, "Fort Police", 6.934, 79.843),
        ]);

        let nearby = fetcher.find_nearby(6.93, 79.85, 25.0, 5);
        assert_eq!(nearby.hospitals.len(), 2);
        // Closest hospital first; Kandy is beyond 25km
        assert_eq!(nearby.hospitals[0].facility.name, "National Hospital");
        assert_eq!(nearby.police.len(), 1);
        assert!(nearby.fire.is_empty());
    }

    #[test]
    fn test_find_nearby_respects_limit() {
        let fetcher = fetcher_with(vec![
            facility(FacilityKind::Hospital, "H1", 6.92, 79.86),
            facility(FacilityKind::Hospital, "H2", 6.93, 79.87),
            facility(FacilityKind::Hospital, "H3", 6.94, 79.88),
        ]);
        let nearby = fetcher.find_nearby(6.93, 79.87, 50.0, 2);
        assert_eq!(nearby.hospitals.len(), 2);
    }

    #[test]
    fn test_nearest_hospital_ignores_radius() {
        let fetcher = fetcher_with(vec![facility(
            FacilityKind::Hospital,
            "Kandy GH",
            7.293,
            80.637,
        )]);
        let nearest = fetcher.nearest_hospital(6.93, 79.85).unwrap();
        assert_eq!(nearest.facility.name, "Kandy GH");
        assert!(nearest.distance_km > 50.0);
    }

    #[test]
    fn test_overpass_element_classification() {
        let mut tags = HashMap::new();
        tags.insert("amenity".to_string(), "hospital".to_string());
        let element = OverpassElement {
            lat: Some(6.9),
            lon: Some(79.9),
            center: None,
            tags,
        };
        assert_eq!(element.kind(), Some(FacilityKind::Hospital));

        let mut tags = HashMap::new();
        tags.insert("emergency".to_string(), "assembly_point".to_string());
        let element = OverpassElement {
            lat: None,
            lon: None,
            center: Some(OverpassCenter { lat: 6.8, lon: 80.0 }),
            tags,
        };
        assert_eq!(element.kind(), Some(FacilityKind::Shelter));
        // Way elements carry their position in "center"
        assert_eq!(element.position(), Some((6.8, 80.0)));

        let element = OverpassElement {
            lat: Some(6.9),
            lon: Some(79.9),
            center: None,
            tags: HashMap::new(),
        };
        assert_eq!(element.kind(), None);
    }
}

//! Region registry: immutable region definitions loaded at startup.
//!
//! A region carries geographic bounds, rainfall alert thresholds, the
//! provider ids serving it, and localisation metadata. The registry supports
//! atomic hot reload: readers see either the old map or the new one in full,
//! and a reload that fails to parse keeps the prior configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::error::CoreError;
use crate::geo::BoundingBox;
use crate::model::AlertLevel;

/// One rainfall threshold band: matches when `min_rain <= r <= max_rain`.
/// A missing `max_rain` means the band is unbounded above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdBand {
    #[serde(rename = "minRain")]
    pub min_rain: f64,
    #[serde(rename = "maxRain")]
    pub max_rain: Option<f64>,
}

impl ThresholdBand {
    fn matches(&self, rainfall_mm: f64) -> bool {
        rainfall_mm >= self.min_rain && rainfall_mm <= self.max_rain.unwrap_or(f64::INFINITY)
    }
}

/// Alert threshold bands for one region. Invariant: the four bands cover
/// `[0, inf)` without gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub green: ThresholdBand,
    pub yellow: ThresholdBand,
    pub orange: ThresholdBand,
    pub red: ThresholdBand,
}

/// Center point of a region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// Provider ids per capability for a region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataProviders {
    #[serde(default)]
    pub weather: Vec<String>,
    #[serde(default)]
    pub rivers: Vec<String>,
    #[serde(default, rename = "emergencyServices")]
    pub emergency_services: Vec<String>,
}

/// A named administrative area with bounds, thresholds, and a provider set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub active: bool,
    #[serde(
        deserialize_with = "deserialize_bounds",
        serialize_with = "serialize_bounds"
    )]
    pub bounds: BoundingBox,
    pub center: Center,
    #[serde(rename = "timeZone")]
    pub time_zone: String,
    pub currency: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(rename = "alertThresholds")]
    pub alert_thresholds: AlertThresholds,
    #[serde(rename = "dataProviders", default)]
    pub data_providers: DataProviders,
    #[serde(rename = "smsGateway", default)]
    pub sms_gateway: String,
}

impl Region {
    /// Classify rainfall against the threshold bands, scanning in severity
    /// order red, orange, yellow, green. The first matching band wins;
    /// `green` is the fallback when nothing matches.
    pub fn alert_level(&self, rainfall_mm: f64) -> AlertLevel {
        let bands = [
            (AlertLevel::Red, &self.alert_thresholds.red),
            (AlertLevel::Orange, &self.alert_thresholds.orange),
            (AlertLevel::Yellow, &self.alert_thresholds.yellow),
            (AlertLevel::Green, &self.alert_thresholds.green),
        ];
        for (level, band) in bands {
            if band.matches(rainfall_mm) {
                return level;
            }
        }
        AlertLevel::Green
    }
}

/// A district entry from a per-region district document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictInfo {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

// Region documents use camelCase bound keys (minLat, maxLat, ...).
#[derive(Serialize, Deserialize)]
struct BoundsDoc {
    #[serde(rename = "minLat")]
    min_lat: f64,
    #[serde(rename = "maxLat")]
    max_lat: f64,
    #[serde(rename = "minLon")]
    min_lon: f64,
    #[serde(rename = "maxLon")]
    max_lon: f64,
}

fn deserialize_bounds<'de, D>(deserializer: D) -> Result<BoundingBox, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let doc = BoundsDoc::deserialize(deserializer)?;
    Ok(BoundingBox::new(
        doc.min_lat,
        doc.max_lat,
        doc.min_lon,
        doc.max_lon,
    ))
}

fn serialize_bounds<S>(bounds: &BoundingBox, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    BoundsDoc {
        min_lat: bounds.min_lat,
        max_lat: bounds.max_lat,
        min_lon: bounds.min_lon,
        max_lon: bounds.max_lon,
    }
    .serialize(serializer)
}

#[derive(Deserialize)]
struct RegionsDoc {
    regions: Vec<Region>,
}

#[derive(Deserialize)]
struct DistrictsDoc {
    districts: Vec<DistrictInfo>,
}

/// Registry of all configured regions and their district lists.
pub struct RegionRegistry {
    regions_path: PathBuf,
    districts_dir: PathBuf,
    regions: RwLock<Arc<HashMap<String, Region>>>,
    districts: RwLock<Arc<HashMap<String, Vec<DistrictInfo>>>>,
}

impl RegionRegistry {
    /// Load the registry from the region document and district directory.
    /// A malformed document at startup is fatal.
    pub fn load(regions_path: &Path, districts_dir: &Path) -> Result<Self, CoreError> {
        let regions = Self::parse_regions(regions_path)?;
        let districts = Self::parse_districts(districts_dir, &regions);
        info!(
            regions = regions.len(),
            path = %regions_path.display(),
            "region registry loaded"
        );
        Ok(Self {
            regions_path: regions_path.to_path_buf(),
            districts_dir: districts_dir.to_path_buf(),
            regions: RwLock::new(Arc::new(regions)),
            districts: RwLock::new(Arc::new(districts)),
        })
    }

    /// Build a registry directly from JSON strings (used by tests).
    pub fn from_documents(
        regions_json: &str,
        districts_json: &[(&str, &str)],
    ) -> Result<Self, CoreError> {
        let doc: RegionsDoc = serde_json::from_str(regions_json)
            .map_err(|e| CoreError::Config(format!("invalid region document: {e}")))?;
        let regions: HashMap<String, Region> =
            doc.regions.into_iter().map(|r| (r.id.clone(), r)).collect();

        let mut districts = HashMap::new();
        for (region_id, json) in districts_json {
            let doc: DistrictsDoc = serde_json::from_str(json)
                .map_err(|e| CoreError::Config(format!("invalid district document: {e}")))?;
            districts.insert(region_id.to_string(), doc.districts);
        }

        Ok(Self {
            regions_path: PathBuf::new(),
            districts_dir: PathBuf::new(),
            regions: RwLock::new(Arc::new(regions)),
            districts: RwLock::new(Arc::new(districts)),
        })
    }

    fn parse_regions(path: &Path) -> Result<HashMap<String, Region>, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read region document {}: {e}", path.display()))
        })?;
        let doc: RegionsDoc = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("invalid region document: {e}")))?;

        for region in &doc.regions {
            if !region.bounds.is_well_formed() {
                return Err(CoreError::Config(format!(
                    "region {} has malformed bounds",
                    region.id
                )));
            }
        }

        Ok(doc.regions.into_iter().map(|r| (r.id.clone(), r)).collect())
    }

    fn parse_districts(
        dir: &Path,
        regions: &HashMap<String, Region>,
    ) -> HashMap<String, Vec<DistrictInfo>> {
        let mut out = HashMap::new();
        for region_id in regions.keys() {
            let path = dir.join(format!("{region_id}.json"));
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<DistrictsDoc>(&raw) {
                    Ok(doc) => {
                        out.insert(region_id.clone(), doc.districts);
                    }
                    Err(err) => {
                        warn!(region = %region_id, error = %err, "invalid district document");
                    }
                },
                Err(_) => {
                    warn!(region = %region_id, path = %path.display(), "no district document");
                }
            }
        }
        out
    }

    /// Look up a region by id.
    pub fn get(&self, region_id: &str) -> Result<Region, CoreError> {
        self.regions
            .read()
            .expect("registry lock poisoned")
            .get(region_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownRegion(region_id.to_string()))
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.regions
            .read()
            .expect("registry lock poisoned")
            .contains_key(region_id)
    }

    /// All regions, sorted by id for stable output.
    pub fn all(&self) -> Vec<Region> {
        let map = self.regions.read().expect("registry lock poisoned");
        let mut regions: Vec<Region> = map.values().cloned().collect();
        regions.sort_by(|a, b| a.id.cmp(&b.id));
        regions
    }

    /// Only regions flagged active.
    pub fn active(&self) -> Vec<Region> {
        self.all().into_iter().filter(|r| r.active).collect()
    }

    /// Rainfall alert level for a region.
    pub fn alert_level(&self, region_id: &str, rainfall_mm: f64) -> Result<AlertLevel, CoreError> {
        Ok(self.get(region_id)?.alert_level(rainfall_mm))
    }

    /// Districts of a region. Unknown region is an error; a known region
    /// without a district document yields an empty list.
    pub fn districts(&self, region_id: &str) -> Result<Vec<DistrictInfo>, CoreError> {
        if !self.contains(region_id) {
            return Err(CoreError::UnknownRegion(region_id.to_string()));
        }
        Ok(self
            .districts
            .read()
            .expect("registry lock poisoned")
            .get(region_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Re-read the documents, replacing the maps atomically. On a parse
    /// failure the prior configuration is retained and the error returned.
    pub fn reload(&self) -> Result<(), CoreError> {
        let regions = Self::parse_regions(&self.regions_path)?;
        let districts = Self::parse_districts(&self.districts_dir, &regions);

        *self.regions.write().expect("registry lock poisoned") = Arc::new(regions);
        *self.districts.write().expect("registry lock poisoned") = Arc::new(districts);
        info!("region registry reloaded");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::{DISTRICTS_JSON, REGIONS_JSON};
    use super::*;

    fn registry() -> RegionRegistry {
        RegionRegistry::from_documents(REGIONS_JSON, &[("srilanka", DISTRICTS_JSON)]).unwrap()
    }

    #[test]
    fn test_get_region() {
        let registry = registry();
        let region = registry.get("srilanka").unwrap();
        assert_eq!(region.name, "Sri Lanka");
        assert!(region.active);
        assert_eq!(region.time_zone, "Asia/Colombo");
        assert_eq!(region.data_providers.rivers.len(), 2);
    }

    #[test]
    fn test_unknown_region() {
        let registry = registry();
        assert!(matches!(
            registry.get("atlantis"),
            Err(CoreError::UnknownRegion(_))
        ));
    }

    #[test]
    fn test_active_regions() {
        let registry = registry();
        assert_eq!(registry.all().len(), 2);
        let active = registry.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "srilanka");
    }

    #[test]
    fn test_alert_level_classification_table() {
        // Bands: green (0,25), yellow (25,50), orange (50,100), red (100,inf)
        let registry = registry();
        let cases = [
            (0.0, AlertLevel::Green),
            (24.9, AlertLevel::Green),
            (25.0, AlertLevel::Yellow),
            (49.9, AlertLevel::Yellow),
            (50.0, AlertLevel::Orange),
            (99.9, AlertLevel::Orange),
            (100.0, AlertLevel::Red),
            (500.0, AlertLevel::Red),
        ];
        for (rainfall, expected) in cases {
            assert_eq!(
                registry.alert_level("srilanka", rainfall).unwrap(),
                expected,
                "rainfall {rainfall}"
            );
        }
    }

    #[test]
    fn test_alert_level_monotone() {
        let registry = registry();
        let region = registry.get("srilanka").unwrap();
        let mut prev = region.alert_level(0.0);
        for step in 0..600 {
            let level = region.alert_level(step as f64);
            assert!(level >= prev, "level dropped at {step}mm");
            prev = level;
        }
    }

    #[test]
    fn test_region_specific_thresholds() {
        let registry = registry();
        // 30mm is yellow in Sri Lanka but still green in South India
        assert_eq!(
            registry.alert_level("srilanka", 30.0).unwrap(),
            AlertLevel::Yellow
        );
        assert_eq!(
            registry.alert_level("south_india", 30.0).unwrap(),
            AlertLevel::Green
        );
    }

    #[test]
    fn test_districts_lookup() {
        let registry = registry();
        let districts = registry.districts("srilanka").unwrap();
        assert_eq!(districts.len(), 3);
        assert_eq!(districts[0].name, "Colombo");

        // Known region without a district document yields an empty list
        assert!(registry.districts("south_india").unwrap().is_empty());
        assert!(registry.districts("atlantis").is_err());
    }

    #[test]
    fn test_reload_idempotent_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let regions_path = dir.path().join("regions.json");
        let districts_dir = dir.path().join("districts");
        std::fs::create_dir_all(&districts_dir).unwrap();
        std::fs::write(&regions_path, REGIONS_JSON).unwrap();
        std::fs::write(districts_dir.join("srilanka.json"), DISTRICTS_JSON).unwrap();

        let registry = RegionRegistry::load(&regions_path, &districts_dir).unwrap();
        let before = registry.all();

        registry.reload().unwrap();
        let after = registry.all();

        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].id, after[0].id);
    }

    #[test]
    fn test_reload_failure_keeps_prior_config() {
        let dir = tempfile::tempdir().unwrap();
        let regions_path = dir.path().join("regions.json");
        let districts_dir = dir.path().join("districts");
        std::fs::create_dir_all(&districts_dir).unwrap();
        std::fs::write(&regions_path, REGIONS_JSON).unwrap();

        let registry = RegionRegistry::load(&regions_path, &districts_dir).unwrap();

        // Corrupt the document, then attempt a reload
        std::fs::write(&regions_path, "{broken").unwrap();
        assert!(registry.reload().is_err());

        // Prior map still served
        assert!(registry.get("srilanka").is_ok());
    }

    #[test]
    fn test_malformed_bounds_rejected() {
        let bad = r#"{
            "regions": [{
                "id": "bad", "name": "Bad", "active": true,
                "bounds": {"minLat": 9.9, "maxLat": 5.9, "minLon": 79.5, "maxLon": 81.9},
                "center": {"lat": 7.8, "lon": 80.7},
                "timeZone": "UTC", "currency": "USD", "languages": [],
                "alertThresholds": {
                    "green": {"minRain": 0, "maxRain": 25},
                    "yellow": {"minRain": 25, "maxRain": 50},
                    "orange": {"minRain": 50, "maxRain": 100},
                    "red": {"minRain": 100}
                }
            }]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.json");
        std::fs::write(&path, bad).unwrap();
        assert!(RegionRegistry::load(&path, dir.path()).is_err());
    }
}

//! Provider factory: routes river-data requests to the providers covering a
//! region or a geographic bounding box.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::info;

use crate::geo::BoundingBox;
use crate::providers::{ProviderHealth, RiverProvider};
use crate::region::RegionRegistry;

/// Health probe timeout. A provider that cannot answer in this window is
/// reported disconnected.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Static registry of providers plus the region routing table.
pub struct ProviderFactory {
    providers: HashMap<String, Arc<dyn RiverProvider>>,
    /// region id -> provider ids configured for it
    region_providers: HashMap<String, Vec<String>>,
    /// region id -> bounds, for bbox dispatch
    region_bounds: HashMap<String, BoundingBox>,
}

impl ProviderFactory {
    /// Build the factory from the region registry and the constructed
    /// provider set. Providers named by a region but missing from the set
    /// are dropped from the routing table.
    pub fn new(registry: &RegionRegistry, providers: Vec<Arc<dyn RiverProvider>>) -> Self {
        let providers: HashMap<String, Arc<dyn RiverProvider>> = providers
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();

        let mut region_providers = HashMap::new();
        let mut region_bounds = HashMap::new();
        for region in registry.all() {
            let configured: Vec<String> = region
                .data_providers
                .rivers
                .iter()
                .filter(|id| providers.contains_key(*id))
                .cloned()
                .collect();
            region_providers.insert(region.id.clone(), configured);
            region_bounds.insert(region.id.clone(), region.bounds);
        }

        info!(
            providers = providers.len(),
            regions = region_providers.len(),
            "river provider factory initialised"
        );

        Self {
            providers,
            region_providers,
            region_bounds,
        }
    }

    /// Look up one provider by id.
    pub fn provider(&self, provider_id: &str) -> Option<Arc<dyn RiverProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Providers configured for a region, in the region's configured order.
    pub fn providers_for_region(&self, region_id: &str) -> Vec<Arc<dyn RiverProvider>> {
        self.region_providers
            .get(region_id)
            .map(|ids| ids.iter().filter_map(|id| self.provider(id)).collect())
            .unwrap_or_default()
    }

    /// Union of providers whose region overlaps the bounding box.
    pub fn providers_for_bounds(&self, bounds: &BoundingBox) -> Vec<Arc<dyn RiverProvider>> {
        let mut region_ids: Vec<&String> = self
            .region_bounds
            .iter()
            .filter(|(_, region_bbox)| bounds.intersects(region_bbox))
            .map(|(region_id, _)| region_id)
            .collect();
        region_ids.sort();

        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for region_id in region_ids {
            for provider in self.providers_for_region(region_id) {
                if seen.insert(provider.id().to_string()) {
                    result.push(provider);
                }
            }
        }
        result
    }

    /// Provider ids and display names.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .providers
            .values()
            .map(|p| (p.id().to_string(), p.name().to_string()))
            .collect();
        entries.sort();
        entries
    }

    /// Probe every provider concurrently. Probes are bounded by
    /// [`HEALTH_PROBE_TIMEOUT`]; a timed-out or failed probe reports
    /// `connected = false` rather than an error.
    pub async fn health_all(&self) -> Vec<ProviderHealth> {
        let mut tasks: JoinSet<ProviderHealth> = JoinSet::new();
        for provider in self.providers.values() {
            let provider = Arc::clone(provider);
            tasks.spawn(async move {
                let probe = tokio::time::timeout(HEALTH_PROBE_TIMEOUT, provider.health_check()).await;
                let (connected, error) = match probe {
                    Ok(connected) => (connected, None),
                    Err(_) => (false, Some("health probe timed out".to_string())),
                };
                ProviderHealth {
                    id: provider.id().to_string(),
                    name: provider.name().to_string(),
                    region_id: provider.region_id().to_string(),
                    connected,
                    error,
                }
            });
        }

        let mut health = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(entry) = joined {
                health.push(entry);
            }
        }
        health.sort_by(|a, b| a.id.cmp(&b.id));
        health
    }

    /// Health of one region's provider set plus an overall active flag.
    pub async fn region_status(&self, region_id: &str) -> (Vec<ProviderHealth>, bool) {
        let providers = self.providers_for_region(region_id);
        let mut health = Vec::new();
        for provider in providers {
            let probe = tokio::time::timeout(HEALTH_PROBE_TIMEOUT, provider.health_check()).await;
            let (connected, error) = match probe {
                Ok(connected) => (connected, None),
                Err(_) => (false, Some("health probe timed out".to_string())),
            };
            health.push(ProviderHealth {
                id: provider.id().to_string(),
                name: provider.name().to_string(),
                region_id: provider.region_id().to_string(),
                connected,
                error,
            });
        }
        let active = health.iter().any(|h| h.connected);
        (health, active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::model::{RiverStation, WaterReading};
    use crate::providers::placeholder::PlaceholderProvider;
    use crate::region::test_fixtures::REGIONS_JSON;
    use async_trait::async_trait;

    /// Static in-memory provider for factory tests.
    struct StaticProvider {
        id: &'static str,
        region_id: &'static str,
        stations: Vec<RiverStation>,
    }

    #[async_trait]
    impl RiverProvider for StaticProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            "Static"
        }

        fn region_id(&self) -> &str {
            self.region_id
        }

        async fn fetch_stations(
            &self,
            bounds: Option<BoundingBox>,
        ) -> Result<Vec<RiverStation>, CoreError> {
            Ok(match bounds {
                Some(bbox) => self
                    .stations
                    .iter()
                    .filter(|s| bbox.contains(s.latitude, s.longitude))
                    .cloned()
                    .collect(),
                None => self.stations.clone(),
            })
        }

        async fn fetch_station_reading(
            &self,
            station_id: &str,
        ) -> Result<Option<WaterReading>, CoreError> {
            Ok(self
                .stations
                .iter()
                .find(|s| s.station_id == station_id)
                .map(|s| WaterReading {
                    station_id: s.station_id.clone(),
                    water_level_m: s.water_level_m,
                    rainfall_mm: s.rainfall_24h_mm,
                    status: s.status,
                    timestamp: s.last_updated,
                }))
        }

        async fn health_check(&self) -> bool {
            !self.stations.is_empty()
        }
    }

    fn factory() -> ProviderFactory {
        let registry = RegionRegistry::from_documents(REGIONS_JSON, &[]).unwrap();
        let station = crate::sources::rivers::test_fixtures::station(
            "Nagalagam",
            "Kelani",
            5.5,
            5.0,
            6.5,
            7.5,
            &["Colombo"],
        );
        let mut providers: Vec<Arc<dyn RiverProvider>> = vec![
            Arc::new(StaticProvider {
                id: "srilanka_navy",
                region_id: "srilanka",
                stations: vec![station.clone()],
            }),
            Arc::new(StaticProvider {
                id: "srilanka_irrigation",
                region_id: "srilanka",
                stations: vec![station],
            }),
        ];
        for placeholder in PlaceholderProvider::south_india_set() {
            providers.push(Arc::new(placeholder));
        }
        ProviderFactory::new(&registry, providers)
    }

    #[test]
    fn test_providers_for_region() {
        let factory = factory();
        let srilanka = factory.providers_for_region("srilanka");
        assert_eq!(srilanka.len(), 2);

        let south_india = factory.providers_for_region("south_india");
        assert_eq!(south_india.len(), 5);

        assert!(factory.providers_for_region("atlantis").is_empty());
    }

    #[test]
    fn test_providers_for_bounds_overlap() {
        let factory = factory();

        // Box inside Sri Lanka only
        let colombo = BoundingBox::new(6.7, 7.1, 79.7, 80.2);
        let providers = factory.providers_for_bounds(&colombo);
        assert_eq!(providers.len(), 2);

        // Box spanning the Palk Strait overlaps both regions
        let straddling = BoundingBox::new(8.5, 10.5, 78.5, 80.5);
        let providers = factory.providers_for_bounds(&straddling);
        assert_eq!(providers.len(), 7);

        // Box far away matches nothing
        let atlantic = BoundingBox::new(30.0, 40.0, -40.0, -30.0);
        assert!(factory.providers_for_bounds(&atlantic).is_empty());
    }

    #[test]
    fn test_providers_for_bounds_edge_touch() {
        let factory = factory();
        // Box touching the region's northern edge exactly still matches
        let touching = BoundingBox::new(9.9, 11.0, 79.5, 80.0);
        assert_eq!(factory.providers_for_bounds(&touching).len(), 2);
    }

    #[tokio::test]
    async fn test_health_all_mixed() {
        let factory = factory();
        let health = factory.health_all().await;
        assert_eq!(health.len(), 7);

        let connected: Vec<&ProviderHealth> = health.iter().filter(|h| h.connected).collect();
        assert_eq!(connected.len(), 2);

        // Placeholders report unhealthy, not errors
        let cwc = health.iter().find(|h| h.id == "india_cwc").unwrap();
        assert!(!cwc.connected);
        assert!(cwc.error.is_none());
    }

    #[tokio::test]
    async fn test_region_status() {
        let factory = factory();
        let (health, active) = factory.region_status("srilanka").await;
        assert_eq!(health.len(), 2);
        assert!(active);

        let (health, active) = factory.region_status("south_india").await;
        assert_eq!(health.len(), 5);
        assert!(!active);
    }
}

//! Configured-but-unimplemented regional providers.
//!
//! Regions list these sources in their provider set before an integration
//! exists. They are first-class registry entries that return empty station
//! lists and report unhealthy, so the status endpoints show the gap instead
//! of hiding it.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::geo::BoundingBox;
use crate::model::{RiverStation, WaterReading};
use crate::providers::RiverProvider;

pub struct PlaceholderProvider {
    id: String,
    name: String,
    region_id: String,
}

impl PlaceholderProvider {
    pub fn new(id: &str, name: &str, region_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            region_id: region_id.to_string(),
        }
    }

    /// The South India provider set awaiting integration.
    pub fn south_india_set() -> Vec<PlaceholderProvider> {
        vec![
            PlaceholderProvider::new("india_cwc", "Central Water Commission", "south_india"),
            PlaceholderProvider::new("tamil_nadu", "Tamil Nadu PWD", "south_india"),
            PlaceholderProvider::new("karnataka", "Karnataka CNNL", "south_india"),
            PlaceholderProvider::new("andhra_pradesh", "Andhra Pradesh Irrigation", "south_india"),
            PlaceholderProvider::new("telangana", "Telangana Irrigation", "south_india"),
        ]
    }
}

#[async_trait]
impl RiverProvider for PlaceholderProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn region_id(&self) -> &str {
        &self.region_id
    }

    async fn fetch_stations(
        &self,
        _bounds: Option<BoundingBox>,
    ) -> Result<Vec<RiverStation>, CoreError> {
        Ok(Vec::new())
    }

    async fn fetch_station_reading(
        &self,
        _station_id: &str,
    ) -> Result<Option<WaterReading>, CoreError> {
        Ok(None)
    }

    async fn health_check(&self) -> bool {
        false
    }
}

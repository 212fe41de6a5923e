//! Irrigation Department river provider.
//!
//! Same shape as the navy provider but backed by the irrigation fetcher,
//! whose gauges carry full threshold sets and district tags.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::geo::BoundingBox;
use crate::model::{RiverStation, WaterReading};
use crate::providers::RiverProvider;
use crate::sources::ManagedSource;
use crate::sources::rivers::{IrrigationFetcher, reading_for};

pub struct IrrigationRiverProvider {
    region_id: String,
    fetcher: Arc<IrrigationFetcher>,
}

impl IrrigationRiverProvider {
    pub fn new(region_id: &str, fetcher: Arc<IrrigationFetcher>) -> Self {
        Self {
            region_id: region_id.to_string(),
            fetcher,
        }
    }

    async fn stations_cached(&self) -> Result<Vec<RiverStation>, CoreError> {
        if !self.fetcher.is_fresh() {
            let _ = self.fetcher.refresh(false).await;
        }
        Ok(self.fetcher.stations())
    }
}

#[async_trait]
impl RiverProvider for IrrigationRiverProvider {
    fn id(&self) -> &str {
        "srilanka_irrigation"
    }

    fn name(&self) -> &str {
        "Irrigation Department Hydrology"
    }

    fn region_id(&self) -> &str {
        &self.region_id
    }

    async fn fetch_stations(
        &self,
        bounds: Option<BoundingBox>,
    ) -> Result<Vec<RiverStation>, CoreError> {
        let stations = self.stations_cached().await?;
        Ok(match bounds {
            Some(bbox) => stations
                .into_iter()
                .filter(|s| bbox.contains(s.latitude, s.longitude))
                .collect(),
            None => stations,
        })
    }

    async fn fetch_station_reading(
        &self,
        station_id: &str,
    ) -> Result<Option<WaterReading>, CoreError> {
        let stations = self.stations_cached().await?;
        Ok(reading_for(&stations, station_id))
    }

    async fn health_check(&self) -> bool {
        match self.fetch_stations(None).await {
            Ok(stations) => !stations.is_empty(),
            Err(_) => false,
        }
    }
}

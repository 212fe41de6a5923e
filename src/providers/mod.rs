//! River data provider abstraction.
//!
//! A [`RiverProvider`] is one regional river-data source behind a uniform
//! capability set: list stations, current reading, history, health check.
//! Sources that lack a capability report "not supported" (an empty result)
//! instead of failing, so regions can plug in partial providers.
//!
//! - [`factory`]: maps region ids and bounding boxes to provider sets
//! - [`navy`] / [`irrigation`]: live Sri Lanka providers backed by the
//!   river fetcher caches
//! - [`placeholder`]: configured-but-unimplemented regional providers,
//!   reported unhealthy until they gain a real backend

pub mod factory;
pub mod irrigation;
pub mod navy;
pub mod placeholder;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::geo::BoundingBox;
use crate::model::{RiverStation, WaterReading};

pub use factory::ProviderFactory;

/// Uniform interface over one regional river data source.
#[async_trait]
pub trait RiverProvider: Send + Sync {
    /// Stable provider id, e.g. `srilanka_navy`.
    fn id(&self) -> &str;

    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Region this provider serves.
    fn region_id(&self) -> &str;

    /// All stations, optionally filtered to a bounding box.
    async fn fetch_stations(
        &self,
        bounds: Option<BoundingBox>,
    ) -> Result<Vec<RiverStation>, CoreError>;

    /// Current reading for one station, `None` when unknown.
    async fn fetch_station_reading(
        &self,
        station_id: &str,
    ) -> Result<Option<WaterReading>, CoreError>;

    /// Historical readings, oldest first. Providers without history support
    /// return an empty list.
    async fn fetch_history(
        &self,
        _station_id: &str,
        _hours: u32,
    ) -> Result<Vec<WaterReading>, CoreError> {
        Ok(Vec::new())
    }

    /// Probe the upstream source. Failures are reported as `false`, never
    /// propagated.
    async fn health_check(&self) -> bool;
}

/// Health probe result for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub id: String,
    pub name: String,
    pub region_id: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//! HTTP query API: a thin, read-only surface over the caches and engines.
//!
//! Handlers never call upstream providers directly; they read snapshots and
//! attach cache metadata (`last_updated`, age, validity, next refresh) so
//! clients can judge freshness. The only writes are the explicit refresh
//! hooks, which route through the scheduler's single-flight machinery.

pub mod facilities;
pub mod intel;
pub mod regions;
pub mod rivers;
pub mod system;
pub mod traffic;
pub mod weather;

use std::sync::{Arc, RwLock};

use axum::Router;
use axum::routing::{get, post};
use serde::Serialize;

use crate::cache::CacheInfo;
use crate::config::CoreConfig;
use crate::engine::{IntelEngine, ThreatEngine};
use crate::providers::factory::ProviderFactory;
use crate::providers::irrigation::IrrigationRiverProvider;
use crate::providers::navy::NavyRiverProvider;
use crate::providers::placeholder::PlaceholderProvider;
use crate::providers::RiverProvider;
use crate::region::RegionRegistry;
use crate::scheduler::Scheduler;
use crate::sources::ManagedSource;
use crate::sources::climate::ClimateFetcher;
use crate::sources::early_warning::EarlyWarningFetcher;
use crate::sources::environmental::EnvironmentalFetcher;
use crate::sources::facilities::FacilitiesFetcher;
use crate::sources::marine::MarineFetcher;
use crate::sources::rivers::{IrrigationFetcher, NavyRiverFetcher};
use crate::sources::sos::SosFetcher;
use crate::sources::traffic::{TrafficFlowFetcher, TrafficIncidentsFetcher};
use crate::sources::weather::WeatherFetcher;
use crate::sources::weather_alerts::WeatherAlertsFetcher;
use crate::storage::Storage;

/// Standard envelope for list reads: the payload plus cache metadata.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub cache: CacheInfo,
    pub items: Vec<T>,
}

/// Application state shared across handlers. Everything is `Arc`-shared with
/// the scheduler; handlers get read-only snapshots.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CoreConfig>,
    pub registry: Arc<RegionRegistry>,
    pub current_region: Arc<RwLock<String>>,
    pub storage: Option<Storage>,
    pub factory: Arc<ProviderFactory>,
    pub weather: Arc<WeatherFetcher>,
    pub early_warning: Arc<EarlyWarningFetcher>,
    pub weather_alerts: Arc<WeatherAlertsFetcher>,
    pub marine: Arc<MarineFetcher>,
    pub traffic_incidents: Arc<TrafficIncidentsFetcher>,
    pub traffic_flow: Arc<TrafficFlowFetcher>,
    pub irrigation: Arc<IrrigationFetcher>,
    pub navy: Arc<NavyRiverFetcher>,
    pub sos: Arc<SosFetcher>,
    pub facilities: Arc<FacilitiesFetcher>,
    pub climate: Arc<ClimateFetcher>,
    pub environmental: Arc<EnvironmentalFetcher>,
    pub threat: Arc<ThreatEngine>,
    pub intel: Arc<IntelEngine>,
    pub scheduler: Arc<Scheduler>,
    pub sources: Vec<Arc<dyn ManagedSource>>,
}

impl AppState {
    /// Wire up the full application: fetchers, providers, engines, and the
    /// scheduler, all sharing the same caches.
    pub async fn build(
        config: CoreConfig,
        registry: RegionRegistry,
        storage: Option<Storage>,
    ) -> anyhow::Result<AppState> {
        let config = Arc::new(config);
        let registry = Arc::new(registry);
        let region_id = config.current_region.clone();

        let districts = registry.districts(&region_id).unwrap_or_default();
        let region = registry.get(&region_id)?;
        // Every district of an island region is near enough to the coast to
        // care about sea state; inland regions can narrow this later.
        let coastal = districts.clone();

        let weather = Arc::new(WeatherFetcher::new(&config, districts.clone()));
        let early_warning = Arc::new(EarlyWarningFetcher::new(&config, districts.clone()));
        let weather_alerts = Arc::new(WeatherAlertsFetcher::new(&config, districts.clone()));
        let marine = Arc::new(MarineFetcher::new(&config, coastal));
        let traffic_incidents = Arc::new(TrafficIncidentsFetcher::new(&config));
        let traffic_flow = Arc::new(TrafficFlowFetcher::new(&config));
        let irrigation = Arc::new(IrrigationFetcher::new(&config));
        let navy = Arc::new(NavyRiverFetcher::new(&config));
        let sos = Arc::new(SosFetcher::new(&config));
        let facilities = Arc::new(FacilitiesFetcher::new(&config, region.bounds));
        let climate = Arc::new(ClimateFetcher::new(&config, districts.clone()));
        let environmental = Arc::new(EnvironmentalFetcher::new(&config, "LKA"));

        // Restore long-TTL caches from disk before the first refresh cycle
        weather.load_snapshot();
        facilities.load_snapshot();
        climate.load_snapshot();
        environmental.load_snapshot();

        let mut providers: Vec<Arc<dyn RiverProvider>> = vec![
            Arc::new(NavyRiverProvider::new("srilanka", Arc::clone(&navy))),
            Arc::new(IrrigationRiverProvider::new(
                "srilanka",
                Arc::clone(&irrigation),
            )),
        ];
        for placeholder in PlaceholderProvider::south_india_set() {
            providers.push(Arc::new(placeholder));
        }
        let factory = Arc::new(ProviderFactory::new(&registry, providers));

        let threat = Arc::new(ThreatEngine::new(
            &config,
            Arc::clone(&weather),
            Arc::clone(&irrigation),
            Arc::clone(&registry),
        ));
        let intel = Arc::new(IntelEngine::new(
            &config,
            Arc::clone(&sos),
            Arc::clone(&weather),
        ));

        let sources: Vec<Arc<dyn ManagedSource>> = vec![
            Arc::clone(&weather) as Arc<dyn ManagedSource>,
            Arc::clone(&early_warning) as Arc<dyn ManagedSource>,
            Arc::clone(&weather_alerts) as Arc<dyn ManagedSource>,
            Arc::clone(&marine) as Arc<dyn ManagedSource>,
            Arc::clone(&traffic_incidents) as Arc<dyn ManagedSource>,
            Arc::clone(&traffic_flow) as Arc<dyn ManagedSource>,
            Arc::clone(&irrigation) as Arc<dyn ManagedSource>,
            Arc::clone(&navy) as Arc<dyn ManagedSource>,
            Arc::clone(&sos) as Arc<dyn ManagedSource>,
            Arc::clone(&facilities) as Arc<dyn ManagedSource>,
            Arc::clone(&climate) as Arc<dyn ManagedSource>,
            Arc::clone(&environmental) as Arc<dyn ManagedSource>,
        ];

        let scheduler = Arc::new(Scheduler::new(
            sources.clone(),
            Arc::clone(&threat),
            Arc::clone(&intel),
            config.intervals.threat,
            config.intervals.intel,
            Arc::clone(&weather),
            Arc::clone(&registry),
            &region_id,
            storage.clone(),
        ));

        Ok(AppState {
            current_region: Arc::new(RwLock::new(region_id)),
            config,
            registry,
            storage,
            factory,
            weather,
            early_warning,
            weather_alerts,
            marine,
            traffic_incidents,
            traffic_flow,
            irrigation,
            navy,
            sos,
            facilities,
            climate,
            environmental,
            threat,
            intel,
            scheduler,
            sources,
        })
    }

    /// Region currently served by the district and alert endpoints.
    pub fn current_region(&self) -> String {
        self.current_region
            .read()
            .expect("region lock poisoned")
            .clone()
    }
}

/// Assemble the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(system::health_check))
        .route("/api/status", get(system::get_status))
        .route("/api/refresh/:source", post(system::refresh_source))
        .route("/api/threat", get(system::get_threat))
        .route("/api/regions", get(regions::list_regions))
        .route("/api/regions/active", get(regions::list_active_regions))
        .route("/api/regions/current", post(regions::set_current_region))
        .route("/api/regions/:region_id", get(regions::get_region))
        .route("/api/districts", get(regions::get_districts))
        .route("/api/rivers/by-region/:region_id", get(rivers::get_by_region))
        .route("/api/rivers/by-bounds", get(rivers::get_by_bounds))
        .route("/api/rivers/providers/status", get(rivers::get_provider_status))
        .route(
            "/api/rivers/region-status/:region_id",
            get(rivers::get_region_status),
        )
        .route("/api/weather", get(weather::get_all_weather))
        .route("/api/weather/alerts", get(weather::get_weather_alerts))
        .route("/api/weather/:district", get(weather::get_district_weather))
        .route("/api/marine", get(weather::get_marine))
        .route("/api/climate", get(weather::get_climate_history))
        .route("/api/environmental", get(weather::get_environmental))
        .route("/api/early-warning", get(weather::get_early_warning_overview))
        .route(
            "/api/early-warning/district/:district",
            get(weather::get_early_warning_district),
        )
        .route("/api/early-warning/alerts", get(weather::get_early_warning_alerts))
        .route("/api/early-warning/high-risk", get(weather::get_high_risk_districts))
        .route(
            "/api/early-warning/forecast/daily",
            get(weather::get_daily_forecast),
        )
        .route(
            "/api/early-warning/forecast/hourly/:district",
            get(weather::get_hourly_forecast),
        )
        .route("/api/traffic/incidents", get(traffic::get_incidents))
        .route("/api/traffic/flow", get(traffic::get_flow))
        .route("/api/intel/priorities", get(intel::get_priorities))
        .route("/api/intel/clusters", get(intel::get_clusters))
        .route("/api/intel/summary", get(intel::get_summary))
        .route("/api/intel/actions", get(intel::get_actions))
        .route("/api/intel/raw-sos", get(intel::get_raw_sos))
        .route("/api/intel/refresh", post(intel::refresh_analysis))
        .route("/api/intel/district/:district", get(intel::get_district_intel))
        .route("/api/facilities", get(facilities::get_all))
        .route("/api/facilities/nearby", get(facilities::get_nearby))
        .route(
            "/api/facilities/nearest-hospital",
            get(facilities::get_nearest_hospital),
        )
        .route("/api/facilities/refresh", post(facilities::refresh))
        .with_state(state)
}

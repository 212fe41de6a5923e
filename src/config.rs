//! Runtime configuration, loaded once from the environment by `main`.
//!
//! A missing API key does not fail startup: it disables the fetcher that
//! needs it, and the scheduler logs the omission instead of refreshing.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default SQLite URL when `DATABASE_URL` is not set.
const DEFAULT_DB_URL: &str = "sqlite:floodwatch.db?mode=rwc";

/// Default HTTP port.
const DEFAULT_PORT: u16 = 8000;

/// API credentials for the upstream providers. `None` disables the fetcher.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Primary weather provider (observations + forecast).
    pub here: Option<String>,
    /// Early-warning provider (government alerts, hourly/daily forecast).
    pub openweathermap: Option<String>,
    /// Severe-weather alert provider.
    pub weatherapi: Option<String>,
    /// Traffic incidents and flow.
    pub tomtom: Option<String>,
}

/// Upstream call timeouts. The archive endpoint returns large documents and
/// gets a wider budget; health probes get a narrow one.
#[derive(Debug, Clone)]
pub struct UpstreamTimeouts {
    pub default: Duration,
    pub health: Duration,
    pub archive: Duration,
}

impl Default for UpstreamTimeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            health: Duration::from_secs(10),
            archive: Duration::from_secs(120),
        }
    }
}

/// Cache TTLs per source, in seconds.
#[derive(Debug, Clone)]
pub struct SourceTtls {
    pub weather: u64,
    pub early_warning: u64,
    pub weather_alerts: u64,
    pub marine: u64,
    pub traffic_incidents: u64,
    pub traffic_flow: u64,
    pub rivers: u64,
    pub facilities: u64,
    pub climate: u64,
    pub environmental: u64,
    pub threat: u64,
}

impl Default for SourceTtls {
    fn default() -> Self {
        Self {
            weather: 60 * 60,
            early_warning: 120 * 60,
            weather_alerts: 15 * 60,
            marine: 30 * 60,
            traffic_incidents: 5 * 60,
            traffic_flow: 5 * 60,
            rivers: 5 * 60,
            facilities: 24 * 60 * 60,
            climate: 7 * 24 * 60 * 60,
            environmental: 7 * 24 * 60 * 60,
            threat: 30 * 60,
        }
    }
}

/// Aggregator loop intervals.
#[derive(Debug, Clone)]
pub struct SchedulerIntervals {
    pub threat: Duration,
    pub intel: Duration,
}

impl Default for SchedulerIntervals {
    fn default() -> Self {
        Self {
            threat: Duration::from_secs(15 * 60),
            intel: Duration::from_secs(5 * 60),
        }
    }
}

/// Top-level configuration for the core process.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Region served by default (`CURRENT_REGION`, default "srilanka").
    pub current_region: String,
    /// HTTP listen port.
    pub port: u16,
    /// SQLite URL for the weather-log / alert-history append store.
    pub database_url: String,
    /// Path to the region definition document.
    pub regions_path: PathBuf,
    /// Directory holding per-region district documents.
    pub districts_dir: PathBuf,
    /// Directory for persisted cache snapshots; `None` disables persistence.
    pub snapshot_dir: Option<PathBuf>,
    /// Freeze mode: serve current caches indefinitely, refresh disabled.
    pub freeze_mode: bool,
    pub api_keys: ApiKeys,
    pub timeouts: UpstreamTimeouts,
    pub ttls: SourceTtls,
    pub intervals: SchedulerIntervals,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            current_region: "srilanka".to_string(),
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_URL.to_string(),
            regions_path: PathBuf::from("data/regions.json"),
            districts_dir: PathBuf::from("data/districts"),
            snapshot_dir: Some(PathBuf::from("cache")),
            freeze_mode: false,
            api_keys: ApiKeys::default(),
            timeouts: UpstreamTimeouts::default(),
            ttls: SourceTtls::default(),
            intervals: SchedulerIntervals::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `CURRENT_REGION` - region served by default (default: "srilanka")
    /// - `FLOODWATCH_PORT` - HTTP port (default: 8000)
    /// - `DATABASE_URL` - SQLite URL for the append store
    /// - `REGIONS_PATH` / `DISTRICTS_DIR` - definition documents
    /// - `CACHE_SNAPSHOT_DIR` - snapshot directory ("" disables persistence)
    /// - `CACHE_FREEZE_MODE` - "true" pins caches and disables refresh
    /// - `ALERT_CHECK_INTERVAL_MINUTES` - threat loop cadence (default: 15)
    /// - `HERE_API_KEY`, `OPENWEATHERMAP_API_KEY`, `WEATHERAPI_KEY`,
    ///   `TOMTOM_API_KEY` - provider credentials; absence disables the fetcher
    pub fn from_env() -> Self {
        let defaults = CoreConfig::default();

        let snapshot_dir = match env::var("CACHE_SNAPSHOT_DIR") {
            Ok(dir) if dir.is_empty() => None,
            Ok(dir) => Some(PathBuf::from(dir)),
            Err(_) => defaults.snapshot_dir,
        };

        let mut intervals = SchedulerIntervals::default();
        if let Some(minutes) = env_parse::<u64>("ALERT_CHECK_INTERVAL_MINUTES") {
            intervals.threat = Duration::from_secs(minutes * 60);
        }
        if let Some(minutes) = env_parse::<u64>("INTEL_INTERVAL_MINUTES") {
            intervals.intel = Duration::from_secs(minutes * 60);
        }

        Self {
            current_region: env::var("CURRENT_REGION")
                .unwrap_or_else(|_| defaults.current_region.clone()),
            port: env_parse("FLOODWATCH_PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| defaults.database_url.clone()),
            regions_path: env::var("REGIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.regions_path.clone()),
            districts_dir: env::var("DISTRICTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.districts_dir.clone()),
            snapshot_dir,
            freeze_mode: env::var("CACHE_FREEZE_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            api_keys: ApiKeys {
                here: env_nonempty("HERE_API_KEY"),
                openweathermap: env_nonempty("OPENWEATHERMAP_API_KEY"),
                weatherapi: env_nonempty("WEATHERAPI_KEY"),
                tomtom: env_nonempty("TOMTOM_API_KEY"),
            },
            timeouts: defaults.timeouts,
            ttls: defaults.ttls,
            intervals,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.current_region, "srilanka");
        assert_eq!(config.ttls.weather, 3600);
        assert_eq!(config.ttls.traffic_incidents, 300);
        assert_eq!(config.intervals.threat, Duration::from_secs(900));
        assert_eq!(config.intervals.intel, Duration::from_secs(300));
        assert!(!config.freeze_mode);
        assert!(config.api_keys.tomtom.is_none());
    }

    #[test]
    fn test_timeout_defaults() {
        let timeouts = UpstreamTimeouts::default();
        assert_eq!(timeouts.default, Duration::from_secs(30));
        assert_eq!(timeouts.health, Duration::from_secs(10));
        assert_eq!(timeouts.archive, Duration::from_secs(120));
    }
}

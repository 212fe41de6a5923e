//! Background refresh scheduler.
//!
//! Owns every periodic task in the process: one loop per source fetcher on
//! its own TTL cadence, plus the two aggregator loops (threat and intel).
//! Startup warm-up issues all refreshes in parallel with a random stagger of
//! up to 20% of each TTL so the cadences do not align into bursts.
//!
//! Shutdown is cooperative: `stop()` cancels the token, gives in-flight
//! fetches a short grace period, then abandons them.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::RefreshOutcome;
use crate::engine::{IntelEngine, ThreatEngine};
use crate::error::CoreError;
use crate::model::AlertLevel;
use crate::region::RegionRegistry;
use crate::sources::ManagedSource;
use crate::sources::weather::WeatherFetcher;
use crate::storage::{AlertRecord, Storage, WeatherLog};

/// How long `stop()` waits for in-flight work before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Scheduler {
    sources: Vec<Arc<dyn ManagedSource>>,
    threat: Arc<ThreatEngine>,
    intel: Arc<IntelEngine>,
    threat_interval: Duration,
    intel_interval: Duration,
    weather: Arc<WeatherFetcher>,
    registry: Arc<RegionRegistry>,
    region_id: String,
    storage: Option<Storage>,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Vec<Arc<dyn ManagedSource>>,
        threat: Arc<ThreatEngine>,
        intel: Arc<IntelEngine>,
        threat_interval: Duration,
        intel_interval: Duration,
        weather: Arc<WeatherFetcher>,
        registry: Arc<RegionRegistry>,
        region_id: &str,
        storage: Option<Storage>,
    ) -> Self {
        Self {
            sources,
            threat,
            intel,
            threat_interval,
            intel_interval,
            weather,
            registry,
            region_id: region_id.to_string(),
            storage,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Warm every cache and spawn the long-running loops.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        for source in &self.sources {
            if !source.enabled() {
                info!(source = source.name(), "credentials absent, refresh loop skipped");
                continue;
            }

            let source = Arc::clone(source);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                // Stagger the initial refresh by up to 20% of the TTL
                let jitter_cap = (source.ttl().as_secs_f64() * 0.2).max(1.0);
                let jitter =
                    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..jitter_cap));
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(jitter) => {}
                }

                loop {
                    run_refresh(source.as_ref(), false).await;
                    source.persist();

                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(source.ttl()) => {}
                    }
                }
            });
        }

        // Threat loop: ensure inputs, recompute, log weather + alerts
        {
            let scheduler = Arc::clone(self);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                loop {
                    scheduler.threat_cycle().await;
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(scheduler.threat_interval) => {}
                    }
                }
            });
        }

        // Intel loop
        {
            let intel = Arc::clone(&self.intel);
            let interval = self.intel_interval;
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                loop {
                    if let Err(err) = intel.run_analysis(true).await {
                        warn!(error = %err, "intel cycle failed");
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            });
        }

        info!(
            sources = self.sources.len(),
            "scheduler started"
        );
    }

    async fn threat_cycle(&self) {
        if let Err(err) = self.threat.refresh_cycle(true).await {
            warn!(error = %err, "threat cycle failed");
            return;
        }
        self.log_weather_and_alerts().await;
    }

    /// Append the current weather snapshot to the log store, plus an
    /// alert-history row for every district at yellow or above.
    async fn log_weather_and_alerts(&self) {
        let Some(storage) = &self.storage else {
            return;
        };

        for weather in self.weather.all() {
            let recorded_at = chrono::Utc::now();
            let log = WeatherLog {
                district: weather.district.clone(),
                rainfall_mm: weather.rainfall_24h_mm,
                temperature_c: weather.temperature_c,
                humidity_percent: weather.humidity_percent,
                recorded_at,
            };
            if let Err(err) = storage.insert_weather_log(&log).await {
                warn!(district = %weather.district, error = %err, "weather log write failed");
                continue;
            }

            let level = self
                .registry
                .alert_level(&self.region_id, weather.rainfall_24h_mm)
                .unwrap_or(AlertLevel::Green);
            if level >= AlertLevel::Yellow {
                let record = AlertRecord {
                    district: weather.district.clone(),
                    alert_level: level,
                    rainfall_mm: weather.rainfall_24h_mm,
                    source: "threat_engine".to_string(),
                    message: format!(
                        "{} at {} alert: {:.1}mm rainfall in 24h",
                        weather.district,
                        level.label(),
                        weather.rainfall_24h_mm
                    ),
                    sent_at: recorded_at,
                };
                if let Err(err) = storage.insert_alert(&record).await {
                    warn!(district = %weather.district, error = %err, "alert history write failed");
                }
            }
        }
    }

    /// Trigger an ad-hoc refresh of a named source without disturbing the
    /// schedule. Engine names ("threat", "intel") are valid targets.
    pub async fn refresh_source(&self, name: &str) -> Result<RefreshOutcome, CoreError> {
        if name == self.threat.name() {
            return self.threat.refresh_cycle(true).await;
        }
        if name == self.intel.name() {
            return self.intel.run_analysis(true).await;
        }
        let source = self
            .sources
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| CoreError::Validation(format!("unknown source: {name}")))?;
        let outcome = source.refresh(true).await?;
        source.persist();
        Ok(outcome)
    }

    /// Cancel all loops cooperatively and wait out the grace period.
    pub async fn stop(&self) {
        info!("scheduler stopping");
        self.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while let Ok(Some(_)) =
            tokio::time::timeout_at(deadline, tasks.join_next()).await
        {
            if tasks.is_empty() {
                break;
            }
        }
        if !tasks.is_empty() {
            warn!(remaining = tasks.len(), "abandoning in-flight fetches");
            tasks.abort_all();
        }
        info!("scheduler stopped");
    }
}

async fn run_refresh(source: &dyn ManagedSource, force: bool) {
    match source.refresh(force).await {
        Ok(RefreshOutcome::Refreshed) => {
            debug!(source = source.name(), "scheduled refresh complete")
        }
        Ok(RefreshOutcome::Skipped) => {}
        Err(err) => {
            // Recorded in cache metadata; readers keep the last snapshot
            warn!(source = source.name(), error = %err, "scheduled refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheInfo, SourceCache};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        cache: SourceCache<u32>,
        refreshes: AtomicUsize,
        enabled: bool,
    }

    impl CountingSource {
        fn new(ttl_seconds: u64, enabled: bool) -> Self {
            Self {
                cache: SourceCache::new("counting", ttl_seconds),
                refreshes: AtomicUsize::new(0),
                enabled,
            }
        }
    }

    #[async_trait]
    impl ManagedSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn ttl(&self) -> Duration {
            Duration::from_secs(self.cache.ttl().num_seconds().max(0) as u64)
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        fn cache_info(&self) -> CacheInfo {
            self.cache.cache_info()
        }

        async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError> {
            self.cache
                .refresh_with(force, || async move {
                    self.refreshes.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
        }
    }

    #[tokio::test]
    async fn test_run_refresh_counts() {
        let source = CountingSource::new(3600, true);
        run_refresh(&source, false).await;
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);

        // Fresh cache: second scheduled pass skips
        run_refresh(&source, false).await;
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);

        // Forced pass refreshes again
        run_refresh(&source, true).await;
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 2);
    }
}

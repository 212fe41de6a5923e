//! Source fetchers: one module per upstream feed.
//!
//! Every fetcher owns one upstream source and follows the same shape: fetch,
//! normalise into the domain types, and replace its [`SourceCache`] snapshot.
//! Reads go through the cache only; a fetcher never blocks a reader on
//! upstream I/O.
//!
//! # Sources
//!
//! - [`weather`]: district observations + daily forecast (primary provider
//!   with automatic fallback)
//! - [`early_warning`]: government alerts, 48-hour hourly and 8-day daily
//!   forecasts, per-district risk scoring
//! - [`weather_alerts`]: severe-weather alerts bucketed by severity
//! - [`marine`]: coastal wave and swell conditions
//! - [`traffic`]: road incidents (sub-region fan-out) and flow from two
//!   providers
//! - [`rivers`]: irrigation-department and navy river gauges
//! - [`sos`]: crowdsourced emergency reports
//! - [`facilities`]: hospitals, police, fire stations, shelters from
//!   OpenStreetMap
//! - [`climate`]: historical daily climate archive
//! - [`environmental`]: yearly environmental indicator series

pub mod climate;
pub mod early_warning;
pub mod environmental;
pub mod facilities;
pub mod marine;
pub mod rivers;
pub mod sos;
pub mod traffic;
pub mod weather;
pub mod weather_alerts;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::cache::{CacheInfo, RefreshOutcome};
use crate::error::CoreError;

/// Uniform surface the scheduler and status endpoint use to drive fetchers.
#[async_trait]
pub trait ManagedSource: Send + Sync {
    /// Stable identifier; also names the disk snapshot and manual-refresh key.
    fn name(&self) -> &'static str;

    /// Refresh cadence for the scheduler loop.
    fn ttl(&self) -> Duration;

    /// False when required credentials are absent; the scheduler then logs
    /// the omission and skips the loop instead of crashing.
    fn enabled(&self) -> bool {
        true
    }

    fn cache_info(&self) -> CacheInfo;

    /// One full fetch cycle. Single-flight per cache; a failure leaves the
    /// previous snapshot in place.
    async fn refresh(&self, force: bool) -> Result<RefreshOutcome, CoreError>;

    /// Write the snapshot to disk, for caches that persist across restarts.
    fn persist(&self) {}
}

/// GET a JSON document with a bounded per-call timeout and a small retry
/// budget. Rate-limit responses (429/503) are not retried; the caller backs
/// off until its next scheduled cycle and the cache stays unchanged.
pub(crate) async fn get_json_with_retry<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    source: &str,
    attempts: u32,
    backoff: Duration,
) -> Result<T, CoreError> {
    let mut last_err = None;

    for attempt in 0..attempts.max(1) {
        if attempt > 0 {
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() == 429 || status.as_u16() == 503 {
                    return Err(CoreError::provider(
                        source,
                        format!("rate limited ({status})"),
                    ));
                }
                if !status.is_success() {
                    last_err = Some(CoreError::provider(source, format!("HTTP {status}")));
                    continue;
                }
                match response.json::<T>().await {
                    Ok(body) => return Ok(body),
                    Err(err) => {
                        last_err = Some(CoreError::provider(source, format!("decode: {err}")));
                    }
                }
            }
            Err(err) => {
                last_err = Some(CoreError::provider(source, err));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| CoreError::provider(source, "no attempts made")))
}

/// Single-attempt variant used by fetchers whose upstream should not be
/// retried within a cycle.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    source: &str,
) -> Result<T, CoreError> {
    get_json_with_retry(client, url, source, 1, Duration::ZERO).await
}

/// Build a reqwest client with the given per-call timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

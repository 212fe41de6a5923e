//! Fusion engines over the source caches.
//!
//! Engines never call upstream themselves: they read whatever snapshots the
//! fetchers hold, tolerate missing inputs as "no contribution", and write
//! their own pre-computed snapshot so API reads stay O(1).
//!
//! - [`threat`]: composite flood threat per district and nationally
//! - [`intel`]: urgency ranking, clustering, and action recommendations for
//!   crowdsourced emergency reports

pub mod intel;
pub mod threat;

pub use intel::IntelEngine;
pub use threat::ThreatEngine;

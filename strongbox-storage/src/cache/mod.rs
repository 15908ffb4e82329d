//! Versioned in-process cache.
//!
//! The cache is never authoritative. Freshness comes from write versions
//! handed out by the crud layer: an entry is only replaced by a value at the
//! same or a newer version, and removals leave a watermark behind that
//! rejects any add still carrying a pre-removal version.

pub mod map_cache;
pub mod traits;

pub use map_cache::MapCache;
pub use traits::{Cache, CacheEvent, CacheMetrics, CacheStats, CacheStatsRecorder, NoopMetrics};

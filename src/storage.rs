use crate::common::error::Result;
use crate::domain::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryCacheStore;
pub use sqlite::SqliteCacheStore;

/// Aggregate view over live (non-expired) cache entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub active_entries: usize,
    pub total_slots: usize,
    pub cities: usize,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub last_collected_at: Option<DateTime<Utc>>,
}

/// Storage trait for the availability cache, collection log and venue directory.
///
/// The collection orchestrator is the only writer of cache entries; searches and
/// health checks only read. Expired entries are invisible to every read even
/// before `cleanup` removes them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    // Cache entry operations
    async fn get(&self, city: &str, date: NaiveDate) -> Result<Option<CacheEntry>>;
    /// Replace the entry for `city:date`; metadata is derived from `slots`.
    async fn upsert(
        &self,
        city: &str,
        date: NaiveDate,
        slots: Vec<CourtSlot>,
        provider: &str,
        ttl: chrono::Duration,
    ) -> Result<CacheEntry>;
    async fn get_cache_stats(&self) -> Result<CacheStats>;
    /// Delete entries with `expires_at <= now`, returning how many went.
    async fn cleanup(&self) -> Result<usize>;

    /// Flatten the live entry for (location, date) and apply query filters.
    /// A miss is an empty result, not an error.
    async fn search(&self, params: &SearchParams) -> Result<Vec<CourtSlot>> {
        Ok(match self.get(&params.location, params.date).await? {
            Some(entry) => entry
                .slots
                .into_iter()
                .filter(|slot| params.matches(slot))
                .collect(),
            None => Vec::new(),
        })
    }

    // Collection log operations
    async fn record_collection_run(&self, run: &CollectionRun) -> Result<()>;
    async fn get_recent_collections(&self, limit: usize) -> Result<Vec<CollectionRun>>;
    /// Percentage of successful runs in the trailing window; 0 for an empty window.
    async fn get_collection_success_rate(&self, window_hours: u32) -> Result<f64>;
    /// Mean execution time of successful runs in the window; 0 for none.
    async fn get_average_execution_time(&self, window_hours: u32) -> Result<f64>;
    async fn get_last_successful_collection(&self) -> Result<Option<DateTime<Utc>>>;
    async fn cleanup_collection_runs(&self, retention_days: u32) -> Result<usize>;

    // Venue directory operations
    async fn upsert_venues(&self, city: &str, venues: &[Venue]) -> Result<usize>;
    async fn get_venues(&self, city: Option<&str>) -> Result<Vec<VenueRecord>>;

    async fn record_health_snapshot(&self, status: &str, report: &serde_json::Value) -> Result<()>;

    /// Reachable and schema present
    async fn health_check(&self) -> bool;
}

/// Percentage with an explicit zero-denominator policy: an empty population is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Arithmetic mean under the same policy as `percentage`.
pub fn mean(total: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

pub(crate) fn window_start(window_hours: u32) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(window_hours as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_denominators_are_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(mean(0, 0), 0.0);
        assert_eq!(percentage(3, 4), 75.0);
        assert_eq!(mean(300, 3), 100.0);
    }
}

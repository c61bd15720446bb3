use super::{mean, percentage, window_start, CacheStats, CacheStore};
use crate::common::error::{PlayScannerError, Result};
use crate::domain::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// In-memory store for development and tests. Same TTL semantics as SQLite.
pub struct InMemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    runs: Arc<Mutex<Vec<CollectionRun>>>,
    venues: Arc<Mutex<HashMap<(String, String), VenueRecord>>>,
    snapshots: Arc<Mutex<Vec<(String, serde_json::Value, DateTime<Utc>)>>>,
    reachable: AtomicBool,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            runs: Arc::new(Mutex::new(Vec::new())),
            venues: Arc::new(Mutex::new(HashMap::new())),
            snapshots: Arc::new(Mutex::new(Vec::new())),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every operation fails and `health_check` reports false.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Physical row count, expired rows included
    pub fn stored_entries(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn snapshot_count(&self) -> usize {
        lock(&self.snapshots).len()
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PlayScannerError::store("in-memory store marked unreachable"))
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, city: &str, date: NaiveDate) -> Result<Option<CacheEntry>> {
        self.ensure_reachable()?;
        let key = cache_key(city, date);
        let now = Utc::now();
        Ok(lock(&self.entries)
            .get(&key)
            .filter(|e| e.is_live_at(now))
            .cloned())
    }

    async fn upsert(
        &self,
        city: &str,
        date: NaiveDate,
        slots: Vec<CourtSlot>,
        provider: &str,
        ttl: chrono::Duration,
    ) -> Result<CacheEntry> {
        self.ensure_reachable()?;
        let now = Utc::now();
        let key = cache_key(city, date);
        let entry = CacheEntry {
            cache_key: key.clone(),
            city: crate::common::constants::normalize_city(city),
            date,
            metadata: CacheMetadata::from_slots(&slots, provider, now),
            slots,
            expires_at: now + ttl,
        };
        lock(&self.entries).insert(key.clone(), entry.clone());
        debug!("Upserted cache entry {} with {} slots", key, entry.metadata.total_slots);
        Ok(entry)
    }

    async fn get_cache_stats(&self) -> Result<CacheStats> {
        self.ensure_reachable()?;
        let now = Utc::now();
        let entries = lock(&self.entries);
        let live: Vec<&CacheEntry> = entries.values().filter(|e| e.is_live_at(now)).collect();
        Ok(CacheStats {
            active_entries: live.len(),
            total_slots: live.iter().map(|e| e.metadata.total_slots).sum(),
            cities: live.iter().map(|e| e.city.as_str()).collect::<HashSet<_>>().len(),
            earliest_date: live.iter().map(|e| e.date).min(),
            latest_date: live.iter().map(|e| e.date).max(),
            last_collected_at: live.iter().map(|e| e.metadata.collected_at).max(),
        })
    }

    async fn cleanup(&self) -> Result<usize> {
        self.ensure_reachable()?;
        let now = Utc::now();
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| e.is_live_at(now));
        Ok(before - entries.len())
    }

    async fn record_collection_run(&self, run: &CollectionRun) -> Result<()> {
        self.ensure_reachable()?;
        lock(&self.runs).push(run.clone());
        Ok(())
    }

    async fn get_recent_collections(&self, limit: usize) -> Result<Vec<CollectionRun>> {
        self.ensure_reachable()?;
        let mut runs = lock(&self.runs).clone();
        // Stable sort keeps insertion order for equal timestamps; reverse for newest first
        runs.sort_by_key(|r| r.created_at);
        runs.reverse();
        runs.truncate(limit);
        Ok(runs)
    }

    async fn get_collection_success_rate(&self, window_hours: u32) -> Result<f64> {
        self.ensure_reachable()?;
        let since = window_start(window_hours);
        let runs = lock(&self.runs);
        let in_window: Vec<&CollectionRun> = runs.iter().filter(|r| r.created_at >= since).collect();
        let succeeded = in_window.iter().filter(|r| r.is_success()).count();
        Ok(percentage(succeeded, in_window.len()))
    }

    async fn get_average_execution_time(&self, window_hours: u32) -> Result<f64> {
        self.ensure_reachable()?;
        let since = window_start(window_hours);
        let runs = lock(&self.runs);
        let successful: Vec<&CollectionRun> = runs
            .iter()
            .filter(|r| r.created_at >= since && r.is_success())
            .collect();
        let total: u64 = successful.iter().map(|r| r.execution_time_ms).sum();
        Ok(mean(total, successful.len()))
    }

    async fn get_last_successful_collection(&self) -> Result<Option<DateTime<Utc>>> {
        self.ensure_reachable()?;
        Ok(lock(&self.runs)
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.created_at)
            .max())
    }

    async fn cleanup_collection_runs(&self, retention_days: u32) -> Result<usize> {
        self.ensure_reachable()?;
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let mut runs = lock(&self.runs);
        let before = runs.len();
        runs.retain(|r| r.created_at >= cutoff);
        Ok(before - runs.len())
    }

    async fn upsert_venues(&self, city: &str, venues: &[Venue]) -> Result<usize> {
        self.ensure_reachable()?;
        let now = Utc::now();
        let mut directory = lock(&self.venues);
        for venue in venues {
            directory.insert(
                (venue.id.clone(), venue.provider.clone()),
                VenueRecord {
                    venue_id: venue.id.clone(),
                    provider: venue.provider.clone(),
                    city: crate::common::constants::normalize_city(city),
                    venue_data: venue.clone(),
                    is_active: true,
                    last_seen: now,
                },
            );
        }
        Ok(venues.len())
    }

    async fn get_venues(&self, city: Option<&str>) -> Result<Vec<VenueRecord>> {
        self.ensure_reachable()?;
        let city = city.map(crate::common::constants::normalize_city);
        let mut venues: Vec<VenueRecord> = lock(&self.venues)
            .values()
            .filter(|v| city.as_ref().map_or(true, |c| &v.city == c))
            .cloned()
            .collect();
        venues.sort_by(|a, b| a.venue_data.name.cmp(&b.venue_data.name));
        Ok(venues)
    }

    async fn record_health_snapshot(&self, status: &str, report: &serde_json::Value) -> Result<()> {
        self.ensure_reachable()?;
        lock(&self.snapshots).push((status.to_string(), report.clone(), Utc::now()));
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

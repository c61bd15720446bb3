use crate::apis::{FetchParams, ProviderAdapter};
use crate::common::bounded::bounded;
use crate::common::constants::normalize_city;
use crate::common::error::{PlayScannerError, Result};
use crate::config::CollectionConfig;
use crate::domain::{distinct_venues, CollectionRun};
use crate::storage::CacheStore;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Success,
    Partial,
    Failed,
}

/// Result of one orchestrator pass over the city × date matrix
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub status: CollectionStatus,
    pub collection_id: Uuid,
    pub results: Vec<CollectionRun>,
    pub attempted: usize,
    pub succeeded: usize,
    pub errors: usize,
    pub total_collected: usize,
    pub unique_venues: usize,
    /// Wall-clock milliseconds for the whole pass
    pub collection_time: u64,
    pub timestamp: DateTime<Utc>,
}

/// Drives one provider across the configured cities and days ahead, sequentially,
/// with a fixed pause between provider calls. One failing pair never stops the pass.
pub struct CollectionOrchestrator {
    store: Arc<dyn CacheStore>,
    provider: Arc<dyn ProviderAdapter>,
    config: CollectionConfig,
    run_lock: Mutex<()>,
}

impl CollectionOrchestrator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        provider: Arc<dyn ProviderAdapter>,
        config: CollectionConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// (city, date) pairs in processing order: cities as configured, then days ascending.
    pub fn matrix(&self, start: NaiveDate, cities: &[String]) -> Vec<(String, NaiveDate)> {
        cities
            .iter()
            .flat_map(|city| {
                (0..self.config.days_ahead).filter_map(move |offset| {
                    start
                        .checked_add_days(chrono::Days::new(offset as u64))
                        .map(|date| (normalize_city(city), date))
                })
            })
            .collect()
    }

    /// Collect for the configured cities starting today (local calendar day).
    pub async fn run(&self) -> Result<CollectionSummary> {
        let cities = self.config.cities.clone();
        self.run_for(Local::now().date_naive(), &cities).await
    }

    /// Run one pass. A second pass while one is in flight in this process is rejected.
    pub async fn run_for(&self, start: NaiveDate, cities: &[String]) -> Result<CollectionSummary> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| PlayScannerError::AlreadyRunning)?;

        let collection_id = Uuid::new_v4();
        let started = Instant::now();
        let pairs = self.matrix(start, cities);
        info!(
            "🚀 Starting collection {} for {} (city, date) pairs via {}",
            collection_id,
            pairs.len(),
            self.provider.name()
        );

        let mut results = Vec::with_capacity(pairs.len());
        let mut venues_seen: HashSet<(String, String)> = HashSet::new();

        for (i, (city, date)) in pairs.iter().enumerate() {
            if i > 0 && !self.config.request_delay().is_zero() {
                tokio::time::sleep(self.config.request_delay()).await;
            }
            let span = info_span!("collect", city = %city, date = %date);
            let (run, venues) = self
                .collect_pair(collection_id, city, *date)
                .instrument(span)
                .await;
            venues_seen.extend(venues);

            crate::metrics::collection_run(run.status.as_str(), run.slots_collected);
            if let Err(e) = self.store.record_collection_run(&run).await {
                warn!("Failed to record collection run for {}:{}: {}", city, date, e);
            }
            results.push(run);
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let errors = results.len() - succeeded;
        let status = match (succeeded, errors) {
            (_, 0) => CollectionStatus::Success,
            (0, _) => CollectionStatus::Failed,
            _ => CollectionStatus::Partial,
        };
        let summary = CollectionSummary {
            status,
            collection_id,
            attempted: results.len(),
            succeeded,
            errors,
            total_collected: results.iter().map(|r| r.slots_collected).sum(),
            unique_venues: venues_seen.len(),
            collection_time: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            results,
        };

        if errors > 0 {
            warn!(
                "⚠️ Collection {} finished with {} errors: {} slots from {} venues",
                collection_id, errors, summary.total_collected, summary.unique_venues
            );
        } else {
            info!(
                "✅ Collection {} finished: {} slots from {} venues in {}ms",
                collection_id, summary.total_collected, summary.unique_venues, summary.collection_time
            );
        }
        Ok(summary)
    }

    /// Fetch and persist one pair. Every failure is folded into an error run.
    async fn collect_pair(
        &self,
        collection_id: Uuid,
        city: &str,
        date: NaiveDate,
    ) -> (CollectionRun, Vec<(String, String)>) {
        let provider = self.provider.name();
        let started = Instant::now();
        let params = FetchParams::new(self.config.sport, city, date);

        let outcome = async {
            let slots = bounded(
                "provider fetch",
                self.config.fetch_timeout(),
                self.provider.fetch_availability(&params),
            )
            .await?;
            let venues = distinct_venues(&slots);
            let entry = self
                .store
                .upsert(city, date, slots, provider, self.config.cache_ttl())
                .await?;
            if let Err(e) = self.store.upsert_venues(city, &venues).await {
                warn!("Venue directory update failed: {}", e);
            }
            Ok::<_, PlayScannerError>((entry, venues))
        }
        .await;

        let elapsed = started.elapsed().as_millis() as u64;
        match outcome {
            Ok((entry, venues)) => {
                info!(
                    "Cached {} slots from {} venues",
                    entry.metadata.total_slots, entry.metadata.unique_venues
                );
                let run = CollectionRun::success(
                    collection_id,
                    city,
                    date,
                    provider,
                    entry.metadata.total_slots,
                    entry.metadata.unique_venues,
                    elapsed,
                );
                let keys = venues.into_iter().map(|v| (v.id, v.provider)).collect();
                (run, keys)
            }
            Err(e) => {
                error!("Collection failed: {}", e);
                (
                    CollectionRun::failure(collection_id, city, date, provider, e.to_string(), elapsed),
                    Vec::new(),
                )
            }
        }
    }
}

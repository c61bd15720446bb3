//! Search engine: validates requests, then answers from the persistent cache
//! (the default) or directly from a provider adapter.

use crate::apis::{FetchParams, ProviderDescriptor, ProviderRegistry, ProviderTestReport};
use crate::common::bounded::bounded;
use crate::common::constants::{SOURCE_LIVE, SOURCE_PERSISTENT_CACHE};
use crate::common::error::{PlayScannerError, Result};
use crate::config::SearchConfig;
use crate::domain::{cache_key, CourtSlot, SearchParams, SearchRequest};
use crate::storage::CacheStore;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const TEST_SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    PersistentCache,
    Live,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::PersistentCache => SOURCE_PERSISTENT_CACHE,
            SearchSource::Live => SOURCE_LIVE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDebug {
    pub cache_key: String,
    pub raw_results: usize,
    pub duplicates_removed: usize,
    pub mode_overridden: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<CourtSlot>,
    pub total_results: usize,
    /// Milliseconds spent answering
    pub search_time: u64,
    pub providers: Vec<String>,
    pub filters: SearchParams,
    pub source: SearchSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<SearchDebug>,
}

pub struct SearchEngine {
    store: Arc<dyn CacheStore>,
    providers: ProviderRegistry,
    use_cached_mode: bool,
    provider_timeout: Duration,
    health_timeout: Duration,
    debug: bool,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn CacheStore>, providers: ProviderRegistry, config: &SearchConfig) -> Self {
        Self {
            store,
            providers,
            use_cached_mode: config.use_cached_mode,
            provider_timeout: Duration::from_millis(config.provider_timeout_ms),
            health_timeout: Duration::from_millis(config.health_check_timeout_ms),
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn uses_cached_mode(&self) -> bool {
        self.use_cached_mode
    }

    pub fn default_source(&self) -> SearchSource {
        if self.use_cached_mode {
            SearchSource::PersistentCache
        } else {
            SearchSource::Live
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.search_as_of(request, Local::now().date_naive()).await
    }

    /// Run a search treating `today` as the current local day.
    #[instrument(skip(self, request), fields(sport = ?request.sport, location = ?request.location))]
    pub async fn search_as_of(&self, request: &SearchRequest, today: NaiveDate) -> Result<SearchResponse> {
        let started = Instant::now();
        let params = request.validate(today).map_err(|e| {
            crate::metrics::search_rejected(e.code.as_str());
            debug!("Rejected search: {}", e);
            e
        })?;

        let source = match request.cached {
            Some(true) => SearchSource::PersistentCache,
            Some(false) => SearchSource::Live,
            None => self.default_source(),
        };
        let providers = self.providers.names_for_sport(params.sport);

        if providers.is_empty() {
            info!("No provider serves {}, returning empty results", params.sport);
            return Ok(SearchResponse {
                results: Vec::new(),
                total_results: 0,
                search_time: started.elapsed().as_millis() as u64,
                message: Some(format!(
                    "{} search is not supported yet. Only padel courts are currently available.",
                    params.sport
                )),
                providers,
                filters: params,
                source,
                debug: None,
            });
        }

        let raw = match source {
            SearchSource::PersistentCache => self.store.search(&params).await.map_err(as_store_error)?,
            SearchSource::Live => self.live_search(&params).await?,
        };
        let raw_count = raw.len();
        let results = dedupe_and_sort(raw);
        let elapsed = started.elapsed();

        crate::metrics::search_completed(source.as_str(), results.len(), elapsed.as_secs_f64());
        info!(
            "🔎 {} results for {} in {} on {} from {}",
            results.len(),
            params.sport,
            params.location,
            params.date,
            source.as_str()
        );

        let debug = self.debug.then(|| SearchDebug {
            cache_key: cache_key(&params.location, params.date),
            raw_results: raw_count,
            duplicates_removed: raw_count - results.len(),
            mode_overridden: request.cached.is_some(),
        });
        Ok(SearchResponse {
            total_results: results.len(),
            results,
            search_time: elapsed.as_millis() as u64,
            providers,
            filters: params,
            source,
            message: None,
            debug,
        })
    }

    async fn live_search(&self, params: &SearchParams) -> Result<Vec<CourtSlot>> {
        let adapter = self
            .providers
            .for_sport(params.sport)
            .ok_or_else(|| PlayScannerError::UnknownProvider(params.sport.to_string()))?;
        let fetch = FetchParams::from(params);
        let slots = bounded(
            "live search",
            self.provider_timeout,
            adapter.fetch_availability(&fetch),
        )
        .await?;
        Ok(slots.into_iter().filter(|slot| params.matches(slot)).collect())
    }

    pub fn get_available_providers(&self) -> Vec<ProviderDescriptor> {
        self.providers.descriptors()
    }

    pub async fn get_provider_health(&self) -> BTreeMap<String, bool> {
        self.providers.probe_health(self.health_timeout).await
    }

    /// Diagnostic call against a single provider. Failures land in the report.
    pub async fn test_provider(&self, name: &str, params: FetchParams) -> ProviderTestReport {
        let started = Instant::now();
        let Some(adapter) = self.providers.get(name) else {
            return ProviderTestReport {
                provider: name.to_string(),
                success: false,
                slot_count: 0,
                sample: Vec::new(),
                duration_ms: 0,
                error: Some(PlayScannerError::UnknownProvider(name.to_string()).to_string()),
            };
        };

        let limit = self.provider_timeout;
        let task = tokio::spawn(async move {
            bounded("provider test", limit, adapter.fetch_availability(&params)).await
        });
        let outcome = match task.await {
            Ok(result) => result,
            Err(e) => Err(PlayScannerError::provider(name, format!("provider task failed: {e}"))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(slots) => ProviderTestReport {
                provider: name.to_string(),
                success: true,
                slot_count: slots.len(),
                sample: slots.into_iter().take(TEST_SAMPLE_SIZE).collect(),
                duration_ms,
                error: None,
            },
            Err(e) => {
                warn!("Provider test for {} failed: {}", name, e);
                ProviderTestReport {
                    provider: name.to_string(),
                    success: false,
                    slot_count: 0,
                    sample: Vec::new(),
                    duration_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// A slow cache read is a store failure, not an upstream one.
fn as_store_error(e: PlayScannerError) -> PlayScannerError {
    match e {
        PlayScannerError::Timeout { operation, after_ms } => {
            PlayScannerError::store(format!("{operation} timed out after {after_ms}ms"))
        }
        other => other,
    }
}

/// Keep the first occurrence of each slot id, then order by start time and price.
pub fn dedupe_and_sort(slots: Vec<CourtSlot>) -> Vec<CourtSlot> {
    let mut seen = HashSet::new();
    let mut unique: Vec<CourtSlot> = slots
        .into_iter()
        .filter(|slot| seen.insert(slot.id.clone()))
        .collect();
    unique.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.price.cmp(&b.price))
            .then_with(|| a.id.cmp(&b.id))
    });
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::stub::StubAdapter;
    use crate::common::error::ValidationCode;
    use crate::domain::fixtures::slot;
    use crate::storage::InMemoryCacheStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 7).unwrap()
    }

    fn request(sport: &str) -> SearchRequest {
        SearchRequest {
            sport: Some(sport.into()),
            location: Some("London".into()),
            date: Some("2025-07-07".into()),
            ..SearchRequest::default()
        }
    }

    fn engine(store: Arc<InMemoryCacheStore>, adapter: StubAdapter) -> SearchEngine {
        SearchEngine::new(
            store,
            ProviderRegistry::new(vec![Arc::new(adapter)]),
            &SearchConfig::default(),
        )
    }

    #[test]
    fn test_dedupe_and_sort() {
        let slots = vec![
            slot("c", "v1", 10, 2000),
            slot("a", "v1", 9, 4000),
            slot("b", "v2", 9, 3000),
            slot("a", "v1", 9, 4000),
        ];
        let ids: Vec<String> = dedupe_and_sort(slots).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_cached_search_uses_store_not_provider() {
        let store = Arc::new(InMemoryCacheStore::new());
        store
            .upsert(
                "london",
                today(),
                vec![slot("x", "v1", 18, 4500), slot("y", "v2", 18, 3500)],
                "playtomic",
                chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        let adapter = StubAdapter::new(vec![]);
        let engine = engine(store, adapter);

        let response = engine.search_as_of(&request("padel"), today()).await.unwrap();
        assert_eq!(response.total_results, 2);
        assert_eq!(response.source, SearchSource::PersistentCache);
        assert_eq!(response.results[0].price, 3500);
        assert!(response.debug.is_none());
    }

    #[tokio::test]
    async fn test_live_override_filters_provider_results() {
        let store = Arc::new(InMemoryCacheStore::new());
        let engine = engine(
            store,
            StubAdapter::new(vec![slot("x", "v1", 8, 3000), slot("y", "v1", 19, 3000)]),
        )
        .with_debug(true);
        let mut req = request("padel");
        req.cached = Some(false);
        req.start_time = Some("18:00".into());

        let response = engine.search_as_of(&req, today()).await.unwrap();
        assert_eq!(response.source, SearchSource::Live);
        assert_eq!(response.total_results, 1);
        assert_eq!(response.results[0].id, "y");
        assert!(response.debug.unwrap().mode_overridden);
    }

    #[tokio::test]
    async fn test_unsupported_sport_is_empty_with_message() {
        let engine = engine(Arc::new(InMemoryCacheStore::new()), StubAdapter::new(vec![]));
        let response = engine.search_as_of(&request("football"), today()).await.unwrap();
        assert_eq!(response.total_results, 0);
        assert!(response.providers.is_empty());
        assert!(response.message.unwrap().contains("not supported"));
    }

    #[tokio::test]
    async fn test_validation_happens_before_store_access() {
        let store = Arc::new(InMemoryCacheStore::new());
        store.set_reachable(false);
        let engine = engine(store, StubAdapter::new(vec![]));
        let err = engine.search_as_of(&request("tennis"), today()).await.unwrap_err();
        match err {
            PlayScannerError::Validation(v) => assert_eq!(v.code, ValidationCode::InvalidSport),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_live_provider_failure_is_upstream_error() {
        let adapter = StubAdapter::new(vec![]).fail_on("london", today());
        let engine = engine(Arc::new(InMemoryCacheStore::new()), adapter);
        let mut req = request("padel");
        req.cached = Some(false);
        let err = engine.search_as_of(&req, today()).await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_provider_health_times_out_to_false() {
        let adapter = StubAdapter::new(vec![]).slow(Duration::from_millis(200));
        let engine = SearchEngine::new(
            Arc::new(InMemoryCacheStore::new()),
            ProviderRegistry::new(vec![Arc::new(adapter)]),
            &SearchConfig {
                health_check_timeout_ms: 20,
                ..SearchConfig::default()
            },
        );
        let health = engine.get_provider_health().await;
        assert_eq!(health.get("playtomic"), Some(&false));
    }

    #[tokio::test]
    async fn test_provider_test_report_never_errors() {
        let adapter = StubAdapter::new(vec![]).fail_on("london", today());
        let engine = engine(Arc::new(InMemoryCacheStore::new()), adapter);

        let params = FetchParams::new(crate::domain::Sport::Padel, "london", today());
        let report = engine.test_provider("playtomic", params.clone()).await;
        assert!(!report.success);
        assert!(report.error.is_some());

        let unknown = engine.test_provider("courtfinder", params).await;
        assert!(!unknown.success);
    }
}

use crate::apis::{create_adapter, FetchParams, ProviderRegistry};
use crate::collector::CollectionOrchestrator;
use crate::common::error::{PlayScannerError, ValidationCode};
use crate::config::Config;
use crate::domain::{SearchRequest, Sport};
use crate::health::{Component, HealthAggregator, HealthStatus};
use crate::search::SearchEngine;
use crate::storage::CacheStore;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use hyper::Server;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const RECENT_COLLECTIONS_LIMIT: usize = 10;

/// Everything the handlers need, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CacheStore>,
    pub search: Arc<SearchEngine>,
    pub collector: Arc<CollectionOrchestrator>,
    pub health: Arc<HealthAggregator>,
    pub secret: Option<String>,
    pub debug: bool,
}

impl AppState {
    /// Build the engine, orchestrator and aggregator over `store` from configuration.
    pub fn from_config(config: &Config, store: Arc<dyn CacheStore>) -> crate::common::error::Result<Self> {
        let registry = ProviderRegistry::from_names(&config.search.providers, &config.playtomic);
        let collection_provider = create_adapter(&config.collection.provider, &config.playtomic)
            .ok_or_else(|| PlayScannerError::UnknownProvider(config.collection.provider.clone()))?;

        let search = SearchEngine::new(store.clone(), registry.clone(), &config.search)
            .with_debug(config.server.debug);
        let collector =
            CollectionOrchestrator::new(store.clone(), collection_provider, config.collection.clone());
        let health = HealthAggregator::new(
            store.clone(),
            registry,
            config.health.clone(),
            Duration::from_millis(config.search.health_check_timeout_ms),
        );

        Ok(Self {
            store,
            search: Arc::new(search),
            collector: Arc::new(collector),
            health: Arc::new(health),
            secret: config.server.secret.clone(),
            debug: config.server.debug,
        })
    }
}

/// JSON error body `{error, code}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing or invalid bearer token")
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ValidationCode::ValidationError.as_str(),
            message,
        )
    }

    /// Map a domain error; internal details are only echoed in debug mode.
    fn from_error(err: PlayScannerError, debug: bool) -> Self {
        let detail = |fallback: &str| {
            if debug {
                err.to_string()
            } else {
                fallback.to_string()
            }
        };
        match &err {
            PlayScannerError::Validation(v) => {
                Self::new(StatusCode::BAD_REQUEST, v.code.as_str(), v.message.clone())
            }
            PlayScannerError::AlreadyRunning => Self::new(
                StatusCode::CONFLICT,
                "COLLECTION_IN_PROGRESS",
                err.to_string(),
            ),
            e if e.is_upstream() => {
                error!("Provider failure: {}", e);
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    detail("Availability provider request failed"),
                )
            }
            PlayScannerError::Store { .. } => {
                error!("Store failure: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    detail("Availability cache is unavailable"),
                )
            }
            _ => {
                error!("Internal error: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    detail("Internal server error"),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "code": self.code })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(secret) = state.secret.as_deref() else {
        warn!("Rejected privileged request: no secret configured");
        return Err(ApiError::unauthorized());
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if tokens_match(token.as_bytes(), secret.as_bytes()) => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

async fn collect(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let summary = state
        .collector
        .run()
        .await
        .map_err(|e| ApiError::from_error(e, state.debug))?;
    Ok(Json(json!(summary)))
}

async fn search(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?;
    let request: SearchRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid search request: {e}")))?;
    let response = state
        .search
        .search(&request)
        .await
        .map_err(|e| ApiError::from_error(e, state.debug))?;
    Ok(Json(json!(response)))
}

async fn search_info(State(state): State<AppState>) -> Json<Value> {
    let provider_health = state.search.get_provider_health().await;
    let cache_stats = match state.store.get_cache_stats().await {
        Ok(stats) => json!(stats),
        Err(e) => {
            warn!("Cache stats unavailable: {}", e);
            Value::Null
        }
    };
    Json(json!({
        "providers": state.search.get_available_providers(),
        "providerHealth": provider_health,
        "cacheStats": cache_stats,
        "mode": state.search.default_source(),
        "supportedSports": Sport::ALL,
    }))
}

#[derive(Debug, Deserialize)]
struct HealthQuery {
    detailed: Option<String>,
    component: Option<String>,
}

async fn health(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> ApiResult<Response> {
    let detailed = query
        .detailed
        .as_deref()
        .map_or(false, |v| v == "1" || v.eq_ignore_ascii_case("true"));
    let component = query
        .component
        .as_deref()
        .map(str::parse::<Component>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let report = state.health.report(detailed, component).await;
    let status = if report.status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(json!(report))).into_response())
}

async fn dashboard_stats(state: &AppState) -> crate::common::error::Result<Value> {
    let window = state.health.config().success_window_hours;
    let stats = state.store.get_cache_stats().await?;
    let recent = state.store.get_recent_collections(RECENT_COLLECTIONS_LIMIT).await?;
    let success_rate = state.store.get_collection_success_rate(window).await?;
    let avg_ms = state.store.get_average_execution_time(window).await?;
    let venues = state.store.get_venues(None).await?;
    Ok(json!({
        "cacheStats": stats,
        "recentCollections": recent,
        "successRate": success_rate,
        "averageExecutionTimeMs": avg_ms,
        "venueCount": venues.len(),
        "windowHours": window,
        "timestamp": Utc::now(),
    }))
}

async fn admin_dashboard(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let stats = dashboard_stats(&state)
        .await
        .map_err(|e| ApiError::from_error(e, state.debug))?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
struct AdminRequest {
    action: String,
    provider: Option<String>,
    location: Option<String>,
    date: Option<NaiveDate>,
}

async fn admin_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AdminRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let Json(request) = body.map_err(|e| ApiError::bad_request(format!("Invalid admin request: {e}")))?;
    let internal = |e: PlayScannerError| ApiError::from_error(e, state.debug);

    match request.action.as_str() {
        "cleanup_cache" => {
            let removed_entries = state.store.cleanup().await.map_err(internal)?;
            let retention = state.health.config().run_retention_days;
            let removed_runs = state
                .store
                .cleanup_collection_runs(retention)
                .await
                .map_err(internal)?;
            crate::metrics::cache_cleanup(removed_entries);
            info!(
                "🧹 Cleanup removed {} expired entries and {} old runs",
                removed_entries, removed_runs
            );
            Ok(Json(json!({
                "action": "cleanup_cache",
                "removedEntries": removed_entries,
                "removedRuns": removed_runs,
            })))
        }
        "health_check" => {
            let report = state.health.snapshot().await.map_err(internal)?;
            Ok(Json(json!({ "action": "health_check", "report": report })))
        }
        "get_stats" => {
            let stats = dashboard_stats(&state).await.map_err(internal)?;
            Ok(Json(json!({ "action": "get_stats", "stats": stats })))
        }
        "test_provider" => {
            let provider = request
                .provider
                .ok_or_else(|| ApiError::bad_request("test_provider requires 'provider'"))?;
            let params = FetchParams::new(
                Sport::Padel,
                request.location.unwrap_or_else(|| "london".to_string()),
                request.date.unwrap_or_else(|| chrono::Local::now().date_naive()),
            );
            let report = state.search.test_provider(&provider, params).await;
            Ok(Json(json!({ "action": "test_provider", "report": report })))
        }
        other => Err(ApiError::bad_request(format!("Unknown admin action '{other}'"))),
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/collect", post(collect))
        .route("/search", post(search).get(search_info))
        .route("/health", get(health))
        .route("/admin", get(admin_dashboard).post(admin_action))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Start the HTTP server on the specified port
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("🚀 PLAYScanner listening on http://{}", addr);
    println!("🚀 HTTP server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("🔎 Search:       http://localhost:{port}/search");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match(b"s3cret-token", b"s3cret-token"));
        assert!(!tokens_match(b"s3cret-tokem", b"s3cret-token"));
        assert!(!tokens_match(b"x3cret-token", b"s3cret-token"));
        assert!(!tokens_match(b"s3cret", b"s3cret-token"));
        assert!(!tokens_match(b"", b"s3cret-token"));
    }

    #[test]
    fn test_authorize_requires_exact_bearer_token() {
        let mut config = Config::default();
        config.server.secret = Some("s3cret-token".to_string());
        let state = AppState::from_config(
            &config,
            Arc::new(crate::storage::InMemoryCacheStore::new()),
        )
        .unwrap();

        let mut headers = HeaderMap::new();
        assert!(authorize(&state, &headers).is_err());
        headers.insert(AUTHORIZATION, "Bearer s3cret-token".parse().unwrap());
        assert!(authorize(&state, &headers).is_ok());
        headers.insert(AUTHORIZATION, "Bearer s3cret-tokem".parse().unwrap());
        assert!(authorize(&state, &headers).is_err());
        headers.insert(AUTHORIZATION, "s3cret-token".parse().unwrap());
        assert!(authorize(&state, &headers).is_err());
    }
}

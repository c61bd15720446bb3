mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Duration;
use common::{slot, tomorrow, FakeProvider};
use playscanner::apis::ProviderRegistry;
use playscanner::collector::CollectionOrchestrator;
use playscanner::config::{CollectionConfig, HealthConfig, SearchConfig};
use playscanner::health::HealthAggregator;
use playscanner::search::SearchEngine;
use playscanner::server::{create_router, AppState};
use playscanner::storage::{CacheStore, InMemoryCacheStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn app_state(store: Arc<InMemoryCacheStore>, provider: FakeProvider) -> AppState {
    let provider = Arc::new(provider);
    let registry = ProviderRegistry::new(vec![provider.clone()]);
    let collection = CollectionConfig {
        days_ahead: 1,
        request_delay_ms: 0,
        ..CollectionConfig::default()
    };
    AppState {
        store: store.clone(),
        search: Arc::new(SearchEngine::new(store.clone(), registry.clone(), &SearchConfig::default())),
        collector: Arc::new(CollectionOrchestrator::new(store.clone(), provider, collection)),
        health: Arc::new(HealthAggregator::new(
            store,
            registry,
            HealthConfig::default(),
            std::time::Duration::from_millis(200),
        )),
        secret: Some(SECRET.to_string()),
        debug: false,
    }
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = create_router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authorized(uri: &str, method: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_london_search_served_from_cache() {
    let store = Arc::new(InMemoryCacheStore::new());
    let date = tomorrow();
    store
        .upsert(
            "london",
            date,
            vec![slot("s1", "v1", date, 18, 4500), slot("s2", "v2", date, 18, 3500)],
            "playtomic",
            Duration::hours(1),
        )
        .await
        .unwrap();
    let provider = FakeProvider::new(vec![]);

    let (status, body) = send(
        app_state(store, provider),
        post_json(
            "/search",
            json!({"sport": "padel", "location": "London", "date": date.format("%Y-%m-%d").to_string()}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 2);
    assert_eq!(body["source"], "persistent_cache");
    assert_eq!(body["results"][0]["price"], 3500);
    assert_eq!(body["providers"], json!(["playtomic"]));
}

#[tokio::test]
async fn test_validation_errors_carry_codes() {
    let cases = [
        (json!({"location": "London", "date": "2030-01-01"}), "VALIDATION_ERROR"),
        (json!({"sport": "tennis", "location": "London", "date": "2030-01-01"}), "INVALID_SPORT"),
        (json!({"sport": "padel", "location": "London", "date": "2030-02-30"}), "INVALID_DATE"),
        (json!({"sport": "padel", "location": "London", "date": "2000-01-01"}), "PAST_DATE"),
        (json!({"sport": "padel", "location": "London", "date": "2030-01-01", "startTime": "9am"}), "VALIDATION_ERROR"),
    ];
    for (request, code) in cases {
        let store = Arc::new(InMemoryCacheStore::new());
        store.set_reachable(false);
        let (status, body) = send(
            app_state(store, FakeProvider::new(vec![])),
            post_json("/search", request),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], code);
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(
        app_state(Arc::new(InMemoryCacheStore::new()), FakeProvider::new(vec![])),
        request,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_football_search_is_empty_not_an_error() {
    let (status, body) = send(
        app_state(Arc::new(InMemoryCacheStore::new()), FakeProvider::new(vec![])),
        post_json(
            "/search",
            json!({"sport": "football", "location": "London", "date": tomorrow().to_string()}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 0);
    assert!(body["message"].as_str().unwrap().contains("not supported"));
}

#[tokio::test]
async fn test_live_provider_failure_is_bad_gateway() {
    let provider = FakeProvider::new(vec![]).failing_on("london", tomorrow());
    let (status, body) = send(
        app_state(Arc::new(InMemoryCacheStore::new()), provider),
        post_json(
            "/search",
            json!({"sport": "padel", "location": "London", "date": tomorrow().to_string(), "cached": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROVIDER_ERROR");
}

#[tokio::test]
async fn test_store_outage_is_store_error() {
    let store = Arc::new(InMemoryCacheStore::new());
    store.set_reachable(false);
    let (status, body) = send(
        app_state(store, FakeProvider::new(vec![])),
        post_json(
            "/search",
            json!({"sport": "padel", "location": "London", "date": tomorrow().to_string()}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "STORE_ERROR");
}

#[tokio::test]
async fn test_search_info_reports_mode_and_providers() {
    let request = Request::builder().uri("/search").body(Body::empty()).unwrap();
    let (status, body) = send(
        app_state(Arc::new(InMemoryCacheStore::new()), FakeProvider::new(vec![])),
        request,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "persistent_cache");
    assert_eq!(body["providers"][0]["name"], "playtomic");
    assert_eq!(body["providerHealth"]["playtomic"], true);
    assert_eq!(body["cacheStats"]["activeEntries"], 0);
}

#[tokio::test]
async fn test_collect_requires_bearer_token() {
    let state = app_state(Arc::new(InMemoryCacheStore::new()), FakeProvider::new(vec![]));
    let request = Request::builder()
        .method("POST")
        .uri("/collect")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(state, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_collect_then_search() {
    let store = Arc::new(InMemoryCacheStore::new());
    let today = chrono::Local::now().date_naive();
    let provider = FakeProvider::new(vec![slot("s1", "v1", today, 20, 4000)]);
    let state = app_state(store.clone(), provider);

    let (status, body) = send(state.clone(), authorized("/collect", "POST", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["totalCollected"], 1);
    assert_eq!(store.get_recent_collections(10).await.unwrap().len(), 1);

    let (status, body) = send(
        state,
        post_json(
            "/search",
            json!({"sport": "padel", "location": "london", "date": today.to_string()}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 1);
}

#[tokio::test]
async fn test_health_is_unavailable_until_collected() {
    let state = app_state(Arc::new(InMemoryCacheStore::new()), FakeProvider::new(vec![]));
    let request = Request::builder()
        .uri("/health?detailed=true")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(state.clone(), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["components"]["cache"]["status"], "degraded");
    assert_eq!(body["components"]["providers"]["status"], "healthy");
    assert_eq!(body["components"]["collection"]["status"], "unhealthy");
    assert_eq!(body["status"], "unhealthy");

    let request = Request::builder()
        .uri("/health?component=providers")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(state.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let request = Request::builder()
        .uri("/health?component=database")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_actions() {
    let store = Arc::new(InMemoryCacheStore::new());
    let date = tomorrow();
    store
        .upsert("london", date, vec![slot("s1", "v1", date, 9, 3000)], "playtomic", Duration::zero())
        .await
        .unwrap();
    let state = app_state(store.clone(), FakeProvider::new(vec![]));

    let (status, body) = send(
        state.clone(),
        authorized("/admin", "POST", Some(json!({"action": "cleanup_cache"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removedEntries"], 1);
    assert_eq!(store.stored_entries(), 0);

    let (status, body) = send(
        state.clone(),
        authorized("/admin", "POST", Some(json!({"action": "health_check"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["report"]["components"].is_object());
    assert_eq!(store.snapshot_count(), 1);

    let (status, body) = send(state.clone(), authorized("/admin", "GET", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["venueCount"], 0);
    assert_eq!(body["successRate"], 0.0);

    let (status, body) = send(
        state,
        authorized("/admin", "POST", Some(json!({"action": "drop_tables"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

/// Provider name constants to ensure consistency across the codebase
pub const PLAYTOMIC_PROVIDER: &str = "playtomic";

/// Result source tags reported by the search engine
pub const SOURCE_PERSISTENT_CACHE: &str = "persistent_cache";
pub const SOURCE_LIVE: &str = "live";

// Collection defaults
pub const DEFAULT_DAYS_AHEAD: u32 = 7;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 2_000;
pub const DEFAULT_CACHE_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_COLLECTION_CITIES: &[&str] = &["london"];

// Timeouts
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;
/// Leaves headroom under `DEFAULT_PROVIDER_TIMEOUT_MS` for the tenant lookup.
pub const DEFAULT_PLAYTOMIC_FETCH_BUDGET_MS: u64 = 25_000;

// Health thresholds
pub const DEFAULT_SUCCESS_WINDOW_HOURS: u32 = 24;
pub const DEFAULT_FRESHNESS_THRESHOLD_MINS: i64 = 120;
pub const HEALTHY_SUCCESS_RATE: f64 = 80.0;
pub const DEGRADED_SUCCESS_RATE: f64 = 50.0;

// Retention for the append-only collection log
pub const DEFAULT_RUN_RETENTION_DAYS: u32 = 30;

/// Known cities served by the collector: (key, display name, latitude, longitude)
pub const CITY_COORDINATES: &[(&str, &str, f64, f64)] = &[
    ("london", "London", 51.5074, -0.1278),
    ("manchester", "Manchester", 53.4808, -2.2426),
    ("birmingham", "Birmingham", 52.4862, -1.8904),
    ("leeds", "Leeds", 53.8008, -1.5491),
    ("liverpool", "Liverpool", 53.4084, -2.9916),
    ("bristol", "Bristol", 51.4545, -2.5879),
    ("glasgow", "Glasgow", 55.8642, -4.2518),
    ("edinburgh", "Edinburgh", 55.9533, -3.1883),
];

/// Normalize a user-facing city name into the key used for cache lookups
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// Look up the centre coordinates for a city, by key or display name
pub fn city_coordinates(city: &str) -> Option<(f64, f64)> {
    let key = normalize_city(city);
    CITY_COORDINATES
        .iter()
        .find(|(k, _, _, _)| *k == key)
        .map(|(_, _, lat, lng)| (*lat, *lng))
}

/// Display name for a city key, falling back to the input
pub fn city_display_name(city: &str) -> String {
    let key = normalize_city(city);
    CITY_COORDINATES
        .iter()
        .find(|(k, _, _, _)| *k == key)
        .map(|(_, name, _, _)| name.to_string())
        .unwrap_or_else(|| city.trim().to_string())
}

use super::{FetchParams, ProviderAdapter};
use crate::common::bounded::{bounded, bounded_probe};
use crate::common::constants::{city_coordinates, city_display_name, PLAYTOMIC_PROVIDER};
use crate::common::error::{PlayScannerError, Result};
use crate::config::PlaytomicConfig;
use crate::domain::{
    Contact, Coordinates, CourtSlot, Location, SlotFeatures, Sport, SportMeta, Venue,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const SUPPORTED: &[Sport] = &[Sport::Padel];

#[derive(Debug, Clone, Default, Deserialize)]
struct CoordinateDto {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AddressDto {
    street: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
    coordinate: Option<CoordinateDto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ResourcePropertiesDto {
    /// "indoor" | "outdoor" | "covered"
    resource_type: Option<String>,
    /// "double" | "single"
    resource_size: Option<String>,
    /// "crystal" | "panoramic" | "wall"
    resource_feature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResourceDto {
    resource_id: String,
    #[serde(default)]
    properties: ResourcePropertiesDto,
}

#[derive(Debug, Clone, Deserialize)]
struct TenantDto {
    tenant_id: String,
    tenant_name: String,
    #[serde(default)]
    address: AddressDto,
    #[serde(default)]
    resources: Vec<ResourceDto>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlotDto {
    start_time: String,
    duration: u32,
    price: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ResourceAvailabilityDto {
    resource_id: String,
    start_date: String,
    #[serde(default)]
    slots: Vec<SlotDto>,
}

/// Adapter for the Playtomic public availability API
pub struct PlaytomicAdapter {
    client: reqwest::Client,
    config: PlaytomicConfig,
}

impl PlaytomicAdapter {
    pub fn new(config: PlaytomicConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client, config }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let started = Instant::now();
        let response = self.client.get(url).query(query).send().await;
        let elapsed = started.elapsed().as_secs_f64();
        let response = match response.and_then(|r| r.error_for_status()) {
            Ok(r) => r,
            Err(e) => {
                crate::metrics::provider_request(PLAYTOMIC_PROVIDER, false, elapsed);
                return Err(e.into());
            }
        };
        crate::metrics::provider_request(PLAYTOMIC_PROVIDER, true, elapsed);
        Ok(response.json::<Value>().await?)
    }

    async fn fetch_tenants(&self, lat: f64, lng: f64) -> Result<Vec<TenantDto>> {
        let url = format!("{}/v1/tenants", self.base_url());
        let body = self
            .get_json(
                &url,
                &[
                    ("coordinate", format!("{lat},{lng}")),
                    ("sport_id", "PADEL".to_string()),
                    ("radius", self.config.search_radius_m.to_string()),
                    ("playtomic_status", "ACTIVE".to_string()),
                    ("size", self.config.max_venues.to_string()),
                ],
            )
            .await?;
        parse_tenants(body)
    }

    async fn fetch_tenant_availability(
        &self,
        tenant_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ResourceAvailabilityDto>> {
        let url = format!("{}/v1/availability", self.base_url());
        let day = date.format("%Y-%m-%d");
        let body = self
            .get_json(
                &url,
                &[
                    ("sport_id", "PADEL".to_string()),
                    ("tenant_id", tenant_id.to_string()),
                    ("start_min", format!("{day}T00:00:00")),
                    ("start_max", format!("{day}T23:59:59")),
                ],
            )
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for PlaytomicAdapter {
    fn name(&self) -> &'static str {
        PLAYTOMIC_PROVIDER
    }

    fn supported_sports(&self) -> &'static [Sport] {
        SUPPORTED
    }

    #[instrument(skip(self), fields(location = %params.location, date = %params.date))]
    async fn fetch_availability(&self, params: &FetchParams) -> Result<Vec<CourtSlot>> {
        if !self.supports(params.sport) {
            return Ok(Vec::new());
        }
        let Some((lat, lng)) = city_coordinates(&params.location) else {
            warn!("No coordinates known for '{}', returning no availability", params.location);
            return Ok(Vec::new());
        };

        let tenants = self.fetch_tenants(lat, lng).await?;
        debug!("Found {} Playtomic venues near {}", tenants.len(), params.location);

        let mut slots = Vec::new();
        let mut skipped = 0usize;
        let mut unvisited = 0usize;
        let deadline = Instant::now() + Duration::from_millis(self.config.fetch_budget_ms);
        for (i, tenant) in tenants.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                unvisited = tenants.len() - i;
                warn!(
                    "Fetch budget of {}ms spent, returning partial availability ({} venues not visited)",
                    self.config.fetch_budget_ms, unvisited
                );
                break;
            }
            let fetched = bounded(
                "playtomic venue availability",
                remaining,
                self.fetch_tenant_availability(&tenant.tenant_id, params.date),
            )
            .await;
            match fetched {
                Ok(availability) => {
                    slots.extend(build_slots(tenant, &availability, params.sport, &params.location))
                }
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping venue {} ({}): {}", tenant.tenant_name, tenant.tenant_id, e);
                }
            }
        }

        slots.retain(|s| within_window(s, params.start_time, params.end_time));
        info!(
            "Fetched {} slots from {} venues ({} skipped, {} not visited)",
            slots.len(),
            tenants.len() - skipped - unvisited,
            skipped,
            unvisited
        );
        Ok(slots)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/tenants", self.base_url());
        let probe = self
            .client
            .get(&url)
            .query(&[("sport_id", "PADEL"), ("size", "1")])
            .send();
        bounded_probe(
            "playtomic health check",
            Duration::from_millis(self.config.health_timeout_ms),
            async move {
                match probe.await {
                    Ok(resp) => resp.status().is_success(),
                    Err(e) => {
                        debug!("Playtomic health check failed: {}", e);
                        false
                    }
                }
            },
        )
        .await
    }
}

/// Parse the tenant list one element at a time so a malformed venue is dropped
/// rather than failing the whole response.
fn parse_tenants(body: Value) -> Result<Vec<TenantDto>> {
    let Value::Array(items) = body else {
        return Err(PlayScannerError::provider(
            PLAYTOMIC_PROVIDER,
            "tenant listing is not a JSON array",
        ));
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<TenantDto>(item) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("Skipping unparseable Playtomic tenant: {}", e);
                None
            }
        })
        .collect())
}

/// "36 GBP" / "36.5 EUR" into (minor units, currency)
fn parse_price(raw: &str) -> Option<(u32, String)> {
    let mut parts = raw.split_whitespace();
    let amount = parts.next()?.replace(',', ".");
    let currency = parts.next().unwrap_or("GBP").to_uppercase();
    let value: f64 = amount.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(((value * 100.0).round() as u32, currency))
}

fn venue_from_tenant(tenant: &TenantDto, location: &str) -> Venue {
    let address = &tenant.address;
    Venue {
        id: tenant.tenant_id.clone(),
        name: tenant.tenant_name.clone(),
        provider: PLAYTOMIC_PROVIDER.to_string(),
        location: Location {
            address: address.street.clone().unwrap_or_default(),
            city: address
                .city
                .clone()
                .unwrap_or_else(|| city_display_name(location)),
            postcode: address.postal_code.clone().unwrap_or_default(),
            coordinates: address.coordinate.as_ref().map(|c| Coordinates {
                lat: c.lat,
                lng: c.lon,
            }),
        },
        amenities: Vec::new(),
        images: tenant.images.clone(),
        contact: Contact {
            phone: tenant.phone.clone(),
            email: None,
            website: None,
        },
    }
}

fn build_slots(
    tenant: &TenantDto,
    availability: &[ResourceAvailabilityDto],
    sport: Sport,
    location: &str,
) -> Vec<CourtSlot> {
    let venue = venue_from_tenant(tenant, location);
    let collected_at = Utc::now();
    let mut slots = Vec::new();

    for resource in availability {
        let props = tenant
            .resources
            .iter()
            .find(|r| r.resource_id == resource.resource_id)
            .map(|r| r.properties.clone())
            .unwrap_or_default();
        let Ok(day) = NaiveDate::parse_from_str(&resource.start_date, "%Y-%m-%d") else {
            warn!("Bad start_date '{}' for resource {}", resource.start_date, resource.resource_id);
            continue;
        };

        for raw in &resource.slots {
            let Ok(time) = NaiveTime::parse_from_str(&raw.start_time, "%H:%M:%S") else {
                debug!("Bad start_time '{}' for resource {}", raw.start_time, resource.resource_id);
                continue;
            };
            let Some((price, currency)) = parse_price(&raw.price) else {
                debug!("Bad price '{}' for resource {}", raw.price, resource.resource_id);
                continue;
            };
            let start = NaiveDateTime::new(day, time).and_utc();
            let end = start + chrono::Duration::minutes(raw.duration as i64);
            let id = format!(
                "playtomic_{}_{}_{}",
                tenant.tenant_id,
                resource.resource_id,
                start.format("%Y%m%dT%H%M")
            );
            let slot = CourtSlot::new(
                id,
                sport,
                venue.clone(),
                start,
                end,
                price,
                currency,
                format!("https://playtomic.io/tenant/{}", tenant.tenant_id),
            );
            match slot {
                Ok(slot) => slots.push(
                    slot.with_features(SlotFeatures {
                        indoor: props.resource_type.as_deref().map(|t| t != "outdoor"),
                        lights: None,
                        surface: props.resource_feature.clone(),
                        court_type: props.resource_size.clone(),
                    })
                    .with_sport_meta(SportMeta {
                        court_type: props.resource_size.clone(),
                        skill_level: None,
                        players: match props.resource_size.as_deref() {
                            Some("single") => Some(2),
                            Some("double") => Some(4),
                            _ => None,
                        },
                    })
                    .with_last_updated(collected_at),
                ),
                Err(e) => debug!("Dropping slot: {}", e),
            }
        }
    }
    slots
}

fn within_window(slot: &CourtSlot, start: Option<NaiveTime>, end: Option<NaiveTime>) -> bool {
    start.map_or(true, |s| slot.start_time.time() >= s)
        && end.map_or(true, |e| slot.start_time.time() < e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenant() -> TenantDto {
        let raw = json!({
            "tenant_id": "t-1",
            "tenant_name": "Padel Social Club",
            "address": {
                "street": "1 Canary Wharf",
                "postal_code": "E14 5AB",
                "city": "London",
                "coordinate": { "lat": 51.50, "lon": -0.02 }
            },
            "resources": [
                { "resource_id": "r-1", "properties": { "resource_type": "indoor", "resource_size": "double", "resource_feature": "panoramic" } },
                { "resource_id": "r-2", "properties": { "resource_type": "outdoor", "resource_size": "single" } }
            ],
            "images": ["https://img.example/1.jpg"]
        });
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("36 GBP"), Some((3600, "GBP".to_string())));
        assert_eq!(parse_price("36.5 eur"), Some((3650, "EUR".to_string())));
        assert_eq!(parse_price("22,75 EUR"), Some((2275, "EUR".to_string())));
        assert_eq!(parse_price("free"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_build_slots_maps_resources_and_skips_bad_rows() {
        let availability: Vec<ResourceAvailabilityDto> = serde_json::from_value(json!([
            { "resource_id": "r-1", "start_date": "2025-07-07", "slots": [
                { "start_time": "18:00:00", "duration": 90, "price": "45 GBP" },
                { "start_time": "not-a-time", "duration": 60, "price": "30 GBP" }
            ]},
            { "resource_id": "r-2", "start_date": "2025-07-07", "slots": [
                { "start_time": "09:00:00", "duration": 60, "price": "35 GBP" },
                { "start_time": "10:00:00", "duration": 60, "price": "??" }
            ]},
            { "resource_id": "r-3", "start_date": "07/07/2025", "slots": [
                { "start_time": "09:00:00", "duration": 60, "price": "35 GBP" }
            ]}
        ]))
        .unwrap();

        let slots = build_slots(&tenant(), &availability, Sport::Padel, "london");
        assert_eq!(slots.len(), 2);

        let evening = &slots[0];
        assert_eq!(evening.id, "playtomic_t-1_r-1_20250707T1800");
        assert_eq!(evening.duration, 90);
        assert_eq!(evening.price, 4500);
        assert_eq!(evening.features.indoor, Some(true));
        assert_eq!(evening.sport_meta.players, Some(4));
        assert_eq!(evening.venue.location.postcode, "E14 5AB");
        assert_eq!(evening.booking_url, "https://playtomic.io/tenant/t-1");

        let morning = &slots[1];
        assert_eq!(morning.features.indoor, Some(false));
        assert_eq!(morning.sport_meta.players, Some(2));
    }

    #[test]
    fn test_parse_tenants_skips_malformed_entries() {
        let body = json!([
            { "tenant_id": "t-1", "tenant_name": "Good" },
            { "tenant_name": "Missing id" },
            { "tenant_id": "t-3", "tenant_name": "Also good", "resources": [] }
        ]);
        let tenants = parse_tenants(body).unwrap();
        assert_eq!(tenants.len(), 2);
        assert!(parse_tenants(json!({"error": "nope"})).is_err());
    }

    #[test]
    fn test_within_window() {
        let slots = build_slots(
            &tenant(),
            &serde_json::from_value::<Vec<ResourceAvailabilityDto>>(json!([
                { "resource_id": "r-1", "start_date": "2025-07-07", "slots": [
                    { "start_time": "18:00:00", "duration": 60, "price": "45 GBP" }
                ]}
            ]))
            .unwrap(),
            Sport::Padel,
            "london",
        );
        let s = &slots[0];
        assert!(within_window(s, NaiveTime::from_hms_opt(17, 0, 0), None));
        assert!(!within_window(s, NaiveTime::from_hms_opt(19, 0, 0), None));
        assert!(!within_window(s, None, NaiveTime::from_hms_opt(18, 0, 0)));
    }

    #[tokio::test]
    async fn test_unknown_city_yields_empty_without_network() {
        let adapter = PlaytomicAdapter::new(PlaytomicConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..PlaytomicConfig::default()
        });
        let params = FetchParams::new(
            Sport::Padel,
            "Atlantis",
            NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
        );
        assert!(adapter.fetch_availability(&params).await.unwrap().is_empty());

        let football = FetchParams::new(
            Sport::Football,
            "London",
            NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
        );
        assert!(adapter.fetch_availability(&football).await.unwrap().is_empty());
    }

    /// Local stand-in for the Playtomic API: three venues, each availability call
    /// answering after `delay` with one 09:00 slot.
    async fn serve_three_venues(delay: Duration) -> String {
        use axum::{routing::get, Json, Router};

        let app = Router::new()
            .route(
                "/v1/tenants",
                get(|| async {
                    Json(json!([
                        {"tenant_id": "t-1", "tenant_name": "Padel One"},
                        {"tenant_id": "t-2", "tenant_name": "Padel Two"},
                        {"tenant_id": "t-3", "tenant_name": "Padel Three"}
                    ]))
                }),
            )
            .route(
                "/v1/availability",
                get(move || async move {
                    tokio::time::sleep(delay).await;
                    Json(json!([{
                        "resource_id": "r-1",
                        "start_date": "2030-03-04",
                        "slots": [{"start_time": "09:00:00", "duration": 60, "price": "36 GBP"}]
                    }]))
                }),
            );
        let server = hyper::Server::bind(&"127.0.0.1:0".parse().unwrap())
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        format!("http://{addr}")
    }

    fn padel_in_london() -> FetchParams {
        FetchParams::new(
            Sport::Padel,
            "london",
            NaiveDate::from_ymd_opt(2030, 3, 4).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_spent_fetch_budget_keeps_gathered_slots() {
        let base_url = serve_three_venues(Duration::from_millis(150)).await;
        let adapter = PlaytomicAdapter::new(PlaytomicConfig {
            base_url,
            fetch_budget_ms: 250,
            ..PlaytomicConfig::default()
        });

        let started = Instant::now();
        let slots = adapter.fetch_availability(&padel_in_london()).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].venue.id, "t-1");
    }

    #[tokio::test]
    async fn test_fetch_within_budget_visits_every_venue() {
        let base_url = serve_three_venues(Duration::ZERO).await;
        let adapter = PlaytomicAdapter::new(PlaytomicConfig {
            base_url,
            ..PlaytomicConfig::default()
        });

        let slots = adapter.fetch_availability(&padel_in_london()).await.unwrap();

        let mut venues: Vec<_> = slots.iter().map(|s| s.venue.id.as_str()).collect();
        venues.sort();
        assert_eq!(venues, vec!["t-1", "t-2", "t-3"]);
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use playscanner::apis::{FetchParams, ProviderAdapter};
use playscanner::common::error::{PlayScannerError, Result};
use playscanner::domain::{CourtSlot, Location, Sport, Venue};
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn venue(id: &str) -> Venue {
    Venue {
        id: id.to_string(),
        name: format!("Padel Club {id}"),
        provider: "playtomic".to_string(),
        location: Location {
            city: "London".to_string(),
            ..Location::default()
        },
        amenities: vec![],
        images: vec![],
        contact: Default::default(),
    }
}

/// 90-minute padel slot at `hour`:00 UTC on `date`
pub fn slot(id: &str, venue_id: &str, date: NaiveDate, hour: u32, price: u32) -> CourtSlot {
    let start = Utc
        .from_utc_datetime(&date.and_hms_opt(hour, 0, 0).expect("valid hour"));
    CourtSlot::new(
        id,
        Sport::Padel,
        venue(venue_id),
        start,
        start + chrono::Duration::minutes(90),
        price,
        "GBP",
        format!("https://playtomic.io/tenant/{venue_id}"),
    )
    .expect("valid slot")
}

pub fn tomorrow() -> NaiveDate {
    chrono::Local::now().date_naive().succ_opt().expect("tomorrow exists")
}

/// Provider double: fixed slots per call, failing for selected (city, date) pairs.
pub struct FakeProvider {
    pub slots: Vec<CourtSlot>,
    pub failing: Vec<(String, NaiveDate)>,
    pub healthy: bool,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(slots: Vec<CourtSlot>) -> Self {
        Self {
            slots,
            failing: Vec::new(),
            healthy: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, city: &str, date: NaiveDate) -> Self {
        self.failing.push((city.to_string(), date));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn name(&self) -> &'static str {
        "playtomic"
    }

    fn supported_sports(&self) -> &'static [Sport] {
        &[Sport::Padel]
    }

    async fn fetch_availability(&self, params: &FetchParams) -> Result<Vec<CourtSlot>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing
            .iter()
            .any(|(city, date)| city.eq_ignore_ascii_case(&params.location) && *date == params.date)
        {
            return Err(PlayScannerError::provider("playtomic", "HTTP 503 from availability endpoint"));
        }
        Ok(self.slots.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

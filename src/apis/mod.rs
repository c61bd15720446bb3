//! Provider adapters: each one turns an external booking source into canonical
//! `CourtSlot`s. Untrusted payloads are parsed into typed records here, at the edge.

pub mod playtomic;
pub mod registry;

use crate::common::error::Result;
use crate::domain::{CourtSlot, SearchParams, Sport};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

pub use registry::{create_adapter, ProviderDescriptor, ProviderRegistry};

/// What an adapter is asked to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    pub sport: Sport,
    pub location: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl FetchParams {
    pub fn new(sport: Sport, location: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            sport,
            location: location.into(),
            date,
            start_time: None,
            end_time: None,
        }
    }
}

impl From<&SearchParams> for FetchParams {
    fn from(params: &SearchParams) -> Self {
        Self {
            sport: params.sport,
            location: params.location.clone(),
            date: params.date,
            start_time: params.start_time,
            end_time: params.end_time,
        }
    }
}

/// Core trait that every availability source must implement
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique identifier for this provider
    fn name(&self) -> &'static str;

    fn supported_sports(&self) -> &'static [Sport];

    /// Fetch availability for one (sport, location, date). A venue that fails to
    /// load or parse is skipped; only failures of the whole request are errors.
    /// Adapters never retry; the caller owns retry policy.
    async fn fetch_availability(&self, params: &FetchParams) -> Result<Vec<CourtSlot>>;

    /// Liveness probe. Implementations bound their own request time.
    async fn health_check(&self) -> bool;

    fn supports(&self, sport: Sport) -> bool {
        self.supported_sports().contains(&sport)
    }
}

/// Outcome of a diagnostic provider call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTestReport {
    pub provider: String,
    pub success: bool,
    pub slot_count: usize,
    pub sample: Vec<CourtSlot>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

use super::{CourtSlot, Venue};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Composite cache key `{city}:{date}`, with the city normalized.
pub fn cache_key(city: &str, date: NaiveDate) -> String {
    format!(
        "{}:{}",
        crate::common::constants::normalize_city(city),
        date.format("%Y-%m-%d")
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub total_slots: usize,
    pub unique_venues: usize,
    pub collected_at: DateTime<Utc>,
    pub provider: String,
}

impl CacheMetadata {
    /// Derive metadata from the payload so counts always match what is stored.
    pub fn from_slots(slots: &[CourtSlot], provider: &str, collected_at: DateTime<Utc>) -> Self {
        Self {
            total_slots: slots.len(),
            unique_venues: count_unique_venues(slots),
            collected_at,
            provider: provider.to_string(),
        }
    }
}

pub fn count_unique_venues(slots: &[CourtSlot]) -> usize {
    slots
        .iter()
        .map(|s| (s.venue.id.as_str(), s.provider.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

/// Distinct venues observed in a batch, first occurrence wins.
pub fn distinct_venues(slots: &[CourtSlot]) -> Vec<Venue> {
    let mut seen = HashSet::new();
    slots
        .iter()
        .filter(|s| seen.insert((s.venue.id.clone(), s.provider.clone())))
        .map(|s| s.venue.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub cache_key: String,
    pub city: String,
    pub date: NaiveDate,
    pub slots: Vec<CourtSlot>,
    pub metadata: CacheMetadata,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunStatus::Success),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

/// One attempt to collect a single (city, date). Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRun {
    pub collection_id: Uuid,
    pub city: String,
    pub date: NaiveDate,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub slots_collected: usize,
    pub venues_processed: usize,
    pub execution_time_ms: u64,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl CollectionRun {
    pub fn success(
        collection_id: Uuid,
        city: &str,
        date: NaiveDate,
        provider: &str,
        slots_collected: usize,
        venues_processed: usize,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            collection_id,
            city: city.to_string(),
            date,
            status: RunStatus::Success,
            error_message: None,
            slots_collected,
            venues_processed,
            execution_time_ms,
            provider: provider.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn failure(
        collection_id: Uuid,
        city: &str,
        date: NaiveDate,
        provider: &str,
        error_message: String,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            collection_id,
            city: city.to_string(),
            date,
            status: RunStatus::Error,
            error_message: Some(error_message),
            slots_collected: 0,
            venues_processed: 0,
            execution_time_ms,
            provider: provider.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Deduplicated venue directory row keyed by (venue_id, provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub venue_id: String,
    pub provider: String,
    pub city: String,
    pub venue_data: Venue,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::slot;

    #[test]
    fn test_cache_key_normalizes_city() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 7).unwrap();
        assert_eq!(cache_key(" London", date), "london:2025-07-07");
    }

    #[test]
    fn test_metadata_counts_match_payload() {
        let slots = vec![slot("a", "v1", 9, 3000), slot("b", "v1", 10, 3000), slot("c", "v2", 9, 3500)];
        let meta = CacheMetadata::from_slots(&slots, "playtomic", Utc::now());
        assert_eq!(meta.total_slots, 3);
        assert_eq!(meta.unique_venues, 2);
        assert_eq!(distinct_venues(&slots).len(), 2);
    }
}

use crate::common::error::{PlayScannerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod cache;
pub mod query;

pub use cache::*;
pub use query::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Padel,
    Football,
}

impl Sport {
    pub const ALL: [Sport; 2] = [Sport::Padel, Sport::Football];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Padel => "padel",
            Sport::Football => "football",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "padel" => Ok(Sport::Padel),
            "football" => Ok(Sport::Football),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub city: String,
    pub postcode: String,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Contact {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub location: Location,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub contact: Contact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub spots_available: u32,
    pub total_spots: u32,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            spots_available: 1,
            total_spots: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotFeatures {
    pub indoor: Option<bool>,
    pub lights: Option<bool>,
    pub surface: Option<String>,
    pub court_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportMeta {
    pub court_type: Option<String>,
    pub skill_level: Option<String>,
    pub players: Option<u32>,
}

/// A bookable time window at a venue. Immutable once collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtSlot {
    pub id: String,
    pub sport: Sport,
    pub provider: String,
    pub venue: Venue,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes between `start_time` and `end_time`
    pub duration: u32,
    /// Minor currency units (pence, cents)
    pub price: u32,
    pub currency: String,
    pub booking_url: String,
    pub availability: Availability,
    #[serde(default)]
    pub features: SlotFeatures,
    #[serde(default)]
    pub sport_meta: SportMeta,
    pub last_updated: DateTime<Utc>,
}

impl CourtSlot {
    /// Build a slot, deriving `duration` from the time window.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        sport: Sport,
        venue: Venue,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        price: u32,
        currency: impl Into<String>,
        booking_url: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        if end_time <= start_time {
            return Err(PlayScannerError::provider(
                &venue.provider,
                format!("slot {id} ends at or before it starts"),
            ));
        }
        let duration = (end_time - start_time).num_minutes() as u32;
        Ok(Self {
            id,
            sport,
            provider: venue.provider.clone(),
            venue,
            start_time,
            end_time,
            duration,
            price,
            currency: currency.into(),
            booking_url: booking_url.into(),
            availability: Availability::default(),
            features: SlotFeatures::default(),
            sport_meta: SportMeta::default(),
            last_updated: Utc::now(),
        })
    }

    pub fn with_availability(mut self, spots_available: u32, total_spots: u32) -> Result<Self> {
        if spots_available > total_spots {
            return Err(PlayScannerError::provider(
                &self.provider,
                format!(
                    "slot {} reports {} spots available of {}",
                    self.id, spots_available, total_spots
                ),
            ));
        }
        self.availability = Availability {
            spots_available,
            total_spots,
        };
        Ok(self)
    }

    pub fn with_features(mut self, features: SlotFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_sport_meta(mut self, sport_meta: SportMeta) -> Self {
        self.sport_meta = sport_meta;
        self
    }

    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = last_updated;
        self
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sport_parsing() {
        assert_eq!("Padel".parse::<Sport>(), Ok(Sport::Padel));
        assert_eq!(" football ".parse::<Sport>(), Ok(Sport::Football));
        assert!("tennis".parse::<Sport>().is_err());
    }

    #[test]
    fn test_duration_is_derived_from_window() {
        let s = slot("a", "v1", 18, 4500);
        assert_eq!(s.duration, 60);
        assert_eq!((s.end_time - s.start_time).num_minutes(), s.duration as i64);
    }

    #[test]
    fn test_rejects_inverted_window() {
        let start = Utc.with_ymd_and_hms(2025, 7, 7, 18, 0, 0).unwrap();
        let result = CourtSlot::new(
            "bad",
            Sport::Padel,
            venue("v1", "Venue"),
            start,
            start,
            1000,
            "GBP",
            "https://example.com",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_overbooked_availability() {
        let s = slot("a", "v1", 18, 4500);
        assert!(s.clone().with_availability(2, 4).is_ok());
        assert!(s.with_availability(5, 4).is_err());
    }

    #[test]
    fn test_slot_serializes_camel_case() {
        let json = serde_json::to_value(slot("a", "v1", 18, 4500)).unwrap();
        assert!(json.get("startTime").is_some());
        assert!(json.get("bookingUrl").is_some());
        assert_eq!(json["sport"], "padel");
        assert_eq!(json["availability"]["spotsAvailable"], 1);
    }
}

use super::{CourtSlot, Sport};
use crate::common::error::{ValidationCode, ValidationError};
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid time regex"));

/// Optional narrowing beyond the core search fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotFilters {
    pub surface: Option<String>,
    pub court_type: Option<String>,
    pub lights: Option<bool>,
    pub min_duration: Option<u32>,
    pub max_duration: Option<u32>,
    /// Case-insensitive substring of the venue name
    pub venue: Option<String>,
}

/// Search request as received on the wire. Every field is optional so that
/// missing fields surface as validation errors instead of decode failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub sport: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_price: Option<i64>,
    pub indoor: Option<bool>,
    pub filters: Option<SlotFilters>,
    /// Per-request override of the configured cached/live mode
    pub cached: Option<bool>,
}

/// Validated search parameters, echoed back in search responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub sport: Sport,
    pub location: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm_opt", default)]
    pub start_time: Option<NaiveTime>,
    #[serde(with = "hhmm_opt", default)]
    pub end_time: Option<NaiveTime>,
    pub max_price: Option<u32>,
    pub indoor: Option<bool>,
    #[serde(default)]
    pub filters: SlotFilters,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::new(
            ValidationCode::ValidationError,
            format!("Missing required field: {field}"),
        )),
    }
}

fn parse_hhmm(value: &str, field: &str) -> Result<NaiveTime, ValidationError> {
    let invalid = || {
        ValidationError::new(
            ValidationCode::ValidationError,
            format!("{field} must be HH:MM, got '{value}'"),
        )
    };
    if !TIME_RE.is_match(value) {
        return Err(invalid());
    }
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| invalid())
}

impl SearchRequest {
    /// Validate against `today` (local calendar day). Never touches the store or providers.
    pub fn validate(&self, today: NaiveDate) -> Result<SearchParams, ValidationError> {
        let sport = required(&self.sport, "sport")?;
        let location = required(&self.location, "location")?;
        let date = required(&self.date, "date")?;

        let sport: Sport = sport.parse().map_err(|_| {
            ValidationError::new(
                ValidationCode::InvalidSport,
                format!(
                    "Unsupported sport '{sport}'. Expected one of: {}",
                    Sport::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ),
            )
        })?;

        let invalid_date = || {
            ValidationError::new(
                ValidationCode::InvalidDate,
                format!("Date must be YYYY-MM-DD, got '{date}'"),
            )
        };
        if !DATE_RE.is_match(date) {
            return Err(invalid_date());
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid_date())?;
        if date < today {
            return Err(ValidationError::new(
                ValidationCode::PastDate,
                format!("Date {date} is in the past"),
            ));
        }

        let start_time = self
            .start_time
            .as_deref()
            .map(|t| parse_hhmm(t.trim(), "startTime"))
            .transpose()?;
        let end_time = self
            .end_time
            .as_deref()
            .map(|t| parse_hhmm(t.trim(), "endTime"))
            .transpose()?;
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if start >= end {
                return Err(ValidationError::new(
                    ValidationCode::ValidationError,
                    "startTime must be before endTime",
                ));
            }
        }

        let max_price = match self.max_price {
            Some(p) if p < 0 => {
                return Err(ValidationError::new(
                    ValidationCode::ValidationError,
                    "maxPrice must not be negative",
                ))
            }
            Some(p) => Some(u32::try_from(p).unwrap_or(u32::MAX)),
            None => None,
        };

        Ok(SearchParams {
            sport,
            location: location.to_string(),
            date,
            start_time,
            end_time,
            max_price,
            indoor: self.indoor,
            filters: self.filters.clone().unwrap_or_default(),
        })
    }
}

impl SearchParams {
    pub fn new(sport: Sport, location: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            sport,
            location: location.into(),
            date,
            start_time: None,
            end_time: None,
            max_price: None,
            indoor: None,
            filters: SlotFilters::default(),
        }
    }

    /// Query-level filtering applied identically to cached and live results.
    pub fn matches(&self, slot: &CourtSlot) -> bool {
        if slot.sport != self.sport {
            return false;
        }
        if let Some(start) = self.start_time {
            if slot.start_time.time() < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            let crosses_midnight = slot.end_time.date_naive() > slot.start_time.date_naive();
            if crosses_midnight || slot.end_time.time() > end {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if slot.price > max {
                return false;
            }
        }
        if let Some(indoor) = self.indoor {
            if slot.features.indoor != Some(indoor) {
                return false;
            }
        }
        self.filters.matches(slot)
    }
}

impl SlotFilters {
    pub fn matches(&self, slot: &CourtSlot) -> bool {
        let eq_ci = |want: &Option<String>, have: Option<&String>| match want {
            Some(w) => have.map_or(false, |h| h.eq_ignore_ascii_case(w)),
            None => true,
        };
        if !eq_ci(&self.surface, slot.features.surface.as_ref()) {
            return false;
        }
        if self.court_type.is_some()
            && !eq_ci(&self.court_type, slot.features.court_type.as_ref())
            && !eq_ci(&self.court_type, slot.sport_meta.court_type.as_ref())
        {
            return false;
        }
        if let Some(lights) = self.lights {
            if slot.features.lights != Some(lights) {
                return false;
            }
        }
        if self.min_duration.map_or(false, |min| slot.duration < min) {
            return false;
        }
        if self.max_duration.map_or(false, |max| slot.duration > max) {
            return false;
        }
        if let Some(venue) = &self.venue {
            if !slot.venue.name.to_lowercase().contains(&venue.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// `NaiveTime` as `HH:MM` on the wire, matching the request format.
mod hhmm_opt {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::slot;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    fn request(sport: &str, location: &str, date: &str) -> SearchRequest {
        SearchRequest {
            sport: Some(sport.into()),
            location: Some(location.into()),
            date: Some(date.into()),
            ..Default::default()
        }
    }

    fn code(req: &SearchRequest) -> ValidationCode {
        req.validate(today()).unwrap_err().code
    }

    #[test]
    fn test_missing_fields_are_validation_errors() {
        let mut req = request("padel", "London", "2025-07-07");
        req.sport = None;
        assert_eq!(code(&req), ValidationCode::ValidationError);

        let mut req = request("padel", "London", "2025-07-07");
        req.location = Some("   ".into());
        assert_eq!(code(&req), ValidationCode::ValidationError);

        let mut req = request("padel", "London", "2025-07-07");
        req.date = None;
        assert_eq!(code(&req), ValidationCode::ValidationError);
    }

    #[test]
    fn test_invalid_sport() {
        assert_eq!(code(&request("tennis", "London", "2025-07-07")), ValidationCode::InvalidSport);
    }

    #[test]
    fn test_strict_date_format() {
        for bad in ["07/07/2025", "2025-7-7", "2025-07-07T10:00", "2025-02-30", "tomorrow"] {
            assert_eq!(code(&request("padel", "London", bad)), ValidationCode::InvalidDate, "{bad}");
        }
    }

    #[test]
    fn test_past_date_but_today_is_fine() {
        assert_eq!(code(&request("padel", "London", "2025-06-30")), ValidationCode::PastDate);
        assert!(request("padel", "London", "2025-07-01").validate(today()).is_ok());
    }

    #[test]
    fn test_time_window_validation() {
        let mut req = request("padel", "London", "2025-07-07");
        req.start_time = Some("25:00".into());
        assert_eq!(code(&req), ValidationCode::ValidationError);

        req.start_time = Some("20:00".into());
        req.end_time = Some("18:00".into());
        assert_eq!(code(&req), ValidationCode::ValidationError);

        req.end_time = Some("22:30".into());
        let params = req.validate(today()).unwrap();
        assert_eq!(params.start_time, NaiveTime::from_hms_opt(20, 0, 0));
    }

    #[test]
    fn test_negative_max_price_rejected() {
        let mut req = request("padel", "London", "2025-07-07");
        req.max_price = Some(-1);
        assert_eq!(code(&req), ValidationCode::ValidationError);
    }

    #[test]
    fn test_matches_applies_price_time_and_indoor() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 7).unwrap();
        let mut params = SearchParams::new(Sport::Padel, "London", date);
        let cheap_morning = slot("a", "v1", 9, 3000);
        let pricey_evening = slot("b", "v1", 19, 5000).with_features(crate::domain::SlotFeatures {
            indoor: Some(true),
            ..Default::default()
        });

        params.max_price = Some(4000);
        assert!(params.matches(&cheap_morning));
        assert!(!params.matches(&pricey_evening));

        params.max_price = None;
        params.start_time = NaiveTime::from_hms_opt(18, 0, 0);
        assert!(!params.matches(&cheap_morning));
        assert!(params.matches(&pricey_evening));

        params.end_time = NaiveTime::from_hms_opt(19, 30, 0);
        assert!(!params.matches(&pricey_evening));

        params.start_time = None;
        params.end_time = None;
        params.indoor = Some(true);
        assert!(!params.matches(&cheap_morning));
        assert!(params.matches(&pricey_evening));
    }

    #[test]
    fn test_extra_filters() {
        let s = slot("a", "v1", 9, 3000);
        let filters = SlotFilters {
            venue: Some("venue V1".into()),
            min_duration: Some(60),
            ..Default::default()
        };
        assert!(filters.matches(&s));
        let filters = SlotFilters {
            max_duration: Some(45),
            ..Default::default()
        };
        assert!(!filters.matches(&s));
    }

    #[test]
    fn test_params_echo_uses_hhmm() {
        let mut req = request("padel", "London", "2025-07-07");
        req.start_time = Some("08:30".into());
        let json = serde_json::to_value(req.validate(today()).unwrap()).unwrap();
        assert_eq!(json["startTime"], "08:30");
        assert_eq!(json["date"], "2025-07-07");
        assert_eq!(json["sport"], "padel");
    }
}

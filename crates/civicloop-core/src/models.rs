//! Data models for hazard reports

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use thiserror::Error;
use uuid::Uuid;

/// Wire format of `date_reported`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A report becomes actionable once it is strictly older than this many days
pub const ACTIONABLE_AFTER_DAYS: i64 = 30;

/// Errors raised when constructing a [`HazardRecord`]
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    /// Latitude or longitude is NaN or infinite
    #[error("coordinates must be finite (lat={latitude}, long={longitude})")]
    NonFiniteCoordinate {
        /// Offending latitude
        latitude: f64,
        /// Offending longitude
        longitude: f64,
    },
}

/// A single reported road hazard
///
/// Serialized as `{id, lat, long, dateReported}`, the schema shared by the
/// baseline dataset and the report log. Equality and hashing use `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardRecord {
    /// Opaque unique identifier, assigned once at creation
    pub id: String,
    /// Latitude in degrees
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in degrees
    #[serde(rename = "long")]
    pub longitude: f64,
    /// Report date as `YYYY-MM-DD`
    #[serde(rename = "dateReported")]
    pub date_reported: String,
}

impl HazardRecord {
    /// Creates a record with a fresh id.
    pub fn new(latitude: f64, longitude: f64, reported_on: NaiveDate) -> Result<Self, RecordError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(RecordError::NonFiniteCoordinate {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            id: Uuid::new_v4().to_string().to_uppercase(),
            latitude,
            longitude,
            date_reported: reported_on.format(DATE_FORMAT).to_string(),
        })
    }

    /// Parsed report date, or `None` when `date_reported` is malformed.
    pub fn reported_on(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date_reported, DATE_FORMAT).ok()
    }

    /// Whole calendar days between the report date and `today`.
    pub fn age_in_days(&self, today: NaiveDate) -> Option<i64> {
        self.reported_on().map(|d| (today - d).num_days())
    }

    /// Whether the hazard has been on record long enough for a claim.
    ///
    /// A malformed date is never actionable.
    pub fn is_actionable(&self, today: NaiveDate) -> bool {
        self.age_in_days(today)
            .is_some_and(|days| days > ACTIONABLE_AFTER_DAYS)
    }

    /// [`Self::is_actionable`] against the local wall clock.
    ///
    /// Not cached: two calls that straddle local midnight can disagree for
    /// the same record. Prefer [`Self::is_actionable`] with an explicit date
    /// anywhere the answer must be stable.
    pub fn is_actionable_now(&self) -> bool {
        self.is_actionable(Local::now().date_naive())
    }

    /// Claim eligibility shown when the hazard is selected.
    pub fn claim_status(&self, today: NaiveDate) -> ClaimStatus {
        if self.is_actionable(today) {
            ClaimStatus::Actionable
        } else {
            ClaimStatus::TooEarly
        }
    }
}

impl PartialEq for HazardRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HazardRecord {}

impl Hash for HazardRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Whether a claim can be filed against a hazard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    /// Older than the liability window
    Actionable,
    /// Still inside the liability window
    TooEarly,
}

impl ClaimStatus {
    /// Short label for list views
    pub fn label(&self) -> &'static str {
        match self {
            ClaimStatus::Actionable => "Actionable (>30 Days)",
            ClaimStatus::TooEarly => "Too Early",
        }
    }

    /// Longer explanation for detail views
    pub fn explanation(&self) -> &'static str {
        match self {
            ClaimStatus::Actionable => "This pothole has been on record for more than 30 days.",
            ClaimStatus::TooEarly => {
                "This pothole is less than 30 days old. Liability not established."
            }
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_dated(date: &str) -> HazardRecord {
        HazardRecord {
            id: "a".to_string(),
            latitude: 42.35,
            longitude: -83.07,
            date_reported: date.to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 21).unwrap()
    }

    #[test]
    fn thirty_days_is_not_actionable() {
        let date = (today() - Duration::days(30)).format(DATE_FORMAT).to_string();
        assert!(!record_dated(&date).is_actionable(today()));
    }

    #[test]
    fn thirty_one_days_is_actionable() {
        let date = (today() - Duration::days(31)).format(DATE_FORMAT).to_string();
        assert!(record_dated(&date).is_actionable(today()));
    }

    #[test]
    fn malformed_date_is_not_actionable() {
        for bad in ["", "11/21/2025", "2025-13-01", "yesterday", "2025-02-30"] {
            let record = record_dated(bad);
            assert!(!record.is_actionable(today()), "{bad:?} should not be actionable");
            assert_eq!(record.reported_on(), None);
        }
    }

    #[test]
    fn future_date_is_not_actionable() {
        assert!(!record_dated("2026-01-01").is_actionable(today()));
    }

    #[test]
    fn claim_status_follows_actionability() {
        assert_eq!(
            record_dated("2025-01-01").claim_status(today()),
            ClaimStatus::Actionable
        );
        assert_eq!(
            record_dated("2025-11-20").claim_status(today()),
            ClaimStatus::TooEarly
        );
        assert!(ClaimStatus::TooEarly
            .explanation()
            .contains("Liability not established"));
        assert_eq!(ClaimStatus::Actionable.to_string(), "Actionable (>30 Days)");
    }

    #[test]
    fn new_assigns_unique_ids_and_formats_date() {
        let a = HazardRecord::new(42.3595, -83.0725, today()).unwrap();
        let b = HazardRecord::new(42.3595, -83.0725, today()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.date_reported, "2025-11-21");
        assert_eq!(a.reported_on(), Some(today()));
    }

    #[test]
    fn new_rejects_non_finite_coordinates() {
        let err = HazardRecord::new(f64::NAN, 0.0, today()).unwrap_err();
        assert!(matches!(err, RecordError::NonFiniteCoordinate { .. }));
        assert!(HazardRecord::new(0.0, f64::INFINITY, today()).is_err());
    }

    #[test]
    fn equality_is_by_id() {
        let mut other = record_dated("2020-01-01");
        other.latitude = 0.0;
        assert_eq!(record_dated("2025-11-01"), other);
    }

    #[test]
    fn json_uses_wire_field_names() {
        let json = serde_json::to_value(record_dated("2025-11-21")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "a",
                "lat": 42.35,
                "long": -83.07,
                "dateReported": "2025-11-21"
            })
        );

        let back: HazardRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.latitude, 42.35);
        assert_eq!(back.longitude, -83.07);
        assert_eq!(back.date_reported, "2025-11-21");
    }
}

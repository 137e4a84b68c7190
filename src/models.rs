//! Core data models for the booking core
//!
//! Stored documents keep the field names the mobile apps already read
//! (`assigned_to`, `starttimestamp`, `primaryAddress`, ...). Conversions
//! into the typed models happen here, at the store boundary.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::BookingError;

pub const DEFAULT_PROVIDER_IMAGE: &str = "https://xsgames.co/randomusers/avatar.php?g=male";

//
// ================= Enums =================
//

/// One of the three fixed daily booking windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeSlot {
    #[serde(rename = "Slot 1")]
    Morning,
    #[serde(rename = "Slot 2")]
    Afternoon,
    #[serde(rename = "Slot 3")]
    Evening,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 3] = [TimeSlot::Morning, TimeSlot::Afternoon, TimeSlot::Evening];

    pub fn label(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "Slot 1",
            TimeSlot::Afternoon => "Slot 2",
            TimeSlot::Evening => "Slot 3",
        }
    }

    /// (start hour, end hour) in naive local time
    pub fn hours(&self) -> (u32, u32) {
        match self {
            TimeSlot::Morning => (8, 12),
            TimeSlot::Afternoon => (13, 17),
            TimeSlot::Evening => (18, 22),
        }
    }

    pub fn start_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hours().0, 0, 0).unwrap_or_default()
    }

    pub fn end_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hours().1, 0, 0).unwrap_or_default()
    }

    /// Hour of day from which the slot no longer counts as bookable today.
    pub fn cutoff_hour(&self) -> u32 {
        self.hours().1
    }

    /// Map a 24-hour clock hour onto the slot that serves it.
    ///
    /// Hours in [12, 13) and [17, 18) fall into the following slot's range
    /// even though the slot itself starts later.
    pub fn for_hour(hour: u32) -> Option<TimeSlot> {
        match hour {
            8..=11 => Some(TimeSlot::Morning),
            12..=16 => Some(TimeSlot::Afternoon),
            17..=21 => Some(TimeSlot::Evening),
            _ => None,
        }
    }

    pub fn display_range(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "8:00 AM - 12:00 PM",
            TimeSlot::Afternoon => "1:00 PM - 5:00 PM",
            TimeSlot::Evening => "6:00 PM - 10:00 PM",
        }
    }

    pub fn clock_range(&self) -> String {
        let (start, end) = self.hours();
        format!("{:02}:00 - {:02}:00", start, end)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for TimeSlot {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slot 1" | "slot1" | "1" => Ok(TimeSlot::Morning),
            "slot 2" | "slot2" | "2" => Ok(TimeSlot::Afternoon),
            "slot 3" | "slot3" | "3" => Ok(TimeSlot::Evening),
            other => Err(BookingError::InvalidSlot(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    #[serde(rename = "In-Progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    /// Only pending and in-progress jobs occupy a provider's slot.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "Pending",
            JobStatus::InProgress => "In-Progress",
            JobStatus::Completed => "Completed",
            JobStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    #[default]
    #[serde(other)]
    Inactive,
}

//
// ================= Geography =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(Self::new(lat, lon)),
            _ => None,
        }
    }
}

//
// ================= Provider =================
//

/// Provider document as stored. Ratings arrive under either
/// `average_rating` or `rating`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub status: ProviderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl ProviderRecord {
    pub fn into_provider(self, id: impl Into<String>) -> Provider {
        let rating = self.average_rating.or(self.rating).unwrap_or(0.0);
        Provider {
            id: id.into(),
            name: self.name,
            expertise: self.expertise,
            status: self.status,
            rating,
            city: self.city.filter(|c| !c.trim().is_empty()),
            coordinates: Coordinates::from_parts(self.latitude, self.longitude),
            profile_image: self.profile_image,
        }
    }
}

impl From<&Provider> for ProviderRecord {
    fn from(p: &Provider) -> Self {
        Self {
            name: p.name.clone(),
            expertise: p.expertise.clone(),
            status: p.status,
            rating: None,
            average_rating: Some(p.rating),
            city: p.city.clone(),
            latitude: p.coordinates.map(|c| c.latitude),
            longitude: p.coordinates.map(|c| c.longitude),
            profile_image: p.profile_image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub expertise: Vec<String>,
    pub status: ProviderStatus,
    pub rating: f64,
    pub city: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub profile_image: Option<String>,
}

impl Provider {
    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }

    /// Lenient expertise match: `category` as a case-insensitive substring
    /// of any expertise label, so "Plumber" matches "Plumber - Pipe Repair"
    /// and "AC" also matches "HVAC Repair".
    pub fn offers(&self, category: &str) -> bool {
        let needle = category.to_lowercase();
        self.expertise
            .iter()
            .any(|label| label.to_lowercase().contains(&needle))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<serde_json::Value>),
        Other(serde_json::Value),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        OneOrMany::Other(_) => Vec::new(),
    })
}

//
// ================= Requester =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Address {
    /// Comma-joined non-empty parts, `None` when nothing is filled in.
    pub fn formatted(&self) -> Option<String> {
        let parts: Vec<&str> = [
            &self.unit_name,
            &self.building_name,
            &self.street_name,
            &self.city,
            &self.postal_code,
            &self.country,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_address: Option<Address>,
    #[serde(default)]
    pub wallet: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl Requester {
    pub fn city(&self) -> Option<&str> {
        self.primary_address
            .as_ref()
            .and_then(|a| a.city.as_deref())
            .filter(|c| !c.trim().is_empty())
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.primary_address.as_ref().and_then(Address::coordinates)
    }
}

//
// ================= Reservation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    #[serde(rename = "booking_id")]
    pub id: String,
    #[serde(rename = "assigned_to")]
    pub provider_id: String,
    #[serde(rename = "user_id")]
    pub requester_id: String,
    pub category: String,
    pub description: String,
    pub status: JobStatus,
    #[serde(rename = "assigned_slot")]
    pub slot: TimeSlot,
    #[serde(rename = "starttimestamp", default)]
    pub start_timestamp: String,
    #[serde(rename = "endtimestamp", default)]
    pub end_timestamp: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: String,
    #[serde(rename = "hasMaterials", default)]
    pub has_materials: bool,
}

impl Reservation {
    /// Calendar date of the start timestamp. `None` when the timestamp is
    /// missing or not of the `YYYY-MM-DDTHH:MM...` shape.
    pub fn start_date(&self) -> Option<NaiveDate> {
        let (date, _) = self.start_timestamp.split_once('T')?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }
}

//
// ================= Ledger =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeTransaction {
    pub id: String,
    pub amount: f64,
    pub booking_id: String,
    pub description: String,
    pub timestamp: i64,
    pub transaction_type: String,
    pub user_id: String,
}

pub const BOOKING_FEE_TYPE: &str = "booking-fee";

impl FeeTransaction {
    /// Debit record for a new reservation.
    ///
    /// The id is derived from the reservation id, so writing the same fee
    /// twice lands on the same document.
    pub fn booking_fee(
        reservation_id: &str,
        requester_id: &str,
        fee: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id: Self::booking_fee_id(reservation_id),
            amount: -fee.abs(),
            booking_id: reservation_id.to_string(),
            description: format!("Processing fee for booking {}", reservation_id),
            timestamp: timestamp_ms,
            transaction_type: BOOKING_FEE_TYPE.to_string(),
            user_id: requester_id.to_string(),
        }
    }

    pub fn booking_fee_id(reservation_id: &str) -> String {
        let digest = Sha256::digest(format!("booking-fee:{}", reservation_id).as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Fare {
    pub amount: f64,
}

impl Fare {
    pub const DEFAULT_AMOUNT: f64 = 20.0;
}

impl Default for Fare {
    fn default() -> Self {
        Self {
            amount: Self::DEFAULT_AMOUNT,
        }
    }
}

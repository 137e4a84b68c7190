//! Availability resolution
//!
//! Three fixed daily slots over a 7-day window starting today. A slot is
//! busy when an active (Pending / In-Progress) reservation of the provider
//! starts on that date in that slot. Today's slots drop out once their
//! window is over.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

use crate::models::{Reservation, TimeSlot};

pub const WINDOW_DAYS: i64 = 7;

/// Free slots of one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub slots: Vec<TimeSlot>,
}

impl DayAvailability {
    /// "Monday, 20 Oct"
    pub fn heading(&self) -> String {
        self.date.format("%A, %d %b").to_string()
    }
}

/// (date, slot) pairs held by active reservations of `provider_id`.
/// Records whose start timestamp cannot be read are skipped.
pub fn busy_slots(provider_id: &str, reservations: &[Reservation]) -> HashSet<(NaiveDate, TimeSlot)> {
    reservations
        .iter()
        .filter(|r| r.provider_id == provider_id && r.status.is_active())
        .filter_map(|r| match r.start_date() {
            Some(date) => Some((date, r.slot)),
            None => {
                warn!(
                    reservation_id = %r.id,
                    start_timestamp = %r.start_timestamp,
                    "Skipping reservation with unreadable start timestamp"
                );
                None
            }
        })
        .collect()
}

/// Slot already over on `date` as seen from `now`. Earlier dates count as
/// passed in full.
pub fn has_passed(date: NaiveDate, slot: TimeSlot, now: NaiveDateTime) -> bool {
    if date < now.date() {
        return true;
    }
    date == now.date() && now.hour() >= slot.cutoff_hour()
}

/// Per-day free slots for the next `WINDOW_DAYS` days. Days without a free
/// slot are left out but still count toward the window.
pub fn weekly_availability(
    provider_id: &str,
    reservations: &[Reservation],
    now: NaiveDateTime,
) -> Vec<DayAvailability> {
    let busy = busy_slots(provider_id, reservations);
    let today = now.date();

    (0..WINDOW_DAYS)
        .map(|offset| today + Duration::days(offset))
        .filter_map(|date| {
            let slots: Vec<TimeSlot> = TimeSlot::ALL
                .into_iter()
                .filter(|slot| !busy.contains(&(date, *slot)))
                .filter(|slot| !has_passed(date, *slot, now))
                .collect();

            (!slots.is_empty()).then(|| DayAvailability {
                date,
                weekday: date.weekday(),
                slots,
            })
        })
        .collect()
}

/// Single-slot check used while walking ranked candidates.
pub fn is_available(
    provider_id: &str,
    reservations: &[Reservation],
    date: NaiveDate,
    slot: TimeSlot,
    now: NaiveDateTime,
) -> bool {
    !has_passed(date, slot, now) && !busy_slots(provider_id, reservations).contains(&(date, slot))
}

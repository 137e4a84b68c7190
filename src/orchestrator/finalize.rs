use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ringgit, BookingOrchestrator, RequesterContext};
use crate::availability::is_available;
use crate::catalog::GENERAL_CATEGORY;
use crate::error::BookingError;
use crate::models::{FeeTransaction, JobStatus, Provider, Reservation, TimeSlot};
use crate::reply::{Button, Reply, CANCEL_BOOKING, CANCEL_REQUEST, CONFIRM_BOOKING};
use crate::session::{BookingStage, SessionSlots};
use crate::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Fee debit attempts before the reservation is reported as held.
const FEE_WRITE_ATTEMPTS: u32 = 3;
const FEE_RETRY_BACKOFF: Duration = Duration::from_millis(50);

impl BookingOrchestrator {
    /// Check the slots, the wallet and the provider's calendar, then write
    /// the reservation and its fee.
    pub async fn confirm_booking(&self, session: &mut SessionSlots) -> Result<Reply> {
        let missing = session.missing_for_confirmation();
        if !missing.is_empty() {
            debug!(?missing, "Confirmation attempted with missing slots");
            return Ok(Reply::single(
                "I'm missing some information for your booking. Please specify the date, time slot, handyman, and service needed.",
            ));
        }

        let (Some(date), Some(slot)) = (session.chosen_date, session.chosen_slot) else {
            return Ok(Reply::single(
                "I'm missing some information for your booking. Please specify the date, time slot, handyman, and service needed.",
            ));
        };

        let Some(provider) = self.session_provider(session).await? else {
            return Ok(Reply::single(format!(
                "I couldn't find a handyman named '{}'. Could you please choose from the list of available experts?",
                session.handyman_name.as_deref().unwrap_or_default()
            )));
        };

        if !provider.is_active() {
            info!(provider_id = %provider.id, "Confirmation refused, provider is not active");
            return Ok(Reply::single(format!(
                "Sorry, {} is not taking bookings at the moment. Please choose another handyman.",
                provider.name
            )));
        }

        let fee = self.fare_amount().await?;
        let requester = self.requester_context(session).await?;

        if requester.wallet < fee {
            info!(requester_id = %requester.id, wallet = requester.wallet, fee, "Confirmation blocked, insufficient funds");
            session.stage = BookingStage::InsufficientFunds;
            let mut reply = Reply::new();
            reply.buttons(
                format!(
                    "Looks like you don't have sufficient funds for the booking fee.\n\
                     Your current balance: {}\n\
                     Required amount: {}\n\n\
                     Please top up your wallet before confirming this booking.",
                    ringgit(requester.wallet),
                    ringgit(fee)
                ),
                vec![Button::new("Cancel", CANCEL_REQUEST)],
            );
            return Ok(reply);
        }

        // a reservation held from an earlier turn only needs its fee
        if let Some(held) = self.held_reservation(session, &provider).await? {
            let transaction = fee_for(&held, &requester, fee, self.clock.now());
            self.charge_fee(&transaction).await?;
            info!(reservation_id = %held.id, "Fee recorded for held reservation");
            mark_booked(session, &provider, &held.id);
            return Ok(confirmed(&provider, &held.category, date, slot, fee));
        }

        let reservations = self.store.reservations_for_provider(&provider.id).await?;
        if !is_available(&provider.id, &reservations, date, slot, self.clock.now()) {
            info!(provider_id = %provider.id, %date, %slot, "Slot no longer free");
            return Ok(no_longer_available(&provider, date, slot));
        }

        let problem = session.problem.clone().unwrap_or_default();
        let reservation = match self
            .finalize(&provider, &requester, &problem, date, slot, fee)
            .await
        {
            Ok(reservation) => reservation,
            Err(e @ BookingError::SlotTaken { .. }) => {
                warn!("Lost the slot to a concurrent booking: {}", e);
                return Ok(no_longer_available(&provider, date, slot));
            }
            Err(BookingError::FeeNotRecorded { reservation_id, .. }) => {
                session.handyman_id = Some(provider.id.clone());
                session.handyman_name = Some(provider.name.clone());
                session.booking_id = Some(reservation_id);
                session.stage = BookingStage::DetailsConfirmed;

                let mut reply = Reply::new();
                reply.buttons(
                    format!(
                        "Your slot with {} on {} for {} is held, but we couldn't charge the booking fee yet. \
                         Please confirm again in a moment, or cancel the booking.",
                        provider.name,
                        date,
                        slot.display_range()
                    ),
                    vec![
                        Button::new("Confirm Booking", CONFIRM_BOOKING),
                        Button::new("Cancel Booking", CANCEL_BOOKING),
                    ],
                );
                return Ok(reply);
            }
            Err(e) => return Err(e),
        };

        mark_booked(session, &provider, &reservation.id);
        Ok(confirmed(&provider, &reservation.category, date, slot, fee))
    }

    /// Mark the session's reservation cancelled. The fee stays charged.
    pub async fn cancel_booking(&self, session: &mut SessionSlots) -> Result<Reply> {
        let Some(booking_id) = session.booking_id.clone() else {
            return Ok(Reply::single("No active booking found to cancel."));
        };

        let updated = self
            .store
            .update_reservation_status(&booking_id, JobStatus::Cancelled)
            .await?;

        session.clear_booking_scope();
        session.stage = BookingStage::Cancelled;

        if updated {
            info!(booking_id = %booking_id, "Booking cancelled");
            Ok(Reply::single(
                "Your booking has been canceled. The booking fee is non-refundable.",
            ))
        } else {
            warn!(booking_id = %booking_id, "Cancel requested for unknown booking");
            Ok(Reply::single("I couldn't find your booking in the system."))
        }
    }

    /// Abandon whatever is in progress. Nothing is written.
    pub async fn cancel_request(&self, session: &mut SessionSlots) -> Result<Reply> {
        session.clear_booking_scope();
        session.stage = BookingStage::Cancelled;
        Ok(Reply::single(
            "I've cancelled your booking request. Is there anything else I can help you with?",
        ))
    }

    /// Reservation first, then the fee debit. When the debit keeps
    /// failing the reservation stays and `FeeNotRecorded` carries its id.
    async fn finalize(
        &self,
        provider: &Provider,
        requester: &RequesterContext,
        problem: &str,
        date: NaiveDate,
        slot: TimeSlot,
        fee: f64,
    ) -> Result<Reservation> {
        let now = self.clock.now();
        let reservation = Reservation {
            id: Uuid::new_v4().to_string(),
            provider_id: provider.id.clone(),
            requester_id: requester.id.clone(),
            category: booked_category(&provider.expertise, problem),
            description: problem.to_string(),
            status: JobStatus::Pending,
            slot,
            start_timestamp: date.and_time(slot.start_time()).format(TIMESTAMP_FORMAT).to_string(),
            end_timestamp: date.and_time(slot.end_time()).format(TIMESTAMP_FORMAT).to_string(),
            address: requester.address.clone(),
            latitude: requester.pin.latitude,
            longitude: requester.pin.longitude,
            created_at: now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            has_materials: false,
        };

        self.store.create_reservation(&reservation).await?;
        self.charge_fee(&fee_for(&reservation, requester, fee, now)).await?;

        info!(
            reservation_id = %reservation.id,
            provider_id = %provider.id,
            requester_id = %requester.id,
            %date,
            %slot,
            fee,
            "Booking finalized"
        );

        Ok(reservation)
    }

    /// Append the fee debit, retrying store outages. The transaction id is
    /// derived from the reservation, so a repeated write is a no-op.
    async fn charge_fee(&self, transaction: &FeeTransaction) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.append_fee_transaction(transaction).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_store_failure() && attempt < FEE_WRITE_ATTEMPTS => {
                    warn!(
                        reservation_id = %transaction.booking_id,
                        attempt,
                        "Fee write failed, retrying: {}", e
                    );
                    tokio::time::sleep(FEE_RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        reservation_id = %transaction.booking_id,
                        attempts = attempt,
                        "Reservation saved without its fee: {}", e
                    );
                    return Err(BookingError::FeeNotRecorded {
                        reservation_id: transaction.booking_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Active reservation from an earlier confirm whose fee never landed.
    async fn held_reservation(
        &self,
        session: &SessionSlots,
        provider: &Provider,
    ) -> Result<Option<Reservation>> {
        if session.booking_confirmed {
            return Ok(None);
        }
        let Some(id) = session.booking_id.as_deref() else {
            return Ok(None);
        };

        Ok(self
            .store
            .reservation(id)
            .await?
            .filter(|r| r.status.is_active() && r.provider_id == provider.id))
    }
}

fn fee_for(
    reservation: &Reservation,
    requester: &RequesterContext,
    fee: f64,
    now: chrono::NaiveDateTime,
) -> FeeTransaction {
    FeeTransaction::booking_fee(
        &reservation.id,
        &requester.id,
        fee,
        now.and_utc().timestamp_millis(),
    )
}

fn mark_booked(session: &mut SessionSlots, provider: &Provider, reservation_id: &str) {
    session.handyman_id = Some(provider.id.clone());
    session.handyman_name = Some(provider.name.clone());
    session.booking_id = Some(reservation_id.to_string());
    session.booking_confirmed = true;
    session.selection_in_progress = false;
    session.awaiting_slot_selection = false;
    session.stage = BookingStage::Booked;
}

fn confirmed(provider: &Provider, category: &str, date: NaiveDate, slot: TimeSlot, fee: f64) -> Reply {
    Reply::single(format!(
        "✅ Your booking is confirmed!\n\n\
         Handyman: {}\n\
         Service: {}\n\
         Date: {}\n\
         Time: {}\n\n\
         A processing fee of {} has been charged. You can view your booking details in the app.",
        provider.name,
        category,
        date,
        slot.clock_range(),
        ringgit(fee)
    ))
}

/// Category written on the reservation: the provider's expertise label
/// containing the problem text, else their first label, else the problem
/// text in title case.
pub fn booked_category(expertise: &[String], problem: &str) -> String {
    let needle = problem.trim().to_lowercase();

    if !needle.is_empty() {
        if let Some(label) = expertise.iter().find(|e| e.to_lowercase().contains(&needle)) {
            return label.clone();
        }
    }

    if let Some(first) = expertise.first() {
        return first.clone();
    }

    let titled: Vec<String> = needle
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if titled.is_empty() {
        GENERAL_CATEGORY.to_string()
    } else {
        titled.join(" ")
    }
}

fn no_longer_available(provider: &Provider, date: NaiveDate, slot: TimeSlot) -> Reply {
    Reply::single(format!(
        "Sorry, {} is no longer available on {} for {}. Please choose another time or date.",
        provider.name,
        date,
        slot.display_range()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_booked_category_prefers_matching_label() {
        let expertise = labels(&["Electrician", "Plumber - Pipe Repair"]);
        assert_eq!(booked_category(&expertise, "Pipe"), "Plumber - Pipe Repair");
        assert_eq!(booked_category(&expertise, "leaking tap"), "Electrician");
    }

    #[test]
    fn test_booked_category_without_expertise() {
        assert_eq!(booked_category(&[], "leaking kitchen tap"), "Leaking Kitchen Tap");
        assert_eq!(booked_category(&[], "   "), GENERAL_CATEGORY);
    }
}

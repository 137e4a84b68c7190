use tracing::{debug, info};

use super::{past_date, ringgit, BookingOrchestrator};
use crate::availability::is_available;
use crate::extractor::FreeTextExtractor;
use crate::matcher::{rank, Candidate};
use crate::reply::{Button, Reply, CANCEL_REQUEST, CONFIRM_BOOKING};
use crate::session::{BookingStage, SessionSlots};
use crate::Result;

/// Phrases that skip the confirm prompt.
static AUTO_CONFIRM_PHRASES: &[&str] = &[
    "book it",
    "confirm",
    "go ahead",
    "proceed",
    "book now",
    "do it",
];

pub(crate) fn wants_auto_confirm(utterance: &str) -> bool {
    let lower = utterance.to_lowercase();
    AUTO_CONFIRM_PHRASES.iter().any(|p| lower.contains(p))
}

impl BookingOrchestrator {
    /// Single-shot booking: one utterance in, a confirm prompt or a booked
    /// reservation out.
    pub async fn easy_book(&self, session: &mut SessionSlots, utterance: &str) -> Result<Reply> {
        let extraction = FreeTextExtractor::new(&self.catalog)
            .extract(utterance, self.clock.today(), self.classifier.as_ref())
            .await;

        let category = extraction.category.clone();
        let problem = if extraction.problem.is_empty() {
            category.clone()
        } else {
            extraction.problem.clone()
        };
        let (date, slot) = (extraction.date, extraction.slot);

        if date < self.clock.today() {
            debug!(%date, "Requested date is in the past");
            return Ok(past_date(date));
        }

        let requester = self.requester_context(session).await?;
        let pool = self.provider_pool().await?;
        let ranked = rank(
            &category,
            requester.city.as_deref(),
            requester.coordinates,
            &pool,
            &self.geo,
        );

        if ranked.is_empty() {
            info!(category = %category, "No provider offers this category");
            return Ok(Reply::single(format!(
                "Sorry, I couldn't find any {} expert available. Please try booking manually.",
                category
            )));
        }

        // one snapshot for the whole walk
        let reservations = self.store.reservations().await?;
        let now = self.clock.now();

        let chosen = ranked.merged().into_iter().find(|candidate| {
            let free = is_available(&candidate.provider.id, &reservations, date, slot, now);
            if !free {
                debug!(provider_id = %candidate.provider.id, "Candidate busy, trying next");
            }
            free
        });

        let Some(chosen) = chosen else {
            info!(category = %category, %date, %slot, candidates = ranked.len(), "Every candidate is booked");
            return Ok(Reply::single(format!(
                "Sorry, all {} experts are fully booked for {} on {}. Please try another time or date.",
                category,
                slot.display_range(),
                date
            )));
        };

        info!(
            provider_id = %chosen.provider.id,
            distance_km = ?chosen.distance_km,
            "Selected provider for single-shot booking"
        );

        session.chosen_date = Some(date);
        session.chosen_slot = Some(slot);
        session.handyman_id = Some(chosen.provider.id.clone());
        session.handyman_name = Some(chosen.provider.name.clone());
        session.problem = Some(problem.clone());
        session.expertise_type = Some(category.clone());
        session.stage = BookingStage::ProviderSelected;

        let fee = self.fare_amount().await?;
        let summary = format!(
            "I'll book a top-rated {} for you!\n\n\
             Handyman: {}\n\
             Location: {}\n\
             Rating: {}/5\n\
             Date: {}\n\
             Time: {}\n\
             Problem: {}\n\
             Booking Fee: {}\n\n",
            category,
            chosen.provider.name,
            location_line(chosen),
            chosen.provider.rating,
            date,
            slot.display_range(),
            problem,
            ringgit(fee),
        );

        if requester.wallet < fee {
            info!(requester_id = %requester.id, wallet = requester.wallet, fee, "Insufficient funds");
            session.stage = BookingStage::InsufficientFunds;
            return Ok(Reply::single(format!(
                "{}❌ Uh oh! Looks like you need to top up your wallet.\n\
                 Your current balance: {}\n\
                 Required amount: {}",
                summary,
                ringgit(requester.wallet),
                ringgit(fee)
            )));
        }

        if wants_auto_confirm(utterance) {
            debug!("Confirmation phrase present, finalizing immediately");
            let mut reply = Reply::single(summary.trim_end());
            let confirmation = self.confirm_booking(session).await?;
            reply.messages.extend(confirmation.messages);
            return Ok(reply);
        }

        session.stage = BookingStage::DetailsConfirmed;
        let mut reply = Reply::new();
        reply.buttons(
            format!(
                "{}The booking fee will be automatically deducted from your wallet. Wanna proceed?",
                summary
            ),
            vec![
                Button::new("Yes, great!", CONFIRM_BOOKING),
                Button::new("No, cancel", CANCEL_REQUEST),
            ],
        );
        Ok(reply)
    }
}

fn location_line(candidate: &Candidate) -> String {
    let city = candidate
        .provider
        .city
        .as_deref()
        .unwrap_or("Unknown location");

    match candidate.distance_km {
        Some(d) if d < 5.0 => format!("Very close in {} ({} km away)", city, d),
        Some(d) if d < 15.0 => format!("Nearby in {} ({} km away)", city, d),
        Some(d) => format!("{} km away in {}", d, city),
        None => city.to_string(),
    }
}

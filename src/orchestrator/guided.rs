use chrono::NaiveDate;
use tracing::{debug, info};

use super::{find_by_name, past_date, ringgit, BookingOrchestrator};
use crate::availability::{is_available, weekly_availability};
use crate::matcher::{qualified, split_by_city};
use crate::models::{Provider, TimeSlot};
use crate::reply::{Button, Reply, CANCEL_REQUEST, CONFIRM_BOOKING, NOTIFY_WHEN_AVAILABLE, SHOW_OTHER_LOCATIONS};
use crate::session::{BookingStage, SessionSlots};
use crate::Result;

/// Cards shown per list
const CARD_LIMIT: usize = 3;
/// Out-of-area ids remembered for the follow-up turn
const OTHER_LOCATION_MEMORY: usize = 5;

impl BookingOrchestrator {
    /// Map the intent, then show same-city providers, or offer out-of-area
    /// ones, or offer a notification.
    pub async fn suggest_providers(
        &self,
        session: &mut SessionSlots,
        intent: &str,
        utterance: Option<&str>,
    ) -> Result<Reply> {
        let Some(category) = self.catalog.category_for_intent(intent).map(str::to_string) else {
            debug!(intent, "Intent has no service category");
            return Ok(Reply::single(
                "Sorry, I couldn't identify the problem. Could you please clarify?",
            ));
        };

        let requester = self.requester_context(session).await?;
        let pool = self.provider_pool().await?;
        let split = split_by_city(&category, requester.city.as_deref(), &pool);

        session.problem = utterance.map(str::to_string).or_else(|| session.problem.take());
        session.expertise_type = Some(category.clone());
        session.stage = BookingStage::ProvidersSuggested;

        info!(
            category = %category,
            city = ?requester.city,
            same_city = split.same_city.len(),
            other_cities = split.other_cities.len(),
            "Providers matched"
        );

        let mut reply = Reply::new();

        if !split.same_city.is_empty() {
            let top = &split.same_city[..split.same_city.len().min(CARD_LIMIT)];
            let city = requester.city.as_deref().unwrap_or("your area");

            let mut text = format!(
                "Here are some recommended {} experts in {}:\n",
                category.to_lowercase(),
                city
            );
            for provider in top {
                text.push_str(&format!("- {} (Rating: {})\n", provider.name, provider.rating));
            }
            text.push_str("\nWould you like to book any of these experts?");

            reply.text(text).providers(top, category.clone());
            session.selection_in_progress = true;
            session.stage = BookingStage::SameCityShown;
        } else if !split.other_cities.is_empty() {
            reply.buttons(
                format!(
                    "Looks like there is no {} handyman at your location. Would you like to look outside your location?",
                    category.to_lowercase()
                ),
                vec![
                    Button::new("Yes, show me other locations", SHOW_OTHER_LOCATIONS),
                    Button::new("No, cancel my request", CANCEL_REQUEST),
                ],
            );
            session.handymen_from_other_locations = split
                .other_cities
                .iter()
                .take(OTHER_LOCATION_MEMORY)
                .map(|p| p.id.clone())
                .collect();
            session.stage = BookingStage::OtherLocationOffered;
        } else {
            reply.buttons(
                format!(
                    "Sorry, no {} experts are available at the moment. Would you like to be notified when one becomes available?",
                    category.to_lowercase()
                ),
                vec![
                    Button::new("Yes, notify me", NOTIFY_WHEN_AVAILABLE),
                    Button::new("No, cancel my request", CANCEL_REQUEST),
                ],
            );
        }

        Ok(reply)
    }

    /// Providers outside the requester's city, best rated first.
    pub async fn show_other_locations(&self, session: &mut SessionSlots) -> Result<Reply> {
        session.handyman_id = None;
        session.handyman_name = None;
        session.chosen_date = None;
        session.chosen_slot = None;

        let category = match session.expertise_type.clone() {
            Some(category) => category,
            None => self
                .catalog
                .infer_from_problem(session.problem.as_deref().unwrap_or_default()),
        };

        let requester = self.requester_context(session).await?;
        let pool = self.provider_pool().await?;
        let others = split_by_city(&category, requester.city.as_deref(), &pool).other_cities;

        session.expertise_type = Some(category.clone());

        if others.is_empty() {
            return Ok(Reply::single(format!(
                "I'm sorry, there are no {} specialists available in other areas at the moment.",
                category.to_lowercase()
            )));
        }

        let mut reply = Reply::new();
        reply
            .text(format!(
                "Here are {} experts available in other areas:",
                category.to_lowercase()
            ))
            .providers(others.iter().take(CARD_LIMIT), category.clone())
            .text("Please select one of these experts to view their availability.");

        session.handymen_from_other_locations = others.iter().map(|p| p.id.clone()).collect();
        session.selection_in_progress = true;
        session.stage = BookingStage::OtherLocationOffered;

        Ok(reply)
    }

    /// Pick a provider by id or name and show the week ahead. Only active
    /// providers offering the session's category can be picked.
    pub async fn select_provider(&self, session: &mut SessionSlots, reference: &str) -> Result<Reply> {
        let pool = self.provider_pool().await?;
        let eligible: Vec<Provider> = match session.expertise_type.as_deref() {
            Some(category) => qualified(category, &pool).into_iter().cloned().collect(),
            None => pool.into_iter().filter(Provider::is_active).collect(),
        };
        let reference = reference.trim();

        let found = eligible
            .iter()
            .find(|p| p.id == reference)
            .or_else(|| find_by_name(&eligible, reference));

        let Some(provider) = found else {
            return Ok(Reply::single(format!(
                "I couldn't find a handyman named '{}'. Could you please choose from the list of available experts?",
                reference
            )));
        };

        info!(provider_id = %provider.id, name = %provider.name, "Provider selected");

        session.handyman_id = Some(provider.id.clone());
        session.handyman_name = Some(provider.name.clone());
        session.selection_in_progress = false;
        session.stage = BookingStage::ProviderSelected;

        self.schedule_reply(session, provider).await
    }

    /// Week ahead for the provider already in the session.
    pub async fn check_availability(&self, session: &mut SessionSlots) -> Result<Reply> {
        if session.handyman_id.is_none() && session.handyman_name.is_none() {
            return Ok(Reply::single("Please specify which handyman you'd like to check."));
        }

        match self.session_provider(session).await? {
            Some(provider) => {
                session.handyman_id = Some(provider.id.clone());
                session.handyman_name = Some(provider.name.clone());
                self.schedule_reply(session, &provider).await
            }
            None => Ok(Reply::single(format!(
                "Sorry, I couldn't find any handyman named {}.",
                session.handyman_name.as_deref().unwrap_or_default()
            ))),
        }
    }

    /// Record a date and slot once the provider is free then, and go
    /// straight on to the booking summary.
    pub async fn choose_slot(
        &self,
        session: &mut SessionSlots,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<Reply> {
        let Some(provider) = self.session_provider(session).await? else {
            return Ok(Reply::single(
                "Please choose a handyman first, then pick a date and time slot.",
            ));
        };

        if date < self.clock.today() {
            let mut reply = past_date(date);
            let schedule = self.schedule_reply(session, &provider).await?;
            reply.messages.extend(schedule.messages);
            return Ok(reply);
        }

        let reservations = self.store.reservations_for_provider(&provider.id).await?;
        if !is_available(&provider.id, &reservations, date, slot, self.clock.now()) {
            let mut reply = Reply::single(format!(
                "Sorry, {} is not available on {} for {}. Please pick another slot.",
                provider.name,
                date,
                slot.display_range()
            ));
            let schedule = self.schedule_reply(session, &provider).await?;
            reply.messages.extend(schedule.messages);
            return Ok(reply);
        }

        session.handyman_id = Some(provider.id.clone());
        session.handyman_name = Some(provider.name.clone());
        session.chosen_date = Some(date);
        session.chosen_slot = Some(slot);
        session.awaiting_slot_selection = false;

        self.show_booking_details(session).await
    }

    /// Summary plus the payment check. Nothing is written here.
    pub async fn show_booking_details(&self, session: &mut SessionSlots) -> Result<Reply> {
        if session.handyman_id.is_none() {
            if let Some(provider) = self.session_provider(session).await? {
                session.handyman_id = Some(provider.id);
            }
        }

        let (Some(name), Some(date), Some(slot)) = (
            session.handyman_name.clone(),
            session.chosen_date,
            session.chosen_slot,
        ) else {
            return Ok(Reply::single(
                "I'm missing some booking information. Please provide the handyman name, date, and time slot.",
            ));
        };

        let fee = self.fare_amount().await?;
        let requester = self.requester_context(session).await?;

        let summary = format!(
            "Here's your booking summary:\n\n\
             Handyman: {}\n\
             Date: {}\n\
             Time: {}\n\
             Problem: {}\n\
             Booking Fee: {}\n\
             Address: {}\n\n",
            name,
            date,
            slot.display_range(),
            session.problem.as_deref().unwrap_or("Not specified"),
            ringgit(fee),
            requester.address,
        );

        let mut reply = Reply::new();
        if requester.wallet < fee {
            info!(requester_id = %requester.id, wallet = requester.wallet, fee, "Insufficient funds");
            reply.buttons(
                format!(
                    "{}Looks like you don't have sufficient funds for the booking fee.\n\
                     Your current balance: {}\n\
                     Required amount: {}\n\n\
                     Please top up your wallet before confirming this booking.",
                    summary,
                    ringgit(requester.wallet),
                    ringgit(fee)
                ),
                vec![Button::new("Cancel", CANCEL_REQUEST)],
            );
            session.stage = BookingStage::InsufficientFunds;
        } else {
            reply.buttons(
                format!("{}Would you like to confirm this booking?", summary),
                vec![
                    Button::new("Confirm Booking", CONFIRM_BOOKING),
                    Button::new("Cancel", CANCEL_REQUEST),
                ],
            );
            session.stage = BookingStage::DetailsConfirmed;
        }

        Ok(reply)
    }

    async fn schedule_reply(&self, session: &mut SessionSlots, provider: &Provider) -> Result<Reply> {
        let reservations = self.store.reservations_for_provider(&provider.id).await?;
        let days = weekly_availability(&provider.id, &reservations, self.clock.now());

        session.awaiting_slot_selection = !days.is_empty();
        session.stage = BookingStage::ScheduleShown;

        if days.is_empty() {
            return Ok(Reply::single(format!(
                "Sorry, {} has no available slots in the next 7 days.",
                provider.name
            )));
        }

        let lines: Vec<String> = days
            .iter()
            .map(|day| {
                let slots: Vec<&str> = day.slots.iter().map(TimeSlot::label).collect();
                format!("{} ({}): {}", day.date.format("%A"), day.date, slots.join(", "))
            })
            .collect();

        Ok(Reply::single(format!(
            "{} is available at the following times:\n{}",
            provider.name,
            lines.join("\n")
        )))
    }
}

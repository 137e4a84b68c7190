//! Session slots and the per-conversation registry
//!
//! The dialogue manager owns the conversation; the booking core reads and
//! writes these named slots. The registry hands out one lock per
//! conversation so that its turns run one after another.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::models::TimeSlot;

/// Where a booking attempt stands.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStage {
    #[default]
    ProblemIdentified,
    ProvidersSuggested,
    SameCityShown,
    OtherLocationOffered,
    ProviderSelected,
    ScheduleShown,
    DetailsConfirmed,
    InsufficientFunds,
    Booked,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSlots {
    pub requester_id: Option<String>,
    pub requester_name: Option<String>,
    /// Requester's city as told in conversation
    pub location: Option<String>,
    pub problem: Option<String>,
    pub expertise_type: Option<String>,
    pub chosen_date: Option<NaiveDate>,
    pub chosen_slot: Option<TimeSlot>,
    pub handyman_id: Option<String>,
    pub handyman_name: Option<String>,
    pub booking_id: Option<String>,
    pub booking_confirmed: bool,
    pub selection_in_progress: bool,
    pub awaiting_slot_selection: bool,
    /// Provider ids offered from outside the requester's city
    pub handymen_from_other_locations: Vec<String>,
    pub stage: BookingStage,
}

impl SessionSlots {
    pub fn for_requester(requester_id: impl Into<String>) -> Self {
        Self {
            requester_id: Some(requester_id.into()),
            ..Default::default()
        }
    }

    /// Drop everything tied to the current booking attempt. Requester
    /// identity and location stay.
    pub fn clear_booking_scope(&mut self) {
        self.problem = None;
        self.expertise_type = None;
        self.chosen_date = None;
        self.chosen_slot = None;
        self.handyman_id = None;
        self.handyman_name = None;
        self.booking_id = None;
        self.booking_confirmed = false;
        self.selection_in_progress = false;
        self.awaiting_slot_selection = false;
        self.handymen_from_other_locations.clear();
    }

    /// Names of the slots a confirmation still needs.
    pub fn missing_for_confirmation(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.requester_id.is_none() {
            missing.push("requester_id");
        }
        if self.handyman_id.is_none() && self.handyman_name.is_none() {
            missing.push("handyman");
        }
        if self.chosen_date.is_none() {
            missing.push("chosen_date");
        }
        if self.chosen_slot.is_none() {
            missing.push("chosen_slot");
        }
        if self.problem.as_deref().map_or(true, |p| p.trim().is_empty()) {
            missing.push("problem");
        }
        missing
    }
}

struct SessionEntry {
    slots: Arc<Mutex<SessionSlots>>,
    last_used: Instant,
}

/// Session slots keyed by conversation (sender) id.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Exclusive access to one conversation's slots for the length of a
    /// turn. Unknown ids start with a fresh session for that requester.
    pub async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<SessionSlots> {
        let slot = {
            let mut sessions = self.sessions.write().await;
            let entry = sessions
                .entry(conversation_id.to_string())
                .or_insert_with(|| {
                    debug!(conversation_id, "New session");
                    SessionEntry {
                        slots: Arc::new(Mutex::new(SessionSlots::for_requester(conversation_id))),
                        last_used: Instant::now(),
                    }
                });
            entry.last_used = Instant::now();
            entry.slots.clone()
        };

        slot.lock_owned().await
    }

    pub async fn snapshot(&self, conversation_id: &str) -> Option<SessionSlots> {
        let slot = self
            .sessions
            .read()
            .await
            .get(conversation_id)
            .map(|entry| entry.slots.clone())?;
        let guard = slot.lock().await;
        Some(guard.clone())
    }

    /// Drop sessions idle for at least `max_idle`. Sessions with a turn in
    /// flight or waiting are kept. Returns how many were dropped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            Arc::strong_count(&entry.slots) > 1 || entry.last_used.elapsed() < max_idle
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    /// Background sweep calling [`evict_idle`](Self::evict_idle) every
    /// `max_idle / 2`, for the life of the process.
    pub fn spawn_eviction(self: &Arc<Self>, max_idle: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = (max_idle / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                registry.evict_idle(max_idle).await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_keeps_identity() {
        let mut slots = SessionSlots::for_requester("u1");
        slots.location = Some("Klang".into());
        slots.problem = Some("leak".into());
        slots.handyman_id = Some("h1".into());
        slots.booking_confirmed = true;
        slots.handymen_from_other_locations = vec!["h2".into()];

        slots.clear_booking_scope();

        assert_eq!(slots.requester_id.as_deref(), Some("u1"));
        assert_eq!(slots.location.as_deref(), Some("Klang"));
        assert!(slots.problem.is_none());
        assert!(slots.handyman_id.is_none());
        assert!(!slots.booking_confirmed);
        assert!(slots.handymen_from_other_locations.is_empty());
    }

    #[test]
    fn test_missing_for_confirmation() {
        let mut slots = SessionSlots::for_requester("u1");
        assert_eq!(
            slots.missing_for_confirmation(),
            vec!["handyman", "chosen_date", "chosen_slot", "problem"]
        );
        slots.handyman_name = Some("Ali".into());
        slots.problem = Some("leaking tap".into());
        slots.chosen_date = NaiveDate::from_ymd_opt(2026, 10, 20);
        slots.chosen_slot = Some(TimeSlot::Morning);
        assert!(slots.missing_for_confirmation().is_empty());
    }

    #[tokio::test]
    async fn test_turns_for_one_conversation_are_serialised() {
        let registry = Arc::new(SessionRegistry::new());
        let mut first = registry.lock("c1").await;
        first.problem = Some("first".into());

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut second = registry.lock("c1").await;
                second.problem = Some("second".into());
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // a different conversation is not blocked
        drop(registry.lock("c2").await);

        drop(first);
        waiter.await.unwrap();
        let slots = registry.snapshot("c1").await.unwrap();
        assert_eq!(slots.problem.as_deref(), Some("second"));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted_busy_ones_kept() {
        let registry = SessionRegistry::new();
        let busy = registry.lock("busy").await;
        {
            let mut idle = registry.lock("idle").await;
            idle.problem = Some("leak".into());
        }
        assert_eq!(registry.len().await, 2);

        // a long idle limit keeps everything
        assert_eq!(registry.evict_idle(Duration::from_secs(3600)).await, 0);

        assert_eq!(registry.evict_idle(Duration::ZERO).await, 1);
        assert!(registry.snapshot("idle").await.is_none());
        assert_eq!(registry.len().await, 1);
        drop(busy);

        // the evicted conversation starts over
        let fresh = registry.lock("idle").await;
        assert!(fresh.problem.is_none());
        assert_eq!(fresh.requester_id.as_deref(), Some("idle"));
    }
}

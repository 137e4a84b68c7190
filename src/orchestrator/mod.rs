//! Booking orchestrator - one user turn per call
//!
//! Guided:  ProblemIdentified → ProvidersSuggested → SameCityShown | OtherLocationOffered
//!          → ProviderSelected → ScheduleShown → DetailsConfirmed | InsufficientFunds
//!          → Booked | Cancelled
//! Single-shot: extract → rank → first available → confirm prompt or auto-confirm
//!
//! Both flows share the requester lookup, the payment check and
//! finalization. Every operation works on a draft of the session that is
//! committed only when the operation succeeds.

mod easy;
mod finalize;
mod guided;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::catalog::ExpertiseCatalog;
use crate::classifier::IntentClassifier;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::BookingError;
use crate::geo::GeoProximityIndex;
use crate::models::{Coordinates, Fare, Provider, Requester, TimeSlot};
use crate::reply::Reply;
use crate::session::SessionSlots;
use crate::store::BookingStore;
use crate::Result;

pub use finalize::booked_category;

pub const TRY_AGAIN_LATER: &str =
    "Sorry, something went wrong on our side. Please try again later.";

const DEFAULT_ADDRESS: &str = "Default Address";

/// One inbound turn, as the dialogue manager names it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    InitializeSession {
        #[serde(default)]
        name: Option<String>,
    },
    SuggestProviders {
        intent: String,
        #[serde(default)]
        text: Option<String>,
    },
    ShowOtherLocations,
    SelectProvider {
        provider: String,
    },
    CheckAvailability,
    ChooseSlot {
        date: NaiveDate,
        slot: TimeSlot,
    },
    ShowBookingDetails,
    ConfirmBooking,
    CancelBooking,
    CancelRequest,
    EasyBook {
        text: String,
    },
    ResetConversation,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::InitializeSession { .. } => "initialize_session",
            Action::SuggestProviders { .. } => "suggest_providers",
            Action::ShowOtherLocations => "show_other_locations",
            Action::SelectProvider { .. } => "select_provider",
            Action::CheckAvailability => "check_availability",
            Action::ChooseSlot { .. } => "choose_slot",
            Action::ShowBookingDetails => "show_booking_details",
            Action::ConfirmBooking => "confirm_booking",
            Action::CancelBooking => "cancel_booking",
            Action::CancelRequest => "cancel_request",
            Action::EasyBook { .. } => "easy_book",
            Action::ResetConversation => "reset_conversation",
        }
    }
}

/// Fallbacks used when the store has no value.
#[derive(Debug, Clone, Copy)]
pub struct BookingDefaults {
    pub fare: f64,
    pub coordinates: Coordinates,
}

impl Default for BookingDefaults {
    fn default() -> Self {
        let config = AppConfig::default();
        Self::from(&config)
    }
}

impl From<&AppConfig> for BookingDefaults {
    fn from(config: &AppConfig) -> Self {
        Self {
            fare: config.default_fare,
            coordinates: config.default_coordinates,
        }
    }
}

/// Requester data as a booking needs it, with fallbacks applied.
#[derive(Debug, Clone)]
pub(crate) struct RequesterContext {
    pub id: String,
    pub wallet: f64,
    pub city: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub address: String,
    pub pin: Coordinates,
}

/// Main orchestrator that owns the booking state machine
pub struct BookingOrchestrator {
    store: Arc<dyn BookingStore>,
    classifier: Arc<dyn IntentClassifier>,
    catalog: Arc<ExpertiseCatalog>,
    geo: Arc<GeoProximityIndex>,
    clock: Arc<dyn Clock>,
    defaults: BookingDefaults,
}

impl BookingOrchestrator {
    pub fn new(
        store: Arc<dyn BookingStore>,
        classifier: Arc<dyn IntentClassifier>,
        catalog: Arc<ExpertiseCatalog>,
        geo: Arc<GeoProximityIndex>,
        clock: Arc<dyn Clock>,
        defaults: BookingDefaults,
    ) -> Self {
        Self {
            store,
            classifier,
            catalog,
            geo,
            clock,
            defaults,
        }
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one turn. The session is only updated when the operation
    /// succeeds; store failures turn into a generic apology.
    pub async fn handle(&self, session: &mut SessionSlots, action: Action) -> Reply {
        let name = action.name();
        let mut draft = session.clone();

        match self.dispatch(&mut draft, action).await {
            Ok(reply) => {
                info!(action = name, stage = ?draft.stage, "Turn complete");
                *session = draft;
                reply
            }
            Err(e) => {
                error!(action = name, "Turn failed, session left unchanged: {}", e);
                Reply::single(TRY_AGAIN_LATER)
            }
        }
    }

    pub async fn dispatch(&self, session: &mut SessionSlots, action: Action) -> Result<Reply> {
        match action {
            Action::InitializeSession { name } => self.initialize_session(session, name).await,
            Action::SuggestProviders { intent, text } => {
                self.suggest_providers(session, &intent, text.as_deref()).await
            }
            Action::ShowOtherLocations => self.show_other_locations(session).await,
            Action::SelectProvider { provider } => self.select_provider(session, &provider).await,
            Action::CheckAvailability => self.check_availability(session).await,
            Action::ChooseSlot { date, slot } => self.choose_slot(session, date, slot).await,
            Action::ShowBookingDetails => self.show_booking_details(session).await,
            Action::ConfirmBooking => self.confirm_booking(session).await,
            Action::CancelBooking => self.cancel_booking(session).await,
            Action::CancelRequest => self.cancel_request(session).await,
            Action::EasyBook { text } => self.easy_book(session, &text).await,
            Action::ResetConversation => self.reset_conversation(session).await,
        }
    }

    /// Create a minimal requester record on first contact.
    pub async fn initialize_session(
        &self,
        session: &mut SessionSlots,
        name: Option<String>,
    ) -> Result<Reply> {
        let requester_id = session
            .requester_id
            .clone()
            .ok_or_else(|| BookingError::StoreUnavailable("session has no requester id".to_string()))?;

        let display_name = match self.store.requester(&requester_id).await? {
            Some(existing) => {
                if existing.name.is_empty() {
                    name.clone().unwrap_or_default()
                } else {
                    existing.name
                }
            }
            None => {
                let requester = Requester {
                    id: requester_id.clone(),
                    name: name.clone().unwrap_or_default(),
                    primary_address: None,
                    wallet: 0.0,
                    created_at: Some(self.clock.now().and_utc().timestamp_millis()),
                };
                self.store.upsert_requester(&requester).await?;
                info!(requester_id = %requester_id, "Requester record created");
                requester.name
            }
        };

        session.requester_name = Some(display_name.clone()).filter(|n| !n.is_empty());

        let greeting = match session.requester_name.as_deref() {
            Some(n) => format!("Hi {}! Tell me what needs fixing and I'll find you a handyman.", n),
            None => "Hi! Tell me what needs fixing and I'll find you a handyman.".to_string(),
        };
        Ok(Reply::single(greeting))
    }

    /// Start over: every slot back to its initial value, requester kept.
    pub async fn reset_conversation(&self, session: &mut SessionSlots) -> Result<Reply> {
        *session = match session.requester_id.take() {
            Some(id) => SessionSlots::for_requester(id),
            None => SessionSlots::default(),
        };
        info!(requester_id = ?session.requester_id, "Conversation reset");
        Ok(Reply::single("Let's start over. What needs fixing?"))
    }

    //
    // ================= Shared subroutines =================
    //

    /// Full provider snapshot. An empty pool means the store gave us
    /// nothing to work with.
    pub(crate) async fn provider_pool(&self) -> Result<Vec<Provider>> {
        let pool = self.store.providers().await?;
        if pool.is_empty() {
            return Err(BookingError::StoreUnavailable(
                "provider pool is empty".to_string(),
            ));
        }
        Ok(pool)
    }

    pub(crate) async fn fare_amount(&self) -> Result<f64> {
        Ok(self
            .store
            .fare()
            .await?
            .unwrap_or(Fare {
                amount: self.defaults.fare,
            })
            .amount)
    }

    pub(crate) async fn requester_context(&self, session: &SessionSlots) -> Result<RequesterContext> {
        let id = session.requester_id.clone().unwrap_or_default();
        let requester = if id.is_empty() {
            None
        } else {
            self.store.requester(&id).await?
        };

        if requester.is_none() {
            warn!(requester_id = %id, "No requester record, using defaults");
        }

        let city = requester
            .as_ref()
            .and_then(|r| r.city().map(str::to_string))
            .or_else(|| session.location.clone());
        let coordinates = requester.as_ref().and_then(Requester::coordinates);
        let address = requester
            .as_ref()
            .and_then(|r| r.primary_address.as_ref())
            .and_then(|a| a.formatted())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

        Ok(RequesterContext {
            id,
            wallet: requester.as_ref().map_or(0.0, |r| r.wallet),
            city,
            coordinates,
            address,
            pin: coordinates.unwrap_or(self.defaults.coordinates),
        })
    }

    /// Look up the provider named in the session, by id first.
    pub(crate) async fn session_provider(&self, session: &SessionSlots) -> Result<Option<Provider>> {
        if let Some(id) = session.handyman_id.as_deref() {
            if let Some(provider) = self.store.provider(id).await? {
                return Ok(Some(provider));
            }
        }

        match session.handyman_name.as_deref() {
            Some(name) => {
                let pool = self.provider_pool().await?;
                Ok(find_by_name(&pool, name).cloned())
            }
            None => Ok(None),
        }
    }
}

/// Case-insensitive name lookup: whole query inside the name, or any of
/// its words inside the name.
pub(crate) fn find_by_name<'a>(pool: &'a [Provider], query: &str) -> Option<&'a Provider> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }

    pool.iter()
        .find(|p| p.name.to_lowercase().contains(&query))
        .or_else(|| {
            pool.iter().find(|p| {
                let name = p.name.to_lowercase();
                query.split_whitespace().any(|word| name.contains(word))
            })
        })
}

pub(crate) fn past_date(date: NaiveDate) -> Reply {
    Reply::single(format!(
        "Sorry, {} has already passed. Please choose today or a later date.",
        date
    ))
}

/// Money as shown to requesters.
pub(crate) fn ringgit(amount: f64) -> String {
    format!("RM{}", amount)
}

//! Handyman Booking Agent
//!
//! Decision core behind a conversational booking assistant:
//! - Maps a classified problem onto a service category
//! - Matches providers by expertise, city and geographic proximity
//! - Resolves free slots over a rolling 7-day window
//! - Checks the wallet against the booking fee before anything is written
//! - Persists the reservation, then its fee debit
//!
//! TURN LOOP:
//! ACTION → (EXTRACT) → MATCH → AVAILABILITY → PAYMENT CHECK → FINALIZE | PROMPT

pub mod api;
pub mod availability;
pub mod catalog;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod extractor;
pub mod geo;
pub mod matcher;
pub mod models;
pub mod nlu;
pub mod orchestrator;
pub mod reply;
pub mod session;
pub mod store;

pub use error::{BookingError, Result};

// Re-export common types
pub use models::*;
pub use classifier::{Classification, IntentClassifier, KeywordClassifier};
pub use orchestrator::{Action, BookingDefaults, BookingOrchestrator};
pub use reply::{BotMessage, Reply};
pub use session::{BookingStage, SessionRegistry, SessionSlots};
pub use store::{BookingStore, InMemoryBookingStore, PgBookingStore};

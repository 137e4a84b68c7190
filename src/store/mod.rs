//! Booking persistence layer
//!
//! Providers, reservations, requesters, the fare record and the fee ledger.
//! In-memory for development and tests; Postgres when a database URL is
//! configured.

mod postgres;

pub use postgres::PgBookingStore;

use crate::error::BookingError;
use crate::models::{
    FeeTransaction, Fare, JobStatus, Provider, Requester, Reservation,
};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trait for booking persistence
#[async_trait::async_trait]
pub trait BookingStore: Send + Sync {
    /// Every provider document that decodes.
    async fn providers(&self) -> Result<Vec<Provider>>;
    async fn provider(&self, id: &str) -> Result<Option<Provider>>;

    async fn reservations(&self) -> Result<Vec<Reservation>>;
    async fn reservation(&self, id: &str) -> Result<Option<Reservation>>;

    async fn reservations_for_provider(&self, provider_id: &str) -> Result<Vec<Reservation>> {
        Ok(self
            .reservations()
            .await?
            .into_iter()
            .filter(|r| r.provider_id == provider_id)
            .collect())
    }

    /// Conditional write: fails with `SlotTaken` when an active reservation
    /// already holds the same (provider, date, slot).
    async fn create_reservation(&self, reservation: &Reservation) -> Result<()>;

    /// Returns false when no such reservation exists.
    async fn update_reservation_status(&self, id: &str, status: JobStatus) -> Result<bool>;

    async fn fare(&self) -> Result<Option<Fare>>;

    async fn requester(&self, id: &str) -> Result<Option<Requester>>;
    async fn upsert_requester(&self, requester: &Requester) -> Result<()>;

    /// Append-only; writing an id that already exists is a no-op.
    async fn append_fee_transaction(&self, transaction: &FeeTransaction) -> Result<()>;
}

/// Whether `existing` blocks `candidate` from being written.
pub(crate) fn holds_same_slot(existing: &Reservation, candidate: &Reservation) -> bool {
    existing.status.is_active()
        && existing.provider_id == candidate.provider_id
        && existing.slot == candidate.slot
        && existing.start_date().is_some()
        && existing.start_date() == candidate.start_date()
}

pub(crate) fn slot_taken(reservation: &Reservation) -> BookingError {
    BookingError::SlotTaken {
        provider_id: reservation.provider_id.clone(),
        date: reservation
            .start_date()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        slot: reservation.slot.label().to_string(),
    }
}

/// In-memory booking store for development
pub struct InMemoryBookingStore {
    providers: Arc<RwLock<HashMap<String, Provider>>>,
    reservations: Arc<RwLock<HashMap<String, Reservation>>>,
    requesters: Arc<RwLock<HashMap<String, Requester>>>,
    fee_transactions: Arc<RwLock<HashMap<String, FeeTransaction>>>,
    fare: Arc<RwLock<Option<Fare>>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
            reservations: Arc::new(RwLock::new(HashMap::new())),
            requesters: Arc::new(RwLock::new(HashMap::new())),
            fee_transactions: Arc::new(RwLock::new(HashMap::new())),
            fare: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn insert_provider(&self, provider: Provider) {
        let mut providers = self.providers.write().await;
        providers.insert(provider.id.clone(), provider);
    }

    /// Bypasses the slot check. Seeding only.
    pub async fn insert_reservation(&self, reservation: Reservation) {
        let mut reservations = self.reservations.write().await;
        reservations.insert(reservation.id.clone(), reservation);
    }

    pub async fn set_fare(&self, fare: Option<Fare>) {
        *self.fare.write().await = fare;
    }

    pub async fn fee_transactions(&self) -> Vec<FeeTransaction> {
        self.fee_transactions.read().await.values().cloned().collect()
    }
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn providers(&self) -> Result<Vec<Provider>> {
        let providers = self.providers.read().await;
        let mut all: Vec<Provider> = providers.values().cloned().collect();
        // HashMap order is random, keep listings stable
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn provider(&self, id: &str) -> Result<Option<Provider>> {
        Ok(self.providers.read().await.get(id).cloned())
    }

    async fn reservations(&self) -> Result<Vec<Reservation>> {
        Ok(self.reservations.read().await.values().cloned().collect())
    }

    async fn reservation(&self, id: &str) -> Result<Option<Reservation>> {
        Ok(self.reservations.read().await.get(id).cloned())
    }

    async fn create_reservation(&self, reservation: &Reservation) -> Result<()> {
        // check and insert under one write lock
        let mut reservations = self.reservations.write().await;

        if reservation.status.is_active()
            && reservations
                .values()
                .any(|existing| holds_same_slot(existing, reservation))
        {
            return Err(slot_taken(reservation));
        }

        reservations.insert(reservation.id.clone(), reservation.clone());
        debug!(reservation_id = %reservation.id, "Reservation stored");
        Ok(())
    }

    async fn update_reservation_status(&self, id: &str, status: JobStatus) -> Result<bool> {
        let mut reservations = self.reservations.write().await;
        match reservations.get_mut(id) {
            Some(reservation) => {
                reservation.status = status;
                info!(reservation_id = id, %status, "Reservation status updated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fare(&self) -> Result<Option<Fare>> {
        Ok(*self.fare.read().await)
    }

    async fn requester(&self, id: &str) -> Result<Option<Requester>> {
        Ok(self.requesters.read().await.get(id).cloned())
    }

    async fn upsert_requester(&self, requester: &Requester) -> Result<()> {
        let mut requesters = self.requesters.write().await;
        requesters.insert(requester.id.clone(), requester.clone());
        Ok(())
    }

    async fn append_fee_transaction(&self, transaction: &FeeTransaction) -> Result<()> {
        let mut ledger = self.fee_transactions.write().await;
        ledger
            .entry(transaction.id.clone())
            .or_insert_with(|| transaction.clone());
        Ok(())
    }
}

//! Error types for the booking core

use thiserror::Error;

/// Result type alias for booking operations
pub type Result<T> = std::result::Result<T, BookingError>;

#[derive(Error, Debug)]
pub enum BookingError {

    // =============================
    // Collaborator Failures
    // =============================

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    // =============================
    // Booking Outcomes
    // =============================

    #[error("Slot taken: {provider_id} on {date} ({slot})")]
    SlotTaken {
        provider_id: String,
        date: String,
        slot: String,
    },

    /// The reservation exists but its fee debit could not be written.
    #[error("Fee not recorded for reservation {reservation_id}: {reason}")]
    FeeNotRecorded {
        reservation_id: String,
        reason: String,
    },

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Dataset error: {0}")]
    DatasetError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BookingError {
    /// Transient store failures, worth another attempt.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, BookingError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_outages_are_retryable() {
        assert!(BookingError::StoreUnavailable("timeout".into()).is_store_failure());
        assert!(!BookingError::InvalidSlot("Slot 9".into()).is_store_failure());
        assert!(!BookingError::SlotTaken {
            provider_id: "p1".into(),
            date: "2026-10-20".into(),
            slot: "Slot 1".into(),
        }
        .is_store_failure());
    }
}

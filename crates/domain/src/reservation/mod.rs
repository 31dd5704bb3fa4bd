//! Time-bounded stock reservations.

mod aggregate;
mod events;
mod status;

pub use aggregate::Reservation;
pub use events::{
    ReservationConfirmedData, ReservationCreatedData, ReservationEvent, ReservationExpiredData,
    ReservationReleasedData,
};
pub use status::ReservationStatus;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during reservation operations.
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Reservation already exists")]
    AlreadyExists,

    #[error("Reservation does not exist")]
    NotCreated,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid reservation TTL: {ttl_secs}s")]
    InvalidTtl { ttl_secs: i64 },

    #[error("Illegal reservation transition: {from} -> {to}")]
    IllegalTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Reservation expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    #[error("Reservation does not expire until {expires_at}")]
    NotYetExpired { expires_at: DateTime<Utc> },
}

impl ReservationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReservationError::InvalidQuantity { .. } | ReservationError::InvalidTtl { .. } => {
                ErrorKind::Validation
            }
            ReservationError::NotCreated => ErrorKind::NotFound,
            ReservationError::AlreadyExists
            | ReservationError::IllegalTransition { .. }
            | ReservationError::Expired { .. }
            | ReservationError::NotYetExpired { .. } => ErrorKind::BusinessRule,
        }
    }
}

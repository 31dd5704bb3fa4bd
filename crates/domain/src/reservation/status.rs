//! Reservation state machine.

use serde::{Deserialize, Serialize};

use super::ReservationError;

/// The status of a reservation.
///
/// State transitions:
/// ```text
/// Active ──┬──► Confirmed
///          ├──► Released
///          └──► Expired
/// ```
/// Every state but `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    #[default]
    Active,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (
                ReservationStatus::Active,
                ReservationStatus::Confirmed | ReservationStatus::Released | ReservationStatus::Expired
            )
        )
    }

    /// Consulted before every mutation.
    pub fn validate_transition(&self, next: ReservationStatus) -> Result<(), ReservationError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ReservationError::IllegalTransition {
                from: *self,
                to: next,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

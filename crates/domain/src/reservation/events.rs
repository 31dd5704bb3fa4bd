//! Reservation domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{OrderId, ProductId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReservationEvent {
    ReservationCreated(ReservationCreatedData),
    ReservationConfirmed(ReservationConfirmedData),
    ReservationReleased(ReservationReleasedData),
    ReservationExpired(ReservationExpiredData),
}

impl DomainEvent for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::ReservationCreated(_) => "ReservationCreated",
            ReservationEvent::ReservationConfirmed(_) => "ReservationConfirmed",
            ReservationEvent::ReservationReleased(_) => "ReservationReleased",
            ReservationEvent::ReservationExpired(_) => "ReservationExpired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationCreatedData {
    pub reservation_id: AggregateId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfirmedData {
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationReleasedData {
    pub released_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationExpiredData {
    pub expired_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub const BOOKINGS: &str = "bookings";
pub const RIDES: &str = "rides";
pub const ADS: &str = "ads";

/// What the requester is asking for: a seat on the ride, or paid access to
/// the counterparty's contact details.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingType {
    SeatBooking,
    ContactUnlock,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Requested,
    Approved,
    Rejected,
    ApprovedByPassenger,
    RejectedByPassenger,
    CancelledByDriver,
    CancelledByPassenger,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Requested => "REQUESTED",
            BookingStatus::Approved => "APPROVED",
            BookingStatus::Rejected => "REJECTED",
            BookingStatus::ApprovedByPassenger => "APPROVED_BY_PASSENGER",
            BookingStatus::RejectedByPassenger => "REJECTED_BY_PASSENGER",
            BookingStatus::CancelledByDriver => "CANCELLED_BY_DRIVER",
            BookingStatus::CancelledByPassenger => "CANCELLED_BY_PASSENGER",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            BookingStatus::CancelledByDriver | BookingStatus::CancelledByPassenger
        )
    }

    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::RejectedByPassenger
        )
    }

    /// No transition leaves a cancelled or rejected booking.
    pub fn is_terminal(&self) -> bool {
        self.is_cancelled() || self.is_rejected()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Party attribution carried by a cancellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelledBy {
    Driver,
    Passenger,
}

/// A chat entry embedded in its booking. `ts` is the author's clock and is
/// for display only; persisted append order is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub from: String,
    pub text: String,
    pub ts: DateTime<Utc>,
    pub read: bool,
    #[serde(default)]
    pub hidden_for: BTreeSet<String>,
}

impl Message {
    pub fn new(from: &str, text: String, ts: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.to_string(),
            text,
            ts,
            read: false,
            hidden_for: BTreeSet::new(),
        }
    }

    pub fn visible_to(&self, viewer_id: &str) -> bool {
        !self.hidden_for.contains(viewer_id)
    }
}

/// Ride fields copied into the booking at creation and never re-synced;
/// going stale is accepted over joining on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideSnapshot {
    pub origin: String,
    pub destination: String,
    pub ride_date: String,
    pub ride_time: String,
}

/// The central record between two users: a seat request or a contact unlock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub booking_type: BookingType,
    pub ride_id: Uuid,
    pub ad_id: Option<Uuid>,
    /// The requesting party.
    pub user_id: String,
    /// The ride owner deciding the request.
    pub counterparty_id: String,
    pub ride: RideSnapshot,
    pub status: BookingStatus,
    pub seats: u32,
    pub messages: Vec<Message>,
    pub driver_phone_shared: Option<String>,
    pub driver_email_shared: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Written by the payment collaborator, read-only here.
    pub contact_unlocked_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reported: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub booking_type: BookingType,
    pub ride_id: Uuid,
    pub ad_id: Option<Uuid>,
    pub requester_id: String,
    pub ride_owner_id: String,
    pub ride: RideSnapshot,
    #[serde(default = "default_seats")]
    pub seats: u32,
}

fn default_seats() -> u32 {
    1
}

impl Booking {
    pub fn new(request: CreateBookingRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_type: request.booking_type,
            ride_id: request.ride_id,
            ad_id: request.ad_id,
            user_id: request.requester_id,
            counterparty_id: request.ride_owner_id,
            ride: request.ride,
            status: BookingStatus::Requested,
            seats: request.seats.max(1),
            messages: Vec::new(),
            driver_phone_shared: None,
            driver_email_shared: None,
            created_at: now,
            approved_at: None,
            rejected_at: None,
            cancelled_at: None,
            contact_unlocked_at: None,
            paid_at: None,
            reported: false,
        }
    }

    pub fn is_party(&self, actor_id: &str) -> bool {
        self.user_id == actor_id || self.counterparty_id == actor_id
    }

    pub fn other_party(&self, actor_id: &str) -> &str {
        if self.user_id == actor_id {
            &self.counterparty_id
        } else {
            &self.user_id
        }
    }

    /// The unlock instant, whichever field the payment collaborator set.
    pub fn unlocked_at(&self) -> Option<DateTime<Utc>> {
        self.contact_unlocked_at.or(self.paid_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RideSnapshot {
        RideSnapshot {
            origin: "Göteborg".to_string(),
            destination: "Stockholm".to_string(),
            ride_date: "2025-06-14".to_string(),
            ride_time: "14:00".to_string(),
        }
    }

    #[test]
    fn test_new_booking_starts_requested_with_at_least_one_seat() {
        let booking = Booking::new(
            CreateBookingRequest {
                booking_type: BookingType::SeatBooking,
                ride_id: Uuid::new_v4(),
                ad_id: None,
                requester_id: "pax-1".to_string(),
                ride_owner_id: "drv-1".to_string(),
                ride: snapshot(),
                seats: 0,
            },
            Utc::now(),
        );

        assert_eq!(booking.status, BookingStatus::Requested);
        assert_eq!(booking.seats, 1);
        assert!(booking.messages.is_empty());
        assert!(!booking.reported);
    }

    #[test]
    fn test_terminal_states() {
        assert!(BookingStatus::CancelledByDriver.is_terminal());
        assert!(BookingStatus::Rejected.is_terminal());
        assert!(!BookingStatus::Requested.is_terminal());
        assert!(!BookingStatus::Approved.is_terminal());
    }

    #[test]
    fn test_status_serializes_suffix_encoded() {
        let json = serde_json::to_string(&BookingStatus::CancelledByPassenger).unwrap();
        assert_eq!(json, "\"CANCELLED_BY_PASSENGER\"");
    }

    #[test]
    fn test_message_visibility_defaults_open() {
        let message = Message::new("pax-1", "Hej!".to_string(), Utc::now());
        assert!(message.visible_to("drv-1"));
        assert!(message.visible_to("pax-1"));
    }
}

use uuid::Uuid;

use crate::pii::Masked;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingRequestedEvent {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub requester_id: String,
    pub seats: u32,
    pub requested_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingDecidedEvent {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub decided_by: String,
    pub approved: bool,
    pub shared_phone: Option<Masked<String>>,
    pub decided_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub cancelled_by: String,
    pub cancelled_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ContactReportedEvent {
    pub booking_id: Uuid,
    pub reporter_id: String,
    pub reason: String,
    pub message: String,
    pub reported_at: i64,
}

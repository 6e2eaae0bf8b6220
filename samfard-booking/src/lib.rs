pub mod machine;
pub mod models;
pub mod report;

pub use machine::BookingEngine;
pub use models::{
    Booking, BookingStatus, BookingType, CancelledBy, CreateBookingRequest, Message, RideSnapshot,
};
pub use report::{can_report, ReportError, ReportRequest};

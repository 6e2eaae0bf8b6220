pub mod guard;
pub mod sanitize;
pub mod service;

pub use guard::{scan, GuardVerdict, ViolationCategory};
pub use sanitize::sanitize;
pub use service::{MessagingService, SendOutcome};

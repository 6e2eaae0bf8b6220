use chrono::{DateTime, Duration, Utc};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_stream::wrappers::IntervalStream;
use tracing::info;
use uuid::Uuid;

use samfard_core::clock::Clock;
use samfard_core::notify::Severity;
use samfard_core::retry::run_transaction;
use samfard_core::EngineError;
use samfard_shared::models::events::ContactReportedEvent;

use crate::machine::BookingEngine;
use crate::models::Booking;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Booking already reported")]
    AlreadyReported,

    #[error("Contact has not been unlocked")]
    NotUnlocked,

    #[error("Report window expired")]
    WindowExpired,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub reason: String,
    pub message: String,
}

/// Reporting is open while the booking is unreported, unlocked, and within
/// the window counted from the unlock instant.
pub fn can_report(booking: &Booking, now: DateTime<Utc>, window: Duration) -> bool {
    eligibility(booking, now, window).is_ok()
}

fn eligibility(booking: &Booking, now: DateTime<Utc>, window: Duration) -> Result<(), ReportError> {
    if booking.reported {
        return Err(ReportError::AlreadyReported);
    }
    let unlocked_at = booking.unlocked_at().ok_or(ReportError::NotUnlocked)?;
    if now - unlocked_at >= window {
        return Err(ReportError::WindowExpired);
    }
    Ok(())
}

/// Time left to report, `None` once expired or never unlocked.
pub fn window_remaining(
    booking: &Booking,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<Duration> {
    remaining(booking.unlocked_at()?, now, window)
}

fn remaining(unlocked_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Option<Duration> {
    let elapsed = now - unlocked_at;
    if elapsed >= window {
        None
    } else {
        Some(window - elapsed)
    }
}

/// Display ticker for the countdown. The remaining time is re-derived from
/// the clock on every tick; the stream ends when the window closes.
pub fn countdown_stream(
    booking: &Booking,
    clock: Arc<dyn Clock>,
    window: Duration,
    tick: std::time::Duration,
) -> impl futures_util::Stream<Item = Duration> {
    let unlocked_at = booking.unlocked_at();
    IntervalStream::new(tokio::time::interval(tick))
        .map(move |_| unlocked_at.and_then(|at| remaining(at, clock.now(), window)))
        .take_while(|left| futures_util::future::ready(left.is_some()))
        .map(|left| left.unwrap_or_else(Duration::zero))
}

impl BookingEngine {
    /// Countdown for this booking's report window at the configured display
    /// interval.
    pub fn report_countdown(&self, booking: &Booking) -> impl futures_util::Stream<Item = Duration> {
        countdown_stream(
            booking,
            self.clock_handle(),
            self.report_window(),
            self.countdown_tick(),
        )
    }

    /// Files the one report a booking can carry. The `reported` flag is
    /// checked and set inside the same guarded commit, so two concurrent
    /// submissions cannot both land. Report content goes to the support
    /// channel, never into the record.
    pub async fn file_report(
        &self,
        booking_id: Uuid,
        reporter_id: &str,
        request: ReportRequest,
    ) -> Result<(), ReportError> {
        let window = self.report_window();
        let outcome = run_transaction(self.retry_policy(), || async move {
            let doc = self.load(booking_id).await?;
            let mut booking: Booking = doc.decode()?;

            if !booking.is_party(reporter_id) {
                return Err(EngineError::Unauthorized(reporter_id.to_string()));
            }
            if let Err(reject) = eligibility(&booking, self.clock().now(), window) {
                return Ok(Err(reject));
            }

            booking.reported = true;
            self.commit_booking(&doc, &booking).await?;
            Ok(Ok(booking))
        })
        .await?;
        let booking = outcome?;

        info!("Booking {} reported by {}", booking.id, reporter_id);
        let event = ContactReportedEvent {
            booking_id: booking.id,
            reporter_id: reporter_id.to_string(),
            reason: request.reason,
            message: request.message,
            reported_at: self.clock().now().timestamp_millis(),
        };
        self.notify(
            self.support_address(),
            "Contact reported",
            &event,
            reporter_id,
            Severity::Alert,
        )
        .await;

        Ok(())
    }
}

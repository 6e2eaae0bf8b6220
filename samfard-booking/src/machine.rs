use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use samfard_core::clock::Clock;
use samfard_core::notify::{NotificationSender, Severity};
use samfard_core::retry::{run_transaction, RetryPolicy};
use samfard_core::store::{with_deadline, Precondition, TransactionalStore, VersionedDoc, Write};
use samfard_core::{EngineError, EngineResult};
use samfard_shared::models::events::{
    BookingCancelledEvent, BookingDecidedEvent, BookingRequestedEvent,
};
use samfard_shared::Masked;
use samfard_store::app_config::Config;

use crate::models::{
    Booking, BookingStatus, BookingType, CancelledBy, CreateBookingRequest, ADS, BOOKINGS, RIDES,
};

/// Owns the lifecycle of booking records: request, decision, cancellation,
/// and the irreversible contact removal.
///
/// Every transition re-reads the record inside the cycle that commits it;
/// the commit carries the read's version as a precondition, so a decision
/// made from a stale read aborts and the cycle is retried under the policy.
pub struct BookingEngine {
    store: Arc<dyn TransactionalStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSender>,
    retry: RetryPolicy,
    op_timeout: Duration,
    report_window: ChronoDuration,
    countdown_tick: Duration,
    support_address: String,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn TransactionalStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSender>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            retry: RetryPolicy {
                max_attempts: config.engine.retry_max_attempts,
                base_delay_ms: config.engine.retry_base_delay_ms,
                max_delay_ms: config.engine.retry_max_delay_ms,
            },
            op_timeout: Duration::from_millis(config.store.op_timeout_ms),
            report_window: ChronoDuration::hours(config.engine.report_window_hours),
            countdown_tick: Duration::from_secs(config.engine.countdown_tick_seconds),
            support_address: config.engine.support_address.clone(),
        }
    }

    pub fn with_defaults(
        store: Arc<dyn TransactionalStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self::new(store, clock, notifier, &Config::default())
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn report_window(&self) -> ChronoDuration {
        self.report_window
    }

    pub(crate) fn countdown_tick(&self) -> Duration {
        self.countdown_tick
    }

    pub(crate) fn clock_handle(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub(crate) fn support_address(&self) -> &str {
        &self.support_address
    }

    /// Creates a booking in `Requested` with the ride snapshot captured now.
    pub async fn create(&self, request: CreateBookingRequest) -> EngineResult<Booking> {
        let booking = Booking::new(request, self.clock.now());
        let id = booking.id.to_string();

        let write = Write::put(BOOKINGS, &id, &booking)?;
        let guard = Precondition::Missing {
            collection: BOOKINGS.to_string(),
            id: id.clone(),
        };
        with_deadline(self.op_timeout, self.store.commit(vec![write], vec![guard])).await?;

        info!("Booking requested: {}", booking.id);
        let event = BookingRequestedEvent {
            booking_id: booking.id,
            ride_id: booking.ride_id,
            requester_id: booking.user_id.clone(),
            seats: booking.seats,
            requested_at: booking.created_at.timestamp_millis(),
        };
        self.notify(
            &booking.counterparty_id,
            "New booking request",
            &event,
            &booking.user_id,
            Severity::Action,
        )
        .await;

        Ok(booking)
    }

    pub async fn get(&self, booking_id: Uuid) -> EngineResult<Booking> {
        let doc = self.load(booking_id).await?;
        Ok(doc.decode()?)
    }

    /// Approves a `Requested` booking. Only the counterparty may decide, and
    /// this is the single point where contact details can be disclosed; the
    /// fields are never written again.
    pub async fn approve(
        &self,
        booking_id: Uuid,
        approver_id: &str,
        shared_phone: Option<String>,
        shared_email: Option<String>,
    ) -> EngineResult<Booking> {
        let booking = run_transaction(&self.retry, || {
            let phone = shared_phone.clone();
            let email = shared_email.clone();
            async move {
                let doc = self.load(booking_id).await?;
                let mut booking: Booking = doc.decode()?;

                self.require_decider(&booking, approver_id)?;
                let target = match booking.booking_type {
                    BookingType::SeatBooking => BookingStatus::Approved,
                    BookingType::ContactUnlock => BookingStatus::ApprovedByPassenger,
                };
                if booking.status != BookingStatus::Requested {
                    return Err(EngineError::InvalidTransition {
                        from: booking.status.to_string(),
                        to: target.to_string(),
                    });
                }

                booking.status = target;
                booking.approved_at = Some(self.clock.now());
                booking.driver_phone_shared = phone;
                booking.driver_email_shared = email;

                self.commit_booking(&doc, &booking).await?;
                Ok(booking)
            }
        })
        .await?;

        info!("Booking {} approved by {}", booking.id, approver_id);
        let event = BookingDecidedEvent {
            booking_id: booking.id,
            ride_id: booking.ride_id,
            decided_by: approver_id.to_string(),
            approved: true,
            shared_phone: booking.driver_phone_shared.clone().map(Masked),
            decided_at: self.clock.now().timestamp_millis(),
        };
        self.notify(
            &booking.user_id,
            "Your booking was approved",
            &event,
            approver_id,
            Severity::Info,
        )
        .await;

        Ok(booking)
    }

    /// Rejects a `Requested` booking. Symmetric to `approve`, discloses nothing.
    pub async fn reject(&self, booking_id: Uuid, approver_id: &str) -> EngineResult<Booking> {
        let booking = run_transaction(&self.retry, || async move {
            let doc = self.load(booking_id).await?;
            let mut booking: Booking = doc.decode()?;

            self.require_decider(&booking, approver_id)?;
            let target = match booking.booking_type {
                BookingType::SeatBooking => BookingStatus::Rejected,
                BookingType::ContactUnlock => BookingStatus::RejectedByPassenger,
            };
            if booking.status != BookingStatus::Requested {
                return Err(EngineError::InvalidTransition {
                    from: booking.status.to_string(),
                    to: target.to_string(),
                });
            }

            booking.status = target;
            booking.rejected_at = Some(self.clock.now());

            self.commit_booking(&doc, &booking).await?;
            Ok(booking)
        })
        .await?;

        info!("Booking {} rejected by {}", booking.id, approver_id);
        let event = BookingDecidedEvent {
            booking_id: booking.id,
            ride_id: booking.ride_id,
            decided_by: approver_id.to_string(),
            approved: false,
            shared_phone: None,
            decided_at: self.clock.now().timestamp_millis(),
        };
        self.notify(
            &booking.user_id,
            "Your booking was declined",
            &event,
            approver_id,
            Severity::Info,
        )
        .await;

        Ok(booking)
    }

    /// Cancels from any non-terminal state, attributed to the cancelling
    /// party. Cancelling an already-cancelled booking is a no-op, not an
    /// error; cancelling a rejected booking is a transition violation.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor_id: &str,
        attribution: CancelledBy,
    ) -> EngineResult<Booking> {
        let (booking, changed) = run_transaction(&self.retry, || async move {
            let doc = self.load(booking_id).await?;
            let mut booking: Booking = doc.decode()?;

            if !booking.is_party(actor_id) {
                return Err(EngineError::Unauthorized(actor_id.to_string()));
            }
            if booking.status.is_cancelled() {
                return Ok((booking, false));
            }
            let target = match attribution {
                CancelledBy::Driver => BookingStatus::CancelledByDriver,
                CancelledBy::Passenger => BookingStatus::CancelledByPassenger,
            };
            if booking.status.is_rejected() {
                return Err(EngineError::InvalidTransition {
                    from: booking.status.to_string(),
                    to: target.to_string(),
                });
            }

            booking.status = target;
            booking.cancelled_at = Some(self.clock.now());

            self.commit_booking(&doc, &booking).await?;
            Ok((booking, true))
        })
        .await?;

        if changed {
            info!("Booking {} cancelled by {}", booking.id, actor_id);
            let event = BookingCancelledEvent {
                booking_id: booking.id,
                ride_id: booking.ride_id,
                cancelled_by: actor_id.to_string(),
                cancelled_at: self.clock.now().timestamp_millis(),
            };
            self.notify(
                booking.other_party(actor_id),
                "Booking cancelled",
                &event,
                actor_id,
                Severity::Info,
            )
            .await;
        }

        Ok(booking)
    }

    /// Irreversibly removes the booking and strips its id from the ride's
    /// and ad's embedded unlock lists, all in one commit.
    pub async fn delete_contact(&self, booking_id: Uuid, actor_id: &str) -> EngineResult<()> {
        run_transaction(&self.retry, || async move {
            let doc = self.load(booking_id).await?;
            let booking: Booking = doc.decode()?;

            if !booking.is_party(actor_id) {
                return Err(EngineError::Unauthorized(actor_id.to_string()));
            }

            let id = booking_id.to_string();
            let mut writes = vec![Write::delete(BOOKINGS, &id)];
            let mut preconditions = vec![doc.unchanged()];

            let ride_id = booking.ride_id.to_string();
            if let Some(ride) =
                with_deadline(self.op_timeout, self.store.get(RIDES, &ride_id)).await?
            {
                preconditions.push(ride.unchanged());
                writes.push(Write::Put {
                    collection: RIDES.to_string(),
                    id: ride_id,
                    data: strip_unlock(ride.data, &id),
                });
            }
            if let Some(ad_id) = booking.ad_id {
                let ad_id = ad_id.to_string();
                if let Some(ad) = with_deadline(self.op_timeout, self.store.get(ADS, &ad_id)).await?
                {
                    preconditions.push(ad.unchanged());
                    writes.push(Write::Put {
                        collection: ADS.to_string(),
                        id: ad_id,
                        data: strip_unlock(ad.data, &id),
                    });
                }
            }

            with_deadline(self.op_timeout, self.store.commit(writes, preconditions)).await?;
            Ok(())
        })
        .await?;

        info!("Booking {} removed by {}", booking_id, actor_id);
        Ok(())
    }

    fn require_decider(&self, booking: &Booking, actor_id: &str) -> EngineResult<()> {
        if !booking.is_party(actor_id) || actor_id != booking.counterparty_id {
            return Err(EngineError::Unauthorized(actor_id.to_string()));
        }
        Ok(())
    }

    pub(crate) async fn load(&self, booking_id: Uuid) -> EngineResult<VersionedDoc> {
        let id = booking_id.to_string();
        with_deadline(self.op_timeout, self.store.get(BOOKINGS, &id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    pub(crate) async fn commit_booking(
        &self,
        read: &VersionedDoc,
        booking: &Booking,
    ) -> EngineResult<()> {
        let write = Write::put(BOOKINGS, &read.id, booking)?;
        with_deadline(
            self.op_timeout,
            self.store.commit(vec![write], vec![read.unchanged()]),
        )
        .await?;
        Ok(())
    }

    /// Fire-and-forget delivery; a failed send never rolls back a transition.
    pub(crate) async fn notify<E: serde::Serialize>(
        &self,
        recipient: &str,
        subject: &str,
        event: &E,
        sender_name: &str,
        severity: Severity,
    ) {
        let body = match serde_json::to_string(event) {
            Ok(body) => body,
            Err(e) => {
                warn!("notification payload dropped: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .notifier
            .send(recipient, subject, &body, sender_name, severity)
            .await
        {
            warn!("notification to {} dropped: {}", recipient, e);
        }
    }
}

fn strip_unlock(mut data: serde_json::Value, booking_id: &str) -> serde_json::Value {
    if let Some(unlocks) = data.get_mut("unlocks").and_then(|v| v.as_array_mut()) {
        unlocks.retain(|entry| entry.as_str() != Some(booking_id));
    }
    data
}

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use samfard_booking::models::{Booking, Message, BOOKINGS};
use samfard_core::clock::Clock;
use samfard_core::retry::{run_transaction, RetryPolicy};
use samfard_core::store::{with_deadline, TransactionalStore, VersionedDoc, Write};
use samfard_core::{EngineError, EngineResult};
use samfard_store::app_config::Config;

use crate::guard::{self, GuardVerdict, ViolationCategory};
use crate::sanitize::sanitize;

/// Result of attempting to send one message. A block is a policy outcome
/// the UI explains to the author, not an error; the attempted text is not
/// persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(Message),
    Blocked {
        category: ViolationCategory,
        user_message: &'static str,
        /// How long the inline warning stays on screen.
        warning_seconds: u64,
    },
}

/// Chat over a booking record: guarded sends, read receipts, per-viewer
/// hiding. All list mutations re-read the current document inside the
/// committing cycle so near-simultaneous writers cannot lose each other's
/// appends.
pub struct MessagingService {
    store: Arc<dyn TransactionalStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    op_timeout: Duration,
    warning_seconds: u64,
}

impl MessagingService {
    pub fn new(store: Arc<dyn TransactionalStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            store,
            clock,
            retry: RetryPolicy {
                max_attempts: config.engine.retry_max_attempts,
                base_delay_ms: config.engine.retry_base_delay_ms,
                max_delay_ms: config.engine.retry_max_delay_ms,
            },
            op_timeout: Duration::from_millis(config.store.op_timeout_ms),
            warning_seconds: config.guard.warning_display_seconds,
        }
    }

    pub fn with_defaults(store: Arc<dyn TransactionalStore>, clock: Arc<dyn Clock>) -> Self {
        Self::new(store, clock, &Config::default())
    }

    /// Sanitizes and scans the body, then appends it to the booking's
    /// message list. The scan runs before anything touches the store.
    pub async fn send(
        &self,
        booking_id: Uuid,
        author_id: &str,
        raw_text: &str,
    ) -> EngineResult<SendOutcome> {
        let text = sanitize(raw_text);
        if let GuardVerdict::Violation {
            category,
            user_message,
        } = guard::scan(&text)
        {
            debug!("Message to booking {} blocked: {:?}", booking_id, category);
            return Ok(SendOutcome::Blocked {
                category,
                user_message,
                warning_seconds: self.warning_seconds,
            });
        }

        let message = run_transaction(&self.retry, || {
            let text = text.clone();
            async move {
                let doc = self.load(booking_id).await?;
                let mut booking: Booking = doc.decode()?;

                if !booking.is_party(author_id) {
                    return Err(EngineError::Unauthorized(author_id.to_string()));
                }

                let message = Message::new(author_id, text, self.clock.now());
                booking.messages.push(message.clone());
                self.commit(&doc, &booking).await?;
                Ok(message)
            }
        })
        .await?;

        Ok(SendOutcome::Sent(message))
    }

    /// Flips `read` on every message authored by someone else. Returns how
    /// many receipts flipped; zero means nothing was written at all.
    pub async fn mark_read(&self, booking_id: Uuid, viewer_id: &str) -> EngineResult<usize> {
        run_transaction(&self.retry, || async move {
            let doc = self.load(booking_id).await?;
            let mut booking: Booking = doc.decode()?;

            if !booking.is_party(viewer_id) {
                return Err(EngineError::Unauthorized(viewer_id.to_string()));
            }

            let mut flipped = 0;
            for message in booking
                .messages
                .iter_mut()
                .filter(|m| m.from != viewer_id && !m.read)
            {
                message.read = true;
                flipped += 1;
            }
            if flipped == 0 {
                return Ok(0);
            }

            self.commit(&doc, &booking).await?;
            Ok(flipped)
        })
        .await
    }

    /// Hides the given messages from one viewer's reading of the thread.
    /// The other party's visibility is never touched.
    pub async fn hide_for_viewer(
        &self,
        booking_id: Uuid,
        viewer_id: &str,
        message_ids: &[Uuid],
    ) -> EngineResult<usize> {
        run_transaction(&self.retry, || async move {
            let doc = self.load(booking_id).await?;
            let mut booking: Booking = doc.decode()?;

            if !booking.is_party(viewer_id) {
                return Err(EngineError::Unauthorized(viewer_id.to_string()));
            }

            let mut hidden = 0;
            for message in booking
                .messages
                .iter_mut()
                .filter(|m| message_ids.contains(&m.id))
            {
                if message.hidden_for.insert(viewer_id.to_string()) {
                    hidden += 1;
                }
            }
            if hidden == 0 {
                return Ok(0);
            }

            self.commit(&doc, &booking).await?;
            Ok(hidden)
        })
        .await
    }

    /// Read path: the thread as one viewer sees it.
    pub fn visible_messages<'a>(booking: &'a Booking, viewer_id: &str) -> Vec<&'a Message> {
        booking
            .messages
            .iter()
            .filter(|m| m.visible_to(viewer_id))
            .collect()
    }

    async fn load(&self, booking_id: Uuid) -> EngineResult<VersionedDoc> {
        let id = booking_id.to_string();
        with_deadline(self.op_timeout, self.store.get(BOOKINGS, &id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    async fn commit(&self, read: &VersionedDoc, booking: &Booking) -> EngineResult<()> {
        let write = Write::put(BOOKINGS, &read.id, booking)?;
        with_deadline(
            self.op_timeout,
            self.store.commit(vec![write], vec![read.unchanged()]),
        )
        .await?;
        Ok(())
    }
}

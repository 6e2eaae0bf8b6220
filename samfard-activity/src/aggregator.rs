use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use samfard_booking::models::{Booking, BOOKINGS};
use samfard_core::clock::Clock;
use samfard_core::retry::{run_transaction, RetryPolicy};
use samfard_core::store::{
    with_deadline, ChangeEvent, Precondition, TransactionalStore, Write,
};
use samfard_core::EngineResult;
use samfard_store::app_config::Config;

use crate::checkpoint::{ActivityCategory, SeenCheckpoints, CHECKPOINTS};

/// "New since last seen" per category. The badge total is the plain sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityCounts {
    pub driver: usize,
    pub bookings: usize,
    pub unlocks: usize,
}

impl ActivityCounts {
    pub fn total(&self) -> usize {
        self.driver + self.bookings + self.unlocks
    }
}

/// Pure count computation over one user's view of the booking set.
///
/// Cancelled records drop out of `driver` and `bookings`, but not out of
/// `unlocks`: a paid unlock already happened and stays counted even when
/// the booking is later cancelled.
pub fn compute_counts(
    bookings: &[Booking],
    user_id: &str,
    seen: &SeenCheckpoints,
) -> ActivityCounts {
    ActivityCounts {
        driver: bookings
            .iter()
            .filter(|b| b.counterparty_id == user_id && !b.status.is_cancelled())
            .filter(|b| newer(b.created_at, seen.driver))
            .count(),
        bookings: bookings
            .iter()
            .filter(|b| b.user_id == user_id && !b.status.is_cancelled())
            .filter(|b| newer(b.created_at, seen.bookings))
            .count(),
        unlocks: bookings
            .iter()
            .filter(|b| b.is_party(user_id))
            .filter(|b| b.unlocked_at().is_some_and(|at| newer(at, seen.unlocks)))
            .count(),
    }
}

fn newer(instant: DateTime<Utc>, seen: Option<DateTime<Utc>>) -> bool {
    seen.map_or(true, |mark| instant > mark)
}

/// Reads checkpoints and the booking set and derives activity counts.
/// Nothing is cached beyond the current observation.
pub struct ActivityService {
    store: Arc<dyn TransactionalStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    op_timeout: Duration,
}

impl ActivityService {
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
        }
    }

    pub fn with_defaults(store: Arc<dyn TransactionalStore>, clock: Arc<dyn Clock>) -> Self {
        Self::new(store, clock, &Config::default())
    }

    pub async fn checkpoints_for(&self, user_id: &str) -> EngineResult<SeenCheckpoints> {
        let doc = with_deadline(self.op_timeout, self.store.get(CHECKPOINTS, user_id)).await?;
        Ok(match doc {
            Some(doc) => doc.decode()?,
            None => SeenCheckpoints::default(),
        })
    }

    pub async fn counts_for(&self, user_id: &str) -> EngineResult<ActivityCounts> {
        let seen = self.checkpoints_for(user_id).await?;
        let docs = with_deadline(self.op_timeout, self.store.list(BOOKINGS)).await?;
        let bookings: Vec<Booking> = docs.iter().filter_map(|doc| doc.decode().ok()).collect();
        Ok(compute_counts(&bookings, user_id, &seen))
    }

    /// Advances one category's checkpoint to now, creating the checkpoint
    /// record on first use.
    pub async fn mark_seen(&self, user_id: &str, category: ActivityCategory) -> EngineResult<()> {
        run_transaction(&self.retry, || async move {
            let doc = with_deadline(self.op_timeout, self.store.get(CHECKPOINTS, user_id)).await?;
            let (mut seen, precondition) = match &doc {
                Some(doc) => (doc.decode::<SeenCheckpoints>()?, doc.unchanged()),
                None => (
                    SeenCheckpoints::default(),
                    Precondition::Missing {
                        collection: CHECKPOINTS.to_string(),
                        id: user_id.to_string(),
                    },
                ),
            };
            seen.set(category, self.clock.now());

            let write = Write::put(CHECKPOINTS, user_id, &seen)?;
            with_deadline(
                self.op_timeout,
                self.store.commit(vec![write], vec![precondition]),
            )
            .await?;
            Ok(())
        })
        .await
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.store.subscribe()
    }
}

/// Recomputes one user's counts on every relevant store change and
/// republishes them through a watch channel for the UI badge.
pub struct ActivityFeed {
    rx: watch::Receiver<ActivityCounts>,
    worker: tokio::task::JoinHandle<()>,
}

impl ActivityFeed {
    pub async fn start(service: Arc<ActivityService>, user_id: String) -> EngineResult<Self> {
        let initial = service.counts_for(&user_id).await?;
        let (tx, rx) = watch::channel(initial);
        let changes = service.subscribe_changes();

        let worker = tokio::spawn(async move {
            let mut stream = BroadcastStream::new(changes);
            while let Some(event) = stream.next().await {
                let event = match event {
                    Ok(event) => event,
                    // Lagged behind the feed; the next recompute catches up.
                    Err(_) => continue,
                };
                if event.collection != BOOKINGS && event.collection != CHECKPOINTS {
                    continue;
                }
                match service.counts_for(&user_id).await {
                    Ok(counts) => {
                        if tx.send(counts).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("activity recompute for {} failed: {}", user_id, e),
                }
            }
        });

        Ok(Self { rx, worker })
    }

    pub fn counts(&self) -> ActivityCounts {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActivityCounts> {
        self.rx.clone()
    }
}

impl Drop for ActivityFeed {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use samfard_booking::models::{
        BookingStatus, BookingType, CreateBookingRequest, RideSnapshot,
    };
    use samfard_core::clock::SystemClock;
    use samfard_store::MemoryStore;
    use uuid::Uuid;

    fn booking(requester: &str, owner: &str, created_at: DateTime<Utc>) -> Booking {
        Booking::new(
            CreateBookingRequest {
                booking_type: BookingType::SeatBooking,
                ride_id: Uuid::new_v4(),
                ad_id: None,
                requester_id: requester.to_string(),
                ride_owner_id: owner.to_string(),
                ride: RideSnapshot {
                    origin: "Linköping".to_string(),
                    destination: "Norrköping".to_string(),
                    ride_date: "2025-09-20".to_string(),
                    ride_time: "07:45".to_string(),
                },
                seats: 1,
            },
            created_at,
        )
    }

    #[test]
    fn test_checkpoint_counts_only_strictly_newer_records() {
        let base = Utc::now();
        let t1 = base;
        let t2 = base + ChronoDuration::minutes(10);
        let t3 = base + ChronoDuration::minutes(20);

        let bookings = vec![
            booking("pax-1", "drv-1", t1),
            booking("pax-2", "drv-1", t2),
            booking("pax-3", "drv-1", t3),
        ];
        let seen = SeenCheckpoints {
            driver: Some(t2),
            ..Default::default()
        };

        let counts = compute_counts(&bookings, "drv-1", &seen);
        assert_eq!(counts.driver, 1);
    }

    #[test]
    fn test_cancelled_records_drop_from_driver_and_bookings() {
        let now = Utc::now();
        let mut cancelled = booking("pax-1", "drv-1", now);
        cancelled.status = BookingStatus::CancelledByPassenger;
        let bookings = vec![cancelled, booking("pax-2", "drv-1", now)];
        let seen = SeenCheckpoints::default();

        assert_eq!(compute_counts(&bookings, "drv-1", &seen).driver, 1);
        assert_eq!(compute_counts(&bookings, "pax-1", &seen).bookings, 0);
        assert_eq!(compute_counts(&bookings, "pax-2", &seen).bookings, 1);
    }

    #[test]
    fn test_unlocks_survive_cancellation() {
        let now = Utc::now();
        let mut unlocked = booking("pax-1", "drv-1", now);
        unlocked.paid_at = Some(now);
        unlocked.status = BookingStatus::CancelledByDriver;
        let bookings = vec![unlocked];
        let seen = SeenCheckpoints::default();

        // Both parties still see the unlock; the cancelled booking itself
        // counts for neither.
        assert_eq!(compute_counts(&bookings, "pax-1", &seen).unlocks, 1);
        assert_eq!(compute_counts(&bookings, "drv-1", &seen).unlocks, 1);
        assert_eq!(compute_counts(&bookings, "drv-1", &seen).driver, 0);
    }

    #[test]
    fn test_total_is_the_sum_of_categories() {
        let counts = ActivityCounts {
            driver: 2,
            bookings: 1,
            unlocks: 3,
        };
        assert_eq!(counts.total(), 6);
    }

    async fn seed(store: &MemoryStore, booking: &Booking) {
        store
            .commit(
                vec![Write::put(BOOKINGS, &booking.id.to_string(), booking).unwrap()],
                vec![],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mark_seen_clears_the_category() {
        let store = Arc::new(MemoryStore::with_system_clock());
        let service = ActivityService::with_defaults(store.clone(), Arc::new(SystemClock));

        seed(&store, &booking("pax-1", "drv-1", Utc::now() - ChronoDuration::minutes(1))).await;
        assert_eq!(service.counts_for("drv-1").await.unwrap().driver, 1);

        service
            .mark_seen("drv-1", ActivityCategory::Driver)
            .await
            .unwrap();
        assert_eq!(service.counts_for("drv-1").await.unwrap().driver, 0);
    }

    #[tokio::test]
    async fn test_feed_recomputes_on_store_changes() {
        let store = Arc::new(MemoryStore::with_system_clock());
        let service = Arc::new(ActivityService::with_defaults(
            store.clone(),
            Arc::new(SystemClock),
        ));

        let feed = ActivityFeed::start(service, "drv-1".to_string())
            .await
            .unwrap();
        assert_eq!(feed.counts().total(), 0);

        let mut rx = feed.subscribe();
        seed(&store, &booking("pax-1", "drv-1", Utc::now())).await;

        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("feed did not react")
            .unwrap();
        assert_eq!(rx.borrow().driver, 1);
        assert_eq!(rx.borrow().total(), 1);
    }
}

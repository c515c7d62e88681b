use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::{Error, StateError, StoreError},
    events::{AuctionEvent, EventBus},
    lanes::{KeyedLocks, LaneMap},
    scheduler::CloseHandler,
    store::AuctionStore,
    types::{
        auction::{Auction, AuctionStatus},
        config::EngineConfig,
        deal::Deal,
        primitives::{Amount, AuctionId, UserId},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    Sold { winner: UserId, price: Amount },
    Unsold,
    /// The auction had already left `Live` when this close attempt ran.
    AlreadyClosed,
}

enum FireAttempt {
    Settled,
    Retry,
}

/// Performs the terminal auction transition exactly once. Invoked by fired
/// timers and by the administrative close endpoint; both paths re-check the
/// live status under the auction lock, so repeated invocation is safe.
pub struct CloseExecutor {
    store: Arc<dyn AuctionStore>,
    events: Arc<EventBus>,
    locks: Arc<KeyedLocks>,
    lanes: Arc<LaneMap>,
    config: EngineConfig,
}

impl CloseExecutor {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        events: Arc<EventBus>,
        locks: Arc<KeyedLocks>,
        lanes: Arc<LaneMap>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            events,
            locks,
            lanes,
            config,
        }
    }

    pub async fn close(&self, auction_id: AuctionId) -> Result<CloseOutcome, Error> {
        let _guard = self.locks.acquire(auction_id).await;
        let auction = self.load(auction_id).await?;
        self.finish(auction).await
    }

    pub async fn republish(&self, auction_id: AuctionId, seller: UserId) -> Result<Auction, Error> {
        let _guard = self.locks.acquire(auction_id).await;
        let source = self.load(auction_id).await?;

        if source.seller != seller {
            return Err(StateError::NotSeller.into());
        }
        if source.status != AuctionStatus::EndedUnsold {
            return Err(StateError::NotUnsold.into());
        }

        let id = self.store.next_id().await?;
        let fresh = source.relist(id, Utc::now());
        self.store.insert(fresh.clone()).await?;

        tracing::info!(source = %auction_id, auction = %fresh.id, "auction republished");
        Ok(fresh)
    }

    pub async fn stop(&self, auction_id: AuctionId, seller: UserId) -> Result<(), Error> {
        let _guard = self.locks.acquire(auction_id).await;
        let mut auction = self.load(auction_id).await?;

        if auction.seller != seller {
            return Err(StateError::NotSeller.into());
        }
        if !matches!(auction.status, AuctionStatus::Draft | AuctionStatus::Live) {
            return Err(StateError::NotStoppable.into());
        }
        if !auction.bid_count.is_zero() {
            return Err(StateError::HasBids.into());
        }

        auction.status = AuctionStatus::Cancelled;
        self.store.update(auction).await?;
        self.teardown(auction_id);

        tracing::info!(auction = %auction_id, "auction stopped by seller");
        Ok(())
    }

    async fn load(&self, auction_id: AuctionId) -> Result<Auction, Error> {
        match self.store.get(auction_id).await {
            Ok(auction) => Ok(auction),
            Err(StoreError::NotFound) => Err(StateError::AuctionNotFound.into()),
            Err(error) => Err(error.into()),
        }
    }

    /// Terminal transition. Caller must hold the auction lock. Events are
    /// staged first and dispatched only after the update committed; a failed
    /// commit leaves the auction untouched and dispatches nothing.
    async fn finish(&self, mut auction: Auction) -> Result<CloseOutcome, Error> {
        if !auction.is_live() {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        let auction_id = auction.id;
        match auction.leader {
            Some(winner) if !auction.bid_count.is_zero() => {
                auction.status = AuctionStatus::EndedSold;
                let price = auction.current_price;
                let deal = Deal {
                    auction_id,
                    seller: auction.seller,
                    buyer: winner,
                    price,
                    confirm_by: Utc::now() + self.config.deal_confirm_window,
                };

                self.store.update(auction).await?;
                self.teardown(auction_id);
                self.events.dispatch(AuctionEvent::Sold { deal }).await;

                tracing::info!(auction = %auction_id, winner = %winner, price = %price, "auction closed sold");
                Ok(CloseOutcome::Sold { winner, price })
            }
            _ => {
                let seller = auction.seller;
                auction.status = AuctionStatus::EndedUnsold;

                self.store.update(auction).await?;
                self.teardown(auction_id);
                self.events
                    .dispatch(AuctionEvent::Unsold { auction_id, seller })
                    .await;

                tracing::info!(auction = %auction_id, "auction closed unsold");
                Ok(CloseOutcome::Unsold)
            }
        }
    }

    /// Drops the auction's lane and lock entry once it is terminal, whichever
    /// path (timer, admin close, seller stop) got it there.
    fn teardown(&self, auction_id: AuctionId) {
        self.lanes.close(auction_id);
        self.locks.release(auction_id);
    }

    async fn try_fire(&self, auction_id: AuctionId, armed_end_at: DateTime<Utc>) -> FireAttempt {
        let _guard = self.locks.acquire(auction_id).await;

        let auction = match self.store.get(auction_id).await {
            Ok(auction) => auction,
            Err(StoreError::NotFound) => {
                tracing::warn!(auction = %auction_id, "close timer fired for unknown auction");
                return FireAttempt::Settled;
            }
            Err(error) => {
                tracing::warn!(auction = %auction_id, %error, "close timer could not load auction");
                return FireAttempt::Retry;
            }
        };

        // A reschedule superseded this timer after it left the sleep; the
        // newer timer owns the close.
        if auction.end_at != armed_end_at {
            tracing::debug!(
                auction = %auction_id,
                armed = %armed_end_at,
                current = %auction.end_at,
                "stale close timer fire"
            );
            return FireAttempt::Settled;
        }
        if !auction.is_live() {
            return FireAttempt::Settled;
        }

        match self.finish(auction).await {
            Ok(_) => FireAttempt::Settled,
            Err(error) => {
                tracing::warn!(auction = %auction_id, %error, "scheduled close failed");
                FireAttempt::Retry
            }
        }
    }
}

#[async_trait]
impl CloseHandler for CloseExecutor {
    /// A failed commit keeps the auction `Live`, so the fire keeps retrying
    /// on an interval until the close lands or the deadline is superseded.
    async fn fire(&self, auction_id: AuctionId, armed_end_at: DateTime<Utc>) {
        while let FireAttempt::Retry = self.try_fire(auction_id, armed_end_at).await {
            tokio::time::sleep(self.config.close_retry_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::*;
    use crate::{
        processor::BidProcessor,
        results::ResultStore,
        scheduler::CloseScheduler,
        store::MemoryStore,
        types::{bid::BidSubmission, primitives::ClientRequestId},
    };

    /// MemoryStore whose next `fail_updates` update calls fail.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_updates: AtomicUsize,
    }

    #[async_trait]
    impl AuctionStore for FailingStore {
        async fn get(&self, id: AuctionId) -> Result<Auction, StoreError> {
            self.inner.get(id).await
        }

        async fn insert(&self, auction: Auction) -> Result<(), StoreError> {
            self.inner.insert(auction).await
        }

        async fn update(&self, auction: Auction) -> Result<(), StoreError> {
            let failing = self
                .fail_updates
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                    remaining.checked_sub(1)
                })
                .is_ok();
            if failing {
                return Err(StoreError::Unavailable("disk offline".into()));
            }
            self.inner.update(auction).await
        }

        async fn next_id(&self) -> Result<AuctionId, StoreError> {
            self.inner.next_id().await
        }
    }

    struct Fixture {
        store: Arc<dyn AuctionStore>,
        locks: Arc<KeyedLocks>,
        lanes: Arc<LaneMap>,
        executor: Arc<CloseExecutor>,
    }

    fn fixture(store: Arc<dyn AuctionStore>) -> Fixture {
        let mut config = EngineConfig::default();
        config.close_retry_delay = StdDuration::from_millis(30);
        let locks = Arc::new(KeyedLocks::new());
        let lanes = Arc::new(LaneMap::new());
        let executor = Arc::new(CloseExecutor::new(
            store.clone(),
            Arc::new(EventBus::new(Vec::new())),
            locks.clone(),
            lanes.clone(),
            config,
        ));
        Fixture {
            store,
            locks,
            lanes,
            executor,
        }
    }

    async fn insert_live(fixture: &Fixture, end_in: Duration) -> Auction {
        let now = Utc::now();
        let auction = Auction::new_listing(
            AuctionId::new(1),
            UserId::new(7),
            "lot".into(),
            Amount::new(10_000),
            now,
            now + end_in,
        );
        fixture
            .store
            .insert(auction.clone())
            .await
            .expect("insert");
        auction
    }

    #[tokio::test]
    async fn timer_close_tears_down_lane_and_lock() {
        let fx = fixture(Arc::new(MemoryStore::new()));
        let auction = insert_live(&fx, Duration::milliseconds(30)).await;

        let scheduler = CloseScheduler::new(fx.executor.clone());
        // Zero threshold so the near-deadline bid does not extend `end_at`
        // and supersede the timer under test.
        let mut processor_config = EngineConfig::default();
        processor_config.snipe_threshold = Duration::zero();
        let processor = Arc::new(BidProcessor::new(
            fx.store.clone(),
            Arc::new(ResultStore::new(StdDuration::from_secs(60))),
            scheduler.clone(),
            fx.locks.clone(),
            processor_config,
        ));
        fx.lanes.send(
            &processor,
            BidSubmission {
                auction_id: auction.id,
                buyer: UserId::new(2),
                amount: Amount::new(11_000),
                client_request_id: ClientRequestId::new("req-lane-001"),
                submitted_at: Utc::now(),
            },
        );
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert_eq!(fx.lanes.len(), 1);
        assert_eq!(fx.locks.len(), 1);

        scheduler.schedule(auction.id, auction.end_at);
        tokio::time::sleep(StdDuration::from_millis(200)).await;

        let closed = fx.store.get(auction.id).await.expect("auction");
        assert_eq!(closed.status, AuctionStatus::EndedSold);
        assert!(fx.lanes.is_empty());
        assert!(fx.locks.is_empty());
    }

    #[tokio::test]
    async fn admin_close_and_stop_tear_down_too() {
        let fx = fixture(Arc::new(MemoryStore::new()));
        let auction = insert_live(&fx, Duration::hours(1)).await;

        fx.executor.close(auction.id).await.expect("close");
        assert!(fx.locks.is_empty());
        assert!(fx.lanes.is_empty());

        let fx = fixture(Arc::new(MemoryStore::new()));
        let auction = insert_live(&fx, Duration::hours(1)).await;
        fx.executor
            .stop(auction.id, auction.seller)
            .await
            .expect("stop");
        assert!(fx.locks.is_empty());
        assert!(fx.lanes.is_empty());
    }

    #[tokio::test]
    async fn fire_retries_until_the_close_commits() {
        let store = Arc::new(FailingStore::default());
        store.fail_updates.store(1, Ordering::SeqCst);
        let fx = fixture(store.clone());
        let auction = insert_live(&fx, Duration::milliseconds(0)).await;

        fx.executor.fire(auction.id, auction.end_at).await;

        let closed = fx.store.get(auction.id).await.expect("auction");
        assert_eq!(closed.status, AuctionStatus::EndedUnsold);
    }

    #[tokio::test]
    async fn stale_fire_leaves_auction_alone() {
        let fx = fixture(Arc::new(MemoryStore::new()));
        let auction = insert_live(&fx, Duration::hours(1)).await;

        fx.executor
            .fire(auction.id, auction.end_at - Duration::minutes(5))
            .await;

        let current = fx.store.get(auction.id).await.expect("auction");
        assert_eq!(current.status, AuctionStatus::Live);
    }
}

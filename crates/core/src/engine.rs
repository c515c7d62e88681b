use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use crate::{
    close::{CloseExecutor, CloseOutcome},
    error::{Error, StateError, StoreError, ValidationError},
    events::{EventBus, EventListener},
    lanes::{KeyedLocks, LaneMap},
    processor::BidProcessor,
    results::{Gate, ResultKey, ResultStore},
    scheduler::CloseScheduler,
    store::AuctionStore,
    types::{
        auction::Auction,
        bid::{BidOutcome, BidSubmission},
        config::EngineConfig,
        primitives::{Amount, AuctionId, ClientRequestId, UserId},
    },
    validation,
};

const RESULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(30);

/// The assembled bidding and closing engine; the HTTP layer talks only to
/// this type. Must be constructed inside a tokio runtime: lanes, timers and
/// the result sweep are spawned tasks.
pub struct AuctionEngine {
    config: EngineConfig,
    store: Arc<dyn AuctionStore>,
    results: Arc<ResultStore>,
    lanes: Arc<LaneMap>,
    processor: Arc<BidProcessor>,
    scheduler: Arc<CloseScheduler>,
    executor: Arc<CloseExecutor>,
}

impl AuctionEngine {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        listeners: Vec<Arc<dyn EventListener>>,
        config: EngineConfig,
    ) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let lanes = Arc::new(LaneMap::new());
        let results = Arc::new(ResultStore::new(config.result_ttl));
        let events = Arc::new(EventBus::new(listeners));
        let executor = Arc::new(CloseExecutor::new(
            store.clone(),
            events,
            locks.clone(),
            lanes.clone(),
            config.clone(),
        ));
        let scheduler = CloseScheduler::new(executor.clone());
        let processor = Arc::new(BidProcessor::new(
            store.clone(),
            results.clone(),
            scheduler.clone(),
            locks,
            config.clone(),
        ));

        spawn_result_sweep(results.clone());

        Self {
            config,
            store,
            results,
            lanes,
            processor,
            scheduler,
            executor,
        }
    }

    pub async fn publish(
        &self,
        seller: UserId,
        item: String,
        start_price: Amount,
        duration: Duration,
    ) -> Result<Auction, Error> {
        if start_price.is_zero() {
            return Err(ValidationError::AmountNotPositive.into());
        }

        let id = self.store.next_id().await?;
        let now = Utc::now();
        let auction = Auction::new_listing(id, seller, item, start_price, now, now + duration);
        self.store.insert(auction.clone()).await?;
        self.scheduler.schedule(id, auction.end_at);

        tracing::info!(auction = %id, seller = %seller, end_at = %auction.end_at, "auction published");
        Ok(auction)
    }

    pub async fn auction(&self, auction_id: AuctionId) -> Result<Auction, Error> {
        match self.store.get(auction_id).await {
            Ok(auction) => Ok(auction),
            Err(StoreError::NotFound) => Err(StateError::AuctionNotFound.into()),
            Err(error) => Err(error.into()),
        }
    }

    /// Retransmitting the same `(buyer, client_request_id)` never enqueues
    /// twice: it returns whatever the first transmission produced. A
    /// `Pending` return means the bid is still queued; the client polls with
    /// the same request id.
    pub async fn submit(
        &self,
        auction_id: AuctionId,
        buyer: UserId,
        amount: Amount,
        client_request_id: &str,
    ) -> Result<BidOutcome, Error> {
        validation::validate_submission(amount, client_request_id)?;
        // Unknown auctions fail here, before the idempotency record exists.
        self.auction(auction_id).await?;

        let token = ClientRequestId::new(client_request_id);
        let key: ResultKey = (buyer, token.clone());
        match self.results.begin(key.clone(), Utc::now()) {
            Gate::Existing(outcome) => return Ok(outcome),
            Gate::Fresh => {}
        }

        let bid = BidSubmission {
            auction_id,
            buyer,
            amount,
            client_request_id: token,
            submitted_at: Utc::now(),
        };
        self.lanes.send(&self.processor, bid);

        Ok(self.wait_for_outcome(&key).await)
    }

    pub fn outcome(&self, buyer: UserId, client_request_id: &str) -> Option<BidOutcome> {
        let key = (buyer, ClientRequestId::new(client_request_id));
        self.results.get(&key, Utc::now())
    }

    /// Administrative close. Safe to call any number of times; only the first
    /// effective invocation transitions the auction and dispatches events.
    pub async fn close(&self, auction_id: AuctionId) -> Result<CloseOutcome, Error> {
        let outcome = self.executor.close(auction_id).await?;
        self.scheduler.cancel(auction_id);
        Ok(outcome)
    }

    pub async fn republish(
        &self,
        auction_id: AuctionId,
        seller: UserId,
    ) -> Result<Auction, Error> {
        let fresh = self.executor.republish(auction_id, seller).await?;
        self.scheduler.schedule(fresh.id, fresh.end_at);
        Ok(fresh)
    }

    pub async fn stop(&self, auction_id: AuctionId, seller: UserId) -> Result<(), Error> {
        self.executor.stop(auction_id, seller).await?;
        self.scheduler.cancel(auction_id);
        Ok(())
    }

    async fn wait_for_outcome(&self, key: &ResultKey) -> BidOutcome {
        let deadline = tokio::time::Instant::now() + self.config.submit_wait;
        loop {
            if let Some(outcome) = self.results.get(key, Utc::now()) {
                if !outcome.is_pending() {
                    return outcome;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return BidOutcome::Pending;
            }
            tokio::time::sleep(self.config.submit_poll).await;
        }
    }
}

fn spawn_result_sweep(results: Arc<ResultStore>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(RESULT_SWEEP_INTERVAL).await;
            results.purge_expired(Utc::now());
        }
    });
}

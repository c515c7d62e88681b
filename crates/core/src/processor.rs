use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::StoreError,
    lanes::KeyedLocks,
    results::ResultStore,
    scheduler::CloseScheduler,
    store::AuctionStore,
    types::{
        bid::{BidOutcome, BidSubmission, RejectReason},
        config::EngineConfig,
    },
    validation,
};

/// Applies dequeued bids for an auction one at a time: the single writer of
/// auction price/deadline state while the auction is live.
pub struct BidProcessor {
    store: Arc<dyn AuctionStore>,
    results: Arc<ResultStore>,
    scheduler: Arc<CloseScheduler>,
    locks: Arc<KeyedLocks>,
    config: EngineConfig,
}

impl BidProcessor {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        results: Arc<ResultStore>,
        scheduler: Arc<CloseScheduler>,
        locks: Arc<KeyedLocks>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            results,
            scheduler,
            locks,
            config,
        }
    }

    /// The queue position is consumed whatever the outcome; a failed bid is
    /// never re-delivered.
    pub async fn process(&self, bid: BidSubmission) {
        let key = (bid.buyer, bid.client_request_id.clone());
        let outcome = self.apply(&bid).await;

        match &outcome {
            BidOutcome::Accepted { price, .. } => {
                tracing::info!(
                    auction = %bid.auction_id,
                    buyer = %bid.buyer,
                    price = %price,
                    "bid accepted"
                );
            }
            BidOutcome::Rejected(reason) => {
                tracing::info!(
                    auction = %bid.auction_id,
                    buyer = %bid.buyer,
                    code = reason.code(),
                    "bid rejected"
                );
            }
            BidOutcome::Pending => {}
        }

        self.results.complete(&key, outcome);
    }

    async fn apply(&self, bid: &BidSubmission) -> BidOutcome {
        let _guard = self.locks.acquire(bid.auction_id).await;

        let mut auction = match self.store.get(bid.auction_id).await {
            Ok(auction) => auction,
            Err(StoreError::NotFound) => {
                return BidOutcome::Rejected(RejectReason::AuctionNotFound);
            }
            Err(error) => {
                return BidOutcome::Rejected(RejectReason::StoreFailure(error.to_string()));
            }
        };

        if let Err(reason) = validation::check_bid(&auction, bid.amount, &self.config) {
            return BidOutcome::Rejected(reason);
        }

        let now = Utc::now();
        auction.current_price = bid.amount;
        auction.bid_count.increment();
        auction.leader = Some(bid.buyer);

        let extended = auction.snipe_extended_end_at(now, &self.config);
        if let Some(end_at) = extended {
            auction.end_at = end_at;
        }
        let end_at = auction.end_at;

        if let Err(error) = self.store.update(auction).await {
            // Nothing was persisted; the client may resubmit under a fresh
            // idempotency token.
            tracing::warn!(auction = %bid.auction_id, %error, "bid persist failed");
            return BidOutcome::Rejected(RejectReason::StoreFailure(error.to_string()));
        }

        if let Some(new_end) = extended {
            tracing::info!(
                auction = %bid.auction_id,
                end_at = %new_end,
                "anti-snipe extension applied"
            );
            self.scheduler.schedule(bid.auction_id, new_end);
        }

        BidOutcome::Accepted {
            price: bid.amount,
            end_at,
        }
    }
}

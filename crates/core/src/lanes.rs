use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

use crate::{
    processor::BidProcessor,
    types::{bid::BidSubmission, primitives::AuctionId},
};

/// One FIFO lane per active auction: an unbounded channel drained by a single
/// task, so bids for one auction apply in submission order while different
/// auctions drain concurrently.
#[derive(Default)]
pub struct LaneMap {
    lanes: DashMap<AuctionId, mpsc::UnboundedSender<BidSubmission>>,
}

impl LaneMap {
    pub fn new() -> Self {
        Self {
            lanes: DashMap::new(),
        }
    }

    /// Appends a bid to its auction's lane, creating the lane (and its drainer
    /// task) on first use. Must run inside a tokio runtime.
    pub fn send(&self, processor: &Arc<BidProcessor>, bid: BidSubmission) {
        let auction_id = bid.auction_id;
        let mut bid = bid;
        loop {
            let tx = match self.lanes.entry(auction_id) {
                Entry::Occupied(occupied) => occupied.get().clone(),
                Entry::Vacant(vacant) => {
                    let tx = spawn_lane(processor.clone(), auction_id);
                    vacant.insert(tx.clone());
                    tx
                }
            };
            match tx.send(bid) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // The lane was shut down between lookup and send; evict it
                    // and re-create.
                    bid = returned;
                    self.lanes.remove_if(&auction_id, |_, sender| sender.is_closed());
                }
            }
        }
    }

    /// Drops the lane. Already-queued bids still drain, but every one of them
    /// re-checks auction status under the auction lock, so a lane that
    /// outlives its auction can only record rejections.
    pub fn close(&self, auction_id: AuctionId) {
        self.lanes.remove(&auction_id);
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

fn spawn_lane(
    processor: Arc<BidProcessor>,
    auction_id: AuctionId,
) -> mpsc::UnboundedSender<BidSubmission> {
    let (tx, mut rx) = mpsc::unbounded_channel::<BidSubmission>();
    tokio::spawn(async move {
        tracing::debug!(auction = %auction_id, "bid lane started");
        while let Some(bid) = rx.recv().await {
            processor.process(bid).await;
        }
        tracing::debug!(auction = %auction_id, "bid lane drained");
    });
    tx
}

/// Per-auction mutex guarding the load-mutate-persist section. The lane
/// already serializes bids for one auction; this additionally serializes the
/// close executor against an in-flight bid application. Never a global lock.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<AuctionId, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn acquire(&self, auction_id: AuctionId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(auction_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Evicts the entry once the auction is terminal. Current holders keep
    /// their `Arc`; a later `acquire` gets a fresh mutex, which is safe only
    /// because every critical section re-checks auction status.
    pub fn release(&self, auction_id: AuctionId) {
        self.locks.remove(&auction_id);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

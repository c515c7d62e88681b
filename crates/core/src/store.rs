use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    error::StoreError,
    types::{auction::Auction, primitives::AuctionId},
};

/// Persistence seam for auction state. `update` is the commit point: the bid
/// processor and the close executor only consider an effect applied once it
/// returns `Ok`.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn get(&self, id: AuctionId) -> Result<Auction, StoreError>;

    async fn insert(&self, auction: Auction) -> Result<(), StoreError>;

    async fn update(&self, auction: Auction) -> Result<(), StoreError>;

    async fn next_id(&self) -> Result<AuctionId, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    auctions: DashMap<AuctionId, Auction>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            auctions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn get(&self, id: AuctionId) -> Result<Auction, StoreError> {
        self.auctions
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, auction: Auction) -> Result<(), StoreError> {
        self.auctions.insert(auction.id, auction);
        Ok(())
    }

    async fn update(&self, auction: Auction) -> Result<(), StoreError> {
        if !self.auctions.contains_key(&auction.id) {
            return Err(StoreError::NotFound);
        }
        self.auctions.insert(auction.id, auction);
        Ok(())
    }

    async fn next_id(&self) -> Result<AuctionId, StoreError> {
        Ok(AuctionId::new(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}

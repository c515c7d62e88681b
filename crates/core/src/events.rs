use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use thiserror::Error;

use crate::types::{
    deal::Deal,
    primitives::{AuctionId, UserId},
};

/// Dispatched only after the terminal transition committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuctionEvent {
    Sold { deal: Deal },
    Unsold { auction_id: AuctionId, seller: UserId },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

/// Each listener is its own failure domain: an error is logged and never
/// rolls back the committed state or starves the other listeners.
#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &AuctionEvent) -> Result<(), ListenerError>;
}

pub struct EventBus {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventBus {
    pub fn new(listeners: Vec<Arc<dyn EventListener>>) -> Self {
        Self { listeners }
    }

    /// Only call after the originating transaction committed.
    pub async fn dispatch(&self, event: AuctionEvent) {
        let runs = self.listeners.iter().map(|listener| {
            let event = event.clone();
            async move {
                if let Err(error) = listener.handle(&event).await {
                    tracing::error!(
                        listener = listener.name(),
                        %error,
                        "event listener failed"
                    );
                }
            }
        });
        join_all(runs).await;
    }
}

/// Records deals for sold closes; stands in for external deal management.
#[derive(Debug, Default)]
pub struct DealLedger {
    deals: DashMap<AuctionId, Deal>,
}

impl DealLedger {
    pub fn new() -> Self {
        Self {
            deals: DashMap::new(),
        }
    }

    pub fn deal(&self, auction_id: AuctionId) -> Option<Deal> {
        self.deals.get(&auction_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.deals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }
}

#[async_trait]
impl EventListener for DealLedger {
    fn name(&self) -> &'static str {
        "deal-ledger"
    }

    async fn handle(&self, event: &AuctionEvent) -> Result<(), ListenerError> {
        if let AuctionEvent::Sold { deal } = event {
            self.deals.insert(deal.auction_id, deal.clone());
        }
        Ok(())
    }
}

/// Stand-in for the chat/notification collaborators. Logs and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

#[async_trait]
impl EventListener for LogListener {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn handle(&self, event: &AuctionEvent) -> Result<(), ListenerError> {
        match event {
            AuctionEvent::Sold { deal } => {
                tracing::info!(
                    auction = %deal.auction_id,
                    buyer = %deal.buyer,
                    price = %deal.price,
                    "auction sold"
                );
            }
            AuctionEvent::Unsold { auction_id, .. } => {
                tracing::info!(auction = %auction_id, "auction ended unsold");
            }
        }
        Ok(())
    }
}

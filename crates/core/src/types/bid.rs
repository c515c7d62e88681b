use chrono::{DateTime, Utc};
use thiserror::Error;

use super::primitives::{Amount, AuctionId, ClientRequestId, UserId};

#[derive(Debug, Clone)]
pub struct BidSubmission {
    pub auction_id: AuctionId,
    pub buyer: UserId,
    pub amount: Amount,
    pub client_request_id: ClientRequestId,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("auction not found")]
    AuctionNotFound,

    #[error("auction is not live")]
    AuctionNotLive,

    #[error("bid must exceed the current price by at least the minimum increment")]
    TooLow,

    #[error("bid exceeds the maximum bid amount")]
    TooHigh,

    #[error("failed to persist bid: {0}")]
    StoreFailure(String),
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::AuctionNotFound => "auction_not_found",
            RejectReason::AuctionNotLive => "auction_not_live",
            RejectReason::TooLow => "bid_too_low",
            RejectReason::TooHigh => "bid_too_high",
            RejectReason::StoreFailure(_) => "store_failure",
        }
    }

    /// Whether resubmitting can succeed: with a different amount for the
    /// business-rule rejections, with a new idempotency token for store
    /// failures. State rejections are final for this auction.
    pub fn retryable(&self) -> bool {
        match self {
            RejectReason::AuctionNotFound | RejectReason::AuctionNotLive => false,
            RejectReason::TooLow | RejectReason::TooHigh | RejectReason::StoreFailure(_) => true,
        }
    }
}

/// Immutable once non-pending.
#[derive(Debug, Clone, PartialEq)]
pub enum BidOutcome {
    Pending,
    Accepted {
        price: Amount,
        end_at: DateTime<Utc>,
    },
    Rejected(RejectReason),
}

impl BidOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, BidOutcome::Pending)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, BidOutcome::Accepted { .. })
    }
}

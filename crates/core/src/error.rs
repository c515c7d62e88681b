use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rejected synchronously at submission, never enqueued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("bid amount must be greater than zero")]
    AmountNotPositive,

    #[error("client request id must be {min} to {max} characters, got {len}")]
    BadTokenLength { len: usize, min: usize, max: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("auction not found")]
    AuctionNotFound,

    #[error("auction is not live")]
    NotLive,

    #[error("auction did not end unsold")]
    NotUnsold,

    #[error("auction already has accepted bids")]
    HasBids,

    #[error("caller is not the seller of this auction")]
    NotSeller,

    #[error("auction cannot be stopped from its current status")]
    NotStoppable,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("auction not found")]
    NotFound,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

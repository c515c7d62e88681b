use crate::{
    error::ValidationError,
    types::{
        auction::Auction,
        bid::RejectReason,
        config::EngineConfig,
        primitives::{Amount, ClientRequestId},
    },
};

/// Synchronous checks applied before a submission is allowed near the queue.
pub fn validate_submission(amount: Amount, client_request_id: &str) -> Result<(), ValidationError> {
    if amount.is_zero() {
        return Err(ValidationError::AmountNotPositive);
    }

    let len = client_request_id.chars().count();
    if !(ClientRequestId::MIN_LEN..=ClientRequestId::MAX_LEN).contains(&len) {
        return Err(ValidationError::BadTokenLength {
            len,
            min: ClientRequestId::MIN_LEN,
            max: ClientRequestId::MAX_LEN,
        });
    }

    Ok(())
}

/// Acceptance rules applied against the auction snapshot inside the queue.
/// A bid equal to `current_price + min_increment` is accepted: the increment
/// is the minimum step, not an exclusive bound.
pub fn check_bid(auction: &Auction, amount: Amount, config: &EngineConfig) -> Result<(), RejectReason> {
    if !auction.is_live() {
        return Err(RejectReason::AuctionNotLive);
    }

    if amount > config.max_amount {
        return Err(RejectReason::TooHigh);
    }

    if amount < auction.current_price.saturating_add(config.min_increment) {
        return Err(RejectReason::TooLow);
    }

    Ok(())
}

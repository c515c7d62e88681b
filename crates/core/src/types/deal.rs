use chrono::{DateTime, Utc};

use super::primitives::{Amount, AuctionId, UserId};

/// Created once when an auction closes sold; owned by deal management from
/// then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub auction_id: AuctionId,
    pub seller: UserId,
    pub buyer: UserId,
    pub price: Amount,
    pub confirm_by: DateTime<Utc>,
}

use chrono::{DateTime, Duration, Utc};

use super::{
    config::EngineConfig,
    primitives::{Amount, AuctionId, BidCount, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionStatus {
    Draft,
    Live,
    EndedSold,
    EndedUnsold,
    Cancelled,
}

impl AuctionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuctionStatus::EndedSold | AuctionStatus::EndedUnsold | AuctionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone)]
pub struct Auction {
    pub id: AuctionId,
    pub seller: UserId,
    pub item: String,
    pub start_price: Amount,
    pub current_price: Amount,
    pub bid_count: BidCount,
    pub leader: Option<UserId>,
    pub opened_at: DateTime<Utc>,
    /// Mutable deadline; only ever pushed later, by the anti-snipe rule.
    pub end_at: DateTime<Utc>,
    /// The deadline the auction was published with. Fixed reference point for
    /// the cumulative-extension ceiling.
    pub original_end_at: DateTime<Utc>,
    pub status: AuctionStatus,
}

impl Auction {
    pub fn new_listing(
        id: AuctionId,
        seller: UserId,
        item: String,
        start_price: Amount,
        opened_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            seller,
            item,
            start_price,
            current_price: start_price,
            bid_count: BidCount::ZERO,
            leader: None,
            opened_at,
            end_at,
            original_end_at: end_at,
            status: AuctionStatus::Live,
        }
    }

    /// Fresh listing for the same item, opening now and running for the same
    /// length as the source listing.
    pub fn relist(&self, id: AuctionId, now: DateTime<Utc>) -> Self {
        Self::new_listing(
            id,
            self.seller,
            self.item.clone(),
            self.start_price,
            now,
            now + self.listing_duration(),
        )
    }

    pub fn listing_duration(&self) -> Duration {
        self.original_end_at - self.opened_at
    }

    pub fn is_live(&self) -> bool {
        self.status == AuctionStatus::Live
    }

    /// Anti-snipe deadline push-back. Returns the new `end_at` when a bid
    /// accepted at `now` lands inside the snipe threshold, `None` otherwise.
    ///
    /// The pushed deadline is clipped twice: remaining time after the push may
    /// not exceed `max_remaining`, and the cumulative extension measured from
    /// `original_end_at` may not exceed `extension_ceiling`. A clip that
    /// yields no net increase means no extension.
    pub fn snipe_extended_end_at(
        &self,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Option<DateTime<Utc>> {
        let remaining = self.end_at - now;
        if remaining >= config.snipe_threshold {
            return None;
        }

        let mut candidate = self.end_at + config.snipe_extension;
        if candidate - now > config.max_remaining {
            candidate = now + config.max_remaining;
        }
        if candidate - self.original_end_at > config.extension_ceiling {
            candidate = self.original_end_at + config.extension_ceiling;
        }

        if candidate > self.end_at {
            Some(candidate)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(end_in: Duration) -> Auction {
        let now = Utc::now();
        Auction::new_listing(
            AuctionId::new(1),
            UserId::new(7),
            "lot".into(),
            Amount::new(10_000),
            now - Duration::hours(1),
            now + end_in,
        )
    }

    #[test]
    fn bid_inside_threshold_extends_deadline() {
        let config = EngineConfig::default();
        let auction = listing(Duration::minutes(4));
        let now = auction.end_at - Duration::minutes(4);

        let extended = auction
            .snipe_extended_end_at(now, &config)
            .expect("should extend");
        assert_eq!(extended, auction.end_at + Duration::minutes(5));
    }

    #[test]
    fn bid_outside_threshold_does_not_extend() {
        let config = EngineConfig::default();
        let auction = listing(Duration::minutes(10));
        let now = auction.end_at - Duration::minutes(10);

        assert!(auction.snipe_extended_end_at(now, &config).is_none());
    }

    #[test]
    fn extension_is_clipped_to_remaining_cap() {
        let mut config = EngineConfig::default();
        config.snipe_threshold = Duration::minutes(40);
        config.snipe_extension = Duration::hours(2);
        let auction = listing(Duration::minutes(20));
        let now = auction.end_at - Duration::minutes(20);

        let extended = auction
            .snipe_extended_end_at(now, &config)
            .expect("should extend");
        assert_eq!(extended, now + Duration::minutes(30));
    }

    #[test]
    fn cumulative_extension_stops_at_ceiling() {
        let config = EngineConfig::default();
        let mut auction = listing(Duration::minutes(2));
        // Already pushed to the ceiling by earlier extensions.
        auction.end_at = auction.original_end_at + Duration::hours(12);
        let now = auction.end_at - Duration::minutes(2);

        assert!(auction.snipe_extended_end_at(now, &config).is_none());
    }

    #[test]
    fn partial_headroom_below_ceiling_is_granted() {
        let config = EngineConfig::default();
        let mut auction = listing(Duration::minutes(2));
        auction.end_at = auction.original_end_at + Duration::hours(12) - Duration::minutes(2);
        let now = auction.end_at - Duration::minutes(2);

        let extended = auction
            .snipe_extended_end_at(now, &config)
            .expect("should grant the remaining headroom");
        assert_eq!(extended, auction.original_end_at + Duration::hours(12));
    }

    #[test]
    fn relist_keeps_item_and_length() {
        let auction = listing(Duration::minutes(10));
        let now = Utc::now();
        let fresh = auction.relist(AuctionId::new(2), now);

        assert_eq!(fresh.item, auction.item);
        assert_eq!(fresh.start_price, auction.start_price);
        assert_eq!(fresh.current_price, auction.start_price);
        assert!(fresh.bid_count.is_zero());
        assert_eq!(fresh.end_at - fresh.opened_at, auction.listing_duration());
        assert_eq!(fresh.status, AuctionStatus::Live);
    }
}

use std::time::Duration as StdDuration;

use chrono::Duration;

use super::primitives::Amount;

/// Engine tunables. Time-of-auction rules use [`chrono::Duration`] because
/// they describe wall-clock deadlines; the submit wait and result TTL are
/// process-local and use [`std::time::Duration`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A bid must reach `current_price + min_increment` to be accepted.
    pub min_increment: Amount,
    /// Hard upper bound on any single bid.
    pub max_amount: Amount,
    /// A bid accepted with less than this much time remaining triggers an
    /// anti-snipe extension.
    pub snipe_threshold: Duration,
    /// How far a single extension pushes `end_at`.
    pub snipe_extension: Duration,
    /// Remaining time after an extension is clipped to this cap.
    pub max_remaining: Duration,
    /// Cumulative extension past the original end time is refused beyond this.
    pub extension_ceiling: Duration,
    /// Window the buyer gets to confirm a deal after a sold close.
    pub deal_confirm_window: Duration,
    /// How long a recorded bid outcome stays retrievable.
    pub result_ttl: StdDuration,
    /// Bounded wait for a submission to resolve before returning `Pending`.
    pub submit_wait: StdDuration,
    pub submit_poll: StdDuration,
    /// Pause between attempts when a scheduled close fails to commit.
    pub close_retry_delay: StdDuration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_increment: Amount::new(100),
            max_amount: Amount::new(10_000_000),
            snipe_threshold: Duration::minutes(5),
            snipe_extension: Duration::minutes(5),
            max_remaining: Duration::minutes(30),
            extension_ceiling: Duration::hours(12),
            deal_confirm_window: Duration::days(7),
            result_ttl: StdDuration::from_secs(600),
            submit_wait: StdDuration::from_millis(1500),
            submit_poll: StdDuration::from_millis(50),
            close_retry_delay: StdDuration::from_secs(5),
        }
    }
}

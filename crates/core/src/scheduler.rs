use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::types::primitives::AuctionId;

/// Invoked when an armed close timer fires. `armed_end_at` is the deadline
/// the timer was armed for; implementations must re-check it against the
/// authoritative auction state and abort stale fires silently.
#[async_trait]
pub trait CloseHandler: Send + Sync {
    async fn fire(&self, auction_id: AuctionId, armed_end_at: DateTime<Utc>);
}

#[derive(Debug)]
struct ArmedTimer {
    end_at: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-auction close timer registry. At most one live timer per auction:
/// arming for a changed `end_at` supersedes (aborts) the previous timer.
/// Supersede/fire races are tolerated because the handler re-checks the
/// armed deadline at fire time.
pub struct CloseScheduler {
    handler: Arc<dyn CloseHandler>,
    timers: DashMap<AuctionId, ArmedTimer>,
    generation: AtomicU64,
}

impl CloseScheduler {
    pub fn new(handler: Arc<dyn CloseHandler>) -> Arc<Self> {
        Arc::new(Self {
            handler,
            timers: DashMap::new(),
            generation: AtomicU64::new(0),
        })
    }

    /// Arms a timer for `end_at`, superseding any timer already armed for
    /// this auction. Must run inside a tokio runtime.
    pub fn schedule(self: &Arc<Self>, auction_id: AuctionId, end_at: DateTime<Utc>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let handler = self.handler.clone();
        let registry = self.clone();

        let handle = tokio::spawn(async move {
            let delay = (end_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
            // Deregister our own entry (and only ours) before firing so a
            // rearm from the handler path installs cleanly.
            registry
                .timers
                .remove_if(&auction_id, |_, timer| timer.generation == generation);
            handler.fire(auction_id, end_at).await;
        });

        let armed = ArmedTimer {
            end_at,
            generation,
            handle,
        };
        if let Some(previous) = self.timers.insert(auction_id, armed) {
            previous.handle.abort();
            tracing::debug!(
                auction = %auction_id,
                superseded_end_at = %previous.end_at,
                end_at = %end_at,
                "close timer superseded"
            );
        } else {
            tracing::debug!(auction = %auction_id, end_at = %end_at, "close timer armed");
        }
    }

    /// Disarms any pending timer, e.g. on seller stop.
    pub fn cancel(&self, auction_id: AuctionId) {
        if let Some((_, timer)) = self.timers.remove(&auction_id) {
            timer.handle.abort();
            tracing::debug!(auction = %auction_id, "close timer cancelled");
        }
    }

    pub fn armed_end_at(&self, auction_id: AuctionId) -> Option<DateTime<Utc>> {
        self.timers.get(&auction_id).map(|timer| timer.end_at)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        fires: Mutex<Vec<(AuctionId, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl CloseHandler for RecordingHandler {
        async fn fire(&self, auction_id: AuctionId, armed_end_at: DateTime<Utc>) {
            self.fires.lock().await.push((auction_id, armed_end_at));
        }
    }

    #[tokio::test]
    async fn timer_fires_once_at_deadline() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = CloseScheduler::new(handler.clone());
        let end_at = Utc::now() + Duration::milliseconds(30);

        scheduler.schedule(AuctionId::new(1), end_at);
        tokio::time::sleep(StdDuration::from_millis(120)).await;

        let fires = handler.fires.lock().await;
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0], (AuctionId::new(1), end_at));
        assert!(scheduler.armed_end_at(AuctionId::new(1)).is_none());
    }

    #[tokio::test]
    async fn reschedule_supersedes_prior_timer() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = CloseScheduler::new(handler.clone());
        let first = Utc::now() + Duration::milliseconds(40);
        let second = Utc::now() + Duration::milliseconds(90);

        scheduler.schedule(AuctionId::new(1), first);
        scheduler.schedule(AuctionId::new(1), second);
        tokio::time::sleep(StdDuration::from_millis(200)).await;

        let fires = handler.fires.lock().await;
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].1, second);
    }

    #[tokio::test]
    async fn cancel_disarms_timer() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = CloseScheduler::new(handler.clone());

        scheduler.schedule(AuctionId::new(1), Utc::now() + Duration::milliseconds(30));
        scheduler.cancel(AuctionId::new(1));
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert!(handler.fires.lock().await.is_empty());
    }

    #[tokio::test]
    async fn timers_for_different_auctions_are_independent() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = CloseScheduler::new(handler.clone());

        scheduler.schedule(AuctionId::new(1), Utc::now() + Duration::milliseconds(20));
        scheduler.schedule(AuctionId::new(2), Utc::now() + Duration::milliseconds(40));
        tokio::time::sleep(StdDuration::from_millis(150)).await;

        let fires = handler.fires.lock().await;
        assert_eq!(fires.len(), 2);
    }
}

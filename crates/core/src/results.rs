use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::types::{
    bid::BidOutcome,
    primitives::{ClientRequestId, UserId},
};

pub type ResultKey = (UserId, ClientRequestId);

/// Outcome of the idempotency gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// A pending record was created; the caller owns enqueueing the bid.
    Fresh,
    /// The key was already claimed; retransmission returns the recorded
    /// outcome and must not re-enqueue.
    Existing(BidOutcome),
}

#[derive(Debug, Clone)]
struct ResultEntry {
    outcome: BidOutcome,
    expires_at: DateTime<Utc>,
}

/// TTL-bounded record of bid-processing outcomes keyed by
/// `(buyer, client_request_id)`. Entries start `Pending`, become immutable
/// once completed, and stay retrievable for the client's polling window.
#[derive(Debug)]
pub struct ResultStore {
    entries: DashMap<ResultKey, ResultEntry>,
    ttl: chrono::Duration,
}

impl ResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(10)),
        }
    }

    /// Atomic insert-if-absent of a `Pending` record. The dashmap entry guard
    /// makes concurrent retransmissions of the same key race safely: exactly
    /// one caller observes `Fresh`.
    pub fn begin(&self, key: ResultKey, now: DateTime<Utc>) -> Gate {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Gate::Existing(occupied.get().outcome.clone());
                }
                // Expired leftover; the key is free to be claimed again.
                occupied.insert(self.pending_entry(now));
                Gate::Fresh
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.pending_entry(now));
                Gate::Fresh
            }
        }
    }

    /// Records the terminal outcome for a pending key. A key that already
    /// holds a non-pending outcome is left untouched.
    pub fn complete(&self, key: &ResultKey, outcome: BidOutcome) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.outcome.is_pending() {
                entry.outcome = outcome;
            }
        }
    }

    pub fn get(&self, key: &ResultKey, now: DateTime<Utc>) -> Option<BidOutcome> {
        let entry = self.entries.get(key)?;
        if entry.expires_at > now {
            Some(entry.outcome.clone())
        } else {
            None
        }
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pending_entry(&self, now: DateTime<Utc>) -> ResultEntry {
        ResultEntry {
            outcome: BidOutcome::Pending,
            expires_at: now + self.ttl,
        }
    }
}

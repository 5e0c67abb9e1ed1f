//! Status feed for observing sync progress.
//!
//! The coordinator publishes a [`SyncStatus`] snapshot whenever its phase,
//! connectivity, or error state changes. Subscribers receive snapshots over
//! a plain mpsc channel, so a UI thread can block on `recv` without holding
//! any coordinator lock.

use crate::state::SyncStatus;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// Watcher list and latest snapshot, updated together under one lock.
struct FeedInner {
    watchers: Vec<Sender<SyncStatus>>,
    latest: SyncStatus,
}

/// A latest-value feed of [`SyncStatus`] snapshots.
pub struct StatusFeed {
    inner: Mutex<FeedInner>,
}

impl StatusFeed {
    /// Creates a feed seeded with the given snapshot.
    pub fn new(initial: SyncStatus) -> Self {
        Self {
            inner: Mutex::new(FeedInner {
                watchers: Vec::new(),
                latest: initial,
            }),
        }
    }

    /// Subscribes to status updates.
    ///
    /// The latest snapshot is delivered first, so a new subscriber never
    /// starts blind.
    pub fn subscribe(&self) -> Receiver<SyncStatus> {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock();
        let _ = tx.send(inner.latest.clone());
        inner.watchers.push(tx);
        rx
    }

    /// Publishes a snapshot, pruning watchers whose receiver is gone.
    pub fn publish(&self, status: SyncStatus) {
        let mut inner = self.inner.lock();
        inner.latest = status.clone();
        inner.watchers.retain(|tx| tx.send(status.clone()).is_ok());
    }

    /// Returns the most recently published snapshot.
    pub fn current(&self) -> SyncStatus {
        self.inner.lock().latest.clone()
    }

    /// Number of receivers still attached.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().watchers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SyncState;
    use std::time::Duration;

    fn feed() -> StatusFeed {
        StatusFeed::new(SyncStatus::initial(true, 0))
    }

    #[test]
    fn a_new_subscriber_receives_the_seed_snapshot() {
        let feed = feed();
        let updates = feed.subscribe();

        let first = updates.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(first.state, SyncState::Idle);
        assert!(first.online);
    }

    #[test]
    fn every_watcher_sees_each_publish() {
        let feed = feed();
        let a = feed.subscribe();
        let b = feed.subscribe();
        let _ = a.recv().unwrap();
        let _ = b.recv().unwrap();

        let mut status = feed.current();
        status.state = SyncState::Pushing;
        feed.publish(status);

        assert_eq!(a.recv().unwrap().state, SyncState::Pushing);
        assert_eq!(b.recv().unwrap().state, SyncState::Pushing);
        assert_eq!(feed.current().state, SyncState::Pushing);
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let feed = feed();
        let updates = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(updates);
        feed.publish(SyncStatus::initial(false, 0));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn current_reflects_the_last_publish_without_subscribing() {
        let feed = feed();
        let mut status = feed.current();
        status.online = false;
        feed.publish(status);
        assert!(!feed.current().online);
    }
}

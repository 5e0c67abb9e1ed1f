//! Background scheduler for periodic sync.
//!
//! The scheduler owns one worker thread that runs a cycle every
//! `sync_interval`, sleeping on a condvar in between so [`trigger_now`]
//! and shutdown interrupt the wait instead of racing a sleep. Dropping the
//! handle stops the thread and joins it.
//!
//! [`trigger_now`]: SyncScheduler::trigger_now

use crate::coordinator::SyncCoordinator;
use crate::transport::SyncTransport;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Handle to the background sync thread.
pub struct SyncScheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    wake: Mutex<Wake>,
    signal: Condvar,
}

#[derive(Default)]
struct Wake {
    stop: bool,
    kick: bool,
}

impl SyncScheduler {
    /// Spawns the scheduler thread.
    ///
    /// The interval comes from the coordinator's configuration. The first
    /// cycle runs after one full interval unless triggered earlier.
    pub fn start<T: SyncTransport + 'static>(coordinator: Arc<SyncCoordinator<T>>) -> Self {
        let interval = coordinator.config().sync_interval;
        let shared = Arc::new(Shared {
            wake: Mutex::new(Wake::default()),
            signal: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || run_loop(coordinator, thread_shared, interval));
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Wakes the scheduler for an immediate cycle.
    pub fn trigger_now(&self) {
        let mut wake = self.shared.wake.lock();
        wake.kick = true;
        self.shared.signal.notify_one();
    }

    /// Stops the scheduler and joins its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let mut wake = self.shared.wake.lock();
            wake.stop = true;
        }
        self.shared.signal.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<T: SyncTransport>(
    coordinator: Arc<SyncCoordinator<T>>,
    shared: Arc<Shared>,
    interval: Duration,
) {
    debug!(?interval, "sync scheduler started");
    loop {
        {
            let mut wake = shared.wake.lock();
            let deadline = Instant::now() + interval;
            while !wake.stop && !wake.kick {
                if shared.signal.wait_until(&mut wake, deadline).timed_out() {
                    break;
                }
            }
            if wake.stop {
                debug!("sync scheduler stopping");
                return;
            }
            wake.kick = false;
        }

        match coordinator.sync_with_retry() {
            Ok(outcome) => debug!(?outcome, "scheduled sync finished"),
            Err(error) => warn!(%error, "scheduled sync failed"),
        }
    }
}

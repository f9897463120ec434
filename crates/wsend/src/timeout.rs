// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send timeout tracking.
//!
//! Blocked writes register an absolute deadline here; a background thread
//! scans the table and fires [`TimeoutTarget::on_timeout`] on every entry
//! whose deadline has passed.
//!
//! # Architecture
//!
//! ```text
//! +------------------+  register/unregister   +---------------------------+
//! |   AsyncSender    | ---------------------> |       TimeoutTable        |
//! |   (per peer)     |                        |  BTreeMap<(deadline, id)> |
//! +------------------+                        |  HashMap<id, deadline>    |
//!          ^                                  +-------------+-------------+
//!          |  on_timeout()                                  | expire(now)
//!          |                                  +-------------v-------------+
//!          +--------------------------------- |      TimeoutTracker       |
//!                                             |  "wsend-timeout" thread   |
//!                                             +---------------------------+
//! ```
//!
//! - Each writer holds at most one entry; registering again replaces it.
//! - Expired entries are removed under the table lock, then fired after the
//!   lock is released so targets may call back into the table.
//! - Targets are held weakly; a dropped writer never fires.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::TimeoutConfig;

/// Process-unique identity of a registered writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriterId(u64);

impl WriterId {
    /// Allocate the next identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value (for logging).
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WriterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "writer-{}", self.0)
    }
}

/// Something that can be told its deadline has passed.
pub trait TimeoutTarget: Send + Sync {
    /// Called by the tracker once the registered deadline has passed.
    fn on_timeout(&self);
}

/// Registry of pending writes and their deadlines.
pub trait TimeoutRegistry: Send + Sync {
    /// Register (or re-arm) `id` with an absolute deadline.
    fn register(&self, id: WriterId, deadline: Instant, target: Weak<dyn TimeoutTarget>);

    /// Remove `id`; a no-op when it is not registered.
    fn unregister(&self, id: WriterId);
}

/// Registry that never tracks anything, for senders without timeouts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTimeouts;

impl TimeoutRegistry for NoTimeouts {
    fn register(&self, _id: WriterId, _deadline: Instant, _target: Weak<dyn TimeoutTarget>) {}

    fn unregister(&self, _id: WriterId) {}
}

// ============================================================================
// Timeout table
// ============================================================================

#[derive(Default)]
struct Entries {
    /// Entries ordered by expiry, so a scan stops at the first live one
    by_deadline: BTreeMap<(Instant, WriterId), Weak<dyn TimeoutTarget>>,
    /// Current deadline of each registered writer
    deadlines: HashMap<WriterId, Instant>,
}

impl Entries {
    fn insert(&mut self, id: WriterId, deadline: Instant, target: Weak<dyn TimeoutTarget>) {
        if let Some(previous) = self.deadlines.insert(id, deadline) {
            self.by_deadline.remove(&(previous, id));
        }
        self.by_deadline.insert((deadline, id), target);
    }

    fn remove(&mut self, id: WriterId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => {
                self.by_deadline.remove(&(deadline, id));
                true
            }
            None => false,
        }
    }

    fn take_expired(&mut self, now: Instant) -> Vec<(WriterId, Weak<dyn TimeoutTarget>)> {
        let mut expired = Vec::new();
        while let Some((&(deadline, id), _)) = self.by_deadline.first_key_value() {
            if deadline > now {
                break;
            }
            if let Some(target) = self.by_deadline.remove(&(deadline, id)) {
                self.deadlines.remove(&id);
                expired.push((id, target));
            }
        }
        expired
    }
}

/// Shared deadline table. Implements [`TimeoutRegistry`].
#[derive(Default)]
pub struct TimeoutTable {
    entries: Mutex<Entries>,
}

impl TimeoutTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered writers.
    pub fn len(&self) -> usize {
        self.entries.lock().deadlines.len()
    }

    /// Check if no writer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether `id` is registered.
    pub fn contains(&self, id: WriterId) -> bool {
        self.entries.lock().deadlines.contains_key(&id)
    }

    /// Deadline currently registered for `id`.
    pub fn deadline(&self, id: WriterId) -> Option<Instant> {
        self.entries.lock().deadlines.get(&id).copied()
    }

    /// Remove every entry whose deadline is at or before `now` and fire it.
    ///
    /// Returns the number of targets notified.
    pub fn expire(&self, now: Instant) -> usize {
        let expired = self.entries.lock().take_expired(now);

        let mut fired = 0;
        for (id, target) in expired {
            match target.upgrade() {
                Some(target) => {
                    log::debug!("[timeout] {} expired", id);
                    target.on_timeout();
                    fired += 1;
                }
                None => log::debug!("[timeout] {} expired after drop, skipping", id),
            }
        }
        fired
    }
}

impl TimeoutRegistry for TimeoutTable {
    fn register(&self, id: WriterId, deadline: Instant, target: Weak<dyn TimeoutTarget>) {
        self.entries.lock().insert(id, deadline, target);
    }

    fn unregister(&self, id: WriterId) {
        self.entries.lock().remove(id);
    }
}

impl std::fmt::Debug for TimeoutTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutTable")
            .field("registered", &self.len())
            .finish()
    }
}

// ============================================================================
// Timeout tracker thread
// ============================================================================

/// Background thread periodically expiring a [`TimeoutTable`].
///
/// # Graceful Shutdown
/// Call `stop()` (or drop the tracker) to signal the thread and join it.
/// The stop signal interrupts the current wait, so shutdown does not wait
/// for a full scan interval.
pub struct TimeoutTracker {
    table: Arc<TimeoutTable>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutTracker {
    /// Start the tracker thread with a fresh table.
    pub fn start(config: TimeoutConfig) -> io::Result<Self> {
        Self::with_table(Arc::new(TimeoutTable::new()), config)
    }

    /// Start the tracker thread over an existing table.
    pub fn with_table(table: Arc<TimeoutTable>, config: TimeoutConfig) -> io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let scan_table = Arc::clone(&table);
        let interval = config.scan_interval;

        let handle = thread::Builder::new()
            .name("wsend-timeout".to_string())
            .spawn(move || {
                log::debug!("[timeout] tracker started, scan interval {:?}", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let fired = scan_table.expire(Instant::now());
                            if fired > 0 {
                                log::debug!("[timeout] fired {} expired writes", fired);
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("[timeout] tracker stopped");
            })?;

        Ok(Self {
            table,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// The table scanned by this tracker.
    pub fn table(&self) -> &Arc<TimeoutTable> {
        &self.table
    }

    /// Registry handle to inject into senders.
    pub fn registry(&self) -> Arc<dyn TimeoutRegistry> {
        self.table.clone()
    }

    /// Check if the tracker thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the tracker gracefully.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("[timeout] tracker thread panicked");
            }
        }
    }
}

impl Drop for TimeoutTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================

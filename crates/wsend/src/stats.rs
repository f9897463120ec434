// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send path statistics.
//!
//! Relaxed atomic counters updated by [`AsyncSender`](crate::AsyncSender).
//! One instance may be shared by several senders to aggregate a whole
//! connection pool.
//!
//! # Example
//!
//! ```
//! use wsend::SendStats;
//!
//! let stats = SendStats::new();
//! stats.record_submitted();
//! stats.record_bytes_written(512);
//! stats.record_completed();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.completed, 1);
//! assert_eq!(snapshot.bytes_written, 512);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the send path.
#[derive(Debug, Default)]
pub struct SendStats {
    /// Requests accepted for sending
    submitted: AtomicU64,

    /// Requests rejected at submission (busy or closed)
    rejected: AtomicU64,

    /// Requests that completed successfully
    completed: AtomicU64,

    /// Requests failed by a transport error or close
    failed: AtomicU64,

    /// Requests failed by the send timeout
    timed_out: AtomicU64,

    /// Calls into `TransportWriter::write`
    write_attempts: AtomicU64,

    /// Bytes accepted by the transport
    bytes_written: AtomicU64,

    /// Times a request parked waiting for writability
    blocked: AtomicU64,
}

/// Point-in-time copy of [`SendStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendStatsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub write_attempts: u64,
    pub bytes_written: u64,
    pub blocked: u64,
}

impl SendStatsSnapshot {
    /// Requests that reached a terminal outcome.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.timed_out
    }
}

impl SendStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_attempt(&self) {
        self.write_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> SendStatsSnapshot {
        SendStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            write_attempts: self.write_attempts.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Send configuration.
//!
//! Provides configuration types for the send path:
//! - [`SendConfig`] - Per-sender async send timeout
//! - [`TimeoutConfig`] - Scan rate of the shared timeout tracker
//!
//! # Example
//!
//! ```
//! use wsend::SendConfig;
//! use std::time::Duration;
//!
//! let config = SendConfig::default().with_timeout(Some(Duration::from_secs(5)));
//! assert_eq!(config.async_send_timeout, Some(Duration::from_secs(5)));
//!
//! // Zero or negative milliseconds disable timeout tracking
//! assert_eq!(SendConfig::from_millis(-1).async_send_timeout, None);
//! ```

use std::time::Duration;

/// Environment variable overriding the async send timeout (milliseconds).
pub const ASYNC_SEND_TIMEOUT_ENV: &str = "WSEND_ASYNC_SEND_TIMEOUT_MS";

/// Default async send timeout (20 seconds).
pub const DEFAULT_ASYNC_SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Default scan interval of the timeout tracker (1 Hz).
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration of a single sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendConfig {
    /// How long a blocked write may wait for the transport to become writable.
    ///
    /// `None` disables timeout tracking: a blocked write waits indefinitely.
    pub async_send_timeout: Option<Duration>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            async_send_timeout: Some(DEFAULT_ASYNC_SEND_TIMEOUT),
        }
    }
}

impl SendConfig {
    /// Create a config from a millisecond value; `<= 0` disables the timeout.
    pub fn from_millis(millis: i64) -> Self {
        let async_send_timeout = u64::try_from(millis)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        Self { async_send_timeout }
    }

    /// Create a config without timeout tracking.
    pub fn no_timeout() -> Self {
        Self {
            async_send_timeout: None,
        }
    }

    /// Load the timeout from `WSEND_ASYNC_SEND_TIMEOUT_MS`, falling back to the default.
    pub fn from_env() -> Self {
        match std::env::var(ASYNC_SEND_TIMEOUT_ENV) {
            Ok(raw) => Self::parse_millis(&raw).unwrap_or_else(|| {
                log::warn!(
                    "[wsend] ignoring invalid {}={:?}, using default {:?}",
                    ASYNC_SEND_TIMEOUT_ENV,
                    raw,
                    DEFAULT_ASYNC_SEND_TIMEOUT
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn parse_millis(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(Self::from_millis)
    }

    /// Builder: set the async send timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.async_send_timeout = timeout.filter(|d| !d.is_zero());
        self
    }
}

/// Configuration of the shared timeout tracker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// How often the background thread scans for expired writes.
    pub scan_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl TimeoutConfig {
    /// Builder: set the scan interval.
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error and outcome types for asynchronous sends.
//!
//! Every submitted write produces exactly one [`SendResult`], delivered through
//! the request's [`SendHandler`](crate::SendHandler).
//!
//! # Example
//!
//! ```
//! use wsend::{SendError, SendResult};
//!
//! fn report(result: SendResult) {
//!     match result {
//!         Ok(()) => println!("frame delivered"),
//!         Err(e) if e.is_timeout() => println!("peer stopped reading: {}", e),
//!         Err(e) => println!("send failed: {}", e),
//!     }
//! }
//! # report(Ok(()));
//! ```

use std::io;
use std::time::Duration;

/// Failure cause carried by a failed send.
#[derive(Debug)]
pub enum SendError {
    // ========================================================================
    // Terminal transport errors
    // ========================================================================
    /// The transport raised an I/O error during a write attempt.
    Io(io::Error),
    /// No writability notification arrived before the deadline.
    Timeout(Duration),

    // ========================================================================
    // Lifecycle errors
    // ========================================================================
    /// The sender was closed before the request could complete.
    Closed,
    /// A request is already in flight; submissions must be serialized.
    WriteInProgress,
}

impl SendError {
    /// Check whether this is a timeout failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SendError::Timeout(_))
    }

    /// Check whether this is a transport I/O failure.
    pub fn is_io(&self) -> bool {
        matches!(self, SendError::Io(_))
    }

    /// Map this error onto an [`io::ErrorKind`] for callers speaking `std::io`.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            SendError::Io(e) => e.kind(),
            SendError::Timeout(_) => io::ErrorKind::TimedOut,
            SendError::Closed => io::ErrorKind::NotConnected,
            SendError::WriteInProgress => io::ErrorKind::WouldBlock,
        }
    }
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Io(e) => write!(f, "I/O error: {}", e),
            SendError::Timeout(after) => {
                write!(f, "Send timed out after {} ms", after.as_millis())
            }
            SendError::Closed => write!(f, "Sender closed"),
            SendError::WriteInProgress => write!(f, "A write is already in progress"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SendError {
    fn from(e: io::Error) -> Self {
        SendError::Io(e)
    }
}

impl From<SendError> for io::Error {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io(inner) => inner,
            other => io::Error::new(other.kind(), other.to_string()),
        }
    }
}

/// Outcome of one write request.
pub type SendResult = Result<(), SendError>;

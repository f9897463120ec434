// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound byte buffers with a read position and limit.

use std::sync::Arc;

/// An immutable byte slice plus a cursor tracking how much has been written.
///
/// The readable window is `position..limit`. Payloads are shared through an
/// `Arc<[u8]>` so the same frame can be handed to several senders without
/// copying.
#[derive(Clone, Debug)]
pub struct OutboundBuffer {
    data: Arc<[u8]>,
    position: usize,
    limit: usize,
}

impl OutboundBuffer {
    /// Wrap a payload; the whole payload is readable.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let limit = data.len();
        Self {
            data,
            position: 0,
            limit,
        }
    }

    /// Wrap a payload, exposing only `position..limit`.
    ///
    /// Bounds are clamped to the payload length.
    pub fn with_window(data: impl Into<Arc<[u8]>>, position: usize, limit: usize) -> Self {
        let data = data.into();
        let limit = limit.min(data.len());
        Self {
            data,
            position: position.min(limit),
            limit,
        }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// End of the readable window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Check whether unread bytes remain.
    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// The unread bytes.
    pub fn chunk(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Mark `n` bytes as written. Advancing past the limit saturates.
    pub fn advance(&mut self, n: usize) {
        self.position = self.position.saturating_add(n).min(self.limit);
    }
}

impl From<Vec<u8>> for OutboundBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for OutboundBuffer {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

impl<const N: usize> From<&[u8; N]> for OutboundBuffer {
    fn from(data: &[u8; N]) -> Self {
        Self::new(&data[..])
    }
}

impl From<Arc<[u8]>> for OutboundBuffer {
    fn from(data: Arc<[u8]>) -> Self {
        Self::new(data)
    }
}

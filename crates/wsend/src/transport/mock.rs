// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted transport for sender tests.
//!
//! The transport and its [`MockHandle`] share state so a test can steer
//! writability and inspect what was written after the transport has been
//! moved into a sender.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::TransportWriter;

#[derive(Debug, Default)]
struct MockState {
    /// Bytes accepted so far
    written: Vec<u8>,
    /// Length of the slice offered on each write call
    attempts: Vec<usize>,
    writable: bool,
    /// Upper bound on bytes accepted per write call
    max_chunk: Option<usize>,
    /// Number of upcoming writes that accept nothing and clear `writable`
    stalls: usize,
    /// Writes left before the transport reports itself unwritable
    writes_before_block: Option<usize>,
    write_error: Option<io::ErrorKind>,
    close_error: Option<io::ErrorKind>,
    close_calls: usize,
    /// Ordered log of externally visible actions
    events: Vec<String>,
}

/// Transport half, handed to the sender.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Test half, kept by the test.
#[derive(Clone, Debug)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create an always-writable transport and its handle.
    pub fn pair() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            writable: true,
            ..MockState::default()
        }));
        (
            Self {
                state: state.clone(),
            },
            MockHandle { state },
        )
    }
}

impl TransportWriter for MockTransport {
    fn can_write(&self) -> bool {
        self.state.lock().writable
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.attempts.push(buf.len());

        if let Some(kind) = state.write_error.take() {
            state.events.push("write-error".to_string());
            return Err(io::Error::new(kind, "injected error"));
        }
        if state.stalls > 0 {
            state.stalls -= 1;
            state.writable = false;
            return Ok(0);
        }

        let n = state.max_chunk.map_or(buf.len(), |max| max.min(buf.len()));
        state.written.extend_from_slice(&buf[..n]);
        state.events.push(format!("write:{}", n));

        if let Some(left) = state.writes_before_block.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                state.writes_before_block = None;
                state.writable = false;
            }
        }
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        state.writable = false;
        state.events.push("close".to_string());
        match state.close_error.take() {
            Some(kind) => Err(io::Error::new(kind, "injected close error")),
            None => Ok(()),
        }
    }
}

impl MockHandle {
    pub fn set_writable(&self, writable: bool) {
        self.state.lock().writable = writable;
    }

    pub fn set_max_chunk(&self, max: usize) {
        self.state.lock().max_chunk = Some(max);
    }

    pub fn stall_writes(&self, count: usize) {
        self.state.lock().stalls = count;
    }

    pub fn block_after_writes(&self, count: usize) {
        self.state.lock().writes_before_block = Some(count);
    }

    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.state.lock().write_error = Some(kind);
    }

    pub fn fail_close(&self, kind: io::ErrorKind) {
        self.state.lock().close_error = Some(kind);
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn attempts(&self) -> Vec<usize> {
        self.state.lock().attempts.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    /// Append a marker to the action log (e.g. from a completion handler).
    pub fn mark(&self, event: &str) {
        self.state.lock().events.push(event.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }
}

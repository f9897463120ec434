// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Asynchronous write coordination for a single peer.
//!
//! Provides the [`AsyncSender`] type which drives one in-flight write request
//! at a time over a [`TransportWriter`]:
//! - Write-until-blocked loop over an ordered list of buffers
//! - Deadline registration while the transport is blocked
//! - Exactly-once completion through a [`SendHandler`]
//!
//! # State Machine
//!
//! ```text
//!      +----------+
//!      |   Idle   |<--------------------------------------+
//!      +----+-----+                                       |
//!           | submit()                                    |
//!           v                                             |
//!      +----------+  transport full   +-----------+       |
//!      | Writing  |------------------>|  Blocked  |       |
//!      +----+-----+<------------------+-----+-----+       |
//!           |          on_writable()        |             |
//!           |                               | on_timeout()|
//!           | all drained / I/O error       v             |
//!           |                         +-----------+       |
//!           +------------------------>| Complete, |-------+
//!                     close()         | Failed or |
//!                                     | Timed out |
//!                                     +-----------+
//! ```
//!
//! # Locking
//!
//! Every entry point (`submit`, `on_writable`, `on_timeout`, `close`) takes
//! the per-sender lock for the whole loop-and-decide sequence. The completion
//! handler is moved out of the shared state and invoked after the lock is
//! released, so it may submit the next request straight away.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::buffer::OutboundBuffer;
use crate::config::SendConfig;
use crate::error::{SendError, SendResult};
use crate::poller::WritableListener;
use crate::stats::SendStats;
use crate::timeout::{TimeoutRegistry, TimeoutTarget, WriterId};
use crate::transport::TransportWriter;

/// Completion callback of a write request.
pub type SendHandler = Box<dyn FnOnce(SendResult) + Send + 'static>;

/// Observable phase of a sender.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SendPhase {
    /// No request in flight
    #[default]
    Idle,

    /// A request is being drained
    Writing,

    /// A request is waiting for the transport to become writable
    Blocked,

    /// The transport has been closed (terminal)
    Closed,
}

impl std::fmt::Display for SendPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SendPhase::Idle => "Idle",
            SendPhase::Writing => "Writing",
            SendPhase::Blocked => "Blocked",
            SendPhase::Closed => "Closed",
        };
        write!(f, "{}", s)
    }
}

/// The in-flight request.
struct WriteRequest {
    buffers: Vec<OutboundBuffer>,
    handler: SendHandler,
    close_after: bool,
}

impl WriteRequest {
    fn remaining(&self) -> usize {
        self.buffers.iter().map(OutboundBuffer::remaining).sum()
    }
}

/// A handler paired with its outcome, invoked once the lock is released.
#[must_use]
struct Delivery {
    handler: SendHandler,
    result: SendResult,
}

impl Delivery {
    fn deliver(self) {
        (self.handler)(self.result);
    }
}

/// Result of one pass of the write loop.
enum Progress {
    Drained,
    Blocked,
    Failed(std::io::Error),
}

struct SenderState<W> {
    transport: W,
    request: Option<WriteRequest>,
    blocked: bool,
    /// Deadline registered with the timeout registry, if any
    deadline: Option<Instant>,
    /// Timeout that armed `deadline`
    armed_timeout: Duration,
    send_timeout: Option<Duration>,
    closed: bool,
}

/// Coordinates asynchronous writes to one peer.
///
/// Created behind an [`Arc`] so the timeout registry and readiness poller can
/// hold weak references back to it.
pub struct AsyncSender<W: TransportWriter> {
    id: WriterId,
    state: Mutex<SenderState<W>>,
    registry: Arc<dyn TimeoutRegistry>,
    stats: Arc<SendStats>,
    self_ref: Weak<Self>,
}

impl<W: TransportWriter + 'static> AsyncSender<W> {
    /// Create a sender over `transport`, tracking deadlines in `registry`.
    pub fn new(transport: W, registry: Arc<dyn TimeoutRegistry>, config: &SendConfig) -> Arc<Self> {
        Self::with_stats(transport, registry, config, Arc::new(SendStats::new()))
    }

    /// Create a sender that records into shared statistics.
    pub fn with_stats(
        transport: W,
        registry: Arc<dyn TimeoutRegistry>,
        config: &SendConfig,
        stats: Arc<SendStats>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            id: WriterId::next(),
            state: Mutex::new(SenderState {
                transport,
                request: None,
                blocked: false,
                deadline: None,
                armed_timeout: Duration::ZERO,
                send_timeout: config.async_send_timeout,
                closed: false,
            }),
            registry,
            stats,
            self_ref: self_ref.clone(),
        })
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Send `buffers` in order and report the outcome to `handler`.
    ///
    /// Only one request may be in flight; a second submission is rejected
    /// with [`SendError::WriteInProgress`] without disturbing the first.
    /// The handler is always called exactly once, possibly before this
    /// method returns.
    pub fn submit<I, F>(&self, buffers: I, handler: F)
    where
        I: IntoIterator,
        I::Item: Into<OutboundBuffer>,
        F: FnOnce(SendResult) + Send + 'static,
    {
        self.start(buffers.into_iter().map(Into::into).collect(), Box::new(handler), false);
    }

    /// Like [`submit`](Self::submit), closing the transport once every
    /// buffer has been written.
    pub fn submit_and_close<I, F>(&self, buffers: I, handler: F)
    where
        I: IntoIterator,
        I::Item: Into<OutboundBuffer>,
        F: FnOnce(SendResult) + Send + 'static,
    {
        self.start(buffers.into_iter().map(Into::into).collect(), Box::new(handler), true);
    }

    fn start(&self, buffers: Vec<OutboundBuffer>, handler: SendHandler, close_after: bool) {
        let delivery = {
            let mut state = self.state.lock();
            if state.closed {
                self.stats.record_rejected();
                Some(Delivery {
                    handler,
                    result: Err(SendError::Closed),
                })
            } else if state.request.is_some() {
                log::debug!("[wsend] {} rejected submit: write in progress", self.id);
                self.stats.record_rejected();
                Some(Delivery {
                    handler,
                    result: Err(SendError::WriteInProgress),
                })
            } else {
                self.stats.record_submitted();
                state.request = Some(WriteRequest {
                    buffers,
                    handler,
                    close_after,
                });
                self.drive(&mut state)
            }
        };

        if let Some(delivery) = delivery {
            delivery.deliver();
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Resume the in-flight request after the transport became writable.
    ///
    /// A no-op when idle or closed.
    pub fn on_writable(&self) {
        let delivery = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.transport.notify_writable();
            if state.request.is_none() {
                return;
            }
            self.drive(&mut state)
        };

        if let Some(delivery) = delivery {
            delivery.deliver();
        }
    }

    /// Fail the in-flight request with [`SendError::Timeout`].
    ///
    /// Ignored unless a request is blocked and its registered deadline has
    /// passed, so a notification that lost the race against completion (or
    /// against a re-armed deadline) delivers nothing.
    pub fn on_timeout(&self) {
        let delivery = {
            let mut state = self.state.lock();
            let expired = matches!(state.deadline, Some(deadline) if deadline <= Instant::now());
            if !state.blocked || !expired || state.request.is_none() {
                log::debug!("[wsend] {} ignoring stale timeout", self.id);
                return;
            }

            let after = state.armed_timeout;
            log::debug!("[wsend] {} timed out after {:?}", self.id, after);
            self.stats.record_timed_out();
            self.finish(&mut state, Err(SendError::Timeout(after)))
        };

        if let Some(delivery) = delivery {
            delivery.deliver();
        }
    }

    /// Close the transport.
    ///
    /// Idempotent. A request still in flight fails with
    /// [`SendError::Closed`]; an idle sender delivers nothing. Close-time I/O
    /// errors are logged and suppressed.
    pub fn close(&self) {
        let delivery = {
            let mut state = self.state.lock();
            let delivery = if state.request.is_some() {
                self.stats.record_failed();
                self.finish(&mut state, Err(SendError::Closed))
            } else {
                self.close_transport(&mut state);
                None
            };
            state.deadline = None;
            self.registry.unregister(self.id);
            delivery
        };

        if let Some(delivery) = delivery {
            delivery.deliver();
        }
    }

    // ========================================================================
    // Write loop
    // ========================================================================

    /// Run the write loop; returns a delivery once the request is finished.
    fn drive(&self, state: &mut SenderState<W>) -> Option<Delivery> {
        state.blocked = false;

        let progress = {
            let SenderState {
                transport, request, ..
            } = &mut *state;
            let request = request.as_mut()?;
            self.write_until_blocked(transport, request)
        };

        match progress {
            Progress::Drained => {
                self.stats.record_completed();
                self.finish(state, Ok(()))
            }
            Progress::Failed(e) => {
                log::debug!("[wsend] {} write failed: {}", self.id, e);
                self.stats.record_failed();
                self.finish(state, Err(SendError::Io(e)))
            }
            Progress::Blocked => {
                self.park(state);
                None
            }
        }
    }

    fn write_until_blocked(&self, transport: &mut W, request: &mut WriteRequest) -> Progress {
        loop {
            // Strict order: only the first buffer with unread bytes is offered
            let Some(buffer) = request.buffers.iter_mut().find(|b| b.has_remaining()) else {
                return Progress::Drained;
            };
            if !transport.can_write() {
                return Progress::Blocked;
            }

            self.stats.record_write_attempt();
            match transport.write(buffer.chunk()) {
                Ok(0) => return Progress::Blocked,
                Ok(n) => {
                    buffer.advance(n);
                    self.stats.record_bytes_written(n);
                }
                Err(e) => return Progress::Failed(e),
            }
        }
    }

    /// Mark the request blocked and (re-)arm its deadline.
    fn park(&self, state: &mut SenderState<W>) {
        state.blocked = true;
        self.stats.record_blocked();

        match state.send_timeout {
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                state.deadline = Some(deadline);
                state.armed_timeout = timeout;
                let target: Weak<dyn TimeoutTarget> = self.self_ref.clone();
                self.registry.register(self.id, deadline, target);
                log::debug!(
                    "[wsend] {} blocked with {} bytes pending, deadline in {:?}",
                    self.id,
                    state.request.as_ref().map_or(0, WriteRequest::remaining),
                    timeout
                );
            }
            None => {
                if state.deadline.take().is_some() {
                    self.registry.unregister(self.id);
                }
                log::debug!("[wsend] {} blocked without deadline", self.id);
            }
        }
    }

    /// Terminate the in-flight request: unregister, close if required, and
    /// hand back the handler with its outcome.
    fn finish(&self, state: &mut SenderState<W>, result: SendResult) -> Option<Delivery> {
        let request = state.request.take()?;
        state.blocked = false;
        if state.deadline.take().is_some() {
            self.registry.unregister(self.id);
        }

        if result.is_err() || request.close_after {
            self.close_transport(state);
        }

        Some(Delivery {
            handler: request.handler,
            result,
        })
    }

    fn close_transport(&self, state: &mut SenderState<W>) {
        if state.closed {
            return;
        }
        state.closed = true;
        if let Err(e) = state.transport.close() {
            log::info!("[wsend] {} failed to close transport: {}", self.id, e);
        }
    }
}

impl<W: TransportWriter> AsyncSender<W> {
    // ========================================================================
    // Getters
    // ========================================================================

    /// Identity used for timeout registration.
    pub fn id(&self) -> WriterId {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> SendPhase {
        let state = self.state.lock();
        if state.request.is_none() {
            if state.closed {
                SendPhase::Closed
            } else {
                SendPhase::Idle
            }
        } else if state.blocked {
            SendPhase::Blocked
        } else {
            SendPhase::Writing
        }
    }

    /// Check if no request is in flight.
    pub fn is_idle(&self) -> bool {
        self.state.lock().request.is_none()
    }

    /// Check if the transport has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Unwritten bytes of the in-flight request.
    pub fn pending_bytes(&self) -> usize {
        self.state
            .lock()
            .request
            .as_ref()
            .map_or(0, WriteRequest::remaining)
    }

    /// Deadline of the blocked request, if one is registered.
    pub fn deadline(&self) -> Option<Instant> {
        self.state.lock().deadline
    }

    /// Current async send timeout.
    pub fn send_timeout(&self) -> Option<Duration> {
        self.state.lock().send_timeout
    }

    /// Override the async send timeout; takes effect the next time a write
    /// blocks. `None` or zero disables the timeout.
    pub fn set_send_timeout(&self, timeout: Option<Duration>) {
        self.state.lock().send_timeout = timeout.filter(|d| !d.is_zero());
    }

    /// Statistics of this sender.
    pub fn stats(&self) -> &Arc<SendStats> {
        &self.stats
    }

    /// Run `f` on the transport under the sender lock.
    pub(crate) fn with_transport<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.state.lock().transport)
    }
}

impl<W: TransportWriter + 'static> TimeoutTarget for AsyncSender<W> {
    fn on_timeout(&self) {
        AsyncSender::on_timeout(self);
    }
}

impl<W: TransportWriter + 'static> WritableListener for AsyncSender<W> {
    fn on_writable(&self) {
        AsyncSender::on_writable(self);
    }
}

impl<W: TransportWriter> Drop for AsyncSender<W> {
    fn drop(&mut self) {
        self.registry.unregister(self.id);

        let state = self.state.get_mut();
        let pending = state.request.take();
        if !state.closed {
            state.closed = true;
            if let Err(e) = state.transport.close() {
                log::info!("[wsend] {} failed to close transport on drop: {}", self.id, e);
            }
        }
        if let Some(request) = pending {
            self.stats.record_failed();
            (request.handler)(Err(SendError::Closed));
        }
    }
}

impl<W: TransportWriter> std::fmt::Debug for AsyncSender<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSender")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("pending_bytes", &self.pending_bytes())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::{NoTimeouts, TimeoutTable};
    use crate::transport::mock::{MockHandle, MockTransport};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Collects every outcome delivered to handlers built by `handler()`.
    #[derive(Clone, Default)]
    struct Outcomes {
        results: Arc<Mutex<Vec<SendResult>>>,
    }

    impl Outcomes {
        fn handler(&self) -> impl FnOnce(SendResult) + Send + 'static {
            let results = Arc::clone(&self.results);
            move |result| results.lock().push(result)
        }

        fn marking_handler(&self, mock: &MockHandle) -> impl FnOnce(SendResult) + Send + 'static {
            let results = Arc::clone(&self.results);
            let mock = mock.clone();
            move |result| {
                mock.mark("callback");
                results.lock().push(result);
            }
        }

        fn count(&self) -> usize {
            self.results.lock().len()
        }

        fn take(&self) -> Vec<SendResult> {
            std::mem::take(&mut *self.results.lock())
        }
    }

    fn sender_with(
        timeout: Option<Duration>,
    ) -> (Arc<AsyncSender<MockTransport>>, MockHandle, Arc<TimeoutTable>) {
        let (transport, mock) = MockTransport::pair();
        let table = Arc::new(TimeoutTable::new());
        let config = SendConfig::default().with_timeout(timeout);
        let sender = AsyncSender::new(transport, table.clone(), &config);
        (sender, mock, table)
    }

    fn wait_past(deadline: Option<Instant>) {
        let deadline = deadline.expect("deadline should be armed");
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_synchronous_completion_two_buffers() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(5)));
        let outcomes = Outcomes::default();

        sender.submit([&b"hello"[..], &b"abc"[..]], outcomes.handler());

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(mock.attempts(), vec![5, 3]);
        assert_eq!(mock.written(), b"helloabc");
        assert!(table.is_empty());
        assert_eq!(sender.stats().snapshot().blocked, 0);
        assert_eq!(sender.phase(), SendPhase::Idle);
    }

    #[test]
    fn test_blocked_then_resumed() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(5)));
        let outcomes = Outcomes::default();
        mock.stall_writes(1);

        sender.submit([vec![7u8; 10]], outcomes.marking_handler(&mock));

        assert_eq!(outcomes.count(), 0);
        assert_eq!(sender.phase(), SendPhase::Blocked);
        assert!(table.contains(sender.id()));
        assert_eq!(table.deadline(sender.id()), sender.deadline());
        assert_eq!(sender.pending_bytes(), 10);

        mock.set_writable(true);
        sender.on_writable();

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(mock.written(), vec![7u8; 10]);
        assert!(table.is_empty());
        assert!(sender.deadline().is_none());
        assert_eq!(sender.phase(), SendPhase::Idle);
    }

    #[test]
    fn test_unregistered_before_callback() {
        struct CheckingRegistry {
            table: TimeoutTable,
        }

        impl TimeoutRegistry for CheckingRegistry {
            fn register(&self, id: WriterId, deadline: Instant, target: Weak<dyn TimeoutTarget>) {
                self.table.register(id, deadline, target);
            }

            fn unregister(&self, id: WriterId) {
                self.table.unregister(id);
            }
        }

        let (transport, mock) = MockTransport::pair();
        let registry = Arc::new(CheckingRegistry {
            table: TimeoutTable::new(),
        });
        let sender = AsyncSender::new(transport, registry.clone(), &SendConfig::default());
        let registered_at_callback = Arc::new(Mutex::new(None));

        mock.stall_writes(1);
        let probe = Arc::clone(&registered_at_callback);
        let probe_registry = Arc::clone(&registry);
        let id = sender.id();
        sender.submit([&b"0123456789"[..]], move |result| {
            assert!(result.is_ok());
            *probe.lock() = Some(probe_registry.table.contains(id));
        });
        assert!(registry.table.contains(id));

        mock.set_writable(true);
        sender.on_writable();

        assert_eq!(*registered_at_callback.lock(), Some(false));
    }

    #[test]
    fn test_io_error_closes_before_callback() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(5)));
        let outcomes = Outcomes::default();
        mock.fail_next_write(io::ErrorKind::ConnectionReset);

        sender.submit([&b"payload"[..]], outcomes.marking_handler(&mock));

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(SendError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O failure, got {:?}", other),
        }
        assert_eq!(mock.events(), vec!["write-error", "close", "callback"]);
        assert!(table.is_empty());
        assert!(sender.is_closed());
    }

    #[test]
    fn test_io_error_after_block_unregisters() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(5)));
        let outcomes = Outcomes::default();
        mock.block_after_writes(1);

        sender.submit([&b"one"[..], &b"two"[..]], outcomes.handler());
        assert!(table.contains(sender.id()));

        mock.set_writable(true);
        mock.fail_next_write(io::ErrorKind::BrokenPipe);
        sender.on_writable();

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_io());
        assert!(table.is_empty());
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_timeout_fails_request() {
        let (sender, mock, table) = sender_with(Some(Duration::from_millis(5)));
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        sender.submit([&b"never sent"[..]], outcomes.marking_handler(&mock));
        assert!(table.contains(sender.id()));
        assert!(mock.attempts().is_empty());

        wait_past(sender.deadline());
        sender.on_timeout();

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_timeout());
        assert_eq!(mock.events(), vec!["close", "callback"]);
        assert!(table.is_empty());
        assert_eq!(sender.phase(), SendPhase::Closed);
        assert_eq!(sender.stats().snapshot().timed_out, 1);
    }

    #[test]
    fn test_timeout_through_table_scan() {
        let (sender, mock, table) = sender_with(Some(Duration::from_millis(5)));
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        sender.submit([&b"stuck"[..]], outcomes.handler());
        wait_past(sender.deadline());

        assert_eq!(table.expire(Instant::now()), 1);
        assert_eq!(outcomes.count(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_early_timeout_is_ignored() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(60)));
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        sender.submit([&b"data"[..]], outcomes.handler());
        sender.on_timeout();

        assert_eq!(outcomes.count(), 0);
        assert_eq!(sender.phase(), SendPhase::Blocked);
        assert!(table.contains(sender.id()));
    }

    #[test]
    fn test_late_timeout_after_completion_is_ignored() {
        let (sender, mock, _table) = sender_with(Some(Duration::from_millis(1)));
        let outcomes = Outcomes::default();
        mock.stall_writes(1);

        sender.submit([&b"race"[..]], outcomes.handler());
        let deadline = sender.deadline();
        wait_past(deadline);

        // Writability wins the race
        mock.set_writable(true);
        sender.on_writable();
        sender.on_timeout();

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(mock.close_calls(), 0);
    }

    #[test]
    fn test_no_timeout_configured_skips_registration() {
        let (sender, mock, table) = sender_with(None);
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        sender.submit([&b"wait forever"[..]], outcomes.handler());

        assert_eq!(sender.phase(), SendPhase::Blocked);
        assert!(table.is_empty());
        assert!(sender.deadline().is_none());

        sender.on_timeout();
        assert_eq!(outcomes.count(), 0);
    }

    #[test]
    fn test_close_while_idle_is_silent_and_idempotent() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(5)));

        sender.close();
        sender.close();

        assert_eq!(mock.close_calls(), 1);
        assert!(sender.is_closed());
        assert!(table.is_empty());
        assert_eq!(sender.stats().snapshot().finished(), 0);
    }

    #[test]
    fn test_close_while_blocked_fails_request() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(5)));
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        sender.submit([&b"abc"[..]], outcomes.handler());
        sender.close();
        sender.close();

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(SendError::Closed)));
        assert!(table.is_empty());
        assert_eq!(mock.close_calls(), 1);

        // Writability after close changes nothing
        sender.on_writable();
        assert_eq!(outcomes.count(), 0);
    }

    #[test]
    fn test_close_failure_is_suppressed() {
        let (sender, mock, _table) = sender_with(None);
        let outcomes = Outcomes::default();
        mock.fail_close(io::ErrorKind::Other);

        sender.submit_and_close([&b"bye"[..]], outcomes.handler());

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_submit_and_close() {
        let (sender, mock, _table) = sender_with(None);
        let outcomes = Outcomes::default();

        sender.submit_and_close([&b"final frame"[..]], outcomes.marking_handler(&mock));

        assert_eq!(mock.events(), vec!["write:11", "close", "callback"]);
        assert!(outcomes.take()[0].is_ok());

        sender.submit([&b"too late"[..]], outcomes.handler());
        assert!(matches!(outcomes.take()[0], Err(SendError::Closed)));
    }

    #[test]
    fn test_second_submit_is_rejected() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(5)));
        let first = Outcomes::default();
        let second = Outcomes::default();
        mock.set_writable(false);

        sender.submit([&b"first"[..]], first.handler());
        sender.submit([&b"second"[..]], second.handler());

        assert_eq!(first.count(), 0);
        assert!(matches!(second.take()[0], Err(SendError::WriteInProgress)));
        assert!(table.contains(sender.id()));

        mock.set_writable(true);
        sender.on_writable();
        assert!(first.take()[0].is_ok());
        assert_eq!(mock.written(), b"first");
        assert_eq!(sender.stats().snapshot().rejected, 1);
    }

    #[test]
    fn test_handler_may_submit_next_request() {
        let (sender, mock, _table) = sender_with(None);
        let outcomes = Outcomes::default();

        let next_sender = Arc::clone(&sender);
        let next_handler = outcomes.handler();
        sender.submit([&b"first"[..]], move |result| {
            assert!(result.is_ok());
            next_sender.submit([&b"second"[..]], next_handler);
        });

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert_eq!(mock.written(), b"firstsecond");
    }

    #[test]
    fn test_on_writable_while_idle_is_noop() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(1)));
        sender.on_writable();
        sender.on_timeout();

        assert!(mock.attempts().is_empty());
        assert!(table.is_empty());
        assert_eq!(sender.phase(), SendPhase::Idle);
    }

    #[test]
    fn test_partial_writes_advance_by_accepted_count() {
        let (sender, mock, _table) = sender_with(None);
        let outcomes = Outcomes::default();
        mock.set_max_chunk(3);

        sender.submit([&b"abcdefg"[..], &b"hi"[..]], outcomes.handler());

        assert!(outcomes.take()[0].is_ok());
        assert_eq!(mock.attempts(), vec![7, 4, 1, 2]);
        assert_eq!(mock.written(), b"abcdefghi");
    }

    #[test]
    fn test_rearm_on_each_block() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(30)));
        let outcomes = Outcomes::default();
        mock.block_after_writes(1);

        sender.submit([&b"a"[..], &b"b"[..], &b"c"[..]], outcomes.handler());
        let first = table.deadline(sender.id()).expect("registered");

        std::thread::sleep(Duration::from_millis(2));
        mock.block_after_writes(1);
        mock.set_writable(true);
        sender.on_writable();

        let second = table.deadline(sender.id()).expect("still registered");
        assert!(second > first);
        assert_eq!(table.len(), 1);
        assert_eq!(outcomes.count(), 0);

        mock.set_writable(true);
        sender.on_writable();
        assert!(outcomes.take()[0].is_ok());
        assert!(table.is_empty());
        assert_eq!(sender.stats().snapshot().blocked, 2);
    }

    #[test]
    fn test_empty_request_completes_immediately() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(1)));
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        sender.submit(Vec::<OutboundBuffer>::new(), outcomes.handler());

        assert!(outcomes.take()[0].is_ok());
        assert!(table.is_empty());
    }

    #[test]
    fn test_set_send_timeout() {
        let (sender, _mock, _table) = sender_with(None);
        assert_eq!(sender.send_timeout(), None);

        sender.set_send_timeout(Some(Duration::from_millis(750)));
        assert_eq!(sender.send_timeout(), Some(Duration::from_millis(750)));

        sender.set_send_timeout(Some(Duration::ZERO));
        assert_eq!(sender.send_timeout(), None);
    }

    #[test]
    fn test_timeout_reports_armed_duration() {
        let (sender, mock, _table) = sender_with(Some(Duration::from_millis(5)));
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        sender.submit([&b"slow"[..]], outcomes.handler());
        // Applies to the next block only
        sender.set_send_timeout(Some(Duration::from_secs(60)));
        wait_past(sender.deadline());
        sender.on_timeout();

        let results = outcomes.take();
        assert_eq!(results.len(), 1);
        assert!(
            matches!(results[0], Err(SendError::Timeout(d)) if d == Duration::from_millis(5)),
            "unexpected outcome: {:?}",
            results[0]
        );
    }

    #[test]
    fn test_disabling_timeout_unregisters_on_next_block() {
        let (sender, mock, table) = sender_with(Some(Duration::from_secs(30)));
        let outcomes = Outcomes::default();
        mock.block_after_writes(1);

        sender.submit([&b"a"[..], &b"b"[..], &b"c"[..]], outcomes.handler());
        assert!(table.contains(sender.id()));

        sender.set_send_timeout(None);
        mock.block_after_writes(1);
        mock.set_writable(true);
        sender.on_writable();

        assert_eq!(sender.phase(), SendPhase::Blocked);
        assert!(table.is_empty());
        assert!(sender.deadline().is_none());

        mock.set_writable(true);
        sender.on_writable();
        assert!(outcomes.take()[0].is_ok());
    }

    #[test]
    fn test_concurrent_timeout_and_writable_deliver_once() {
        for _ in 0..200 {
            let (sender, mock, table) = sender_with(Some(Duration::from_millis(1)));
            let outcomes = Outcomes::default();
            mock.set_writable(false);

            sender.submit([vec![3u8; 64]], outcomes.handler());
            wait_past(sender.deadline());
            mock.set_writable(true);

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let writer = {
                let sender = Arc::clone(&sender);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    sender.on_writable();
                })
            };
            let timer = {
                let sender = Arc::clone(&sender);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    sender.on_timeout();
                })
            };
            writer.join().unwrap();
            timer.join().unwrap();

            let results = outcomes.take();
            assert_eq!(results.len(), 1);
            match &results[0] {
                Ok(()) => assert_eq!(mock.written(), vec![3u8; 64]),
                Err(e) => assert!(e.is_timeout(), "unexpected error: {:?}", e),
            }
            assert!(table.is_empty());
            assert!(sender.is_idle());
        }
    }

    #[test]
    fn test_drop_with_pending_request_fails_it() {
        let (transport, mock) = MockTransport::pair();
        let outcomes = Outcomes::default();
        mock.set_writable(false);

        let sender = AsyncSender::new(transport, Arc::new(NoTimeouts), &SendConfig::no_timeout());
        sender.submit([&b"orphan"[..]], outcomes.handler());
        drop(sender);

        assert!(matches!(outcomes.take()[0], Err(SendError::Closed)));
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_random_schedule_preserves_order_and_exactly_once() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);

        for _ in 0..200 {
            let (sender, mock, table) = sender_with(Some(Duration::from_secs(30)));
            let delivered = Arc::new(AtomicUsize::new(0));
            mock.set_max_chunk(rng.usize(1..8));

            let buffers: Vec<Vec<u8>> = (0..rng.usize(1..6))
                .map(|i| vec![i as u8; rng.usize(0..20)])
                .collect();
            let expected: Vec<u8> = buffers.concat();

            mock.block_after_writes(rng.usize(1..4));
            let counter = Arc::clone(&delivered);
            sender.submit(buffers, move |result| {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            });

            let mut rounds = 0;
            while !sender.is_idle() {
                assert!(table.contains(sender.id()));
                mock.block_after_writes(rng.usize(1..4));
                mock.set_writable(true);
                sender.on_writable();
                rounds += 1;
                assert!(rounds < 1000, "sender never drained");
            }

            assert_eq!(delivered.load(Ordering::SeqCst), 1);
            assert_eq!(mock.written(), expected);
            assert!(table.is_empty());
        }
    }
}

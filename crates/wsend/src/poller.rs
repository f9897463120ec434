// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writable-readiness poller for TCP senders.
//!
//! Provides a dedicated thread running a mio event loop that turns
//! edge-triggered WRITABLE readiness into
//! [`WritableListener::on_writable`] calls.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                      WritablePoller                          |
//! |  +-------------------------------------------------------+  |
//! |  |                    mio::Poll                           |  |
//! |  |  - TCP streams (WRITABLE interest, edge-triggered)    |  |
//! |  |  - Waker (shutdown)                                   |  |
//! |  +-------------------------------------------------------+  |
//! |                              |                               |
//! |                              v                               |
//! |  +-------------------------------------------------------+  |
//! |  |   Token -> Weak<dyn WritableListener>  (on_writable)   |  |
//! |  +-------------------------------------------------------+  |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Example
//!
//! ```ignore
//! use wsend::{SendConfig, TimeoutConfig, TimeoutTracker, WritablePoller};
//!
//! let tracker = TimeoutTracker::start(TimeoutConfig::default())?;
//! let poller = WritablePoller::spawn()?;
//!
//! let stream = std::net::TcpStream::connect("127.0.0.1:9000")?;
//! stream.set_nonblocking(true)?;
//! let stream = mio::net::TcpStream::from_std(stream);
//!
//! let sender = poller.attach(stream, tracker.registry(), &SendConfig::default())?;
//! sender.submit([b"frame".to_vec()], |result| println!("sent: {:?}", result));
//! ```

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;

use crate::config::SendConfig;
use crate::sender::AsyncSender;
use crate::timeout::TimeoutRegistry;
use crate::transport::StreamWriter;

// ============================================================================
// Constants
// ============================================================================

/// Token for the waker (shutdown signal)
const WAKER_TOKEN: Token = Token(0);

/// Starting token for streams
const STREAM_TOKEN_START: usize = 1;

/// Default poll timeout
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum events to process per poll
const MAX_EVENTS: usize = 128;

/// How often listeners of dropped senders are pruned
const PRUNE_INTERVAL: Duration = Duration::from_millis(100);

/// Transport writer over a non-blocking mio TCP stream.
pub type TcpWriter = StreamWriter<TcpStream>;

/// Receiver of writable-readiness notifications.
pub trait WritableListener: Send + Sync {
    /// The watched stream can accept more bytes.
    fn on_writable(&self);
}

type Listeners = Arc<Mutex<HashMap<Token, Weak<dyn WritableListener>>>>;

// ============================================================================
// Poller
// ============================================================================

/// Readiness poller thread and its registration handle.
///
/// Dropping the poller stops the thread and joins it.
pub struct WritablePoller {
    /// Registry clone used to register streams from any thread
    registry: Registry,

    /// Listener per stream token
    listeners: Listeners,

    /// Next stream token
    next_token: AtomicUsize,

    /// Waker to interrupt the poll on shutdown
    waker: Arc<Waker>,

    /// Running flag
    running: Arc<AtomicBool>,

    /// Thread handle
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WritablePoller {
    /// Spawn the poller thread.
    pub fn spawn() -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let listeners: Listeners = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let thread_listeners = Arc::clone(&listeners);
        let thread_running = Arc::clone(&running);
        let thread_handle = thread::Builder::new()
            .name("wsend-writable".to_string())
            .spawn(move || run(poll, thread_listeners, thread_running))?;

        Ok(Self {
            registry,
            listeners,
            next_token: AtomicUsize::new(STREAM_TOKEN_START),
            waker,
            running,
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }

    /// Route readiness of a new stream to `listener`, then register it.
    ///
    /// The listener is in place before the stream joins the poll, so the
    /// first edge cannot be missed.
    pub fn register_listener(
        &self,
        stream: &mut TcpStream,
        listener: Weak<dyn WritableListener>,
    ) -> io::Result<Token> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.watch(token, listener);
        if let Err(e) = self.registry.register(stream, token, Interest::WRITABLE) {
            self.unwatch(token);
            return Err(e);
        }
        Ok(token)
    }

    /// Route readiness of `token` to `listener`.
    pub fn watch(&self, token: Token, listener: Weak<dyn WritableListener>) {
        self.listeners.lock().insert(token, listener);
    }

    /// Stop routing readiness of `token`.
    pub fn unwatch(&self, token: Token) {
        self.listeners.lock().remove(&token);
    }

    /// Stop routing readiness of `token` and remove `stream` from the poll.
    pub fn deregister(&self, token: Token, stream: &mut TcpStream) -> io::Result<()> {
        self.unwatch(token);
        self.registry.deregister(stream)
    }

    /// Number of watched streams.
    pub fn watched(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Wrap `stream` in a sender and route its readiness to it.
    ///
    /// The poller only keeps a weak reference; once the sender is dropped
    /// its entry is pruned and the socket leaves the poll when it closes.
    pub fn attach(
        &self,
        stream: TcpStream,
        timeouts: Arc<dyn TimeoutRegistry>,
        config: &SendConfig,
    ) -> io::Result<Arc<AsyncSender<TcpWriter>>> {
        let sender = AsyncSender::new(StreamWriter::new(stream), timeouts, config);

        let listener: Arc<dyn WritableListener> = sender.clone();
        let token = sender.with_transport(|writer| {
            self.register_listener(writer.stream_mut(), Arc::downgrade(&listener))
        })?;
        log::debug!("[poller] {} attached as token {}", sender.id(), token.0);

        Ok(sender)
    }

    /// Check if the poller thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the poller thread and wait for it.
    pub fn shutdown(&self) -> io::Result<()> {
        if !self.running.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let _ = self.waker.wake();

        if let Some(handle) = self.thread_handle.lock().take() {
            handle
                .join()
                .map_err(|_| io::Error::other("poller thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for WritablePoller {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl std::fmt::Debug for WritablePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritablePoller")
            .field("running", &self.is_running())
            .field("watched", &self.watched())
            .finish()
    }
}

/// Run the event loop until `running` is cleared.
fn run(mut poll: Poll, listeners: Listeners, running: Arc<AtomicBool>) {
    log::debug!("[poller] started");
    let mut events = Events::with_capacity(MAX_EVENTS);
    let mut last_prune = Instant::now();

    while running.load(Ordering::Relaxed) {
        if last_prune.elapsed() >= PRUNE_INTERVAL {
            prune(&listeners);
            last_prune = Instant::now();
        }

        if let Err(e) = poll.poll(&mut events, Some(DEFAULT_POLL_TIMEOUT)) {
            if e.kind() != io::ErrorKind::Interrupted {
                log::warn!("[poller] poll error: {}", e);
            }
            continue;
        }

        for event in events.iter() {
            let token = event.token();
            if token == WAKER_TOKEN {
                continue;
            }
            if !(event.is_writable() || event.is_write_closed() || event.is_error()) {
                continue;
            }

            // Release the map lock before calling out; listeners may unwatch
            let listener = listeners.lock().get(&token).cloned();
            match listener.and_then(|weak| weak.upgrade()) {
                Some(listener) => listener.on_writable(),
                None => {
                    listeners.lock().remove(&token);
                }
            }
        }
    }

    log::debug!("[poller] stopped");
}

/// Forget listeners whose sender has been dropped.
fn prune(listeners: &Listeners) {
    let mut map = listeners.lock();
    let before = map.len();
    map.retain(|_, listener| listener.strong_count() > 0);
    if map.len() < before {
        log::debug!("[poller] pruned {} dropped listeners", before - map.len());
    }
}

// ============================================================================
// Tests
// ============================================================================

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Non-blocking frame sending with completion handlers and send timeouts.
//!
//! `wsend` delivers an opaque, ordered list of byte buffers to one peer over
//! a non-blocking transport. A write that cannot finish because the peer's
//! buffer is full parks until the transport becomes writable again, and is
//! failed if that does not happen within the configured send timeout. Every
//! request reports exactly one [`SendResult`] to its handler.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                        AsyncSender                           |
//! |  submit() -> write loop -> complete / fail                   |
//! |              |        ^                                      |
//! |       blocked|        |on_writable()                         |
//! |              v        |                                      |
//! |  +----------------+  +-------------------+                   |
//! |  | TimeoutTracker |  |  WritablePoller   |                   |
//! |  | (deadlines,    |  |  (mio readiness)  |                   |
//! |  |  on_timeout)   |  |                   |                   |
//! |  +----------------+  +-------------------+                   |
//! |                                                               |
//! |  TransportWriter: StreamWriter<TcpStream> / custom sinks      |
//! +-------------------------------------------------------------+
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wsend::{AsyncSender, SendConfig, TimeoutConfig, TimeoutTracker, TransportWriter};
//!
//! /// In-memory sink that always accepts everything.
//! struct Sink(Vec<u8>);
//!
//! impl TransportWriter for Sink {
//!     fn can_write(&self) -> bool {
//!         true
//!     }
//!     fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
//!         self.0.extend_from_slice(buf);
//!         Ok(buf.len())
//!     }
//!     fn close(&mut self) -> std::io::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let tracker = TimeoutTracker::start(TimeoutConfig::default()).unwrap();
//! let sender = AsyncSender::new(Sink(Vec::new()), tracker.registry(), &SendConfig::default());
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! sender.submit([b"header".to_vec(), b"payload".to_vec()], move |result| {
//!     tx.send(result.is_ok()).unwrap();
//! });
//! assert!(rx.recv().unwrap());
//! ```
//!
//! # Modules
//!
//! - `sender` - The write coordinator ([`AsyncSender`])
//! - `timeout` - Deadline registry and tracker thread
//! - `transport` - [`TransportWriter`] contract and stream adapter
//! - `poller` - mio readiness thread for TCP streams
//! - `buffer` - [`OutboundBuffer`]
//! - `config` - [`SendConfig`], [`TimeoutConfig`]
//! - `stats` - [`SendStats`]

pub mod buffer;
pub mod config;
pub mod error;
pub mod poller;
pub mod sender;
pub mod stats;
pub mod timeout;
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use buffer::OutboundBuffer;
pub use config::{SendConfig, TimeoutConfig};
pub use error::{SendError, SendResult};
pub use poller::{TcpWriter, WritableListener, WritablePoller};
pub use sender::{AsyncSender, SendHandler, SendPhase};
pub use stats::{SendStats, SendStatsSnapshot};
pub use timeout::{
    NoTimeouts, TimeoutRegistry, TimeoutTable, TimeoutTarget, TimeoutTracker, WriterId,
};
pub use transport::{ByteStream, StreamWriter, TransportWriter};

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport writer abstraction.
//!
//! A [`TransportWriter`] is the one-way byte sink an
//! [`AsyncSender`](crate::AsyncSender) drains its buffers into. It reports
//! whether it can currently accept bytes and performs bounded, non-blocking
//! write attempts.
//!
//! # Contract
//!
//! - `write` returns the number of bytes accepted, which may be fewer than
//!   offered. Returning `Ok(0)` means "no progress now"; the sender then waits
//!   for a writability notification.
//! - A transport that cannot accept more data must report `can_write() == false`
//!   until [`TransportWriter::notify_writable`] is called or its own readiness
//!   tracking says otherwise.
//! - `close` must be safe to call more than once.
//!
//! # Modules
//!
//! - `stream` - [`StreamWriter`] adapter over non-blocking byte streams

pub mod stream;

#[cfg(test)]
pub(crate) mod mock;

pub use stream::{ByteStream, StreamWriter};

use std::io;

/// One-way, non-blocking byte sink.
pub trait TransportWriter: Send {
    /// Check whether the transport can accept more bytes right now.
    fn can_write(&self) -> bool;

    /// Attempt to write `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Close the transport.
    fn close(&mut self) -> io::Result<()>;

    /// Readiness hook, called before the sender resumes after a writability
    /// notification.
    fn notify_writable(&mut self) {}
}

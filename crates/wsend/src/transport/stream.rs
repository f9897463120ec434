// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Non-blocking byte streams as transport writers.
//!
//! [`ByteStream`] abstracts over socket types (std and mio TCP streams, or
//! test doubles). [`StreamWriter`] turns any of them into a
//! [`TransportWriter`] by tracking writability itself:
//!
//! - `WouldBlock` clears the writable flag and reports zero progress
//! - `Interrupted` is retried
//! - `Ok(0)` on a non-empty buffer is a closed peer (`WriteZero`)
//! - [`TransportWriter::notify_writable`] sets the flag again
//!
//! # Example
//!
//! ```ignore
//! use wsend::transport::StreamWriter;
//!
//! let stream = std::net::TcpStream::connect("127.0.0.1:9000")?;
//! stream.set_nonblocking(true)?;
//! let writer = StreamWriter::new(stream);
//! ```

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};

use super::TransportWriter;

/// Abstraction over byte-oriented output streams.
///
/// Implementations are expected to be in non-blocking mode so that a full
/// send buffer surfaces as `io::ErrorKind::WouldBlock`.
pub trait ByteStream: Write + Send {
    /// Shutdown the stream.
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()>;

    /// Get the peer address of this stream.
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl ByteStream for std::net::TcpStream {
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        std::net::TcpStream::shutdown(self, how)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        std::net::TcpStream::peer_addr(self)
    }
}

impl ByteStream for mio::net::TcpStream {
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        mio::net::TcpStream::shutdown(self, how)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        mio::net::TcpStream::peer_addr(self)
    }
}

/// [`TransportWriter`] over a non-blocking [`ByteStream`].
pub struct StreamWriter<S: ByteStream> {
    stream: S,
    writable: bool,
    closed: bool,
}

impl<S: ByteStream> StreamWriter<S> {
    /// Wrap a stream. The stream starts out writable.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            writable: true,
            closed: false,
        }
    }

    /// Get the underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Get mutable reference to the stream (for poll registration).
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Check if the writer has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: ByteStream> TransportWriter for StreamWriter<S> {
    fn can_write(&self) -> bool {
        self.writable && !self.closed
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream already closed",
            ));
        }

        loop {
            match self.stream.write(buf) {
                Ok(0) if !buf.is_empty() => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed",
                    ));
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.writable = false;
                    return Ok(0);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writable = false;

        let _ = self.stream.flush();
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn notify_writable(&mut self) {
        if !self.closed {
            self.writable = true;
        }
    }
}

impl<S: ByteStream> std::fmt::Debug for StreamWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("peer_addr", &self.stream.peer_addr().ok())
            .field("writable", &self.writable)
            .field("closed", &self.closed)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

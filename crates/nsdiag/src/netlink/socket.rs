//! Synchronous, non-blocking `NETLINK_SOCK_DIAG` socket.
//!
//! A dump is drained until the socket reports it would block, so the socket
//! is never registered with the async reactor: "would block" means the
//! kernel has nothing more to say.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tracing::debug;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{RawMessage, split_frames};

/// Datagram primitives the drain loop needs from a socket.
pub trait Datagram {
    /// Send one datagram to the kernel.
    fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Report the size of the next pending datagram without consuming it.
    fn peek_len(&mut self) -> io::Result<usize>;

    /// Consume the next datagram into the spare capacity of `buf`.
    ///
    /// Returns the datagram's true size, which may exceed what was stored.
    fn recv_into(&mut self, buf: &mut BytesMut) -> io::Result<usize>;
}

impl Datagram for Socket {
    fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize> {
        let kernel = SocketAddr::new(0, 0);
        self.send_to(buf, &kernel, 0)
    }

    fn peek_len(&mut self) -> io::Result<usize> {
        let mut probe: &mut [u8] = &mut [];
        self.recv(&mut probe, libc::MSG_PEEK | libc::MSG_TRUNC)
    }

    fn recv_into(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        self.recv(buf, libc::MSG_TRUNC)
    }
}

/// A socket-diagnostics netlink socket.
pub struct DiagSocket<S = Socket> {
    socket: S,
    /// Sequence number counter.
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
}

impl DiagSocket<Socket> {
    /// Open a non-blocking `NETLINK_SOCK_DIAG` socket in the calling
    /// thread's network namespace.
    pub fn open() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_SOCK_DIAG)
            .map_err(|e| Error::transport("socket", e))?;
        socket
            .set_non_blocking(true)
            .map_err(|e| Error::transport("set_non_blocking", e))?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket
            .bind(&addr)
            .map_err(|e| Error::transport("bind", e))?;
        socket
            .get_address(&mut addr)
            .map_err(|e| Error::transport("getsockname", e))?;

        Ok(Self::with_pid(socket, addr.port_number()))
    }
}

impl<S: Datagram> DiagSocket<S> {
    /// Wrap an already configured datagram socket.
    pub fn with_pid(socket: S, pid: u32) -> Self {
        Self {
            socket,
            seq: AtomicU32::new(1),
            pid,
        }
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get a mutable reference to the underlying socket.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    /// Stamp and send a request as a single datagram.
    ///
    /// Returns the sequence number used.
    pub fn send(&mut self, mut msg: MessageBuilder) -> Result<u32> {
        let seq = self.next_seq();
        msg.set_seq(seq);
        msg.set_pid(self.pid);
        let bytes = msg.finish();

        let sent = self
            .socket
            .send_datagram(&bytes)
            .map_err(|e| Error::transport("send", e))?;
        if sent != bytes.len() {
            return Err(Error::Protocol(format!(
                "short send: {} of {} bytes",
                sent,
                bytes.len()
            )));
        }

        debug!(seq, len = bytes.len(), "request sent");
        Ok(seq)
    }

    /// Drain every pending datagram and split the result into frames.
    ///
    /// Each datagram is peeked first so the receive buffer is sized exactly;
    /// the drain ends when the socket would block.
    pub fn receive_all(&mut self) -> Result<Vec<RawMessage>> {
        let mut acc = BytesMut::new();
        let mut datagrams = 0usize;

        loop {
            let size = match retry_eintr(|| self.socket.peek_len()) {
                Ok(size) => size,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::transport("peek", e)),
            };
            if size == 0 {
                return Err(Error::transport(
                    "peek",
                    io::Error::new(io::ErrorKind::UnexpectedEof, "zero-length datagram"),
                ));
            }

            acc.reserve(size);
            let start = acc.len();
            let got = retry_eintr(|| self.socket.recv_into(&mut acc))
                .map_err(|e| Error::transport("recv", e))?;
            if got == 0 {
                return Err(Error::transport(
                    "recv",
                    io::Error::new(io::ErrorKind::UnexpectedEof, "zero-length datagram"),
                ));
            }
            if got != size || acc.len() - start != size {
                return Err(Error::Protocol(format!(
                    "datagram size changed between peek ({}) and read ({})",
                    size, got
                )));
            }

            datagrams += 1;
            debug!(size, "datagram received");
        }

        debug!(datagrams, bytes = acc.len(), "receive drained");
        split_frames(acc.freeze())
    }

    /// Close the socket.
    pub fn close(self) {
        drop(self);
    }
}

fn retry_eintr<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

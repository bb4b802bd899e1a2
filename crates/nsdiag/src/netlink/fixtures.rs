//! Test doubles and byte fixtures.

use std::collections::VecDeque;
use std::io;

use bytes::BytesMut;

use super::builder::MessageBuilder;
use super::message::{NLM_F_MULTI, NlMsgType};
use super::socket::Datagram;
use crate::sockdiag::wire::{InetDiagMsg, InetDiagSockId, SOCK_DIAG_BY_FAMILY};

/// A datagram socket that replays queued datagrams.
#[derive(Debug, Default)]
pub struct ScriptedSocket {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub send_error: Option<i32>,
    pub recv_error: Option<i32>,
    /// Number of peeks that fail with EINTR before the queue is served.
    pub interrupts: usize,
    /// Consume one byte less than was peeked.
    pub short_read: bool,
    /// Consume the datagram but report zero bytes read.
    pub empty_read: bool,
    pub peeks: usize,
}

impl ScriptedSocket {
    pub fn push(&mut self, datagram: Vec<u8>) {
        self.inbound.push_back(datagram);
    }
}

impl Datagram for ScriptedSocket {
    fn send_datagram(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(errno) = self.send_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        self.sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn peek_len(&mut self) -> io::Result<usize> {
        self.peeks += 1;
        if let Some(errno) = self.recv_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if self.interrupts > 0 {
            self.interrupts -= 1;
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        self.inbound
            .front()
            .map(Vec::len)
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))
    }

    fn recv_into(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        let datagram = self
            .inbound
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        let n = if self.empty_read {
            0
        } else if self.short_read {
            datagram.len() - 1
        } else {
            datagram.len()
        };
        buf.extend_from_slice(&datagram[..n]);
        Ok(n)
    }
}

/// An ESTABLISHED 10.0.0.1:22 -> 10.0.0.2:40000 header.
pub fn established_msg(inode: u32) -> InetDiagMsg {
    InetDiagMsg {
        family: libc::AF_INET as u8,
        state: 1,
        timer: 0,
        retrans: 0,
        id: InetDiagSockId::v4([10, 0, 0, 1], 22, [10, 0, 0, 2], 40000),
        inode,
        uid: 1000,
        ..Default::default()
    }
}

/// A `SOCK_DIAG_BY_FAMILY` frame with the given header and raw attribute
/// region appended after it.
pub fn diag_frame(msg: &InetDiagMsg, attrs: &[u8]) -> Vec<u8> {
    let mut builder = MessageBuilder::new(SOCK_DIAG_BY_FAMILY, NLM_F_MULTI);
    builder.append(msg);
    builder.append_bytes(attrs);
    builder.finish()
}

pub fn done_frame() -> Vec<u8> {
    let mut builder = MessageBuilder::new(NlMsgType::DONE, NLM_F_MULTI);
    builder.append_bytes(&0i32.to_ne_bytes());
    builder.finish()
}

/// An `NLMSG_ERROR` frame carrying `-errno`.
pub fn error_frame(errno: i32) -> Vec<u8> {
    let mut builder = MessageBuilder::new(NlMsgType::ERROR, 0);
    builder.append_bytes(&(-errno).to_ne_bytes());
    builder.append_bytes(&[0u8; 16]);
    builder.finish()
}

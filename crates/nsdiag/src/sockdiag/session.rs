//! One-shot TCP socket dump over `NETLINK_SOCK_DIAG`.

use netlink_sys::Socket;
use tracing::{debug, warn};

use crate::netlink::builder::MessageBuilder;
use crate::netlink::message::{FrameKind, NLM_F_DUMP, NLM_F_REQUEST, RawMessage};
use crate::netlink::socket::{Datagram, DiagSocket};
use crate::netlink::{Error, Result};

use super::attr::{decode_attributes, into_map};
use super::types::SocketRecord;
use super::wire::{INET_DIAG_MSG_LEN, InetDiagMsg, InetDiagReqV2, SOCK_DIAG_BY_FAMILY, TCPDIAG_GETSOCK};

/// Lifecycle of a [`TcpDiag`] session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opened, nothing sent yet.
    Idle,
    /// Request sent.
    Sent,
    /// Reading the response.
    Draining,
    /// Dump complete.
    Done,
    /// Send, receive or parse failed.
    Failed,
}

/// A diagnostic session: one socket, one dump.
///
/// The socket is created in the namespace of the calling thread and keeps
/// reporting on that namespace even if the thread moves afterwards.
pub struct TcpDiag<S = Socket> {
    socket: DiagSocket<S>,
    state: SessionState,
}

impl TcpDiag<Socket> {
    /// Open a session in the calling thread's network namespace.
    pub fn open() -> Result<Self> {
        Ok(Self::with_socket(DiagSocket::open()?))
    }
}

impl<S: Datagram> TcpDiag<S> {
    /// Run a session over an existing socket.
    pub fn with_socket(socket: DiagSocket<S>) -> Self {
        Self {
            socket,
            state: SessionState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Dump every IPv4 TCP socket, in the order the kernel reports them.
    ///
    /// A session runs once; a second call returns
    /// [`Error::SessionReused`].
    pub fn query(&mut self) -> Result<Vec<SocketRecord>> {
        if self.state != SessionState::Idle {
            return Err(Error::SessionReused(self.state));
        }

        let result = self.run();
        match &result {
            Ok(_) => self.enter(SessionState::Done),
            Err(e) => {
                debug!(error = %e, "session failed");
                self.enter(SessionState::Failed);
            }
        }
        result
    }

    fn run(&mut self) -> Result<Vec<SocketRecord>> {
        self.socket.send(dump_request())?;
        self.enter(SessionState::Sent);

        let frames = self.drain()?;
        collect_records(&frames)
    }

    fn drain(&mut self) -> Result<Vec<RawMessage>> {
        self.enter(SessionState::Draining);
        self.socket.receive_all()
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Close the session and its socket.
    pub fn close(self) {
        self.socket.close();
    }
}

/// The "all TCP sockets, all states" request, unstamped.
pub fn dump_request() -> MessageBuilder {
    let mut msg = MessageBuilder::new(SOCK_DIAG_BY_FAMILY, NLM_F_REQUEST | NLM_F_DUMP);
    msg.append(&InetDiagReqV2::tcp_dump());
    msg
}

fn collect_records(frames: &[RawMessage]) -> Result<Vec<SocketRecord>> {
    let mut records = Vec::new();

    for frame in frames {
        match frame.kind()? {
            FrameKind::Error(0) => debug!("ack frame skipped"),
            FrameKind::Error(errno) => return Err(Error::from_errno(errno)),
            FrameKind::Done => {
                debug!(records = records.len(), "dump done");
                return Ok(records);
            }
            FrameKind::Noop => {}
            FrameKind::Overrun => {
                return Err(Error::Protocol("kernel reported netlink overrun".into()));
            }
            FrameKind::Data(SOCK_DIAG_BY_FAMILY | TCPDIAG_GETSOCK) => {
                if frame.header.is_dump_interrupted() {
                    warn!(
                        seq = frame.header.nlmsg_seq,
                        "dump interrupted by a concurrent change, results may be inconsistent"
                    );
                }
                records.push(parse_record(&frame.payload)?);
            }
            FrameKind::Data(other) => {
                return Err(Error::Protocol(format!(
                    "unexpected message type {} in sock_diag dump",
                    other
                )));
            }
        }
    }

    debug!(records = records.len(), "dump ended without NLMSG_DONE");
    Ok(records)
}

fn parse_record(payload: &[u8]) -> Result<SocketRecord> {
    let msg = InetDiagMsg::parse(payload)?;
    let region = &payload[INET_DIAG_MSG_LEN..];
    let attrs = decode_attributes(region, region.len())?;

    SocketRecord::from_parts(&msg, into_map(attrs)).ok_or_else(|| {
        Error::Protocol(format!("unsupported address family {}", msg.family))
    })
}

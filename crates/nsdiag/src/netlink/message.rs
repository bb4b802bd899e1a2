//! Netlink message header and frame splitting.

use bytes::Bytes;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Netlink message header (mirrors struct nlmsghdr, host byte order).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type.
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending process port ID.
    pub nlmsg_pid: u32,
}

const _: () = assert!(std::mem::size_of::<NlMsgHdr>() == 16);

impl NlMsgHdr {
    /// Create a new message header.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: 0,
            nlmsg_pid: 0,
        }
    }

    /// Check if the kernel flagged the dump as interrupted.
    pub fn is_dump_interrupted(&self) -> bool {
        self.nlmsg_flags & NLM_F_DUMP_INTR != 0
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse a header from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Standard netlink message types.
pub struct NlMsgType;

impl NlMsgType {
    /// No operation, message must be discarded.
    pub const NOOP: u16 = 1;
    /// Error message or ACK.
    pub const ERROR: u16 = 2;
    /// End of multipart message.
    pub const DONE: u16 = 3;
    /// Data lost, request resend.
    pub const OVERRUN: u16 = 4;
}

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_DUMP_INTR: u16 = 0x10;

// Modifiers to GET request
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

/// Netlink error message payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgError {
    /// Error code (negative errno or 0 for ACK).
    pub error: i32,
    /// Original message header that caused the error.
    pub msg: NlMsgHdr,
}

const _: () = assert!(std::mem::size_of::<NlMsgError>() == 20);

/// How a frame's payload is to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `NLMSG_ERROR`; carries the raw (negative) errno, 0 for an ACK.
    Error(i32),
    /// `NLMSG_DONE`, end of a dump.
    Done,
    /// `NLMSG_NOOP`.
    Noop,
    /// `NLMSG_OVERRUN`.
    Overrun,
    /// A protocol-family message; the payload is family specific.
    Data(u16),
}

/// One complete netlink message as delimited by `nlmsg_len`.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Message header.
    pub header: NlMsgHdr,
    /// Payload following the header, exactly `nlmsg_len - NLMSG_HDRLEN` bytes.
    pub payload: Bytes,
}

impl RawMessage {
    /// Classify the frame by message type.
    ///
    /// Error frames must carry a full `nlmsgerr` (errno plus the echoed
    /// request header).
    pub fn kind(&self) -> Result<FrameKind> {
        match self.header.nlmsg_type {
            NlMsgType::ERROR => {
                let (err, _) =
                    NlMsgError::read_from_prefix(&self.payload).map_err(|_| Error::Truncated {
                        expected: std::mem::size_of::<NlMsgError>(),
                        actual: self.payload.len(),
                    })?;
                Ok(FrameKind::Error(err.error))
            }
            NlMsgType::DONE => Ok(FrameKind::Done),
            NlMsgType::NOOP => Ok(FrameKind::Noop),
            NlMsgType::OVERRUN => Ok(FrameKind::Overrun),
            other => Ok(FrameKind::Data(other)),
        }
    }
}

/// Split a buffer of concatenated netlink messages into frames.
///
/// Every frame starts on an `NLMSG_ALIGNTO` boundary. A header that does not
/// fit, or a declared length shorter than the header or longer than the bytes
/// left, fails the whole buffer.
pub fn split_frames(buf: Bytes) -> Result<Vec<RawMessage>> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let rest = &buf[offset..];
        let header = NlMsgHdr::parse(rest)?;

        let msg_len = header.nlmsg_len as usize;
        if msg_len < NLMSG_HDRLEN || msg_len > rest.len() {
            return Err(Error::Protocol(format!(
                "frame at offset {} declares length {} with {} bytes remaining",
                offset,
                msg_len,
                rest.len()
            )));
        }

        frames.push(RawMessage {
            header,
            payload: buf.slice(offset + NLMSG_HDRLEN..offset + msg_len),
        });

        offset += nlmsg_align(msg_len).min(rest.len());
    }

    Ok(frames)
}

//! Byte-exact `inet_diag` structures (linux/inet_diag.h).
//!
//! Ports and addresses travel in network byte order; every other field is
//! host order.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use zerocopy::byteorder::network_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::netlink::{Error, Result};

/// Socket diagnostics request/response type.
pub const SOCK_DIAG_BY_FAMILY: u16 = 20;
/// Legacy TCP diag message type, still used by some kernels for replies.
pub const TCPDIAG_GETSOCK: u16 = 18;

// Inet diag attribute types
pub const INET_DIAG_NONE: u16 = 0;
pub const INET_DIAG_MEMINFO: u16 = 1;
pub const INET_DIAG_INFO: u16 = 2;
pub const INET_DIAG_VEGASINFO: u16 = 3;
pub const INET_DIAG_CONG: u16 = 4;
pub const INET_DIAG_TOS: u16 = 5;
pub const INET_DIAG_TCLASS: u16 = 6;
pub const INET_DIAG_SKMEMINFO: u16 = 7;
pub const INET_DIAG_SHUTDOWN: u16 = 8;

/// Bit requesting attribute `attr` in `idiag_ext`.
pub const fn ext_flag(attr: u16) -> u8 {
    1 << (attr - 1)
}

/// Extensions asked for by a TCP dump: tcp_info, vegas info, congestion.
pub const TCP_DUMP_EXT: u8 =
    ext_flag(INET_DIAG_INFO) | ext_flag(INET_DIAG_VEGASINFO) | ext_flag(INET_DIAG_CONG);

/// Every TCP state.
pub const ALL_STATES: u32 = 0xffff_ffff;

/// Socket identity (struct inet_diag_sockid).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct InetDiagSockId {
    pub sport: U16,
    pub dport: U16,
    /// Source address octets; IPv4 uses the first four.
    pub src: [u8; 16],
    /// Destination address octets; IPv4 uses the first four.
    pub dst: [u8; 16],
    pub interface: u32,
    pub cookie: [u32; 2],
}

const _: () = assert!(std::mem::size_of::<InetDiagSockId>() == 48);

impl InetDiagSockId {
    /// Build an IPv4 identity from host-order ports.
    pub fn v4(src: [u8; 4], sport: u16, dst: [u8; 4], dport: u16) -> Self {
        let mut id = Self {
            sport: U16::new(sport),
            dport: U16::new(dport),
            ..Default::default()
        };
        id.src[..4].copy_from_slice(&src);
        id.dst[..4].copy_from_slice(&dst);
        id
    }

    /// Source port in host order.
    pub fn source_port(&self) -> u16 {
        self.sport.get()
    }

    /// Destination port in host order.
    pub fn dest_port(&self) -> u16 {
        self.dport.get()
    }

    /// Source address, interpreted for `family`.
    pub fn source_addr(&self, family: u8) -> Option<IpAddr> {
        addr(family, &self.src)
    }

    /// Destination address, interpreted for `family`.
    pub fn dest_addr(&self, family: u8) -> Option<IpAddr> {
        addr(family, &self.dst)
    }

    /// The opaque 64-bit socket cookie.
    pub fn cookie(&self) -> u64 {
        ((self.cookie[1] as u64) << 32) | self.cookie[0] as u64
    }
}

fn addr(family: u8, octets: &[u8; 16]) -> Option<IpAddr> {
    match family as i32 {
        libc::AF_INET => Some(IpAddr::V4(Ipv4Addr::new(
            octets[0], octets[1], octets[2], octets[3],
        ))),
        libc::AF_INET6 => Some(IpAddr::V6(Ipv6Addr::from(*octets))),
        _ => None,
    }
}

/// Dump request (struct inet_diag_req_v2).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct InetDiagReqV2 {
    pub family: u8,
    pub protocol: u8,
    pub ext: u8,
    pub pad: u8,
    pub states: u32,
    pub id: InetDiagSockId,
}

const _: () = assert!(std::mem::size_of::<InetDiagReqV2>() == 56);

impl InetDiagReqV2 {
    /// Every IPv4 TCP socket in every state, with tcp_info and congestion
    /// attributes.
    pub fn tcp_dump() -> Self {
        Self {
            family: libc::AF_INET as u8,
            protocol: libc::IPPROTO_TCP as u8,
            ext: TCP_DUMP_EXT,
            pad: 0,
            states: ALL_STATES,
            id: InetDiagSockId::default(),
        }
    }

    /// Parse from the start of a request payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        read_prefix(data)
    }
}

/// Per-socket response header (struct inet_diag_msg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct InetDiagMsg {
    pub family: u8,
    pub state: u8,
    pub timer: u8,
    pub retrans: u8,
    pub id: InetDiagSockId,
    pub expires: u32,
    pub rqueue: u32,
    pub wqueue: u32,
    pub uid: u32,
    pub inode: u32,
}

/// Size of the fixed response header; attributes start right after it.
pub const INET_DIAG_MSG_LEN: usize = 72;

const _: () = assert!(std::mem::size_of::<InetDiagMsg>() == INET_DIAG_MSG_LEN);

impl InetDiagMsg {
    /// Parse from the start of a response payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        read_prefix(data)
    }
}

fn read_prefix<T: FromBytes + KnownLayout + Immutable>(data: &[u8]) -> Result<T> {
    T::read_from_prefix(data)
        .map(|(value, _)| value)
        .map_err(|_| Error::Truncated {
            expected: std::mem::size_of::<T>(),
            actual: data.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ext_mask() {
        assert_eq!(ext_flag(INET_DIAG_INFO), 0x02);
        assert_eq!(ext_flag(INET_DIAG_VEGASINFO), 0x04);
        assert_eq!(ext_flag(INET_DIAG_CONG), 0x08);
        assert_eq!(TCP_DUMP_EXT, 0x0e);
    }

    #[test]
    fn test_request_layout() {
        let req = InetDiagReqV2::tcp_dump();
        let bytes = req.as_bytes();
        assert_eq!(bytes.len(), 56);
        assert_eq!(bytes[0], libc::AF_INET as u8);
        assert_eq!(bytes[1], libc::IPPROTO_TCP as u8);
        assert_eq!(bytes[2], 0x0e);
        assert_eq!(bytes[3], 0);
        assert_eq!(&bytes[4..8], &u32::MAX.to_ne_bytes());
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sockid_byte_order() {
        let id = InetDiagSockId::v4([127, 0, 0, 1], 8080, [192, 168, 1, 9], 443);
        let bytes = id.as_bytes();
        assert_eq!(&bytes[0..2], &[0x1f, 0x90]);
        assert_eq!(&bytes[2..4], &[0x01, 0xbb]);
        assert_eq!(&bytes[4..8], &[127, 0, 0, 1]);
        assert_eq!(&bytes[20..24], &[192, 168, 1, 9]);

        assert_eq!(id.source_port(), 8080);
        assert_eq!(id.dest_port(), 443);
        assert_eq!(
            id.source_addr(libc::AF_INET as u8),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
        assert_eq!(id.source_addr(0), None);
    }

    #[test]
    fn test_sockid_v6() {
        let mut id = InetDiagSockId::default();
        id.dst = Ipv6Addr::LOCALHOST.octets();
        assert_eq!(
            id.dest_addr(libc::AF_INET6 as u8),
            Some(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
    }

    #[test]
    fn test_msg_offsets() {
        let msg = InetDiagMsg {
            family: libc::AF_INET as u8,
            state: 10,
            timer: 1,
            retrans: 3,
            expires: 0x1111_1111,
            rqueue: 5,
            wqueue: 6,
            uid: 1000,
            inode: 0xabcd,
            ..Default::default()
        };
        let bytes = msg.as_bytes();
        assert_eq!(bytes[1], 10);
        assert_eq!(&bytes[52..56], &0x1111_1111u32.to_ne_bytes());
        assert_eq!(&bytes[64..68], &1000u32.to_ne_bytes());
        assert_eq!(&bytes[68..72], &0xabcdu32.to_ne_bytes());
        assert_eq!(InetDiagMsg::parse(bytes).unwrap(), msg);
    }

    #[test]
    fn test_msg_truncated() {
        let err = InetDiagMsg::parse(&[0u8; 40]).unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                expected: 72,
                actual: 40
            }
        ));
    }
}

//! Typed views of TCP diagnostic records.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use super::attr::{Attribute, ExtendedTcpInfo};
use super::wire::{INET_DIAG_CONG, INET_DIAG_INFO, InetDiagMsg};

/// TCP socket states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TcpState {
    /// Unknown state.
    Unknown = 0,
    /// Connection established.
    Established = 1,
    /// SYN sent, waiting for matching SYN.
    SynSent = 2,
    /// SYN received, waiting for ACK.
    SynRecv = 3,
    /// FIN sent, waiting for FIN or FIN-ACK.
    FinWait1 = 4,
    /// FIN received, waiting for FIN.
    FinWait2 = 5,
    /// In TIME-WAIT state.
    TimeWait = 6,
    /// Socket is closed.
    Close = 7,
    /// FIN received, close pending.
    CloseWait = 8,
    /// Close wait acknowledged, waiting for FIN.
    LastAck = 9,
    /// Socket is listening.
    Listen = 10,
    /// Both sides sent FIN simultaneously.
    Closing = 11,
    /// New SYN received (kernel only).
    NewSynRecv = 12,
    /// Bound but inactive (MPTCP).
    BoundInactive = 13,
}

impl TcpState {
    /// Parse from a raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Established,
            2 => Self::SynSent,
            3 => Self::SynRecv,
            4 => Self::FinWait1,
            5 => Self::FinWait2,
            6 => Self::TimeWait,
            7 => Self::Close,
            8 => Self::CloseWait,
            9 => Self::LastAck,
            10 => Self::Listen,
            11 => Self::Closing,
            12 => Self::NewSynRecv,
            13 => Self::BoundInactive,
            _ => Self::Unknown,
        }
    }

    /// Short name, as printed by `ss`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Established => "ESTAB",
            Self::SynSent => "SYN-SENT",
            Self::SynRecv => "SYN-RECV",
            Self::FinWait1 => "FIN-WAIT-1",
            Self::FinWait2 => "FIN-WAIT-2",
            Self::TimeWait => "TIME-WAIT",
            Self::Close => "UNCONN",
            Self::CloseWait => "CLOSE-WAIT",
            Self::LastAck => "LAST-ACK",
            Self::Listen => "LISTEN",
            Self::Closing => "CLOSING",
            Self::NewSynRecv => "NEW-SYN-RECV",
            Self::BoundInactive => "BOUND-INACTIVE",
        }
    }

    /// Name of the kernel constant (`TCP_ESTABLISHED`, ...).
    pub fn kernel_name(&self) -> &'static str {
        match self {
            Self::Unknown => "TCP_UNKNOWN",
            Self::Established => "TCP_ESTABLISHED",
            Self::SynSent => "TCP_SYN_SENT",
            Self::SynRecv => "TCP_SYN_RECV",
            Self::FinWait1 => "TCP_FIN_WAIT1",
            Self::FinWait2 => "TCP_FIN_WAIT2",
            Self::TimeWait => "TCP_TIME_WAIT",
            Self::Close => "TCP_CLOSE",
            Self::CloseWait => "TCP_CLOSE_WAIT",
            Self::LastAck => "TCP_LAST_ACK",
            Self::Listen => "TCP_LISTEN",
            Self::Closing => "TCP_CLOSING",
            Self::NewSynRecv => "TCP_NEW_SYN_RECV",
            Self::BoundInactive => "TCP_BOUND_INACTIVE",
        }
    }

    /// Create a bitmask for this state.
    pub fn mask(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// Timer information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// No timer active.
    Off,
    /// Retransmit timer.
    On { expires_ms: u32, retrans: u8 },
    /// Keepalive timer.
    Keepalive { expires_ms: u32, probes: u8 },
    /// TIME-WAIT timer.
    TimeWait { expires_ms: u32 },
    /// Zero window probe timer.
    Probe { expires_ms: u32, retrans: u8 },
}

impl Timer {
    /// Parse timer info from idiag_timer, idiag_expires, idiag_retrans.
    pub fn from_raw(timer: u8, expires: u32, retrans: u8) -> Self {
        match timer {
            1 => Self::On {
                expires_ms: expires,
                retrans,
            },
            2 => Self::Keepalive {
                expires_ms: expires,
                probes: retrans,
            },
            3 => Self::TimeWait {
                expires_ms: expires,
            },
            4 => Self::Probe {
                expires_ms: expires,
                retrans,
            },
            _ => Self::Off,
        }
    }
}

/// TCP information structure (struct tcp_info).
///
/// Fields the kernel did not send are left at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpInfo {
    pub state: u8,
    pub ca_state: u8,
    pub retransmits: u8,
    pub probes: u8,
    pub backoff: u8,
    pub options: u8,
    /// Send window scale in the low nibble, receive in the high one.
    pub wscale: u8,
    /// Bit 0: delivery rate app limited; bits 1-2: fastopen client failure.
    pub flags: u8,

    /// Retransmit timeout (usec).
    pub rto: u32,
    /// Delayed ACK timeout (usec).
    pub ato: u32,
    pub snd_mss: u32,
    pub rcv_mss: u32,

    pub unacked: u32,
    pub sacked: u32,
    pub lost: u32,
    pub retrans: u32,
    pub fackets: u32,

    pub last_data_sent: u32,
    pub last_ack_sent: u32,
    pub last_data_recv: u32,
    pub last_ack_recv: u32,

    pub pmtu: u32,
    pub rcv_ssthresh: u32,
    /// Smoothed RTT (usec).
    pub rtt: u32,
    /// RTT variance (usec).
    pub rttvar: u32,
    pub snd_ssthresh: u32,
    pub snd_cwnd: u32,
    pub advmss: u32,
    pub reordering: u32,

    pub rcv_rtt: u32,
    pub rcv_space: u32,
    pub total_retrans: u32,

    /// Pacing rate (bytes/sec).
    pub pacing_rate: u64,
    pub max_pacing_rate: u64,
    pub bytes_acked: u64,
    pub bytes_received: u64,
    pub segs_out: u32,
    pub segs_in: u32,

    pub notsent_bytes: u32,
    /// Minimum RTT (usec).
    pub min_rtt: u32,
    pub data_segs_in: u32,
    pub data_segs_out: u32,

    /// Delivery rate (bytes/sec).
    pub delivery_rate: u64,

    pub busy_time: u64,
    pub rwnd_limited: u64,
    pub sndbuf_limited: u64,

    pub delivered: u32,
    pub delivered_ce: u32,

    pub bytes_sent: u64,
    pub bytes_retrans: u64,
    pub dsack_dups: u32,
    pub reord_seen: u32,

    pub rcv_ooopack: u32,
    pub snd_wnd: u32,
}

trait NeField: Copy {
    const WIDTH: usize;
    fn read(src: &[u8]) -> Self;
    fn write(self, dst: &mut [u8]);
}

macro_rules! ne_field {
    ($($ty:ty),*) => {$(
        impl NeField for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn read(src: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&src[..Self::WIDTH]);
                <$ty>::from_ne_bytes(raw)
            }

            fn write(self, dst: &mut [u8]) {
                dst[..Self::WIDTH].copy_from_slice(&self.to_ne_bytes());
            }
        }
    )*};
}

ne_field!(u8, u32, u64);

/// Read a field only if it lies entirely inside `data`.
fn read_field<T: NeField>(data: &[u8], offset: usize) -> Option<T> {
    data.get(offset..offset + T::WIDTH).map(T::read)
}

fn write_field<T: NeField>(buf: &mut [u8], offset: usize, value: T) {
    if let Some(dst) = buf.get_mut(offset..offset + T::WIDTH) {
        value.write(dst);
    }
}

macro_rules! tcp_info_layout {
    ($($field:ident: $ty:ty = $offset:literal),* $(,)?) => {
        impl TcpInfo {
            /// Decode from a kernel `tcp_info` payload of any length.
            pub fn decode(data: &[u8]) -> Self {
                let mut info = Self::default();
                $(
                    if let Some(v) = read_field::<$ty>(data, $offset) {
                        info.$field = v;
                    }
                )*
                info
            }

            /// Serialize into `buf`, skipping fields that do not fit.
            pub fn encode_into(&self, buf: &mut [u8]) {
                $( write_field::<$ty>(buf, $offset, self.$field); )*
            }
        }
    };
}

tcp_info_layout! {
    state: u8 = 0,
    ca_state: u8 = 1,
    retransmits: u8 = 2,
    probes: u8 = 3,
    backoff: u8 = 4,
    options: u8 = 5,
    wscale: u8 = 6,
    flags: u8 = 7,
    rto: u32 = 8,
    ato: u32 = 12,
    snd_mss: u32 = 16,
    rcv_mss: u32 = 20,
    unacked: u32 = 24,
    sacked: u32 = 28,
    lost: u32 = 32,
    retrans: u32 = 36,
    fackets: u32 = 40,
    last_data_sent: u32 = 44,
    last_ack_sent: u32 = 48,
    last_data_recv: u32 = 52,
    last_ack_recv: u32 = 56,
    pmtu: u32 = 60,
    rcv_ssthresh: u32 = 64,
    rtt: u32 = 68,
    rttvar: u32 = 72,
    snd_ssthresh: u32 = 76,
    snd_cwnd: u32 = 80,
    advmss: u32 = 84,
    reordering: u32 = 88,
    rcv_rtt: u32 = 92,
    rcv_space: u32 = 96,
    total_retrans: u32 = 100,
    pacing_rate: u64 = 104,
    max_pacing_rate: u64 = 112,
    bytes_acked: u64 = 120,
    bytes_received: u64 = 128,
    segs_out: u32 = 136,
    segs_in: u32 = 140,
    notsent_bytes: u32 = 144,
    min_rtt: u32 = 148,
    data_segs_in: u32 = 152,
    data_segs_out: u32 = 156,
    delivery_rate: u64 = 160,
    busy_time: u64 = 168,
    rwnd_limited: u64 = 176,
    sndbuf_limited: u64 = 184,
    delivered: u32 = 192,
    delivered_ce: u32 = 196,
    bytes_sent: u64 = 200,
    bytes_retrans: u64 = 208,
    dsack_dups: u32 = 216,
    reord_seen: u32 = 220,
    rcv_ooopack: u32 = 224,
    snd_wnd: u32 = 228,
}

impl TcpInfo {
    /// Bytes covered by the fields this type knows about.
    pub const KNOWN_LEN: usize = 232;

    /// The state as reported inside `tcp_info`.
    pub fn tcp_state(&self) -> TcpState {
        TcpState::from_u8(self.state)
    }

    pub fn snd_wscale(&self) -> u8 {
        self.wscale & 0x0f
    }

    pub fn rcv_wscale(&self) -> u8 {
        self.wscale >> 4
    }

    pub fn delivery_rate_app_limited(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

/// The connection 4-tuple plus interface and cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketIdentity {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    /// Bound interface index, 0 if none.
    pub interface: u32,
    /// Opaque kernel socket cookie.
    pub cookie: u64,
}

/// One socket as reported by a TCP dump.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketRecord {
    pub family: u8,
    /// State from the fixed header.
    pub state: TcpState,
    pub timer: Timer,
    pub retrans: u8,
    pub id: SocketIdentity,
    pub expires: u32,
    /// Receive queue depth.
    pub recv_q: u32,
    /// Send queue depth.
    pub send_q: u32,
    pub uid: u32,
    pub inode: u32,
    /// Recognized attributes keyed by attribute type.
    pub attrs: BTreeMap<u16, Attribute>,
}

impl SocketRecord {
    /// Build a record from a parsed header and its decoded attributes.
    ///
    /// Returns `None` for address families other than IPv4 and IPv6.
    pub fn from_parts(msg: &InetDiagMsg, attrs: BTreeMap<u16, Attribute>) -> Option<Self> {
        let src = msg.id.source_addr(msg.family)?;
        let dst = msg.id.dest_addr(msg.family)?;

        Some(Self {
            family: msg.family,
            state: TcpState::from_u8(msg.state),
            timer: Timer::from_raw(msg.timer, msg.expires, msg.retrans),
            retrans: msg.retrans,
            id: SocketIdentity {
                local: SocketAddr::new(src, msg.id.source_port()),
                remote: SocketAddr::new(dst, msg.id.dest_port()),
                interface: msg.id.interface,
                cookie: msg.id.cookie(),
            },
            expires: msg.expires,
            recv_q: msg.rqueue,
            send_q: msg.wqueue,
            uid: msg.uid,
            inode: msg.inode,
            attrs,
        })
    }

    /// Extended TCP info, if the kernel attached it.
    pub fn tcp_info(&self) -> Option<&ExtendedTcpInfo> {
        match self.attrs.get(&INET_DIAG_INFO) {
            Some(Attribute::TcpInfo(info)) => Some(info),
            _ => None,
        }
    }

    /// Congestion control algorithm name, if reported.
    pub fn congestion(&self) -> Option<&str> {
        match self.attrs.get(&INET_DIAG_CONG) {
            Some(Attribute::Congestion(name)) => Some(name),
            _ => None,
        }
    }

    /// Best known state: from `tcp_info` when present, the header otherwise.
    pub fn effective_state(&self) -> TcpState {
        self.tcp_info()
            .map(|ext| ext.info.tcp_state())
            .unwrap_or(self.state)
    }

    pub fn local_ip(&self) -> IpAddr {
        self.id.local.ip()
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.id.remote.ip()
    }
}

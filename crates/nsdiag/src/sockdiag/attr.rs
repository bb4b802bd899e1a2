//! Typed `inet_diag` attributes.

use std::collections::BTreeMap;

use crate::netlink::Result;
use crate::netlink::attr::{AttrCursor, NLA_MAX_PAYLOAD};
use crate::netlink::builder::push_attr;

use super::types::TcpInfo;
use super::wire::{INET_DIAG_CONG, INET_DIAG_INFO};

/// `tcp_info` together with the number of bytes the kernel sent.
///
/// The layout grows with every kernel release, so `len` is the only
/// authoritative statement of which fields are real.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedTcpInfo {
    pub info: TcpInfo,
    pub len: usize,
}

/// A decoded attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// `INET_DIAG_INFO`.
    TcpInfo(ExtendedTcpInfo),
    /// `INET_DIAG_CONG`: congestion control algorithm name.
    Congestion(String),
    /// Any other attribute. The payload is not kept.
    Unrecognized { kind: u16, len: usize },
}

impl Attribute {
    /// Attribute type code.
    pub fn kind(&self) -> u16 {
        match self {
            Self::TcpInfo(_) => INET_DIAG_INFO,
            Self::Congestion(_) => INET_DIAG_CONG,
            Self::Unrecognized { kind, .. } => *kind,
        }
    }

    /// Whether a record keeps this attribute.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }

    fn decode(kind: u16, payload: &[u8]) -> Self {
        match kind {
            INET_DIAG_INFO => Self::TcpInfo(ExtendedTcpInfo {
                info: TcpInfo::decode(payload),
                len: payload.len(),
            }),
            INET_DIAG_CONG => {
                let name = payload.split(|&b| b == 0).next().unwrap_or_default();
                Self::Congestion(String::from_utf8_lossy(name).into_owned())
            }
            kind => Self::Unrecognized {
                kind,
                len: payload.len(),
            },
        }
    }

    /// Append this attribute in TLV form (header, payload, padding).
    ///
    /// Unrecognized attributes are written with a zeroed payload of their
    /// original length.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Self::TcpInfo(ext) => {
                let mut payload = vec![0u8; ext.len];
                ext.info.encode_into(&mut payload);
                push_attr(buf, INET_DIAG_INFO, &payload);
            }
            Self::Congestion(name) => {
                let mut payload = name.as_bytes().to_vec();
                // A name filling the whole attribute was sent without a NUL.
                if payload.len() < NLA_MAX_PAYLOAD {
                    payload.push(0);
                }
                push_attr(buf, INET_DIAG_CONG, &payload);
            }
            Self::Unrecognized { kind, len } => {
                push_attr(buf, *kind, &vec![0u8; *len]);
            }
        }
    }
}

/// Decode the attribute region `region[..declared_len]`.
///
/// Fails with a protocol error if any attribute is malformed or the walk
/// does not end exactly on `declared_len`.
pub fn decode_attributes(region: &[u8], declared_len: usize) -> Result<Vec<Attribute>> {
    AttrCursor::new(region, declared_len)?
        .map(|raw| raw.map(|a| Attribute::decode(a.kind, a.payload)))
        .collect()
}

/// Keep only recognized attributes, keyed by type. A later duplicate
/// replaces an earlier one.
pub fn into_map(attrs: Vec<Attribute>) -> BTreeMap<u16, Attribute> {
    attrs
        .into_iter()
        .filter(Attribute::is_recognized)
        .map(|a| (a.kind(), a))
        .collect()
}

//! Netlink attribute (nlattr) handling.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4; // nla_align(size_of::<NlAttr>())

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

const _: () = assert!(std::mem::size_of::<NlAttr>() == NLA_HDRLEN);

/// Largest payload a 16-bit `nla_len` can describe.
pub const NLA_MAX_PAYLOAD: usize = u16::MAX as usize - NLA_HDRLEN;

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    ///
    /// `data_len` must not exceed [`NLA_MAX_PAYLOAD`].
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        debug_assert!(data_len <= NLA_MAX_PAYLOAD, "attribute payload too long");
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(attr, _)| attr)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// One attribute as found in the buffer, payload not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAttr<'a> {
    /// Attribute type without flags.
    pub kind: u16,
    /// Payload bytes (`nla_len - NLA_HDRLEN`), padding excluded.
    pub payload: &'a [u8],
}

/// Strict walker over an attribute region.
///
/// Unlike a lenient iterator that stops at the first inconsistency, every
/// malformed step is reported as an error and ends the walk. A walk that runs
/// to completion has consumed exactly the declared length.
#[derive(Debug, Clone)]
pub struct AttrCursor<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> AttrCursor<'a> {
    /// Walk the first `declared_len` bytes of `region`.
    pub fn new(region: &'a [u8], declared_len: usize) -> Result<Self> {
        let data = region.get(..declared_len).ok_or_else(|| {
            Error::Protocol(format!(
                "attribute region declares {} bytes but only {} are present",
                declared_len,
                region.len()
            ))
        })?;
        Ok(Self {
            data,
            pos: 0,
            failed: false,
        })
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn fail(&mut self, err: Error) -> Option<Result<RawAttr<'a>>> {
        self.failed = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for AttrCursor<'a> {
    type Item = Result<RawAttr<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos == self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.pos;
        if remaining < NLA_HDRLEN {
            return self.fail(Error::Protocol(format!(
                "attribute header at offset {} out of bounds ({} bytes left)",
                self.pos, remaining
            )));
        }

        let attr = match NlAttr::parse(&self.data[self.pos..]) {
            Ok(a) => a,
            Err(e) => return self.fail(e),
        };

        let len = attr.nla_len as usize;
        if len < NLA_HDRLEN {
            return self.fail(Error::Protocol(format!(
                "attribute at offset {} has length {} below header size",
                self.pos, len
            )));
        }
        if len > remaining {
            return self.fail(Error::Protocol(format!(
                "attribute at offset {} claims {} bytes, {} left",
                self.pos, len, remaining
            )));
        }

        // The aligned step must land inside the declared region, otherwise
        // the walk could never end on it exactly.
        let step = nla_align(len);
        if step > remaining {
            return self.fail(Error::Protocol(format!(
                "attribute at offset {} pads to {} bytes past the declared length",
                self.pos,
                step - remaining
            )));
        }

        let payload = &self.data[self.pos + NLA_HDRLEN..self.pos + len];
        self.pos += step;

        Some(Ok(RawAttr {
            kind: attr.kind(),
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::builder::push_attr;

    fn walk(region: &[u8]) -> Result<Vec<(u16, Vec<u8>)>> {
        AttrCursor::new(region, region.len())?
            .map(|r| r.map(|a| (a.kind, a.payload.to_vec())))
            .collect()
    }

    #[test]
    fn test_nla_align() {
        assert_eq!(nla_align(0), 0);
        assert_eq!(nla_align(1), 4);
        assert_eq!(nla_align(4), 4);
        assert_eq!(nla_align(5), 8);
    }

    #[test]
    fn test_walk_two_attrs() {
        let mut region = Vec::new();
        push_attr(&mut region, 2, &[1, 2, 3]);
        push_attr(&mut region, 4, b"cubic\0");

        let attrs = walk(&region).unwrap();
        assert_eq!(attrs, vec![(2, vec![1, 2, 3]), (4, b"cubic\0".to_vec())]);
    }

    #[test]
    fn test_walk_empty_payload() {
        let mut region = Vec::new();
        push_attr(&mut region, 8, &[]);
        push_attr(&mut region, 5, &[7]);

        let attrs = walk(&region).unwrap();
        assert_eq!(attrs, vec![(8, vec![]), (5, vec![7])]);
    }

    #[test]
    fn test_walk_flags_masked() {
        let mut region = Vec::new();
        push_attr(&mut region, 3 | NLA_F_NESTED, &[0; 4]);
        assert_eq!(walk(&region).unwrap()[0].0, 3);
    }

    #[test]
    fn test_header_out_of_bounds() {
        let mut region = Vec::new();
        push_attr(&mut region, 2, &[0; 4]);
        region.extend_from_slice(&[0, 0]);
        assert!(walk(&region).unwrap_err().is_protocol());
    }

    #[test]
    fn test_length_below_header() {
        let mut region = NlAttr::new(2, 4).as_bytes().to_vec();
        region.extend_from_slice(&[0; 4]);
        region[0..2].copy_from_slice(&2u16.to_ne_bytes());
        assert!(walk(&region).unwrap_err().is_protocol());
    }

    #[test]
    fn test_claims_more_than_present() {
        // Declares 8 bytes, only the 4-byte header is readable.
        let mut region = NlAttr::new(2, 4).as_bytes().to_vec();
        assert_eq!(region.len(), 4);
        assert!(walk(&region).unwrap_err().is_protocol());

        // Same when the region is longer than the declared length.
        region.extend_from_slice(&[0; 4]);
        let err = AttrCursor::new(&region, 4)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_declared_longer_than_region() {
        assert!(AttrCursor::new(&[0u8; 4], 8).unwrap_err().is_protocol());
    }

    #[test]
    fn test_unpadded_tail_rejected() {
        // nla_len = 5 with a 5 byte region: aligned step of 8 overshoots.
        let mut region = NlAttr::new(2, 1).as_bytes().to_vec();
        region.push(0xee);
        assert!(walk(&region).unwrap_err().is_protocol());
    }

    #[test]
    fn test_stops_after_error() {
        let region = [0u8; 2];
        let mut cursor = AttrCursor::new(&region, 2).unwrap();
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_advance_matches_alignment_for_every_payload_size() {
        let max_payload = NLA_MAX_PAYLOAD;
        let mut buf = vec![0u8; nla_align(NLA_HDRLEN + max_payload)];

        for payload in 0..=max_payload {
            let len = NLA_HDRLEN + payload;
            buf[..NLA_HDRLEN].copy_from_slice(NlAttr::new(9, payload).as_bytes());
            let region = &buf[..nla_align(len)];

            let mut cursor = AttrCursor::new(region, region.len()).unwrap();
            let attr = cursor.next().unwrap().unwrap();
            assert_eq!(attr.payload.len(), payload);
            assert_eq!(cursor.position(), nla_align(len));
            assert!(cursor.next().is_none());
        }
    }
}

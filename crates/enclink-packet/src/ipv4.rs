use core::net::Ipv4Addr;

use crate::checksum::ipv4_header_checksum;
use crate::{ensure_len, read_ipv4, read_u16, PacketError};

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

pub const DEFAULT_TTL: u8 = 128;

const FLAG_MORE_FRAGMENTS: u16 = 0x2000;
const FRAGMENT_OFFSET_MASK: u16 = 0x1fff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Packet<'a> {
    pub version: u8,
    pub header_len: usize,
    pub total_len: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub header_checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// Bounded by `total_len`, so Ethernet padding and CRC bytes are not included.
    pub payload: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    pub const MIN_HEADER_LEN: usize = 20;

    /// Decodes the fixed header layout. Version and header length are reported rather than
    /// enforced so the caller can decide what it accepts.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::MIN_HEADER_LEN)?;
        let version = buf[0] >> 4;
        let header_len = (buf[0] & 0x0f) as usize * 4;
        if header_len < Self::MIN_HEADER_LEN {
            return Err(PacketError::Malformed("IPv4 IHL < 5"));
        }
        ensure_len(buf, header_len)?;
        let total_len = read_u16(buf, 2);
        if (total_len as usize) < header_len {
            return Err(PacketError::Malformed("IPv4 total length < header length"));
        }
        ensure_len(buf, total_len as usize)?;

        Ok(Self {
            version,
            header_len,
            total_len,
            identification: read_u16(buf, 4),
            flags_fragment: read_u16(buf, 6),
            ttl: buf[8],
            protocol: buf[9],
            header_checksum: read_u16(buf, 10),
            src: read_ipv4(buf, 12),
            dst: read_ipv4(buf, 16),
            payload: &buf[header_len..total_len as usize],
        })
    }

    pub fn more_fragments(&self) -> bool {
        self.flags_fragment & FLAG_MORE_FRAGMENTS != 0
    }

    /// Fragment offset in bytes.
    pub fn fragment_offset(&self) -> usize {
        ((self.flags_fragment & FRAGMENT_OFFSET_MASK) as usize) << 3
    }

    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() != 0
    }

    /// 20-byte header with no options, no flags and a computed header checksum.
    pub fn header(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
        identification: u16,
        ttl: u8,
        payload_len: usize,
    ) -> Result<[u8; Ipv4Packet::<'static>::MIN_HEADER_LEN], PacketError> {
        let total_len = Self::MIN_HEADER_LEN + payload_len;
        if total_len > u16::MAX as usize {
            return Err(PacketError::Malformed("IPv4 total length > 65535"));
        }
        let mut out = [0u8; Self::MIN_HEADER_LEN];
        out[0] = (4u8 << 4) | 5;
        out[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        out[4..6].copy_from_slice(&identification.to_be_bytes());
        out[8] = ttl;
        out[9] = protocol;
        out[12..16].copy_from_slice(&src.octets());
        out[16..20].copy_from_slice(&dst.octets());
        let csum = ipv4_header_checksum(&out);
        out[10..12].copy_from_slice(&csum.to_be_bytes());
        Ok(out)
    }
}

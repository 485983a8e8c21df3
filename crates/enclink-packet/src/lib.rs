#![forbid(unsafe_code)]

//! Wire formats for the small IPv4 stack that sits on top of the ENC28J60 driver.
//!
//! Parsers borrow the receive buffer and never allocate. Builders produce fixed-size headers so
//! an outbound frame can be handed to the chip as a list of segments (Ethernet header, IPv4
//! header, transport header, payload) without first being copied into one contiguous buffer.

use core::fmt;
use core::str::FromStr;

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod udp;

pub use arp::{ArpPacket, ARP_OP_REPLY, ARP_OP_REQUEST, HTYPE_ETHERNET, PTYPE_IPV4};
pub use ethernet::{EthernetFrame, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_VLAN};
pub use icmp::{IcmpPacket, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST};
pub use ipv4::{Ipv4Packet, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
pub use udp::UdpPacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet truncated")]
    Truncated,
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: Self = Self([0xff; 6]);
    pub const UNSPECIFIED: Self = Self([0; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = PacketError;

    /// Accepts `aa:bb:cc:dd:ee:ff` (or `-` separated) hex notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for slot in out.iter_mut() {
            let part = parts
                .next()
                .ok_or(PacketError::Malformed("MAC address has fewer than 6 octets"))?;
            if part.is_empty() || part.len() > 2 {
                return Err(PacketError::Malformed("MAC address octet must be 1-2 hex digits"));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| PacketError::Malformed("MAC address octet is not hex"))?;
        }
        if parts.next().is_some() {
            return Err(PacketError::Malformed("MAC address has more than 6 octets"));
        }
        Ok(Self(out))
    }
}

pub(crate) fn ensure_len(buf: &[u8], len: usize) -> Result<(), PacketError> {
    if buf.len() < len {
        return Err(PacketError::Truncated);
    }
    Ok(())
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub(crate) fn read_mac(buf: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buf[offset..offset + 6]);
    MacAddr(mac)
}

pub(crate) fn read_ipv4(buf: &[u8], offset: usize) -> core::net::Ipv4Addr {
    core::net::Ipv4Addr::new(buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3])
}

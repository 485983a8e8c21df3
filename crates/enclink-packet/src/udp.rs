use core::net::Ipv4Addr;

use crate::checksum::udp_checksum;
use crate::{ensure_len, read_u16, PacketError};

/// Value written to the checksum field when no checksum is computed.
pub const UDP_CHECKSUM_NONE: u16 = 0;

#[derive(Clone, Copy, Debug)]
pub struct UdpPacket<'a> {
    data: &'a [u8],
    length: usize,
}

impl<'a> UdpPacket<'a> {
    pub const HEADER_LEN: usize = 8;

    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(data, Self::HEADER_LEN)?;
        let length = read_u16(data, 4) as usize;
        if length < Self::HEADER_LEN {
            return Err(PacketError::Malformed("UDP length < header length"));
        }
        ensure_len(data, length)?;
        Ok(Self { data, length })
    }

    pub fn src_port(&self) -> u16 {
        read_u16(self.data, 0)
    }

    pub fn dst_port(&self) -> u16 {
        read_u16(self.data, 2)
    }

    pub fn length(&self) -> u16 {
        self.length as u16
    }

    pub fn checksum(&self) -> u16 {
        read_u16(self.data, 6)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.data[Self::HEADER_LEN..self.length]
    }

    /// Checksum this datagram should carry, with a computed zero normalised to `0xFFFF`.
    pub fn expected_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> u16 {
        udp_checksum(
            src_ip,
            dst_ip,
            self.src_port(),
            self.dst_port(),
            self.payload(),
        )
    }

    /// A zero checksum field means the sender skipped it and is always accepted.
    pub fn checksum_valid_ipv4(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        let csum = self.checksum();
        csum == UDP_CHECKSUM_NONE || csum == self.expected_checksum(src_ip, dst_ip)
    }

    /// Header for an outbound datagram. With `addrs` set the checksum is computed over the
    /// pseudo-header, otherwise the field is left as [`UDP_CHECKSUM_NONE`].
    pub fn header(
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
        addrs: Option<(Ipv4Addr, Ipv4Addr)>,
    ) -> Result<[u8; UdpPacket::<'static>::HEADER_LEN], PacketError> {
        let len = Self::HEADER_LEN + payload.len();
        if len > u16::MAX as usize {
            return Err(PacketError::Malformed("UDP length > 65535"));
        }
        let csum = match addrs {
            Some((src_ip, dst_ip)) => udp_checksum(src_ip, dst_ip, src_port, dst_port, payload),
            None => UDP_CHECKSUM_NONE,
        };
        let mut out = [0u8; Self::HEADER_LEN];
        out[0..2].copy_from_slice(&src_port.to_be_bytes());
        out[2..4].copy_from_slice(&dst_port.to_be_bytes());
        out[4..6].copy_from_slice(&(len as u16).to_be_bytes());
        out[6..8].copy_from_slice(&csum.to_be_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 200);
    const DST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 198);

    fn datagram(payload: &[u8], addrs: Option<(Ipv4Addr, Ipv4Addr)>) -> Vec<u8> {
        let mut out = UdpPacket::header(5000, 6000, payload, addrs).unwrap().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn checksummed_datagram_verifies() {
        let buf = datagram(b"time>>2024/3/9 14:05", Some((SRC, DST)));
        let pkt = UdpPacket::parse(&buf).unwrap();
        assert_eq!(pkt.src_port(), 5000);
        assert_eq!(pkt.dst_port(), 6000);
        assert_eq!(pkt.payload(), b"time>>2024/3/9 14:05");
        assert_ne!(pkt.checksum(), 0);
        assert!(pkt.checksum_valid_ipv4(SRC, DST));
        assert!(!pkt.checksum_valid_ipv4(SRC, Ipv4Addr::new(192, 168, 1, 197)));
    }

    #[test]
    fn zero_checksum_is_accepted() {
        let buf = datagram(b"ack>>ok", None);
        let pkt = UdpPacket::parse(&buf).unwrap();
        assert_eq!(pkt.checksum(), UDP_CHECKSUM_NONE);
        assert!(pkt.checksum_valid_ipv4(SRC, DST));
    }

    #[test]
    fn corrupted_payload_fails_verification() {
        let mut buf = datagram(b"alive>>yes", Some((SRC, DST)));
        buf[10] ^= 0x01;
        let pkt = UdpPacket::parse(&buf).unwrap();
        assert!(!pkt.checksum_valid_ipv4(SRC, DST));
    }

    #[test]
    fn length_field_bounds_payload() {
        let mut buf = datagram(b"hi", None);
        buf.extend_from_slice(&[0u8; 4]);
        assert_eq!(UdpPacket::parse(&buf).unwrap().payload(), b"hi");

        buf[5] = 7;
        assert!(matches!(UdpPacket::parse(&buf), Err(PacketError::Malformed(_))));
        buf[5] = 64;
        assert!(matches!(UdpPacket::parse(&buf), Err(PacketError::Truncated)));
    }
}

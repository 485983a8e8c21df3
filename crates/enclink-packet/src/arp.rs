use core::net::Ipv4Addr;

use crate::ethernet::{EthernetFrame, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use crate::{ensure_len, read_ipv4, read_mac, read_u16, MacAddr, PacketError};

pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;
pub const HTYPE_ETHERNET: u16 = 1;
pub const PTYPE_IPV4: u16 = ETHERTYPE_IPV4;

/// Ethernet/IPv4 ARP body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub htype: u16,
    pub ptype: u16,
    pub hlen: u8,
    pub plen: u8,
    pub op: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub const LEN: usize = 28;
    /// Ethernet header plus ARP body; the size of every ARP frame this stack emits.
    pub const FRAME_LEN: usize = EthernetFrame::HEADER_LEN + Self::LEN;

    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::LEN)?;
        Ok(Self {
            htype: read_u16(buf, 0),
            ptype: read_u16(buf, 2),
            hlen: buf[4],
            plen: buf[5],
            op: read_u16(buf, 6),
            sender_mac: read_mac(buf, 8),
            sender_ip: read_ipv4(buf, 14),
            target_mac: read_mac(buf, 18),
            target_ip: read_ipv4(buf, 24),
        })
    }

    pub fn is_ethernet_ipv4(&self) -> bool {
        self.htype == HTYPE_ETHERNET && self.ptype == PTYPE_IPV4 && self.hlen == 6 && self.plen == 4
    }

    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self::ethernet_ipv4(
            ARP_OP_REQUEST,
            sender_mac,
            sender_ip,
            MacAddr::UNSPECIFIED,
            target_ip,
        )
    }

    /// Reply that answers `self` on behalf of `our_mac`/`our_ip`.
    ///
    /// `asker_mac` is the Ethernet source of the request frame. It becomes both the target
    /// hardware address and the frame destination, so the answer goes back to the station that
    /// put the request on the wire even when the ARP sender field names someone else.
    pub fn reply_to(&self, asker_mac: MacAddr, our_mac: MacAddr, our_ip: Ipv4Addr) -> Self {
        Self::ethernet_ipv4(ARP_OP_REPLY, our_mac, our_ip, asker_mac, self.sender_ip)
    }

    fn ethernet_ipv4(
        op: u16,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            htype: HTYPE_ETHERNET,
            ptype: PTYPE_IPV4,
            hlen: 6,
            plen: 4,
            op,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..2].copy_from_slice(&self.htype.to_be_bytes());
        out[2..4].copy_from_slice(&self.ptype.to_be_bytes());
        out[4] = self.hlen;
        out[5] = self.plen;
        out[6..8].copy_from_slice(&self.op.to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.octets());
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.octets());
        out
    }

    /// Complete frame: requests go to broadcast, replies straight back to the asker.
    pub fn to_frame(&self) -> [u8; Self::FRAME_LEN] {
        let dst = if self.op == ARP_OP_REQUEST {
            MacAddr::BROADCAST
        } else {
            self.target_mac
        };
        let mut out = [0u8; Self::FRAME_LEN];
        out[..EthernetFrame::HEADER_LEN].copy_from_slice(&EthernetFrame::header(
            dst,
            self.sender_mac,
            ETHERTYPE_ARP,
        ));
        out[EthernetFrame::HEADER_LEN..].copy_from_slice(&self.to_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_MAC: MacAddr = MacAddr([0x0e, 0x5f, 0x5f, 0x19, 0x98, 0x00]);
    const PEER_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);

    #[test]
    fn request_frame_layout() {
        let req = ArpPacket::request(
            OUR_MAC,
            Ipv4Addr::new(192, 168, 1, 198),
            Ipv4Addr::new(192, 168, 1, 200),
        );
        let frame = req.to_frame();
        assert_eq!(frame.len(), 42);
        assert_eq!(&frame[0..6], &[0xff; 6]);
        assert_eq!(&frame[6..12], &OUR_MAC.0);
        assert_eq!(&frame[12..22], &[0x08, 0x06, 0, 1, 8, 0, 6, 4, 0, 1]);
        assert_eq!(&frame[32..38], &[0; 6]);
        assert_eq!(&frame[38..42], &[192, 168, 1, 200]);
    }

    #[test]
    fn reply_swaps_roles() {
        let req = ArpPacket::request(
            PEER_MAC,
            Ipv4Addr::new(192, 168, 1, 200),
            Ipv4Addr::new(192, 168, 1, 198),
        );
        let parsed = ArpPacket::parse(&req.to_bytes()).unwrap();
        assert!(parsed.is_ethernet_ipv4());
        let reply = parsed.reply_to(PEER_MAC, OUR_MAC, Ipv4Addr::new(192, 168, 1, 198));
        assert_eq!(reply.op, ARP_OP_REPLY);
        assert_eq!(reply.sender_mac, OUR_MAC);
        assert_eq!(reply.target_mac, PEER_MAC);
        assert_eq!(reply.target_ip, Ipv4Addr::new(192, 168, 1, 200));

        let frame = reply.to_frame();
        assert_eq!(&frame[0..6], &PEER_MAC.0);
        assert_eq!(&frame[12..22], &[0x08, 0x06, 0, 1, 8, 0, 6, 4, 0, 2]);
    }

    #[test]
    fn reply_goes_to_the_frame_source() {
        let relay = MacAddr([0x02, 0, 0, 0, 0, 0x99]);
        let req = ArpPacket::request(
            PEER_MAC,
            Ipv4Addr::new(192, 168, 1, 200),
            Ipv4Addr::new(192, 168, 1, 198),
        );
        let reply = req.reply_to(relay, OUR_MAC, Ipv4Addr::new(192, 168, 1, 198));
        assert_eq!(reply.target_mac, relay);
        assert_eq!(reply.target_ip, Ipv4Addr::new(192, 168, 1, 200));
        assert_eq!(&reply.to_frame()[0..6], &relay.0);
    }

    #[test]
    fn parse_rejects_short_body() {
        assert_eq!(ArpPacket::parse(&[0u8; 27]), Err(PacketError::Truncated));
    }
}

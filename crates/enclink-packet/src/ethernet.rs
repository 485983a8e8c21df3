use crate::{ensure_len, read_mac, read_u16, MacAddr, PacketError};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_VLAN: u16 = 0x8100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetFrame<'a> {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    /// True when the frame carried an 802.1Q tag at offset 12.
    pub tagged: bool,
    pub payload: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    pub const HEADER_LEN: usize = 14;
    pub const TAGGED_HEADER_LEN: usize = 16;

    /// Splits a received frame into addresses, type and payload.
    ///
    /// When the type at offset 12 is the 802.1Q tag, the type is re-read two bytes further in and
    /// the payload starts at offset 16. Any trailing CRC left by the MAC stays in `payload`; the
    /// upper layers bound themselves by their own length fields.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::HEADER_LEN)?;
        let dst = read_mac(buf, 0);
        let src = read_mac(buf, 6);
        let ethertype = read_u16(buf, 12);
        if ethertype == ETHERTYPE_VLAN {
            ensure_len(buf, Self::TAGGED_HEADER_LEN)?;
            return Ok(Self {
                dst,
                src,
                ethertype: read_u16(buf, 14),
                tagged: true,
                payload: &buf[Self::TAGGED_HEADER_LEN..],
            });
        }
        Ok(Self {
            dst,
            src,
            ethertype,
            tagged: false,
            payload: &buf[Self::HEADER_LEN..],
        })
    }

    /// Untagged header for an outbound frame.
    pub fn header(dst: MacAddr, src: MacAddr, ethertype: u16) -> [u8; EthernetFrame::<'static>::HEADER_LEN] {
        let mut out = [0u8; Self::HEADER_LEN];
        out[0..6].copy_from_slice(&dst.0);
        out[6..12].copy_from_slice(&src.0);
        out[12..14].copy_from_slice(&ethertype.to_be_bytes());
        out
    }

    pub fn serialize(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + payload.len());
        out.extend_from_slice(&Self::header(dst, src, ethertype));
        out.extend_from_slice(payload);
        out
    }
}

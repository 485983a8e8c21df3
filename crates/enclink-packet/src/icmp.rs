use crate::checksum::checksum;
use crate::{ensure_len, read_u16, PacketError};

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpPacket<'a> {
    data: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub const HEADER_LEN: usize = 4;

    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(data, Self::HEADER_LEN)?;
        Ok(Self { data })
    }

    pub fn icmp_type(&self) -> u8 {
        self.data[0]
    }

    pub fn code(&self) -> u8 {
        self.data[1]
    }

    pub fn checksum(&self) -> u16 {
        read_u16(self.data, 2)
    }

    /// Decided on the type alone; the code byte is not inspected.
    pub fn is_echo_request(&self) -> bool {
        self.icmp_type() == ICMP_ECHO_REQUEST
    }

    pub fn checksum_valid(&self) -> bool {
        checksum(self.data, 0) == 0
    }

    /// Echo reply carrying the same identifier, sequence number and data.
    pub fn echo_reply(&self) -> Vec<u8> {
        let mut out = self.data.to_vec();
        out[0] = ICMP_ECHO_REPLY;
        out[1] = 0;
        out[2] = 0;
        out[3] = 0;
        let csum = checksum(&out, 0);
        out[2..4].copy_from_slice(&csum.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_reply_keeps_body_and_fixes_checksum() {
        let mut req = vec![ICMP_ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0x00, 0x01];
        req.extend_from_slice(b"ping");
        let csum = checksum(&req, 0);
        req[2..4].copy_from_slice(&csum.to_be_bytes());

        let pkt = IcmpPacket::parse(&req).unwrap();
        assert!(pkt.is_echo_request());
        assert!(pkt.checksum_valid());

        let reply = pkt.echo_reply();
        assert_eq!(reply[0], ICMP_ECHO_REPLY);
        assert_eq!(reply[1], 0);
        assert_eq!(&reply[4..], &req[4..]);
        assert!(IcmpPacket::parse(&reply).unwrap().checksum_valid());
    }

    #[test]
    fn nonzero_code_is_still_an_echo_request() {
        let req = [ICMP_ECHO_REQUEST, 1, 0, 0, 0, 1, 0, 1];
        let pkt = IcmpPacket::parse(&req).unwrap();
        assert!(pkt.is_echo_request());
        assert_eq!(pkt.echo_reply()[1], 0);
        assert!(!IcmpPacket::parse(&[ICMP_ECHO_REPLY, 0, 0, 0]).unwrap().is_echo_request());
    }
}

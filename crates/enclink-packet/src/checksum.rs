//! RFC 1071 Internet checksum.

use core::net::Ipv4Addr;

use crate::ipv4::IPPROTO_UDP;

/// Adds `data` to `sum` as big-endian 16-bit words. An odd trailing byte is the high byte of a
/// final word.
pub fn sum_words(data: &[u8], mut sum: u32) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let Some(&last) = chunks.remainder().first() {
        sum += (last as u32) << 8;
    }
    sum
}

/// Folds carries back into the low 16 bits until none remain. Not complemented.
pub fn fold(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// One's-complement checksum of `data`, seeded with `initial`.
///
/// Running this over a buffer whose checksum field already holds the correct value yields zero.
pub fn checksum(data: &[u8], initial: u32) -> u16 {
    !fold(sum_words(data, initial))
}

pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    checksum(header, 0)
}

/// Seed for the UDP checksum of a datagram: the pseudo-header plus the UDP header words, with
/// the checksum field taken as zero. `udp_len` counts once for the pseudo-header and once for the
/// header itself.
pub fn udp_pseudo_header_sum(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    udp_len: u16,
    src_port: u16,
    dst_port: u16,
) -> u32 {
    let mut sum = sum_words(&src.octets(), 0);
    sum = sum_words(&dst.octets(), sum);
    sum += IPPROTO_UDP as u32;
    sum += 2 * udp_len as u32;
    sum += src_port as u32;
    sum += dst_port as u32;
    sum
}

/// Checksum to place in (or compare against) a UDP header. A computed zero is sent as `0xFFFF`,
/// because zero on the wire means "no checksum".
pub fn udp_checksum(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> u16 {
    let udp_len = (crate::udp::UdpPacket::HEADER_LEN + payload.len()) as u16;
    let seed = udp_pseudo_header_sum(src, dst, udp_len, src_port, dst_port);
    match checksum(payload, seed) {
        0 => 0xFFFF,
        csum => csum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1071_example() {
        // Worked example from RFC 1071 section 3.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(fold(sum_words(&data, 0)), 0xddf2);
        assert_eq!(checksum(&data, 0), !0xddf2);
    }

    #[test]
    fn odd_length_pads_high_byte() {
        assert_eq!(sum_words(&[0x12], 0), 0x1200);
        assert_eq!(sum_words(&[0x00, 0x01, 0x12], 0), 0x1201);
    }

    #[test]
    fn known_ipv4_header() {
        // 192.168.0.1 -> 192.168.0.199, from the Wikipedia IPv4 checksum example.
        let mut header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let csum = ipv4_header_checksum(&header);
        assert_eq!(csum, 0xb861);
        header[10..12].copy_from_slice(&csum.to_be_bytes());
        assert_eq!(ipv4_header_checksum(&header), 0);
    }

    #[test]
    fn udp_checksum_matches_full_datagram_sum() {
        let src = Ipv4Addr::new(192, 168, 1, 200);
        let dst = Ipv4Addr::new(192, 168, 1, 198);
        let payload = b"alive>>yes";
        let csum = udp_checksum(src, dst, 5000, 6000, payload);

        // Summing the real header (with the checksum in place) plus the classic pseudo-header
        // must come out to zero.
        let len = 8 + payload.len() as u16;
        let mut datagram = Vec::new();
        datagram.extend_from_slice(&5000u16.to_be_bytes());
        datagram.extend_from_slice(&6000u16.to_be_bytes());
        datagram.extend_from_slice(&len.to_be_bytes());
        datagram.extend_from_slice(&csum.to_be_bytes());
        datagram.extend_from_slice(payload);
        let mut sum = sum_words(&src.octets(), 0);
        sum = sum_words(&dst.octets(), sum);
        sum += 17 + len as u32;
        assert_eq!(checksum(&datagram, sum), 0);
    }
}

#![allow(dead_code)]

use core::net::Ipv4Addr;

use enclink_chip::sim::{InstantDelay, SimulatedEnc28j60};
use enclink_chip::{ChipConfig, Enc28j60, DEFAULT_MAC};
use enclink_packet::checksum::checksum;
use enclink_packet::ipv4::DEFAULT_TTL;
use enclink_packet::{
    ArpPacket, EthernetFrame, Ipv4Packet, MacAddr, UdpPacket, ETHERTYPE_IPV4, ICMP_ECHO_REQUEST,
    IPPROTO_ICMP, IPPROTO_UDP,
};
use enclink_stack::{Ipv4Config, NetworkStack, StackConfig};

pub type Stack = NetworkStack<SimulatedEnc28j60, InstantDelay>;

pub const OUR_MAC: MacAddr = MacAddr(DEFAULT_MAC);
pub const OUR_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 198);
pub const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const GATEWAY_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
pub const SERVER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 200);
pub const SERVER_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0xc8]);
pub const SERVER_PORT: u16 = 5000;
pub const LOCAL_PORT: u16 = 6000;

pub fn ipv4() -> Ipv4Config {
    Ipv4Config {
        addr: OUR_IP,
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: GATEWAY_IP,
    }
}

pub fn stack_config() -> StackConfig {
    StackConfig {
        ipv4: Some(ipv4()),
        ..StackConfig::default()
    }
}

pub fn nic() -> Enc28j60<SimulatedEnc28j60, InstantDelay> {
    Enc28j60::new(
        SimulatedEnc28j60::new(),
        InstantDelay::default(),
        ChipConfig::default(),
    )
    .unwrap()
}

pub fn stack_with(cfg: StackConfig) -> Stack {
    let mut stack = NetworkStack::new(nic(), cfg);
    stack.nic_mut().bus_mut().clear_transactions();
    stack
}

pub fn stack() -> Stack {
    stack_with(stack_config())
}

pub fn inject(stack: &mut Stack, frame: &[u8]) {
    stack.nic_mut().bus_mut().inject_frame(frame);
}

pub fn transmitted(stack: &mut Stack) -> Vec<Vec<u8>> {
    stack.nic_mut().bus_mut().take_transmitted()
}

pub fn arp_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    ArpPacket::request(sender_mac, sender_ip, target_ip)
        .to_frame()
        .to_vec()
}

/// Reply from `sender` telling us where it lives.
pub fn arp_reply(sender_mac: MacAddr, sender_ip: Ipv4Addr) -> Vec<u8> {
    ArpPacket::request(OUR_MAC, OUR_IP, sender_ip)
        .reply_to(OUR_MAC, sender_mac, sender_ip)
        .to_frame()
        .to_vec()
}

pub fn ipv4_frame(
    src_mac: MacAddr,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    payload: &[u8],
) -> Vec<u8> {
    let header =
        Ipv4Packet::header(src, dst, protocol, 0x1234, DEFAULT_TTL, payload.len()).unwrap();
    let mut ip = header.to_vec();
    ip.extend_from_slice(payload);
    EthernetFrame::serialize(OUR_MAC, src_mac, ETHERTYPE_IPV4, &ip)
}

pub fn udp_datagram(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    payload: &[u8],
    with_checksum: bool,
) -> Vec<u8> {
    let addrs = with_checksum.then_some((src, dst));
    let mut udp = UdpPacket::header(SERVER_PORT, LOCAL_PORT, payload, addrs)
        .unwrap()
        .to_vec();
    udp.extend_from_slice(payload);
    udp
}

/// Server to node datagram, optionally checksummed.
pub fn udp_frame(payload: &[u8], with_checksum: bool) -> Vec<u8> {
    let udp = udp_datagram(SERVER_IP, OUR_IP, payload, with_checksum);
    ipv4_frame(SERVER_MAC, SERVER_IP, OUR_IP, IPPROTO_UDP, &udp)
}

pub fn echo_request(data: &[u8]) -> Vec<u8> {
    let mut icmp = vec![ICMP_ECHO_REQUEST, 0, 0, 0, 0xbe, 0xef, 0x00, 0x01];
    icmp.extend_from_slice(data);
    let csum = checksum(&icmp, 0);
    icmp[2..4].copy_from_slice(&csum.to_be_bytes());
    ipv4_frame(SERVER_MAC, SERVER_IP, OUR_IP, IPPROTO_ICMP, &icmp)
}

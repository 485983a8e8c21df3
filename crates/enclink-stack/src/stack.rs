use std::collections::VecDeque;
use std::mem;

use core::net::Ipv4Addr;

use enclink_chip::{
    ChipError, Delay, Enc28j60, InitError, SpiBus, ETH_RX_BUFFER_SIZE, ETH_TX_BUFFER_SIZE,
};
use enclink_packet::ipv4::DEFAULT_TTL;
use enclink_packet::{
    ArpPacket, EthernetFrame, IcmpPacket, Ipv4Packet, MacAddr, UdpPacket, ARP_OP_REPLY,
    ARP_OP_REQUEST, ETHERTYPE_ARP, ETHERTYPE_IPV4, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP,
};
use tracing::{debug, error, info, warn};

use crate::arp_table::ArpTable;
use crate::config::{Ipv4Config, StackConfig};
use crate::dos::DosGuard;
use crate::event::{EventSink, Priority};

/// Upper bound on frames handled by one [`NetworkStack::poll`], so a flood the limiter has not
/// caught yet cannot pin the caller forever.
pub const MAX_FRAMES_PER_POLL: usize = 256;

/// Largest UDP payload that still fits in one untagged frame.
pub const MAX_UDP_PAYLOAD: usize = ETH_TX_BUFFER_SIZE
    - EthernetFrame::HEADER_LEN
    - Ipv4Packet::MIN_HEADER_LEN
    - UdpPacket::HEADER_LEN;

const EVENT_SOURCE: &str = "network";

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("IPv4 is not configured")]
    NotConfigured,
    #[error("no ARP entry for {0}")]
    Unresolved(Ipv4Addr),
    #[error("UDP payload of {len} bytes does not fit in one frame")]
    PayloadTooLarge { len: usize },
    #[error(transparent)]
    Chip(#[from] ChipError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    Malformed,
    UnsupportedIpVersion,
    UnsupportedHeaderLength,
    UnsupportedFragmentation,
    ChecksumMismatch,
    DosLimitExceeded,
    NotConfigured,
    NotForUs,
    Undecodable,
}

/// What happened to one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    ArpReplied,
    ArpLearned { ip: Ipv4Addr, mac: MacAddr },
    EchoReplied,
    UdpQueued,
    Ignored,
    /// The frame was fine but the answer could not be transmitted.
    ReplyFailed(ChipError),
    Dropped(DropReason),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DropCounts {
    pub malformed: u64,
    pub unsupported_ip_version: u64,
    pub unsupported_header_length: u64,
    pub unsupported_fragmentation: u64,
    pub checksum_mismatch: u64,
    pub dos_limit_exceeded: u64,
    pub not_configured: u64,
    pub not_for_us: u64,
    pub undecodable: u64,
}

impl DropCounts {
    fn bump(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::Malformed => &mut self.malformed,
            DropReason::UnsupportedIpVersion => &mut self.unsupported_ip_version,
            DropReason::UnsupportedHeaderLength => &mut self.unsupported_header_length,
            DropReason::UnsupportedFragmentation => &mut self.unsupported_fragmentation,
            DropReason::ChecksumMismatch => &mut self.checksum_mismatch,
            DropReason::DosLimitExceeded => &mut self.dos_limit_exceeded,
            DropReason::NotConfigured => &mut self.not_configured,
            DropReason::NotForUs => &mut self.not_for_us,
            DropReason::Undecodable => &mut self.undecodable,
        };
        *counter += 1;
    }

    pub fn get(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::Malformed => self.malformed,
            DropReason::UnsupportedIpVersion => self.unsupported_ip_version,
            DropReason::UnsupportedHeaderLength => self.unsupported_header_length,
            DropReason::UnsupportedFragmentation => self.unsupported_fragmentation,
            DropReason::ChecksumMismatch => self.checksum_mismatch,
            DropReason::DosLimitExceeded => self.dos_limit_exceeded,
            DropReason::NotConfigured => self.not_configured,
            DropReason::NotForUs => self.not_for_us,
            DropReason::Undecodable => self.undecodable,
        }
    }

    pub fn total(&self) -> u64 {
        self.malformed
            + self.unsupported_ip_version
            + self.unsupported_header_length
            + self.unsupported_fragmentation
            + self.checksum_mismatch
            + self.dos_limit_exceeded
            + self.not_configured
            + self.not_for_us
            + self.undecodable
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StackStats {
    pub frames_received: u64,
    pub receive_errors: u64,
    pub frames_sent: u64,
    pub send_errors: u64,
    pub arp_replied: u64,
    pub arp_learned: u64,
    pub echo_replied: u64,
    pub udp_queued: u64,
    /// Payloads discarded because the queue was full when a newer one arrived.
    pub udp_queue_overflows: u64,
    pub ignored: u64,
    pub dropped: DropCounts,
}

impl StackStats {
    fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::ArpReplied => self.arp_replied += 1,
            Disposition::ArpLearned { .. } => self.arp_learned += 1,
            Disposition::EchoReplied => self.echo_replied += 1,
            Disposition::UdpQueued => self.udp_queued += 1,
            Disposition::Ignored => self.ignored += 1,
            Disposition::ReplyFailed(_) => self.send_errors += 1,
            Disposition::Dropped(reason) => self.dropped.bump(*reason),
        }
    }
}

/// ARP, IPv4, ICMP echo and UDP on top of one ENC28J60.
///
/// Nothing runs in the background: [`NetworkStack::poll`] drains the chip and answers ARP and
/// ping inline, queueing UDP text for the application.
pub struct NetworkStack<B, D> {
    nic: Enc28j60<B, D>,
    cfg: StackConfig,
    mac: MacAddr,
    arp: ArpTable,
    dos: DosGuard,
    dos_announced: bool,
    udp_queue: VecDeque<String>,
    ipv4_ident: u8,
    rx_buf: Vec<u8>,
    stats: StackStats,
    sink: Option<Box<dyn EventSink>>,
}

impl<B: SpiBus, D: Delay> NetworkStack<B, D> {
    pub fn new(nic: Enc28j60<B, D>, cfg: StackConfig) -> Self {
        Self::with_sink(nic, cfg, None)
    }

    /// Like [`NetworkStack::new`], with `sink` attached from the start so it also hears about
    /// the chip coming up.
    pub fn with_sink(
        nic: Enc28j60<B, D>,
        cfg: StackConfig,
        sink: Option<Box<dyn EventSink>>,
    ) -> Self {
        let mac = MacAddr(nic.mac_address());
        let revision = nic.revision();
        let mut stack = Self {
            nic,
            arp: ArpTable::new(cfg.arp_capacity),
            dos: DosGuard::new(cfg.dos),
            dos_announced: false,
            udp_queue: VecDeque::with_capacity(cfg.udp_queue_capacity),
            ipv4_ident: 0,
            rx_buf: vec![0; ETH_RX_BUFFER_SIZE],
            stats: StackStats::default(),
            sink,
            cfg,
            mac,
        };
        stack.emit(
            EVENT_SOURCE,
            Priority::Info,
            &format!("Ethernet initialised (rev {revision:#04x}, mac {mac})"),
        );
        stack
    }

    pub fn set_event_sink(&mut self, sink: Option<Box<dyn EventSink>>) {
        self.sink = sink;
    }

    /// Logs `message` and forwards it to the event sink, if one is attached.
    pub fn emit(&mut self, source: &'static str, priority: Priority, message: &str) {
        match priority {
            Priority::Debug => debug!(source, "{message}"),
            Priority::Info => info!(source, "{message}"),
            Priority::Warning => warn!(source, "{message}"),
            Priority::Error | Priority::Critical => error!(source, %priority, "{message}"),
        }
        self.sink.event(source, priority, message);
    }

    pub fn config(&self) -> &StackConfig {
        &self.cfg
    }

    pub fn ipv4(&self) -> Option<Ipv4Config> {
        self.cfg.ipv4
    }

    pub fn set_ipv4(&mut self, ipv4: Option<Ipv4Config>) {
        self.cfg.ipv4 = ipv4;
    }

    pub fn is_ipv4_configured(&self) -> bool {
        self.cfg.ipv4.is_some()
    }

    pub fn mac_address(&self) -> MacAddr {
        self.mac
    }

    /// Receives and handles pending frames until the chip is empty, the flood guard closes, or
    /// [`MAX_FRAMES_PER_POLL`] frames have been read. Returns the number of frames read.
    pub fn poll(&mut self) -> usize {
        let mut buf = mem::take(&mut self.rx_buf);
        buf.resize(ETH_RX_BUFFER_SIZE, 0);

        let mut read = 0;
        while read < MAX_FRAMES_PER_POLL {
            if !self.dos.overall_accepting() {
                if !self.dos_announced {
                    self.dos_announced = true;
                    let report = self.dos.report().to_string();
                    self.emit(
                        EVENT_SOURCE,
                        Priority::Critical,
                        &format!("DoS protection engaged\n{report}"),
                    );
                }
                break;
            }
            match self.nic.receive_frame(&mut buf) {
                Ok(0) => break,
                Ok(len) => {
                    read += 1;
                    self.stats.frames_received += 1;
                    self.process_frame(&buf[..len]);
                }
                Err(err) => {
                    read += 1;
                    self.stats.receive_errors += 1;
                    warn!(code = err.code(), %err, "receive failed");
                }
            }
        }

        self.rx_buf = buf;
        read
    }

    /// Handles one complete Ethernet frame as if it had just been read from the chip.
    pub fn process_frame(&mut self, frame: &[u8]) -> Disposition {
        let disposition = match EthernetFrame::parse(frame) {
            Ok(eth) => match eth.ethertype {
                ETHERTYPE_ARP => self.handle_arp(eth.src, eth.payload),
                ETHERTYPE_IPV4 => self.handle_ipv4(eth.src, eth.payload),
                _ => Disposition::Ignored,
            },
            Err(_) => Disposition::Dropped(DropReason::Malformed),
        };
        self.stats.record(&disposition);
        if let Disposition::Dropped(reason) = disposition {
            debug!(?reason, "frame dropped");
        }
        disposition
    }

    fn handle_arp(&mut self, src_mac: MacAddr, payload: &[u8]) -> Disposition {
        if !self.dos.check_arp() {
            return Disposition::Dropped(DropReason::DosLimitExceeded);
        }
        let arp = match ArpPacket::parse(payload) {
            Ok(arp) if arp.is_ethernet_ipv4() => arp,
            Ok(_) => return Disposition::Ignored,
            Err(_) => return Disposition::Dropped(DropReason::Malformed),
        };
        debug!(op = arp.op, sender = %arp.sender_ip, target = %arp.target_ip, "rx ARP");

        match arp.op {
            ARP_OP_REQUEST => {
                let Some(ipv4) = self.cfg.ipv4 else {
                    return Disposition::Dropped(DropReason::NotConfigured);
                };
                if arp.target_ip != ipv4.addr {
                    return Disposition::Dropped(DropReason::NotForUs);
                }
                let reply = arp.reply_to(src_mac, self.mac, ipv4.addr);
                match self.transmit(&[&reply.to_frame()]) {
                    Ok(_) => {
                        debug!(to = %arp.sender_ip, mac = %src_mac, "answered ARP request");
                        Disposition::ArpReplied
                    }
                    Err(err) => Disposition::ReplyFailed(err),
                }
            }
            ARP_OP_REPLY => {
                info!(ip = %arp.sender_ip, mac = %arp.sender_mac, "ARP entry learned");
                self.arp.insert(arp.sender_ip, arp.sender_mac);
                Disposition::ArpLearned {
                    ip: arp.sender_ip,
                    mac: arp.sender_mac,
                }
            }
            _ => Disposition::Ignored,
        }
    }

    fn handle_ipv4(&mut self, src_mac: MacAddr, payload: &[u8]) -> Disposition {
        let ip = match Ipv4Packet::parse(payload) {
            Ok(ip) => ip,
            Err(_) => return Disposition::Dropped(DropReason::Malformed),
        };
        if ip.version != 4 {
            warn!(version = ip.version, "IP version not supported");
            return Disposition::Dropped(DropReason::UnsupportedIpVersion);
        }
        if ip.header_len != Ipv4Packet::MIN_HEADER_LEN {
            warn!(header_len = ip.header_len, "IPv4 options not supported");
            return Disposition::Dropped(DropReason::UnsupportedHeaderLength);
        }
        if ip.is_fragment() {
            warn!(
                offset = ip.fragment_offset(),
                more_fragments = ip.more_fragments(),
                "fragmented IPv4 not supported"
            );
            return Disposition::Dropped(DropReason::UnsupportedFragmentation);
        }
        let Some(ipv4) = self.cfg.ipv4 else {
            return Disposition::Dropped(DropReason::NotConfigured);
        };

        if ip.dst == ipv4.addr {
            match ip.protocol {
                IPPROTO_ICMP => self.handle_icmp(ipv4.addr, src_mac, &ip),
                IPPROTO_UDP => self.handle_udp(&ip),
                IPPROTO_TCP => self.handle_tcp(),
                _ => Disposition::Ignored,
            }
        } else if ip.dst == Ipv4Addr::BROADCAST {
            match ip.protocol {
                IPPROTO_UDP => self.handle_udp(&ip),
                _ => Disposition::Ignored,
            }
        } else {
            Disposition::Dropped(DropReason::NotForUs)
        }
    }

    fn handle_icmp(
        &mut self,
        our_ip: Ipv4Addr,
        src_mac: MacAddr,
        ip: &Ipv4Packet<'_>,
    ) -> Disposition {
        if !self.dos.check_icmp() {
            return Disposition::Dropped(DropReason::DosLimitExceeded);
        }
        let icmp = match IcmpPacket::parse(ip.payload) {
            Ok(icmp) => icmp,
            Err(_) => return Disposition::Dropped(DropReason::Malformed),
        };
        if !icmp.is_echo_request() {
            debug!(icmp_type = icmp.icmp_type(), "ICMP message ignored");
            return Disposition::Ignored;
        }

        let reply = icmp.echo_reply();
        let ident = self.next_ipv4_ident();
        let Ok(ip_header) =
            Ipv4Packet::header(our_ip, ip.src, IPPROTO_ICMP, ident, DEFAULT_TTL, reply.len())
        else {
            return Disposition::Dropped(DropReason::Malformed);
        };
        let eth = EthernetFrame::header(src_mac, self.mac, ETHERTYPE_IPV4);
        match self.transmit(&[&eth, &ip_header, &reply]) {
            Ok(_) => Disposition::EchoReplied,
            Err(err) => Disposition::ReplyFailed(err),
        }
    }

    fn handle_udp(&mut self, ip: &Ipv4Packet<'_>) -> Disposition {
        if !self.dos.check_udp() {
            return Disposition::Dropped(DropReason::DosLimitExceeded);
        }
        let udp = match UdpPacket::parse(ip.payload) {
            Ok(udp) => udp,
            Err(_) => return Disposition::Dropped(DropReason::Malformed),
        };
        if !udp.checksum_valid_ipv4(ip.src, ip.dst) {
            debug!(
                rx = udp.checksum(),
                calc = udp.expected_checksum(ip.src, ip.dst),
                "invalid UDP checksum"
            );
            return Disposition::Dropped(DropReason::ChecksumMismatch);
        }
        let Ok(text) = core::str::from_utf8(udp.payload()) else {
            return Disposition::Dropped(DropReason::Undecodable);
        };
        if text.is_empty() {
            return Disposition::Ignored;
        }
        debug!(src = %ip.src, src_port = udp.src_port(), len = text.len(), "UDP payload queued");
        self.enqueue_udp(text.to_owned());
        Disposition::UdpQueued
    }

    /// TCP is not spoken here; segments only count towards the flood limit.
    fn handle_tcp(&mut self) -> Disposition {
        if !self.dos.check_tcp() {
            return Disposition::Dropped(DropReason::DosLimitExceeded);
        }
        Disposition::Ignored
    }

    fn enqueue_udp(&mut self, text: String) {
        let capacity = self.cfg.udp_queue_capacity;
        if capacity == 0 {
            self.stats.udp_queue_overflows += 1;
            return;
        }
        while self.udp_queue.len() >= capacity {
            self.udp_queue.pop_front();
            self.stats.udp_queue_overflows += 1;
            debug!(capacity, "UDP queue full, dropped oldest payload");
        }
        self.udp_queue.push_back(text);
    }

    /// 8-bit identification counter; 255 is never used on the wire.
    fn next_ipv4_ident(&mut self) -> u16 {
        if self.ipv4_ident == u8::MAX {
            self.ipv4_ident = 0;
        }
        let id = self.ipv4_ident;
        self.ipv4_ident += 1;
        u16::from(id)
    }

    fn transmit(&mut self, segments: &[&[u8]]) -> Result<usize, ChipError> {
        match self.nic.send_frame(segments) {
            Ok(len) => {
                self.stats.frames_sent += 1;
                Ok(len)
            }
            Err(err) => {
                self.stats.send_errors += 1;
                warn!(code = err.code(), %err, "transmit failed");
                Err(err)
            }
        }
    }

    /// Whether `ip` is on the configured subnet. Always false without IPv4.
    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        self.cfg.ipv4.is_some_and(|ipv4| ipv4.is_local(ip))
    }

    /// Address whose MAC is needed to reach `ip`: the host itself when on-link, the gateway
    /// otherwise.
    pub fn resolution_target(&self, ip: Ipv4Addr) -> Option<Ipv4Addr> {
        let ipv4 = self.cfg.ipv4?;
        Some(if ipv4.is_local(ip) { ip } else { ipv4.gateway })
    }

    pub fn send_arp_request(&mut self, target: Ipv4Addr) -> Result<usize, StackError> {
        let ipv4 = self.cfg.ipv4.ok_or(StackError::NotConfigured)?;
        let request = ArpPacket::request(self.mac, ipv4.addr, target);
        debug!(%target, "ARP request");
        Ok(self.transmit(&[&request.to_frame()])?)
    }

    /// Starts resolving the next hop towards `ip`. Nothing is sent when the route goes through a
    /// gateway that is already resolved.
    pub fn connect(&mut self, ip: Ipv4Addr) -> Result<(), StackError> {
        let target = self.resolution_target(ip).ok_or(StackError::NotConfigured)?;
        if target != ip && self.arp.contains(target) {
            return Ok(());
        }
        self.send_arp_request(target)?;
        Ok(())
    }

    pub fn is_resolved(&self, ip: Ipv4Addr) -> bool {
        self.resolution_target(ip)
            .is_some_and(|target| self.arp.contains(target))
    }

    /// Sends `payload` to `dst_ip:dst_port` through the resolved next hop.
    pub fn send_udp(
        &mut self,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        src_port: u16,
        payload: &[u8],
    ) -> Result<usize, StackError> {
        let ipv4 = self.cfg.ipv4.ok_or(StackError::NotConfigured)?;
        let hop = if ipv4.is_local(dst_ip) { dst_ip } else { ipv4.gateway };
        let dst_mac = self.arp.lookup(hop).ok_or(StackError::Unresolved(hop))?;
        self.send_udp_frame(dst_mac, ipv4.addr, dst_ip, dst_port, src_port, payload)
    }

    /// Sends `payload` to every host on the segment. The source address defaults to `0.0.0.0`.
    pub fn send_udp_broadcast(
        &mut self,
        dst_port: u16,
        src_port: u16,
        payload: &[u8],
        src_ip: Option<Ipv4Addr>,
    ) -> Result<usize, StackError> {
        self.send_udp_frame(
            MacAddr::BROADCAST,
            src_ip.unwrap_or(Ipv4Addr::UNSPECIFIED),
            Ipv4Addr::BROADCAST,
            dst_port,
            src_port,
            payload,
        )
    }

    fn send_udp_frame(
        &mut self,
        dst_mac: MacAddr,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        src_port: u16,
        payload: &[u8],
    ) -> Result<usize, StackError> {
        let too_large = StackError::PayloadTooLarge { len: payload.len() };
        if payload.len() > MAX_UDP_PAYLOAD {
            return Err(too_large);
        }
        let addrs = self.cfg.udp_tx_checksum.then_some((src_ip, dst_ip));
        let udp = UdpPacket::header(src_port, dst_port, payload, addrs).map_err(|_| too_large)?;
        let ident = self.next_ipv4_ident();
        let ip = Ipv4Packet::header(
            src_ip,
            dst_ip,
            IPPROTO_UDP,
            ident,
            DEFAULT_TTL,
            UdpPacket::HEADER_LEN + payload.len(),
        )
        .map_err(|_| too_large)?;
        let eth = EthernetFrame::header(dst_mac, self.mac, ETHERTYPE_IPV4);
        Ok(self.transmit(&[&eth, &ip, &udp, payload])?)
    }

    /// Oldest queued UDP payload.
    pub fn pop_udp_payload(&mut self) -> Option<String> {
        self.udp_queue.pop_front()
    }

    pub fn udp_queue(&self) -> &VecDeque<String> {
        &self.udp_queue
    }

    pub fn clear_udp_queue(&mut self) {
        self.udp_queue.clear();
    }

    pub fn arp_table(&self) -> &ArpTable {
        &self.arp
    }

    pub fn arp_table_mut(&mut self) -> &mut ArpTable {
        &mut self.arp
    }

    pub fn dos(&self) -> &DosGuard {
        &self.dos
    }

    pub fn reset_dos(&mut self) {
        self.dos.reset();
        self.dos_announced = false;
    }

    /// Reports a link transition since the last call, if any.
    pub fn check_link(&mut self) -> Result<Option<bool>, ChipError> {
        let Some(up) = self.nic.link_state_changed()? else {
            return Ok(None);
        };
        let message = if up { "link up" } else { "link down" };
        self.emit(EVENT_SOURCE, Priority::Info, message);
        Ok(Some(up))
    }

    /// Resets and reprograms the controller. Learned ARP entries and queued payloads survive.
    pub fn refresh(&mut self) -> Result<(), InitError> {
        self.nic.init()?;
        self.emit(EVENT_SOURCE, Priority::Info, "Ethernet reset");
        Ok(())
    }

    pub fn stats(&self) -> &StackStats {
        &self.stats
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.nic.delay_ms(ms);
    }

    pub fn nic(&self) -> &Enc28j60<B, D> {
        &self.nic
    }

    pub fn nic_mut(&mut self) -> &mut Enc28j60<B, D> {
        &mut self.nic
    }

    pub fn into_nic(self) -> Enc28j60<B, D> {
        self.nic
    }
}

use std::collections::{HashMap, VecDeque};

use core::net::Ipv4Addr;

use enclink_packet::MacAddr;

/// IPv4 to MAC mappings learned from ARP replies.
///
/// Unbounded by default. With a capacity set, inserting a new address beyond it evicts the
/// oldest inserted entry; updating an existing entry does not refresh its position.
#[derive(Debug, Clone, Default)]
pub struct ArpTable {
    entries: HashMap<Ipv4Addr, MacAddr>,
    fifo: VecDeque<Ipv4Addr>,
    capacity: Option<usize>,
}

impl ArpTable {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            fifo: VecDeque::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        if self.capacity == Some(0) {
            return;
        }
        if self.entries.insert(ip, mac).is_none() {
            self.fifo.push_back(ip);
        }
        let Some(max) = self.capacity else {
            return;
        };
        while self.entries.len() > max {
            let Some(evict) = self.fifo.pop_front() else {
                break;
            };
            self.entries.remove(&evict);
            tracing::debug!(%evict, "ARP table full, evicted oldest entry");
        }
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.get(&ip).copied()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.entries.contains_key(&ip)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.fifo.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ipv4Addr, MacAddr)> + '_ {
        self.entries.iter().map(|(ip, mac)| (*ip, *mac))
    }
}

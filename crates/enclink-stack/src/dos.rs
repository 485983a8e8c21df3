//! Per-protocol flood guard.
//!
//! Each inbound ARP, ICMP, TCP or UDP packet costs one unit of its protocol's budget. Once a
//! budget is spent the protocol stops being accepted, and the stack as a whole stops draining
//! the chip until [`DosGuard::reset`] is called after a cooldown.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosLimits {
    pub arp: u32,
    pub icmp: u32,
    pub tcp: u32,
    pub udp: u32,
}

impl Default for DosLimits {
    fn default() -> Self {
        Self {
            arp: 50,
            icmp: 100,
            tcp: 200,
            udp: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolBudget {
    pub count: u32,
    pub limit: u32,
    pub accepting: bool,
}

impl ProtocolBudget {
    fn new(limit: u32) -> Self {
        Self {
            count: 0,
            limit,
            accepting: limit > 0,
        }
    }

    /// Charges one packet. The call that brings the count to the limit already reports the
    /// protocol as closed; the counter never goes past the limit.
    fn charge(&mut self) -> bool {
        if self.count < self.limit {
            self.count += 1;
        }
        if self.count >= self.limit {
            self.accepting = false;
        }
        self.accepting
    }

    fn reset(&mut self) {
        *self = Self::new(self.limit);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Arp,
    Icmp,
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Arp => "ARP",
            Protocol::Icmp => "ICMP",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosGuard {
    arp: ProtocolBudget,
    icmp: ProtocolBudget,
    tcp: ProtocolBudget,
    udp: ProtocolBudget,
}

impl Default for DosGuard {
    fn default() -> Self {
        Self::new(DosLimits::default())
    }
}

impl DosGuard {
    pub fn new(limits: DosLimits) -> Self {
        Self {
            arp: ProtocolBudget::new(limits.arp),
            icmp: ProtocolBudget::new(limits.icmp),
            tcp: ProtocolBudget::new(limits.tcp),
            udp: ProtocolBudget::new(limits.udp),
        }
    }

    fn budget_mut(&mut self, protocol: Protocol) -> &mut ProtocolBudget {
        match protocol {
            Protocol::Arp => &mut self.arp,
            Protocol::Icmp => &mut self.icmp,
            Protocol::Tcp => &mut self.tcp,
            Protocol::Udp => &mut self.udp,
        }
    }

    pub fn budget(&self, protocol: Protocol) -> ProtocolBudget {
        match protocol {
            Protocol::Arp => self.arp,
            Protocol::Icmp => self.icmp,
            Protocol::Tcp => self.tcp,
            Protocol::Udp => self.udp,
        }
    }

    /// Charges one packet of `protocol`; returns whether that protocol is still accepted.
    pub fn check(&mut self, protocol: Protocol) -> bool {
        let budget = self.budget_mut(protocol);
        let was_accepting = budget.accepting;
        let accepting = budget.charge();
        if was_accepting && !accepting {
            tracing::warn!(%protocol, limit = budget.limit, "DoS limit reached");
        }
        accepting
    }

    pub fn check_arp(&mut self) -> bool {
        self.check(Protocol::Arp)
    }

    pub fn check_icmp(&mut self) -> bool {
        self.check(Protocol::Icmp)
    }

    pub fn check_tcp(&mut self) -> bool {
        self.check(Protocol::Tcp)
    }

    pub fn check_udp(&mut self) -> bool {
        self.check(Protocol::Udp)
    }

    pub fn overall_accepting(&self) -> bool {
        self.arp.accepting && self.icmp.accepting && self.tcp.accepting && self.udp.accepting
    }

    pub fn reset(&mut self) {
        self.arp.reset();
        self.icmp.reset();
        self.tcp.reset();
        self.udp.reset();
    }

    pub fn report(&self) -> DosReport {
        DosReport {
            arp: self.arp,
            icmp: self.icmp,
            tcp: self.tcp,
            udp: self.udp,
        }
    }
}

/// Snapshot of all four budgets. `Display` renders one line per protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosReport {
    pub arp: ProtocolBudget,
    pub icmp: ProtocolBudget,
    pub tcp: ProtocolBudget,
    pub udp: ProtocolBudget,
}

impl fmt::Display for DosReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            (Protocol::Arp, self.arp),
            (Protocol::Icmp, self.icmp),
            (Protocol::Tcp, self.tcp),
            (Protocol::Udp, self.udp),
        ];
        for (i, (protocol, budget)) in rows.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(
                f,
                "{protocol}: {} {}/{}",
                if budget.accepting { "accepting" } else { "blocked" },
                budget.count,
                budget.limit
            )?;
        }
        Ok(())
    }
}

use core::net::Ipv4Addr;
use core::str::FromStr;
use std::time::Duration;

use enclink_chip::{ChipConfig, Duplex};
use enclink_packet::MacAddr;

use crate::dos::DosLimits;

/// Upper bound on a single keepalive wait, whatever the caller asks for.
pub const MAX_KEEPALIVE_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Config {
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl Ipv4Config {
    /// Whether `ip` is on the directly attached subnet.
    pub fn is_local(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        u32::from(self.addr) & mask == u32::from(ip) & mask
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Without an address the stack still drains the chip but answers nothing.
    pub ipv4: Option<Ipv4Config>,
    pub dos: DosLimits,
    /// Received UDP payloads kept for the application; the oldest is dropped on overflow.
    pub udp_queue_capacity: usize,
    /// `None` keeps every learned mapping.
    pub arp_capacity: Option<usize>,
    /// Compute checksums on outbound UDP instead of sending the "no checksum" value.
    pub udp_tx_checksum: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            ipv4: None,
            dos: DosLimits::default(),
            udp_queue_capacity: 32,
            arp_capacity: None,
            udp_tx_checksum: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub server_ip: Ipv4Addr,
    pub server_port: u16,
    pub local_port: u16,
    /// Connection attempt budget, refilled whenever it runs out.
    pub retry_budget: u32,
    pub keepalive_timeout: Duration,
    /// Spacing between receive polls while waiting for a reply.
    pub poll_interval: Duration,
    /// Pause before each ARP attempt while connecting.
    pub attempt_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::new(192, 168, 1, 200),
            server_port: 5000,
            local_port: 6000,
            retry_budget: 10,
            keepalive_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            attempt_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}

/// Everything needed to bring a node up: chip, stack and session settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeConfig {
    pub chip: ChipConfig,
    pub stack: StackConfig,
    pub session: SessionConfig,
}

impl NodeConfig {
    /// Reads `ENCLINK_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`NodeConfig::from_env`], with variables supplied by `lookup`.
    ///
    /// Unset variables keep their defaults. IPv4 stays unconfigured unless `ENCLINK_IP` is set,
    /// in which case `ENCLINK_GATEWAY` becomes mandatory.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(mac) = parse::<MacAddr, _>(&lookup, "ENCLINK_MAC")? {
            cfg.chip.mac = mac.octets();
        }
        if let Some(full) = parse_bool(&lookup, "ENCLINK_FULL_DUPLEX")? {
            cfg.chip.duplex = if full { Duplex::Full } else { Duplex::Half };
        }

        if let Some(addr) = parse::<Ipv4Addr, _>(&lookup, "ENCLINK_IP")? {
            let netmask = parse(&lookup, "ENCLINK_NETMASK")?
                .unwrap_or(Ipv4Addr::new(255, 255, 255, 0));
            let gateway = parse(&lookup, "ENCLINK_GATEWAY")?
                .ok_or(ConfigError::MissingEnv("ENCLINK_GATEWAY"))?;
            cfg.stack.ipv4 = Some(Ipv4Config {
                addr,
                netmask,
                gateway,
            });
        }

        if let Some(raw) = lookup("ENCLINK_DOS_LIMITS") {
            cfg.stack.dos = parse_dos_limits(&raw)
                .ok_or(ConfigError::InvalidEnv("ENCLINK_DOS_LIMITS"))?;
        }
        if let Some(capacity) = parse(&lookup, "ENCLINK_UDP_QUEUE_CAPACITY")? {
            cfg.stack.udp_queue_capacity = capacity;
        }
        if let Some(capacity) = parse(&lookup, "ENCLINK_ARP_CAPACITY")? {
            cfg.stack.arp_capacity = Some(capacity);
        }

        if let Some(ip) = parse(&lookup, "ENCLINK_SERVER_IP")? {
            cfg.session.server_ip = ip;
        }
        if let Some(port) = parse(&lookup, "ENCLINK_SERVER_PORT")? {
            cfg.session.server_port = port;
        }
        if let Some(port) = parse(&lookup, "ENCLINK_LOCAL_PORT")? {
            cfg.session.local_port = port;
        }
        if let Some(budget) = parse(&lookup, "ENCLINK_RETRY_BUDGET")? {
            cfg.session.retry_budget = budget;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "ENCLINK_KEEPALIVE_TIMEOUT_SECS")? {
            cfg.session.keepalive_timeout = Duration::from_secs(secs).min(MAX_KEEPALIVE_WAIT);
        }

        Ok(cfg)
    }
}

fn parse<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(var)),
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).as_deref().map(str::trim) {
        None => Ok(None),
        Some("1" | "true" | "yes") => Ok(Some(true)),
        Some("0" | "false" | "no") => Ok(Some(false)),
        Some(_) => Err(ConfigError::InvalidEnv(var)),
    }
}

/// `arp,icmp,tcp,udp`
fn parse_dos_limits(raw: &str) -> Option<DosLimits> {
    let mut values = raw.split(',').map(|part| part.trim().parse::<u32>());
    let limits = DosLimits {
        arp: values.next()?.ok()?,
        icmp: values.next()?.ok()?,
        tcp: values.next()?.ok()?,
        udp: values.next()?.ok()?,
    };
    if values.next().is_some() {
        return None;
    }
    Some(limits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.chip.mac, enclink_chip::DEFAULT_MAC);
        assert_eq!(cfg.stack.ipv4, None);
        assert_eq!(cfg.stack.dos, DosLimits::default());
        assert_eq!(cfg.session.retry_budget, 10);
        assert_eq!(cfg.session.server_port, 5000);
        assert_eq!(cfg.session.local_port, 6000);
    }

    #[test]
    fn full_environment() {
        let cfg = config(&[
            ("ENCLINK_MAC", "02:00:00:aa:bb:cc"),
            ("ENCLINK_FULL_DUPLEX", "false"),
            ("ENCLINK_IP", "10.0.0.5"),
            ("ENCLINK_NETMASK", "255.255.0.0"),
            ("ENCLINK_GATEWAY", "10.0.0.1"),
            ("ENCLINK_DOS_LIMITS", "50, 90, 150, 150"),
            ("ENCLINK_SERVER_IP", "10.0.9.9"),
            ("ENCLINK_SERVER_PORT", "7000"),
            ("ENCLINK_LOCAL_PORT", "7001"),
            ("ENCLINK_RETRY_BUDGET", "4"),
            ("ENCLINK_KEEPALIVE_TIMEOUT_SECS", "60"),
            ("ENCLINK_ARP_CAPACITY", "16"),
        ])
        .unwrap();
        assert_eq!(cfg.chip.mac, [0x02, 0, 0, 0xaa, 0xbb, 0xcc]);
        assert_eq!(cfg.chip.duplex, Duplex::Half);
        assert_eq!(
            cfg.stack.ipv4,
            Some(Ipv4Config {
                addr: Ipv4Addr::new(10, 0, 0, 5),
                netmask: Ipv4Addr::new(255, 255, 0, 0),
                gateway: Ipv4Addr::new(10, 0, 0, 1),
            })
        );
        assert_eq!(
            cfg.stack.dos,
            DosLimits {
                arp: 50,
                icmp: 90,
                tcp: 150,
                udp: 150
            }
        );
        assert_eq!(cfg.stack.arp_capacity, Some(16));
        assert_eq!(cfg.session.server_ip, Ipv4Addr::new(10, 0, 9, 9));
        assert_eq!(cfg.session.server_port, 7000);
        assert_eq!(cfg.session.local_port, 7001);
        assert_eq!(cfg.session.retry_budget, 4);
        assert_eq!(cfg.session.keepalive_timeout, MAX_KEEPALIVE_WAIT);
    }

    #[test]
    fn address_requires_gateway() {
        assert_eq!(
            config(&[("ENCLINK_IP", "10.0.0.5")]),
            Err(ConfigError::MissingEnv("ENCLINK_GATEWAY"))
        );
    }

    #[test]
    fn invalid_values_name_the_variable() {
        assert_eq!(
            config(&[("ENCLINK_MAC", "not-a-mac")]),
            Err(ConfigError::InvalidEnv("ENCLINK_MAC"))
        );
        assert_eq!(
            config(&[("ENCLINK_DOS_LIMITS", "1,2,3")]),
            Err(ConfigError::InvalidEnv("ENCLINK_DOS_LIMITS"))
        );
        assert_eq!(
            config(&[("ENCLINK_DOS_LIMITS", "1,2,3,4,5")]),
            Err(ConfigError::InvalidEnv("ENCLINK_DOS_LIMITS"))
        );
        assert_eq!(
            config(&[("ENCLINK_SERVER_PORT", "70000")]),
            Err(ConfigError::InvalidEnv("ENCLINK_SERVER_PORT"))
        );
        assert_eq!(
            config(&[("ENCLINK_FULL_DUPLEX", "maybe")]),
            Err(ConfigError::InvalidEnv("ENCLINK_FULL_DUPLEX"))
        );
    }

    #[test]
    fn subnet_membership() {
        let ipv4 = Ipv4Config {
            addr: Ipv4Addr::new(192, 168, 1, 198),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
        };
        assert!(ipv4.is_local(Ipv4Addr::new(192, 168, 1, 200)));
        assert!(!ipv4.is_local(Ipv4Addr::new(192, 168, 2, 200)));
    }
}

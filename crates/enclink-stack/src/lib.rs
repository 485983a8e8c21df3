//! Minimal ARP/IPv4/ICMP/UDP networking over an ENC28J60, plus the session layer that keeps a
//! board talking to its companion UDP server.
//!
//! The layers are plain values owned by the caller: [`NetworkStack`] wraps the driver and is
//! driven by [`NetworkStack::poll`]; [`Session`] wraps the stack and is driven by
//! [`Session::tick`]. Nothing spawns threads or installs a logger.
#![forbid(unsafe_code)]

pub mod arp_table;
pub mod config;
pub mod dos;
pub mod event;
pub mod message;
pub mod session;
pub mod stack;

pub use arp_table::ArpTable;
pub use config::{ConfigError, Ipv4Config, NodeConfig, SessionConfig, StackConfig};
pub use dos::{DosGuard, DosLimits, DosReport, Protocol, ProtocolBudget};
pub use event::{EventSink, Priority, RecordedEvent, RecordingSink};
pub use message::{Message, MessageError, Reply, Request};
pub use session::{LinkState, Session, SessionError};
pub use stack::{Disposition, DropReason, NetworkStack, StackError, StackStats};

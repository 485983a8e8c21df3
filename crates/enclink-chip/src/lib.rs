//! SPI driver for the Microchip ENC28J60 10BASE-T Ethernet controller.
//!
//! [`Enc28j60`] owns the bus, tracks the selected register bank and walks the on-chip receive
//! ring. Platform glue plugs in through [`SpiBus`] and [`Delay`]; [`sim::SimulatedEnc28j60`]
//! implements the same bus against a software model of the chip.
#![forbid(unsafe_code)]

pub mod bus;
pub mod driver;
pub mod error;
pub mod regs;
pub mod sim;

pub use bus::{Delay, SpiBus, StdDelay};
pub use driver::{ChipConfig, Duplex, Enc28j60, DEFAULT_MAC, DEFAULT_PHY_POLL_LIMIT};
pub use error::{ChipError, InitError};
pub use regs::{ETH_RX_BUFFER_SIZE, ETH_TX_BUFFER_SIZE};

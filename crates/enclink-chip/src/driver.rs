use tracing::{debug, info, warn};

use crate::bus::{Delay, SpiBus};
use crate::error::{ChipError, InitError, Result};
use crate::regs::{
    self, opcode, Bank, Econ1, Econ2, Eie, Eir, Erxfcon, Macon1, Macon3, Macon4, Micmd, Mistat,
    Phcon1, Phcon2, Phie, Phstat2, PhyRegister, Register, RegisterPair, RxStatus,
};

/// Locally administered address used when the board has no EEPROM of its own.
pub const DEFAULT_MAC: [u8; 6] = [0x0e, 0x5f, 0x5f, 0x19, 0x98, 0x00];

pub const DEFAULT_PHY_POLL_LIMIT: u32 = 1_000;

/// The datasheet asks for at least 1 ms after a soft reset; some boards need longer before
/// CLKRDY settles.
const RESET_SETTLE_MS: u32 = 10;

/// One MII transaction takes 10.24 µs.
const PHY_POLL_INTERVAL_US: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    Half,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipConfig {
    pub mac: [u8; 6],
    pub duplex: Duplex,
    /// Accept multicast frames in addition to unicast and broadcast.
    pub multicast_rx: bool,
    /// Number of MISTAT.BUSY polls before a PHY access gives up.
    pub phy_poll_limit: u32,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            mac: DEFAULT_MAC,
            duplex: Duplex::Full,
            multicast_rx: false,
            phy_poll_limit: DEFAULT_PHY_POLL_LIMIT,
        }
    }
}

/// Driver for a Microchip ENC28J60 attached over SPI.
///
/// Holds the cached register bank and the receive ring cursor, so every access to the chip must
/// go through this value. Constructing it resets and configures the controller.
pub struct Enc28j60<B, D> {
    bus: B,
    delay: D,
    cfg: ChipConfig,
    /// `None` until the first switch after a reset, forcing an explicit select.
    bank: Option<Bank>,
    /// Start of the next unread frame in the receive ring.
    next_packet: u16,
    revision: u8,
}

impl<B: SpiBus, D: Delay> Enc28j60<B, D> {
    pub fn new(bus: B, delay: D, cfg: ChipConfig) -> std::result::Result<Self, InitError> {
        let mut nic = Self {
            bus,
            delay,
            cfg,
            bank: None,
            next_packet: regs::RX_BUFFER_START,
            revision: 0,
        };
        nic.init()?;
        Ok(nic)
    }

    /// Resets the controller and programs buffers, filters, MAC and PHY from the stored
    /// configuration. Pending receive state is discarded.
    pub fn init(&mut self) -> std::result::Result<(), InitError> {
        self.soft_reset();

        let revision = self.read_register(regs::EREVID);
        if revision == 0x00 || revision == 0xFF {
            return Err(InitError::ChipNotDetected { revision });
        }
        if revision != regs::EXPECTED_REVISION {
            warn!(revision, "unexpected ENC28J60 silicon revision");
        }
        self.revision = revision;

        // CLKOUT is not wired on any supported board.
        self.write_register(regs::ECOCON, 0);

        let mac = self.cfg.mac;
        for (reg, octet) in regs::MAADR.into_iter().zip(mac) {
            self.write_register(reg, octet);
        }

        self.next_packet = regs::RX_BUFFER_START;
        self.write_register_pair(regs::ERXST, regs::RX_BUFFER_START);
        self.write_register_pair(regs::ERXND, regs::RX_BUFFER_STOP);
        self.write_register_pair(regs::ERXRDPT, regs::RX_BUFFER_STOP);

        let mut filters = Erxfcon::UCEN | Erxfcon::CRCEN | Erxfcon::HTEN | Erxfcon::BCEN;
        if self.cfg.multicast_rx {
            filters |= Erxfcon::MCEN;
        }
        self.write_register(regs::ERXFCON, filters.bits());
        for reg in regs::EHT {
            self.write_register(reg, 0);
        }

        let full_duplex = self.cfg.duplex == Duplex::Full;
        self.write_register(regs::MACON2, 0);
        self.write_register(
            regs::MACON1,
            (Macon1::TXPAUS | Macon1::RXPAUS | Macon1::MARXEN).bits(),
        );
        let mut macon3 = Macon3::PADCFG_AUTO | Macon3::TXCRCEN | Macon3::FRMLNEN;
        if full_duplex {
            macon3 |= Macon3::FULDPX;
        }
        self.write_register(regs::MACON3, macon3.bits());
        self.write_register(regs::MACON4, Macon4::DEFER.bits());
        self.write_register_pair(regs::MAMXFL, regs::MAX_FRAME_LEN);
        self.write_register(
            regs::MABBIPG,
            if full_duplex {
                regs::MABBIPG_FULL_DUPLEX
            } else {
                regs::MABBIPG_HALF_DUPLEX
            },
        );
        self.write_register(regs::MAIPGL, regs::MAIPGL_DEFAULT);
        self.write_register(regs::MAIPGH, regs::MAIPGH_DEFAULT);
        self.write_register(regs::MACLCON2, regs::MACLCON2_COLLISION_WINDOW);

        let phcon1 = if full_duplex {
            Phcon1::PDPXMD
        } else {
            Phcon1::empty()
        };
        self.write_phy(PhyRegister::PHCON1, phcon1.bits())?;
        self.write_phy(PhyRegister::PHCON2, Phcon2::HDLDIS.bits())?;

        self.write_register(regs::EIR, 0);
        self.write_register(regs::EIE, (Eie::INTIE | Eie::PKTIE | Eie::LINKIE).bits());
        self.write_phy(PhyRegister::PHIE, (Phie::PLNKIE | Phie::PGEIE).bits())?;

        self.set_bits(regs::ECON1, Econ1::RXEN.bits());

        info!(
            revision,
            mac = %format_mac(&mac),
            full_duplex,
            "ENC28J60 initialised"
        );
        Ok(())
    }

    pub fn soft_reset(&mut self) {
        self.bus.select();
        self.bus.write(&[opcode::SYSTEM_RESET]);
        self.bus.deselect();
        self.bank = None;
        self.delay.delay_ms(RESET_SETTLE_MS);
    }

    fn select_bank(&mut self, reg: Register) {
        if reg.is_common() || self.bank == Some(reg.bank) {
            return;
        }
        let bsel0 = Econ1::BSEL0.bits();
        let bsel1 = Econ1::BSEL1.bits();
        let econ1 = regs::ECON1.offset;
        match reg.bank {
            Bank::Bank0 => self.command(opcode::BIT_FIELD_CLEAR, econ1, bsel1 | bsel0),
            Bank::Bank1 => {
                self.command(opcode::BIT_FIELD_SET, econ1, bsel0);
                self.command(opcode::BIT_FIELD_CLEAR, econ1, bsel1);
            }
            Bank::Bank2 => {
                self.command(opcode::BIT_FIELD_CLEAR, econ1, bsel0);
                self.command(opcode::BIT_FIELD_SET, econ1, bsel1);
            }
            Bank::Bank3 => self.command(opcode::BIT_FIELD_SET, econ1, bsel1 | bsel0),
        }
        self.bank = Some(reg.bank);
    }

    fn command(&mut self, op: u8, address: u8, data: u8) {
        self.bus.select();
        self.bus.write(&[op | (address & opcode::ADDRESS_MASK), data]);
        self.bus.deselect();
    }

    pub fn read_register(&mut self, reg: Register) -> u8 {
        self.select_bank(reg);
        let mut buf = [opcode::READ_CONTROL_REGISTER | reg.offset, 0, 0];
        let len = if reg.has_dummy_byte() { 3 } else { 2 };
        self.bus.select();
        self.bus.transfer(&mut buf[..len]);
        self.bus.deselect();
        buf[len - 1]
    }

    pub fn write_register(&mut self, reg: Register, value: u8) {
        self.select_bank(reg);
        self.command(opcode::WRITE_CONTROL_REGISTER, reg.offset, value);
        if reg == regs::ECON1 {
            self.bank = Some(Bank::from_bits(value));
        }
    }

    /// Low byte first; the chip latches pointer pairs on the high-byte write.
    pub fn write_register_pair(&mut self, pair: RegisterPair, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_register(pair.low, low);
        self.write_register(pair.high, high);
    }

    pub fn read_register_pair(&mut self, pair: RegisterPair) -> u16 {
        let low = self.read_register(pair.low);
        let high = self.read_register(pair.high);
        u16::from_le_bytes([low, high])
    }

    /// Atomic OR into an ETH register. MAC and MII registers do not support bit-field commands.
    pub fn set_bits(&mut self, reg: Register, mask: u8) {
        debug_assert!(!reg.has_dummy_byte(), "bit-field set on {reg:?}");
        self.select_bank(reg);
        self.command(opcode::BIT_FIELD_SET, reg.offset, mask);
        if reg == regs::ECON1 && mask & (Econ1::BSEL0 | Econ1::BSEL1).bits() != 0 {
            self.bank = None;
        }
    }

    pub fn clear_bits(&mut self, reg: Register, mask: u8) {
        debug_assert!(!reg.has_dummy_byte(), "bit-field clear on {reg:?}");
        self.select_bank(reg);
        self.command(opcode::BIT_FIELD_CLEAR, reg.offset, mask);
        if reg == regs::ECON1 && mask & (Econ1::BSEL0 | Econ1::BSEL1).bits() != 0 {
            self.bank = None;
        }
    }

    fn wait_phy_idle(&mut self) -> Result<()> {
        let polls = self.cfg.phy_poll_limit;
        for _ in 0..polls {
            let status = Mistat::from_bits_retain(self.read_register(regs::MISTAT));
            if !status.contains(Mistat::BUSY) {
                return Ok(());
            }
            self.delay.delay_us(PHY_POLL_INTERVAL_US);
        }
        warn!(polls, "MII interface stayed busy");
        Err(ChipError::PhyBusyTimeout { polls })
    }

    pub fn read_phy(&mut self, reg: PhyRegister) -> Result<u16> {
        self.write_register(regs::MIREGADR, reg.0);
        self.write_register(regs::MICMD, Micmd::MIIRD.bits());
        let waited = self.wait_phy_idle();
        self.write_register(regs::MICMD, 0);
        waited?;
        let low = self.read_register(regs::MIRDL);
        let high = self.read_register(regs::MIRDH);
        Ok(u16::from_le_bytes([low, high]))
    }

    pub fn write_phy(&mut self, reg: PhyRegister, value: u16) -> Result<()> {
        let [low, high] = value.to_le_bytes();
        self.write_register(regs::MIREGADR, reg.0);
        self.write_register(regs::MIWRL, low);
        self.write_register(regs::MIWRH, high);
        self.wait_phy_idle()
    }

    pub fn is_link_up(&mut self) -> Result<bool> {
        let status = Phstat2::from_bits_retain(self.read_phy(PhyRegister::PHSTAT2)?);
        Ok(status.contains(Phstat2::LSTAT))
    }

    /// Acknowledges a pending link-change interrupt and returns the new link state, or `None`
    /// when the link has not changed since the last call.
    pub fn link_state_changed(&mut self) -> Result<Option<bool>> {
        let eir = Eir::from_bits_retain(self.read_register(regs::EIR));
        if !eir.contains(Eir::LINKIF) {
            return Ok(None);
        }
        // Reading PHIR clears the PHY side of the interrupt.
        self.read_phy(PhyRegister::PHIR)?;
        self.clear_bits(regs::EIR, Eir::LINKIF.bits());
        let up = self.is_link_up()?;
        info!(up, "link state changed");
        Ok(Some(up))
    }

    pub fn pending_packet_count(&mut self) -> u8 {
        self.read_register(regs::EPKTCNT)
    }

    fn read_buffer(&mut self, buf: &mut [u8]) {
        self.bus.select();
        self.bus.write(&[opcode::READ_BUFFER_MEMORY]);
        self.bus.read(buf);
        self.bus.deselect();
    }

    /// Transmits one frame assembled from `segments` in order.
    ///
    /// The per-packet control byte goes at the start of the transmit area and the frame follows
    /// it, so the end pointer is `start + 1 + len - 1`.
    pub fn send_frame(&mut self, segments: &[&[u8]]) -> Result<usize> {
        let len: usize = segments.iter().map(|segment| segment.len()).sum();
        if len > regs::ETH_TX_BUFFER_SIZE {
            return Err(ChipError::MessageTooLarge {
                len,
                max: regs::ETH_TX_BUFFER_SIZE,
            });
        }
        if !self.is_link_up()? {
            return Err(ChipError::LinkDown);
        }

        // Errata: reset the transmit logic before every send.
        self.set_bits(regs::ECON1, Econ1::TXRST.bits());
        self.clear_bits(regs::ECON1, Econ1::TXRST.bits());
        self.clear_bits(regs::EIR, (Eir::TXERIF | Eir::TXIF).bits());

        self.write_register_pair(regs::ETXST, regs::TX_BUFFER_START);
        self.write_register_pair(regs::EWRPT, regs::TX_BUFFER_START);

        self.bus.select();
        self.bus.write(&[opcode::WRITE_BUFFER_MEMORY, 0x00]);
        for segment in segments {
            self.bus.write(segment);
        }
        self.bus.deselect();

        self.write_register_pair(regs::ETXND, regs::TX_BUFFER_START + len as u16);
        self.set_bits(regs::ECON1, Econ1::TXRTS.bits());
        debug!(len, "frame queued for transmit");
        Ok(len)
    }

    /// Copies the next received frame into `buf`, returning its length, or `Ok(0)` when the ring
    /// is empty. Frames longer than `buf` are truncated. The ring slot is released either way.
    pub fn receive_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending_packet_count() == 0 {
            return Ok(0);
        }

        self.write_register_pair(regs::ERDPT, self.next_packet);
        let mut header = [0u8; regs::RX_HEADER_LEN];
        self.read_buffer(&mut header);
        let next = u16::from_le_bytes([header[0], header[1]]);
        let byte_count = u16::from_le_bytes([header[2], header[3]]) as usize;
        let status = RxStatus::from_bits_retain(u16::from_le_bytes([header[4], header[5]]));

        let received = if status.contains(RxStatus::RECEIVED_OK) {
            let len = byte_count.min(regs::ETH_RX_BUFFER_SIZE).min(buf.len());
            self.read_buffer(&mut buf[..len]);
            debug!(len, next, "frame received");
            Ok(len)
        } else {
            warn!(status = status.bits(), "receive error");
            Err(ChipError::UnspecifiedReceive {
                status: status.bits(),
            })
        };

        self.next_packet = next;
        let read_pointer = if next == regs::RX_BUFFER_START {
            regs::RX_BUFFER_STOP
        } else {
            next - 1
        };
        self.write_register_pair(regs::ERXRDPT, read_pointer);
        self.set_bits(regs::ECON2, Econ2::PKTDEC.bits());
        received
    }

    pub fn mac_address(&self) -> [u8; 6] {
        self.cfg.mac
    }

    pub fn config(&self) -> &ChipConfig {
        &self.cfg
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn current_bank(&self) -> Option<Bank> {
        self.bank
    }

    pub fn next_packet_pointer(&self) -> u16 {
        self.next_packet
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }
}

fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|octet| format!("{octet:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

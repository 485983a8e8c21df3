//! Register-level software model of the ENC28J60.
//!
//! Speaks the same SPI opcode protocol as the silicon, so the driver can be exercised end to end
//! on a host: bank switching through ECON1, buffer memory with auto-incrementing pointers and
//! receive-ring wraparound, MII indirect PHY access (with a configurable number of busy polls),
//! EPKTCNT/PKTDEC bookkeeping and TXRTS frame capture. Timing, collisions and the DMA engine are
//! not modelled.

use crate::bus::{Delay, SpiBus};
use crate::regs::{
    self, opcode, Bank, Econ1, Econ2, Eir, Estat, Micmd, Mistat, Phir, Phstat2, PhyRegister,
    Register, RegisterPair, RxStatus,
};

/// Frame check sequence the MAC leaves at the end of every received frame.
const CRC_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Waiting for the opcode byte after chip-select.
    Opcode,
    ReadControl { address: u8, latched: Option<u8> },
    WriteControl { address: u8 },
    BitFieldSet { address: u8 },
    BitFieldClear { address: u8 },
    ReadBuffer,
    WriteBuffer,
    /// Command finished; further bytes in this chip-select frame are ignored.
    Complete,
}

#[derive(Debug, Clone)]
pub struct SimulatedEnc28j60 {
    /// Offsets `0x1B..` of bank 0 hold the registers shared by every bank.
    banks: [[u8; 32]; 4],
    phy: [u16; 32],
    memory: Vec<u8>,
    revision: u8,
    mii_busy_polls: u32,
    mii_busy_remaining: u32,
    mii_stuck: bool,
    command: Command,
    selected: bool,
    current: Vec<u8>,
    transactions: Vec<Vec<u8>>,
    transmitted: Vec<Vec<u8>>,
    rx_write: u16,
    resets: usize,
}

impl Default for SimulatedEnc28j60 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEnc28j60 {
    pub fn new() -> Self {
        let mut chip = Self {
            banks: [[0; 32]; 4],
            phy: [0; 32],
            memory: vec![0; regs::BUFFER_MEMORY_SIZE],
            revision: regs::EXPECTED_REVISION,
            mii_busy_polls: 1,
            mii_busy_remaining: 0,
            mii_stuck: false,
            command: Command::Opcode,
            selected: false,
            current: Vec::new(),
            transactions: Vec::new(),
            transmitted: Vec::new(),
            rx_write: regs::RX_BUFFER_START,
            resets: 0,
        };
        chip.phy[PhyRegister::PHID1.0 as usize] = 0x0083;
        chip.phy[PhyRegister::PHID2.0 as usize] = 0x1400;
        chip.phy[PhyRegister::PHSTAT2.0 as usize] = Phstat2::LSTAT.bits();
        chip.power_on_registers();
        chip
    }

    /// Model answering with a different silicon revision, e.g. `0x00` for an absent chip.
    pub fn with_revision(revision: u8) -> Self {
        let mut chip = Self::new();
        chip.revision = revision;
        chip
    }

    fn power_on_registers(&mut self) {
        self.banks = [[0; 32]; 4];
        self.set_pair_raw(regs::ERXST, 0x05FA);
        self.set_pair_raw(regs::ERXND, 0x1FFF);
        self.set_pair_raw(regs::ERXRDPT, 0x05FA);
        self.banks[0][regs::ESTAT.offset as usize] = Estat::CLKRDY.bits();
        self.rx_write = regs::RX_BUFFER_START;
        self.mii_busy_remaining = 0;
    }

    fn slot(&self, address: u8) -> (usize, usize) {
        let address = (address & opcode::ADDRESS_MASK) as usize;
        if address >= Register::COMMON_BASE as usize {
            (0, address)
        } else {
            (self.active_bank() as usize, address)
        }
    }

    fn active_bank(&self) -> Bank {
        Bank::from_bits(self.banks[0][regs::ECON1.offset as usize])
    }

    fn is(&self, address: u8, reg: Register) -> bool {
        address == reg.offset && (reg.is_common() || self.active_bank() == reg.bank)
    }

    fn read_control(&mut self, address: u8) -> u8 {
        if self.is(address, regs::MISTAT) {
            if self.mii_stuck {
                return Mistat::BUSY.bits();
            }
            if self.mii_busy_remaining > 0 {
                self.mii_busy_remaining -= 1;
                return Mistat::BUSY.bits();
            }
            return 0;
        }
        if self.is(address, regs::EREVID) {
            return self.revision;
        }
        let (bank, offset) = self.slot(address);
        self.banks[bank][offset]
    }

    fn write_control(&mut self, address: u8, value: u8) {
        if self.is(address, regs::EREVID) || self.is(address, regs::EPKTCNT) {
            return;
        }
        if self.is(address, regs::ECON1) {
            self.write_econ1(value);
            return;
        }
        if self.is(address, regs::ECON2) {
            let econ2 = Econ2::from_bits_retain(value);
            if econ2.contains(Econ2::PKTDEC) {
                let count = &mut self.banks[1][regs::EPKTCNT.offset as usize];
                *count = count.saturating_sub(1);
            }
            self.banks[0][address as usize] = (econ2 - Econ2::PKTDEC).bits();
            return;
        }

        let (bank, offset) = self.slot(address);
        self.banks[bank][offset] = value;

        if self.is(address, regs::MICMD) && Micmd::from_bits_retain(value).contains(Micmd::MIIRD) {
            let reg = self.banks[2][regs::MIREGADR.offset as usize] & 0x1F;
            let [low, high] = self.phy[reg as usize].to_le_bytes();
            self.banks[2][regs::MIRDL.offset as usize] = low;
            self.banks[2][regs::MIRDH.offset as usize] = high;
            if reg == PhyRegister::PHIR.0 {
                self.phy[reg as usize] = 0;
            }
            self.mii_busy_remaining = self.mii_busy_polls;
        } else if self.is(address, regs::MIWRH) {
            let reg = self.banks[2][regs::MIREGADR.offset as usize] & 0x1F;
            let low = self.banks[2][regs::MIWRL.offset as usize];
            if reg != PhyRegister::PHSTAT1.0 && reg != PhyRegister::PHSTAT2.0 {
                self.phy[reg as usize] = u16::from_le_bytes([low, value]);
            }
            self.mii_busy_remaining = self.mii_busy_polls;
        }
    }

    fn write_econ1(&mut self, value: u8) {
        let econ1 = Econ1::from_bits_retain(value);
        self.banks[0][regs::ECON1.offset as usize] = (econ1 - Econ1::TXRTS).bits();
        if econ1.contains(Econ1::TXRTS) {
            let start = self.pair_raw(regs::ETXST) as usize;
            let end = self.pair_raw(regs::ETXND) as usize;
            // Byte at ETXST is the per-packet control byte.
            let frame = if end > start && end < self.memory.len() {
                self.memory[start + 1..=end].to_vec()
            } else {
                Vec::new()
            };
            self.transmitted.push(frame);
            self.banks[0][regs::EIR.offset as usize] |= Eir::TXIF.bits();
        }
    }

    fn pair_raw(&self, pair: RegisterPair) -> u16 {
        let bank = pair.low.bank as usize;
        u16::from_le_bytes([
            self.banks[bank][pair.low.offset as usize],
            self.banks[bank][pair.high.offset as usize],
        ])
    }

    fn set_pair_raw(&mut self, pair: RegisterPair, value: u16) {
        let bank = pair.low.bank as usize;
        let [low, high] = value.to_le_bytes();
        self.banks[bank][pair.low.offset as usize] = low;
        self.banks[bank][pair.high.offset as usize] = high;
    }

    fn ring_advance(&self, pointer: u16) -> u16 {
        if pointer == self.pair_raw(regs::ERXND) {
            self.pair_raw(regs::ERXST)
        } else {
            (pointer + 1) & (regs::BUFFER_MEMORY_SIZE as u16 - 1)
        }
    }

    fn reset(&mut self) {
        self.power_on_registers();
        self.resets += 1;
    }

    fn clock(&mut self, mosi: u8) -> u8 {
        match self.command {
            Command::Opcode => {
                if mosi == opcode::SYSTEM_RESET {
                    self.reset();
                    self.command = Command::Complete;
                    return 0;
                }
                let address = mosi & opcode::ADDRESS_MASK;
                self.command = match mosi & opcode::OPCODE_MASK {
                    opcode::READ_CONTROL_REGISTER => Command::ReadControl {
                        address,
                        latched: None,
                    },
                    opcode::WRITE_CONTROL_REGISTER => Command::WriteControl { address },
                    opcode::BIT_FIELD_SET => Command::BitFieldSet { address },
                    opcode::BIT_FIELD_CLEAR => Command::BitFieldClear { address },
                    _ if mosi == opcode::READ_BUFFER_MEMORY => Command::ReadBuffer,
                    _ if mosi == opcode::WRITE_BUFFER_MEMORY => Command::WriteBuffer,
                    _ => Command::Complete,
                };
                0
            }
            Command::ReadControl { address, latched } => {
                // MAC/MII reads clock out a dummy byte first; both bytes carry the value here.
                let value = match latched {
                    Some(value) => value,
                    None => self.read_control(address),
                };
                self.command = Command::ReadControl {
                    address,
                    latched: Some(value),
                };
                value
            }
            Command::WriteControl { address } => {
                self.write_control(address, mosi);
                self.command = Command::Complete;
                0
            }
            Command::BitFieldSet { address } => {
                let (bank, offset) = self.slot(address);
                let value = self.banks[bank][offset] | mosi;
                self.write_control(address, value);
                self.command = Command::Complete;
                0
            }
            Command::BitFieldClear { address } => {
                let (bank, offset) = self.slot(address);
                let value = self.banks[bank][offset] & !mosi;
                self.write_control(address, value);
                self.command = Command::Complete;
                0
            }
            Command::ReadBuffer => {
                let pointer = self.pair_raw(regs::ERDPT);
                let value = self.memory[pointer as usize];
                let next = self.ring_advance(pointer);
                self.set_pair_raw(regs::ERDPT, next);
                value
            }
            Command::WriteBuffer => {
                let pointer = self.pair_raw(regs::EWRPT);
                self.memory[pointer as usize] = mosi;
                let next = (pointer + 1) & (regs::BUFFER_MEMORY_SIZE as u16 - 1);
                self.set_pair_raw(regs::EWRPT, next);
                0
            }
            Command::Complete => 0,
        }
    }

    /// Places `frame` in the receive ring as if it had arrived with status
    /// [`RxStatus::RECEIVED_OK`]. Returns the next-packet pointer written into its header.
    pub fn inject_frame(&mut self, frame: &[u8]) -> u16 {
        self.inject_frame_with_status(frame, RxStatus::RECEIVED_OK)
    }

    /// Writes header, frame and a zeroed FCS at the hardware write pointer, wrapping at ERXND,
    /// and bumps EPKTCNT. The next frame starts on an even address.
    pub fn inject_frame_with_status(&mut self, frame: &[u8], status: RxStatus) -> u16 {
        let byte_count = frame.len() + CRC_LEN;
        let total = regs::RX_HEADER_LEN + byte_count;

        let mut next = self.rx_write;
        for _ in 0..total {
            next = self.ring_advance(next);
        }
        if next % 2 == 1 {
            next = self.ring_advance(next);
        }

        let mut header = [0u8; regs::RX_HEADER_LEN];
        header[0..2].copy_from_slice(&next.to_le_bytes());
        header[2..4].copy_from_slice(&(byte_count as u16).to_le_bytes());
        header[4..6].copy_from_slice(&status.bits().to_le_bytes());

        let mut pointer = self.rx_write;
        for &byte in header.iter().chain(frame).chain(&[0u8; CRC_LEN]) {
            self.memory[pointer as usize] = byte;
            pointer = self.ring_advance(pointer);
        }

        self.rx_write = next;
        let count = &mut self.banks[1][regs::EPKTCNT.offset as usize];
        *count = count.saturating_add(1);
        self.banks[0][regs::EIR.offset as usize] |= Eir::PKTIF.bits();
        next
    }

    pub fn set_rx_write_pointer(&mut self, pointer: u16) {
        self.rx_write = pointer;
    }

    pub fn rx_write_pointer(&self) -> u16 {
        self.rx_write
    }

    /// Changes the PHY link status and raises the link-change interrupt.
    pub fn set_link_up(&mut self, up: bool) {
        let status = &mut self.phy[PhyRegister::PHSTAT2.0 as usize];
        if up {
            *status |= Phstat2::LSTAT.bits();
        } else {
            *status &= !Phstat2::LSTAT.bits();
        }
        self.phy[PhyRegister::PHIR.0 as usize] |= (Phir::PLNKIF | Phir::PGIF).bits();
        self.banks[0][regs::EIR.offset as usize] |= Eir::LINKIF.bits();
    }

    /// Number of BUSY answers MISTAT gives after each MII command.
    pub fn set_mii_busy_polls(&mut self, polls: u32) {
        self.mii_busy_polls = polls;
    }

    /// MISTAT.BUSY never clears.
    pub fn set_mii_stuck(&mut self, stuck: bool) {
        self.mii_stuck = stuck;
    }

    /// Raw register contents, without read side effects.
    pub fn register(&self, reg: Register) -> u8 {
        let bank = if reg.is_common() { 0 } else { reg.bank as usize };
        self.banks[bank][reg.offset as usize]
    }

    pub fn register_pair(&self, pair: RegisterPair) -> u16 {
        self.pair_raw(pair)
    }

    pub fn phy_register(&self, reg: PhyRegister) -> u16 {
        self.phy[reg.0 as usize]
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn packet_count(&self) -> u8 {
        self.banks[1][regs::EPKTCNT.offset as usize]
    }

    /// MOSI bytes of every completed chip-select frame, oldest first.
    pub fn transactions(&self) -> &[Vec<u8>] {
        &self.transactions
    }

    pub fn clear_transactions(&mut self) {
        self.transactions.clear();
    }

    pub fn transmitted_frames(&self) -> &[Vec<u8>] {
        &self.transmitted
    }

    pub fn take_transmitted(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.transmitted)
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }
}

impl SpiBus for SimulatedEnc28j60 {
    fn select(&mut self) {
        self.selected = true;
        self.command = Command::Opcode;
        self.current.clear();
    }

    fn deselect(&mut self) {
        if self.selected && !self.current.is_empty() {
            self.transactions.push(std::mem::take(&mut self.current));
        }
        self.selected = false;
        self.command = Command::Opcode;
    }

    fn transfer(&mut self, buf: &mut [u8]) {
        if !self.selected {
            buf.fill(0xFF);
            return;
        }
        for byte in buf.iter_mut() {
            self.current.push(*byte);
            *byte = self.clock(*byte);
        }
    }
}

/// Delay source that returns immediately and keeps a running total.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstantDelay {
    elapsed_us: u64,
}

impl InstantDelay {
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_us / 1_000
    }
}

impl Delay for InstantDelay {
    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += us as u64;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_us += ms as u64 * 1_000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spi(chip: &mut SimulatedEnc28j60, bytes: &[u8]) -> Vec<u8> {
        let mut buf = bytes.to_vec();
        chip.select();
        chip.transfer(&mut buf);
        chip.deselect();
        buf
    }

    #[test]
    fn bank_switch_changes_register_window() {
        let mut chip = SimulatedEnc28j60::new();
        // Bank 3, read EREVID.
        spi(&mut chip, &[opcode::BIT_FIELD_SET | 0x1F, 0x03]);
        assert_eq!(spi(&mut chip, &[0x12, 0])[1], regs::EXPECTED_REVISION);
        // Same offset in bank 0 is EDMANDL, plain storage.
        spi(&mut chip, &[opcode::BIT_FIELD_CLEAR | 0x1F, 0x03]);
        assert_eq!(spi(&mut chip, &[0x12, 0])[1], 0);
    }

    #[test]
    fn reset_restores_power_on_state() {
        let mut chip = SimulatedEnc28j60::new();
        spi(&mut chip, &[opcode::WRITE_CONTROL_REGISTER | 0x08, 0x00]);
        spi(&mut chip, &[opcode::SYSTEM_RESET]);
        assert_eq!(chip.register_pair(regs::ERXST), 0x05FA);
        assert_eq!(chip.reset_count(), 1);
        assert_eq!(chip.transactions().len(), 2);
    }

    #[test]
    fn injected_frame_lands_with_header() {
        let mut chip = SimulatedEnc28j60::new();
        chip.set_pair_raw(regs::ERXST, regs::RX_BUFFER_START);
        chip.set_pair_raw(regs::ERXND, regs::RX_BUFFER_STOP);
        let next = chip.inject_frame(&[0xAA; 15]);
        // 6 header + 15 frame + 4 FCS = 25, rounded up to even.
        assert_eq!(next, 26);
        assert_eq!(&chip.memory()[0..6], &[26, 0, 19, 0, 0x80, 0x00]);
        assert_eq!(chip.packet_count(), 1);
    }

    #[test]
    fn instant_delay_accumulates() {
        let mut delay = InstantDelay::default();
        delay.delay_ms(2);
        delay.delay_us(500);
        assert_eq!(delay.elapsed_us(), 2_500);
        assert_eq!(delay.elapsed_ms(), 2);
    }
}

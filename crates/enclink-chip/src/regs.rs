//! ENC28J60 register map, SPI opcodes and buffer layout.
//!
//! Control registers live in four banks of 32 addresses. Offsets `0x1B..=0x1F` (EIE, EIR, ESTAT,
//! ECON2, ECON1) are mirrored in every bank, so touching them never requires a bank switch. PHY
//! registers are not on the SPI bus at all; they are reached indirectly through the MII
//! registers and are modelled by [`PhyRegister`].

use bitflags::bitflags;

/// SPI opcodes. The low 5 bits of the first byte carry the register address for the
/// register-oriented commands.
pub mod opcode {
    pub const READ_CONTROL_REGISTER: u8 = 0x00;
    pub const READ_BUFFER_MEMORY: u8 = 0x3A;
    pub const WRITE_CONTROL_REGISTER: u8 = 0x40;
    pub const WRITE_BUFFER_MEMORY: u8 = 0x7A;
    pub const BIT_FIELD_SET: u8 = 0x80;
    pub const BIT_FIELD_CLEAR: u8 = 0xA0;
    pub const SYSTEM_RESET: u8 = 0xFF;

    pub const OPCODE_MASK: u8 = 0xE0;
    pub const ADDRESS_MASK: u8 = 0x1F;
}

/// 8 KiB of on-chip buffer memory, split into a receive ring and a transmit area.
pub const BUFFER_MEMORY_SIZE: usize = 0x2000;
pub const RX_BUFFER_START: u16 = 0x0000;
pub const RX_BUFFER_STOP: u16 = 0x17FF;
pub const TX_BUFFER_START: u16 = 0x1800;
pub const TX_BUFFER_STOP: u16 = 0x1FFF;

pub const ETH_RX_BUFFER_SIZE: usize = 1536;
pub const ETH_TX_BUFFER_SIZE: usize = 1536;
pub const MAX_FRAME_LEN: u16 = 1536;

/// Silicon revision B7, the only one this driver has been brought up on.
pub const EXPECTED_REVISION: u8 = 0x06;

/// Bytes in the receive status vector that precedes every frame in the ring.
pub const RX_HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    Bank0 = 0,
    Bank1 = 1,
    Bank2 = 2,
    Bank3 = 3,
}

impl Bank {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Bank::Bank0,
            1 => Bank::Bank1,
            2 => Bank::Bank2,
            _ => Bank::Bank3,
        }
    }
}

/// Which read framing a register needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegSpace {
    /// ETH registers answer on the byte right after the opcode.
    Eth,
    /// MAC and MII registers shift out a dummy byte before the data byte.
    Mac,
    Mii,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub space: RegSpace,
    pub bank: Bank,
    pub offset: u8,
}

impl Register {
    /// First offset of the registers shared by all banks.
    pub const COMMON_BASE: u8 = 0x1B;

    const fn new(space: RegSpace, bank: Bank, offset: u8) -> Self {
        Self {
            space,
            bank,
            offset,
        }
    }

    pub const fn is_common(&self) -> bool {
        self.offset >= Self::COMMON_BASE
    }

    pub const fn has_dummy_byte(&self) -> bool {
        !matches!(self.space, RegSpace::Eth)
    }
}

/// Little-endian register pair (`xxxL`/`xxxH`) holding a buffer pointer or a 16-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterPair {
    pub low: Register,
    pub high: Register,
}

const fn eth(bank: Bank, offset: u8) -> Register {
    Register::new(RegSpace::Eth, bank, offset)
}

const fn mac(bank: Bank, offset: u8) -> Register {
    Register::new(RegSpace::Mac, bank, offset)
}

const fn mii(bank: Bank, offset: u8) -> Register {
    Register::new(RegSpace::Mii, bank, offset)
}

const fn eth_pair(bank: Bank, low: u8) -> RegisterPair {
    RegisterPair {
        low: eth(bank, low),
        high: eth(bank, low + 1),
    }
}

// Bank 0: buffer pointers.
pub const ERDPT: RegisterPair = eth_pair(Bank::Bank0, 0x00);
pub const EWRPT: RegisterPair = eth_pair(Bank::Bank0, 0x02);
pub const ETXST: RegisterPair = eth_pair(Bank::Bank0, 0x04);
pub const ETXND: RegisterPair = eth_pair(Bank::Bank0, 0x06);
pub const ERXST: RegisterPair = eth_pair(Bank::Bank0, 0x08);
pub const ERXND: RegisterPair = eth_pair(Bank::Bank0, 0x0A);
pub const ERXRDPT: RegisterPair = eth_pair(Bank::Bank0, 0x0C);
pub const ERXWRPT: RegisterPair = eth_pair(Bank::Bank0, 0x0E);
pub const EDMAST: RegisterPair = eth_pair(Bank::Bank0, 0x10);
pub const EDMAND: RegisterPair = eth_pair(Bank::Bank0, 0x12);
pub const EDMADST: RegisterPair = eth_pair(Bank::Bank0, 0x14);
pub const EDMACS: RegisterPair = eth_pair(Bank::Bank0, 0x16);

// Common to every bank.
pub const EIE: Register = eth(Bank::Bank0, 0x1B);
pub const EIR: Register = eth(Bank::Bank0, 0x1C);
pub const ESTAT: Register = eth(Bank::Bank0, 0x1D);
pub const ECON2: Register = eth(Bank::Bank0, 0x1E);
pub const ECON1: Register = eth(Bank::Bank0, 0x1F);

// Bank 1: receive filters.
pub const EHT: [Register; 8] = [
    eth(Bank::Bank1, 0x00),
    eth(Bank::Bank1, 0x01),
    eth(Bank::Bank1, 0x02),
    eth(Bank::Bank1, 0x03),
    eth(Bank::Bank1, 0x04),
    eth(Bank::Bank1, 0x05),
    eth(Bank::Bank1, 0x06),
    eth(Bank::Bank1, 0x07),
];
pub const EPMCS: RegisterPair = eth_pair(Bank::Bank1, 0x10);
pub const EPMO: RegisterPair = eth_pair(Bank::Bank1, 0x14);
pub const EWOLIE: Register = eth(Bank::Bank1, 0x16);
pub const EWOLIR: Register = eth(Bank::Bank1, 0x17);
pub const ERXFCON: Register = eth(Bank::Bank1, 0x18);
pub const EPKTCNT: Register = eth(Bank::Bank1, 0x19);

// Bank 2: MAC and MII.
pub const MACON1: Register = mac(Bank::Bank2, 0x00);
pub const MACON2: Register = mac(Bank::Bank2, 0x01);
pub const MACON3: Register = mac(Bank::Bank2, 0x02);
pub const MACON4: Register = mac(Bank::Bank2, 0x03);
pub const MABBIPG: Register = mac(Bank::Bank2, 0x04);
pub const MAIPGL: Register = mac(Bank::Bank2, 0x06);
pub const MAIPGH: Register = mac(Bank::Bank2, 0x07);
pub const MACLCON1: Register = mac(Bank::Bank2, 0x08);
pub const MACLCON2: Register = mac(Bank::Bank2, 0x09);
pub const MAMXFL: RegisterPair = RegisterPair {
    low: mac(Bank::Bank2, 0x0A),
    high: mac(Bank::Bank2, 0x0B),
};
pub const MAPHSUP: Register = mac(Bank::Bank2, 0x0D);
pub const MICON: Register = mii(Bank::Bank2, 0x11);
pub const MICMD: Register = mii(Bank::Bank2, 0x12);
pub const MIREGADR: Register = mii(Bank::Bank2, 0x14);
pub const MIWRL: Register = mii(Bank::Bank2, 0x16);
pub const MIWRH: Register = mii(Bank::Bank2, 0x17);
pub const MIRDL: Register = mii(Bank::Bank2, 0x18);
pub const MIRDH: Register = mii(Bank::Bank2, 0x19);

// Bank 3: station address (datasheet numbering, MAADR1 is the first octet on the wire).
pub const MAADR5: Register = mac(Bank::Bank3, 0x00);
pub const MAADR6: Register = mac(Bank::Bank3, 0x01);
pub const MAADR3: Register = mac(Bank::Bank3, 0x02);
pub const MAADR4: Register = mac(Bank::Bank3, 0x03);
pub const MAADR1: Register = mac(Bank::Bank3, 0x04);
pub const MAADR2: Register = mac(Bank::Bank3, 0x05);
/// Station address registers in wire order.
pub const MAADR: [Register; 6] = [MAADR1, MAADR2, MAADR3, MAADR4, MAADR5, MAADR6];
pub const EBSTSD: Register = eth(Bank::Bank3, 0x06);
pub const EBSTCON: Register = eth(Bank::Bank3, 0x07);
pub const EBSTCS: RegisterPair = eth_pair(Bank::Bank3, 0x08);
pub const MISTAT: Register = mii(Bank::Bank3, 0x0A);
pub const EREVID: Register = eth(Bank::Bank3, 0x12);
pub const ECOCON: Register = eth(Bank::Bank3, 0x15);
pub const EFLOCON: Register = eth(Bank::Bank3, 0x17);
pub const EPAUS: RegisterPair = eth_pair(Bank::Bank3, 0x18);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhyRegister(pub u8);

impl PhyRegister {
    pub const PHCON1: Self = Self(0x00);
    pub const PHSTAT1: Self = Self(0x01);
    pub const PHID1: Self = Self(0x02);
    pub const PHID2: Self = Self(0x03);
    pub const PHCON2: Self = Self(0x10);
    pub const PHSTAT2: Self = Self(0x11);
    pub const PHIE: Self = Self(0x12);
    pub const PHIR: Self = Self(0x13);
    pub const PHLCON: Self = Self(0x14);
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Eie: u8 {
        const RXERIE = 1 << 0;
        const TXERIE = 1 << 1;
        const WOLIE = 1 << 2;
        const TXIE = 1 << 3;
        const LINKIE = 1 << 4;
        const DMAIE = 1 << 5;
        const PKTIE = 1 << 6;
        const INTIE = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Eir: u8 {
        const RXERIF = 1 << 0;
        const TXERIF = 1 << 1;
        const WOLIF = 1 << 2;
        const TXIF = 1 << 3;
        const LINKIF = 1 << 4;
        const DMAIF = 1 << 5;
        const PKTIF = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Estat: u8 {
        const CLKRDY = 1 << 0;
        const TXABRT = 1 << 1;
        const RXBUSY = 1 << 2;
        const LATECOL = 1 << 4;
        const INT = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Econ2: u8 {
        const VRPS = 1 << 3;
        const PWRSV = 1 << 5;
        const PKTDEC = 1 << 6;
        const AUTOINC = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Econ1: u8 {
        const BSEL0 = 1 << 0;
        const BSEL1 = 1 << 1;
        const RXEN = 1 << 2;
        const TXRTS = 1 << 3;
        const CSUMEN = 1 << 4;
        const DMAST = 1 << 5;
        const RXRST = 1 << 6;
        const TXRST = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Erxfcon: u8 {
        const BCEN = 1 << 0;
        const MCEN = 1 << 1;
        const HTEN = 1 << 2;
        const MPEN = 1 << 3;
        const PMEN = 1 << 4;
        const CRCEN = 1 << 5;
        const ANDOR = 1 << 6;
        const UCEN = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Macon1: u8 {
        const MARXEN = 1 << 0;
        const PASSALL = 1 << 1;
        const RXPAUS = 1 << 2;
        const TXPAUS = 1 << 3;
        const LOOPBK = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Macon3: u8 {
        const FULDPX = 1 << 0;
        const FRMLNEN = 1 << 1;
        const HFRMEN = 1 << 2;
        const PHDRLEN = 1 << 3;
        const TXCRCEN = 1 << 4;
        /// Pad short frames (VLAN-aware) and append a CRC.
        const PADCFG_AUTO = 0b101 << 5;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Macon4: u8 {
        const PUREPRE = 1 << 0;
        const LONGPRE = 1 << 1;
        const NOBKOFF = 1 << 4;
        const BPEN = 1 << 5;
        const DEFER = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Micmd: u8 {
        const MIIRD = 1 << 0;
        const MIISCAN = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Mistat: u8 {
        const BUSY = 1 << 0;
        const SCAN = 1 << 1;
        const NVALID = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Phcon1: u16 {
        const PDPXMD = 1 << 8;
        const PPWRSV = 1 << 11;
        const PLOOPBK = 1 << 14;
        const PRST = 1 << 15;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Phcon2: u16 {
        const HDLDIS = 1 << 8;
        const JABBER = 1 << 10;
        const TXDIS = 1 << 13;
        const FRCLNK = 1 << 14;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Phstat2: u16 {
        const PLRITY = 1 << 5;
        const DPXSTAT = 1 << 9;
        const LSTAT = 1 << 10;
        const COLSTAT = 1 << 11;
        const RXSTAT = 1 << 12;
        const TXSTAT = 1 << 13;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Phie: u16 {
        const PGEIE = 1 << 1;
        const PLNKIE = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Phir: u16 {
        const PGIF = 1 << 2;
        const PLNKIF = 1 << 4;
    }
}

bitflags! {
    /// Upper half of the receive status vector (RSV bits 16..=31).
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RxStatus: u16 {
        const LONG_EVENT = 1 << 0;
        const CARRIER_EVENT = 1 << 2;
        const CRC_ERROR = 1 << 4;
        const LENGTH_CHECK_ERROR = 1 << 5;
        const LENGTH_OUT_OF_RANGE = 1 << 6;
        const RECEIVED_OK = 1 << 7;
        const MULTICAST = 1 << 8;
        const BROADCAST = 1 << 9;
        const DRIBBLE_NIBBLE = 1 << 10;
        const CONTROL_FRAME = 1 << 11;
        const PAUSE_FRAME = 1 << 12;
        const UNKNOWN_OPCODE = 1 << 13;
        const VLAN = 1 << 14;
    }
}

/// MABBIPG for full duplex.
pub const MABBIPG_FULL_DUPLEX: u8 = 0x15;
/// MABBIPG for half duplex.
pub const MABBIPG_HALF_DUPLEX: u8 = 0x12;
pub const MAIPGL_DEFAULT: u8 = 0x12;
pub const MAIPGH_DEFAULT: u8 = 0x0C;
pub const MACLCON2_COLLISION_WINDOW: u8 = 0x37;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_registers_are_flagged() {
        for reg in [EIE, EIR, ESTAT, ECON2, ECON1] {
            assert!(reg.is_common(), "{reg:?}");
        }
        assert!(!EPKTCNT.is_common());
        assert!(!MISTAT.is_common());
    }

    #[test]
    fn dummy_byte_only_for_mac_and_mii() {
        assert!(!ERXFCON.has_dummy_byte());
        assert!(MACON3.has_dummy_byte());
        assert!(MIRDL.has_dummy_byte());
        assert!(MISTAT.has_dummy_byte());
    }

    #[test]
    fn station_address_order() {
        assert_eq!(MAADR.map(|r| r.offset), [0x04, 0x05, 0x02, 0x03, 0x00, 0x01]);
    }

    #[test]
    fn macon3_padding_value() {
        assert_eq!(Macon3::PADCFG_AUTO.bits(), 0xA0);
        let full = Macon3::PADCFG_AUTO | Macon3::TXCRCEN | Macon3::FRMLNEN | Macon3::FULDPX;
        assert_eq!(full.bits(), 0xB3);
    }

    #[test]
    fn buffer_layout_fits_memory() {
        assert_eq!(RX_BUFFER_STOP + 1, TX_BUFFER_START);
        assert_eq!(TX_BUFFER_STOP as usize + 1, BUFFER_MEMORY_SIZE);
        assert!((TX_BUFFER_STOP - TX_BUFFER_START) as usize >= ETH_TX_BUFFER_SIZE);
    }
}

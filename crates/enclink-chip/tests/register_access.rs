use enclink_chip::regs::{self, Bank, PhyRegister};
use enclink_chip::sim::{InstantDelay, SimulatedEnc28j60};
use enclink_chip::{ChipConfig, ChipError, Duplex, Enc28j60, InitError};
use pretty_assertions::assert_eq;

type Nic = Enc28j60<SimulatedEnc28j60, InstantDelay>;

fn nic_with(cfg: ChipConfig) -> Nic {
    Enc28j60::new(SimulatedEnc28j60::new(), InstantDelay::default(), cfg).unwrap()
}

fn nic() -> Nic {
    nic_with(ChipConfig::default())
}

#[test]
fn init_programs_mac_ring_and_filters() {
    let cfg = ChipConfig {
        mac: [0x02, 0x11, 0x22, 0x33, 0x44, 0x55],
        ..ChipConfig::default()
    };
    let nic = nic_with(cfg);
    let chip = nic.bus();

    assert_eq!(nic.revision(), regs::EXPECTED_REVISION);
    assert_eq!(chip.reset_count(), 1);
    assert_eq!(regs::MAADR.map(|reg| chip.register(reg)), cfg.mac);

    assert_eq!(chip.register_pair(regs::ERXST), 0x0000);
    assert_eq!(chip.register_pair(regs::ERXND), 0x17FF);
    assert_eq!(chip.register_pair(regs::ERXRDPT), 0x17FF);
    assert_eq!(chip.register(regs::ERXFCON), 0xA5);
    assert_eq!(chip.register(regs::MACON1), 0x0D);
    assert_eq!(chip.register(regs::MACON3), 0xB3);
    assert_eq!(chip.register(regs::MACON4), 0x40);
    assert_eq!(chip.register_pair(regs::MAMXFL), 1536);
    assert_eq!(chip.register(regs::MABBIPG), 0x15);
    assert_eq!(chip.register(regs::MAIPGL), 0x12);
    assert_eq!(chip.register(regs::MAIPGH), 0x0C);
    assert_eq!(chip.register(regs::MACLCON2), 0x37);
    assert_eq!(chip.register(regs::EIE), 0xD0);
    assert_eq!(chip.register(regs::ECON1) & 0x04, 0x04);

    assert_eq!(chip.phy_register(PhyRegister::PHCON1), 0x0100);
    assert_eq!(chip.phy_register(PhyRegister::PHCON2), 0x0100);
    assert_eq!(chip.phy_register(PhyRegister::PHIE), 0x0012);
}

#[test]
fn half_duplex_and_multicast_options() {
    let nic = nic_with(ChipConfig {
        duplex: Duplex::Half,
        multicast_rx: true,
        ..ChipConfig::default()
    });
    let chip = nic.bus();
    assert_eq!(chip.register(regs::MACON3), 0xB2);
    assert_eq!(chip.register(regs::MABBIPG), 0x12);
    assert_eq!(chip.register(regs::ERXFCON), 0xA7);
    assert_eq!(chip.phy_register(PhyRegister::PHCON1), 0);
}

#[test]
fn absent_chip_is_reported() {
    for revision in [0x00, 0xFF] {
        let err = Enc28j60::new(
            SimulatedEnc28j60::with_revision(revision),
            InstantDelay::default(),
            ChipConfig::default(),
        )
        .err();
        assert_eq!(err, Some(InitError::ChipNotDetected { revision }));
    }
}

#[test]
fn unexpected_revision_still_initialises() {
    let nic = Enc28j60::new(
        SimulatedEnc28j60::with_revision(0x04),
        InstantDelay::default(),
        ChipConfig::default(),
    )
    .unwrap();
    assert_eq!(nic.revision(), 0x04);
}

#[test]
fn bank_switch_is_memoised() {
    let mut nic = nic();
    assert_eq!(nic.current_bank(), Some(Bank::Bank3));
    nic.bus_mut().clear_transactions();

    nic.pending_packet_count();
    nic.pending_packet_count();
    assert_eq!(
        nic.bus().transactions(),
        &[
            vec![0x9F, 0x01], // BFS ECON1.BSEL0
            vec![0xBF, 0x02], // BFC ECON1.BSEL1
            vec![0x19, 0x00], // RCR EPKTCNT
            vec![0x19, 0x00],
        ]
    );
    assert_eq!(nic.current_bank(), Some(Bank::Bank1));
}

#[test]
fn mac_registers_read_through_dummy_byte() {
    let mut nic = nic();
    nic.bus_mut().clear_transactions();
    assert_eq!(nic.read_register(regs::MACON3), 0xB3);
    assert_eq!(
        nic.bus().transactions(),
        &[vec![0xBF, 0x01], vec![0x9F, 0x02], vec![0x02, 0x00, 0x00]]
    );
}

#[test]
fn common_registers_never_switch_banks() {
    let mut nic = nic();
    nic.bus_mut().clear_transactions();
    nic.read_register(regs::EIR);
    nic.set_bits(regs::EIE, 0x01);
    nic.clear_bits(regs::EIE, 0x01);
    assert_eq!(
        nic.bus().transactions(),
        &[vec![0x1C, 0x00], vec![0x9B, 0x01], vec![0xBB, 0x01]]
    );
    assert_eq!(nic.current_bank(), Some(Bank::Bank3));
}

#[test]
fn writing_econ1_updates_cached_bank() {
    let mut nic = nic();
    nic.write_register(regs::ECON1, 0x04 | 0x02);
    assert_eq!(nic.current_bank(), Some(Bank::Bank2));
    nic.bus_mut().clear_transactions();
    nic.read_register(regs::MACON1);
    assert_eq!(nic.bus().transactions(), &[vec![0x00, 0x00, 0x00]]);
}

#[test]
fn soft_reset_forgets_bank() {
    let mut nic = nic();
    nic.soft_reset();
    assert_eq!(nic.current_bank(), None);
    assert_eq!(nic.bus().reset_count(), 2);
}

#[test]
fn register_pair_round_trip() {
    let mut nic = nic();
    nic.write_register_pair(regs::EWRPT, 0x1234);
    assert_eq!(nic.read_register_pair(regs::EWRPT), 0x1234);
    assert_eq!(nic.bus().register(regs::EWRPT.low), 0x34);
    assert_eq!(nic.bus().register(regs::EWRPT.high), 0x12);
}

#[test]
fn phy_access_waits_for_busy() {
    let mut nic = nic();
    nic.bus_mut().set_mii_busy_polls(3);
    let before = nic.delay().elapsed_us();
    assert_eq!(nic.read_phy(PhyRegister::PHID1).unwrap(), 0x0083);
    assert_eq!(nic.delay().elapsed_us() - before, 30);

    nic.write_phy(PhyRegister::PHLCON, 0x3476).unwrap();
    assert_eq!(nic.bus().phy_register(PhyRegister::PHLCON), 0x3476);
}

#[test]
fn stuck_phy_times_out() {
    let mut nic = nic_with(ChipConfig {
        phy_poll_limit: 5,
        ..ChipConfig::default()
    });
    nic.bus_mut().set_mii_stuck(true);
    assert_eq!(
        nic.read_phy(PhyRegister::PHSTAT2),
        Err(ChipError::PhyBusyTimeout { polls: 5 })
    );
    assert_eq!(nic.bus().register(regs::MICMD), 0);
    assert_eq!(
        nic.is_link_up(),
        Err(ChipError::PhyBusyTimeout { polls: 5 })
    );
}

#[test]
fn stuck_phy_fails_construction() {
    let mut chip = SimulatedEnc28j60::new();
    chip.set_mii_stuck(true);
    let err = Enc28j60::new(chip, InstantDelay::default(), ChipConfig::default()).err();
    assert_eq!(
        err,
        Some(InitError::Chip(ChipError::PhyBusyTimeout {
            polls: enclink_chip::DEFAULT_PHY_POLL_LIMIT
        }))
    );
}

#[test]
fn link_change_is_reported_once() {
    let mut nic = nic();
    assert!(nic.is_link_up().unwrap());
    assert_eq!(nic.link_state_changed().unwrap(), None);

    nic.bus_mut().set_link_up(false);
    assert_eq!(nic.link_state_changed().unwrap(), Some(false));
    assert_eq!(nic.link_state_changed().unwrap(), None);
    assert!(!nic.is_link_up().unwrap());
    assert_eq!(nic.bus().phy_register(PhyRegister::PHIR), 0);
    assert_eq!(nic.bus().register(regs::EIR) & 0x10, 0);

    nic.bus_mut().set_link_up(true);
    assert_eq!(nic.link_state_changed().unwrap(), Some(true));
}

use std::time::Duration;

use wiznet_driver::error::DriverError;
use wiznet_driver::sim::SimulatedChip;
use wiznet_driver::wiznet::config::Config;
use wiznet_driver::wiznet::registers::{self, Bank, CHIP_VERSION, DEFAULT_INTERRUPT_PACING};
use wiznet_driver::wiznet::registry::Registry;
use wiznet_driver::wiznet::{Socket, Wiznet};
use wiznet_driver::ChipContext;

mod common;
use common::*;

#[test]
fn init_programs_network_identity() {
    let (registry, mut wiznet) = device();

    assert_eq!(wiznet.id(), Some(0));
    assert!(registry.is_bound(0));
    assert_eq!(wiznet.version().unwrap(), CHIP_VERSION);

    let programmed = wiznet.read_network_config().unwrap();
    assert_eq!(programmed.mac, MAC);
    assert_eq!(programmed.ip, IP);
    assert_eq!(programmed.gateway, GATEWAY);
    assert_eq!(programmed.subnet, SUBNET);
    assert_eq!(programmed.interrupt_pacing, DEFAULT_INTERRUPT_PACING);

    // Raw register layout in the common block
    assert_eq!(wiznet.ctx.common_registers(registers::common::SHAR, 6), &MAC);
    assert_eq!(wiznet.ctx.common_registers(registers::common::SIPR, 4), &[10, 0, 0, 2]);
    assert_eq!(wiznet.ctx.common_registers(registers::common::INTLEVEL, 2), &[0x7A, 0x11]);
}

#[test]
fn version_mismatch_fails_and_releases_identity() {
    let mut registry = Registry::new();
    let mut chip = SimulatedChip::new();
    chip.version = 0x03;

    let mut wiznet = Wiznet::new(chip, config());
    let err = wiznet.init(&mut registry).unwrap_err();

    assert_eq!(
        err.downcast_ref::<DriverError>(),
        Some(&DriverError::VersionMismatch {
            expected: CHIP_VERSION,
            found: 0x03
        })
    );
    assert_eq!(wiznet.id(), None);
    assert!(registry.is_empty());
}

#[test]
fn full_registry_rejects_before_touching_hardware() {
    let mut registry = Registry::with_capacity(1);

    let mut first = Wiznet::new(SimulatedChip::new(), config());
    first.init(&mut registry).unwrap();

    let mut second = Wiznet::new(SimulatedChip::new(), config());
    let err = second.init(&mut registry).unwrap_err();

    assert_eq!(
        err.downcast_ref::<DriverError>(),
        Some(&DriverError::RegistryFull { capacity: 1 })
    );
    assert_eq!(second.ctx.transactions(), 0);
    assert_eq!(second.id(), None);
    assert_eq!(registry.len(), 1);
}

#[test]
fn missing_link_degrades_but_initializes() {
    let mut registry = Registry::new();
    let mut chip = SimulatedChip::new();
    chip.link_up = false;

    let mut wiznet = Wiznet::new(chip, config());
    wiznet.init(&mut registry).unwrap();
    assert_eq!(wiznet.id(), Some(0));

    // Reset waited for the whole bound
    assert!(wiznet.ctx.uptime() >= Duration::from_millis(50));
    assert!(!wiznet.hw_reset().unwrap());

    wiznet.ctx.link_up = true;
    assert!(wiznet.hw_reset().unwrap());
}

#[test]
fn transport_failure_propagates() {
    let mut registry = Registry::new();
    let mut chip = SimulatedChip::new();
    chip.transport_failure = true;

    let mut wiznet = Wiznet::new(chip, config());
    let err = wiznet.init(&mut registry).unwrap_err();

    assert!(format!("{:#}", err).contains("Simulated transport failure"));
    assert!(registry.is_empty());
}

#[test]
fn deinit_resets_chip_and_unbinds() {
    let (mut registry, mut wiznet) = device();
    let mut sock = Socket::udp(PEER, 5000);
    wiznet.open_socket(&mut sock).unwrap();
    assert_eq!(wiznet.socket_count(), 1);

    wiznet.deinit(&mut registry).unwrap();

    assert_eq!(wiznet.id(), None);
    assert!(registry.is_empty());
    assert_eq!(wiznet.socket_count(), 0);
    assert_eq!(wiznet.sockets_taken(), 0);
    assert_eq!(wiznet.ctx.common_registers(registers::common::SHAR, 6), &[0; 6]);

    // A second deinit has nothing to release
    let err = wiznet.deinit(&mut registry).unwrap_err();
    assert_eq!(
        err.downcast_ref::<DriverError>(),
        Some(&DriverError::DeviceNotBound)
    );

    // And the device can be brought up again
    wiznet.init(&mut registry).unwrap();
    assert_eq!(wiznet.id(), Some(0));
}

#[test]
fn identities_are_unique_per_registry() {
    let mut registry = Registry::with_capacity(2);
    let mut first = Wiznet::new(SimulatedChip::new(), config());
    let mut second = Wiznet::new(SimulatedChip::new(), Config::default());

    first.init(&mut registry).unwrap();
    second.init(&mut registry).unwrap();
    assert_eq!(first.id(), Some(0));
    assert_eq!(second.id(), Some(1));

    first.deinit(&mut registry).unwrap();
    assert!(!registry.is_bound(0));
    assert!(registry.is_bound(1));
}

#[test]
fn register_frames_use_three_phases() {
    let (_registry, mut wiznet) = device();
    wiznet.ctx.clear_writes();

    wiznet.write_u16(registers::common::INTLEVEL, Bank::Common, 0x1234).unwrap();

    let writes = wiznet.ctx.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].bank, Bank::Common);
    assert_eq!(writes[0].address, registers::common::INTLEVEL);
    assert_eq!(writes[0].data, vec![0x12, 0x34]);
    assert_eq!(wiznet.read_u16(registers::common::INTLEVEL, Bank::Common).unwrap(), 0x1234);
}

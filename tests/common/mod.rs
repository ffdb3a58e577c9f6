#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::time::Duration;

use wiznet_driver::sim::SimulatedChip;
use wiznet_driver::wiznet::config::{Config, Timeouts};
use wiznet_driver::wiznet::registry::Registry;
use wiznet_driver::wiznet::Wiznet;

pub const MAC: [u8; 6] = [0x02, 0x08, 0xDC, 0x00, 0x00, 0x01];
pub const IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const SUBNET: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

// Short bounds keep timeout scenarios cheap on the simulated clock
pub fn timeouts() -> Timeouts {
    Timeouts {
        reset: Duration::from_millis(50),
        open: Duration::from_millis(20),
        connect: Duration::from_millis(20),
        close: Duration::from_millis(20),
        disconnect: Duration::from_millis(20),
        send: Duration::from_millis(20),
    }
}

pub fn config() -> Config {
    Config::default()
        .with_mac(MAC)
        .with_ip(IP)
        .with_gateway(GATEWAY)
        .with_subnet(SUBNET)
        .with_timeouts(timeouts())
}

pub fn device() -> (Registry, Wiznet<SimulatedChip>) {
    let mut registry = Registry::new();
    let mut wiznet = Wiznet::new(SimulatedChip::new(), config());
    wiznet.init(&mut registry).unwrap();
    (registry, wiznet)
}

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::wiznet::registers::DEFAULT_INTERRUPT_PACING;

/// Upper bounds for every blocking wait of the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub reset: Duration,
    pub open: Duration,
    pub connect: Duration,
    pub close: Duration,
    pub disconnect: Duration,
    // Waiting for TX buffer space while sending
    pub send: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            reset: Duration::from_millis(8000),
            open: Duration::from_millis(1000),
            connect: Duration::from_millis(2000),
            close: Duration::from_millis(1000),
            disconnect: Duration::from_millis(2000),
            send: Duration::from_millis(1000),
        }
    }
}

/// Network identity and timing programmed into a chip on init
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,

    /// INTLEVEL value, in 4 / (25 MHz) steps
    pub interrupt_pacing: u16,
    pub timeouts: Timeouts,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mac: [0; 6],
            ip: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            subnet: Ipv4Addr::UNSPECIFIED,
            interrupt_pacing: DEFAULT_INTERRUPT_PACING,
            timeouts: Default::default(),
        }
    }
}

impl Config {
    pub fn with_mac(mut self, mac: [u8; 6]) -> Self {
        self.mac = mac;
        self
    }

    pub fn with_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ip = ip;
        self
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_subnet(mut self, subnet: Ipv4Addr) -> Self {
        self.subnet = subnet;
        self
    }

    pub fn with_interrupt_pacing(mut self, interrupt_pacing: u16) -> Self {
        self.interrupt_pacing = interrupt_pacing;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{ensure, Result};
use log::{debug, error, info, trace, warn};
use packed_struct::PackedStruct;

use crate::error::DriverError;
use crate::wiznet::config::Config;
use crate::wiznet::registers::*;
use crate::wiznet::registry::Registry;
use crate::ChipContext;

pub mod config;
mod interrupts;
mod receive;
pub mod registers;
pub mod registry;
mod socket;
mod transmit;
mod transport;

pub use socket::Socket;

// Reset pulse width and settle time after release
const RESET_HOLD: Duration = Duration::from_millis(1);
const RESET_SETTLE: Duration = Duration::from_millis(1);

/// Result of a bounded polling loop, both variants carry the last observed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome<T> {
    Reached(T),
    TimedOut(T),
}

/// One chip, its socket bookkeeping and the context it is wired to
pub struct Wiznet<C: ChipContext> {
    pub ctx: C,
    pub config: Config,

    id: Option<usize>,
    sockets_cnt: u8,
    // Bitmap like 0b01010101 where LSB is socket 0, mirrors `sockets`
    sockets_taken: u8,
    sockets: [Option<SocketType>; NUM_OF_SOCKETS],
    // Bumped whenever a slot is freed, see `Socket::id`
    generations: [u32; NUM_OF_SOCKETS],
}

impl<C: ChipContext> Wiznet<C> {
    pub fn new(ctx: C, config: Config) -> Self {
        Wiznet {
            ctx,
            config,
            id: None,
            sockets_cnt: 0,
            sockets_taken: 0,
            sockets: [None; NUM_OF_SOCKETS],
            generations: [0; NUM_OF_SOCKETS],
        }
    }

    pub fn id(&self) -> Option<usize> {
        self.id
    }

    pub fn socket_count(&self) -> u8 {
        self.sockets_cnt
    }

    pub fn sockets_taken(&self) -> u8 {
        self.sockets_taken
    }

    /// Type of the socket occupying hardware slot `id`, if any
    pub fn socket_slot(&self, id: u8) -> Option<SocketType> {
        self.sockets.get(id as usize).copied().flatten()
    }

    /// Register in `registry`, reset the chip and program the network identity.
    ///
    /// A missing link after reset only degrades the device, a wrong chip version fails.
    /// On failure the registry slot is released again.
    pub fn init(&mut self, registry: &mut Registry) -> Result<()> {
        ensure!(self.id.is_none(), "Device is already initialized");

        let id = registry.bind()?;
        self.id = Some(id);

        if let Err(err) = self.bring_up() {
            error!("Device {}: initialization failed: {}", id, err);
            registry.unbind(id);
            self.id = None;
            return Err(err);
        }

        info!("Device {}: initialized", id);
        Ok(())
    }

    fn bring_up(&mut self) -> Result<()> {
        self.hw_reset()?;

        self.write_u16(common::INTLEVEL, Bank::Common, self.config.interrupt_pacing)?;

        let config = self.config.clone();
        self.write(common::SHAR, Bank::Common, &config.mac)?;
        self.write(common::SIPR, Bank::Common, &config.ip.octets())?;
        self.write(common::GAR, Bank::Common, &config.gateway.octets())?;
        self.write(common::SUBR, Bank::Common, &config.subnet.octets())?;

        let programmed = self.read_network_config()?;
        debug!(
            "Network config: mac={:x?} ip={} gateway={} subnet={}",
            programmed.mac, programmed.ip, programmed.gateway, programmed.subnet
        );

        let version = self.version()?;
        debug!("Chip version: {:#04x}", version);
        if version != CHIP_VERSION {
            return Err(DriverError::VersionMismatch {
                expected: CHIP_VERSION,
                found: version,
            }
            .into());
        }
        Ok(())
    }

    /// Reset the chip and release the registry slot
    pub fn deinit(&mut self, registry: &mut Registry) -> Result<()> {
        let id = self.id.ok_or(DriverError::DeviceNotBound)?;

        self.hw_reset()?;

        // Reset wiped every socket on the chip
        self.sockets_cnt = 0;
        self.sockets_taken = 0;
        self.sockets = [None; NUM_OF_SOCKETS];
        (0..NUM_OF_SOCKETS as u8).for_each(|id| self.retire_slot(id));

        registry.unbind(id);
        self.id = None;
        info!("Device {}: deinitialized", id);
        Ok(())
    }

    /// Pulse the reset line and wait for reset completion and PHY link.
    /// Returns false if the link did not come up in time, which is not fatal.
    pub fn hw_reset(&mut self) -> Result<bool> {
        self.ctx.set_reset(true)?;
        self.ctx.delay(RESET_HOLD);
        self.ctx.set_reset(false)?;
        self.ctx.delay(RESET_SETTLE);

        let timeout = self.config.timeouts.reset;
        let outcome = self.poll_until(
            timeout,
            |wiznet| {
                let byte = wiznet.read_u8(common::PHYCFGR, Bank::Common)?;
                Ok(PhyConfig::unpack(&[byte])?)
            },
            |phy| phy.RST && phy.LNK,
        )?;

        match outcome {
            PollOutcome::Reached(_) => {
                debug!("Reset completed, link up");
                Ok(true)
            }
            PollOutcome::TimedOut(phy) => {
                warn!("Reset not completed within {:?}, PHY: {:?}", timeout, phy);
                Ok(false)
            }
        }
    }

    pub fn version(&mut self) -> Result<u8> {
        self.read_u8(common::VERSIONR, Bank::Common)
    }

    /// Network identity as currently programmed in the chip
    pub fn read_network_config(&mut self) -> Result<Config> {
        let mut mac = [0u8; 6];
        let mut ip = [0u8; 4];
        let mut gateway = [0u8; 4];
        let mut subnet = [0u8; 4];
        self.read(common::SHAR, Bank::Common, &mut mac)?;
        self.read(common::SIPR, Bank::Common, &mut ip)?;
        self.read(common::GAR, Bank::Common, &mut gateway)?;
        self.read(common::SUBR, Bank::Common, &mut subnet)?;

        let interrupt_pacing = self.read_u16(common::INTLEVEL, Bank::Common)?;

        Ok(Config {
            mac,
            ip: Ipv4Addr::from(ip),
            gateway: Ipv4Addr::from(gateway),
            subnet: Ipv4Addr::from(subnet),
            interrupt_pacing,
            timeouts: self.config.timeouts,
        })
    }

    // Busy poll `sample` until `done` accepts its value or `timeout` passed
    pub(crate) fn poll_until<T>(
        &mut self, timeout: Duration, mut sample: impl FnMut(&mut Self) -> Result<T>,
        done: impl Fn(&T) -> bool,
    ) -> Result<PollOutcome<T>> {
        let start = self.ctx.uptime();
        loop {
            let value = sample(self)?;
            if done(&value) {
                return Ok(PollOutcome::Reached(value));
            }

            let elapsed = self.ctx.uptime().saturating_sub(start);
            if elapsed >= timeout {
                trace!("Polling timed out after {:?}", elapsed);
                return Ok(PollOutcome::TimedOut(value));
            }
        }
    }
}

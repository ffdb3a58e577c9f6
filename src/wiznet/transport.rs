use anyhow::Result;
use log::trace;
use packed_struct::PackedStruct;

use crate::wiznet::registers::{Bank, ControlPhase};
use crate::wiznet::Wiznet;
use crate::ChipContext;

// Every access is one frame: 16 bit big endian address, control phase, then data.
// Chip select is always released again, the first error of the frame is returned.
impl<C: ChipContext> Wiznet<C> {
    pub fn write(&mut self, address: u16, bank: Bank, data: &[u8]) -> Result<()> {
        trace!("SPI write {:?} @ {:#06x}: {:x?}", bank, address, data);
        let header = frame_header(address, bank, true)?;

        self.ctx.select(true)?;
        let result = self
            .ctx
            .transmit(&header)
            .and_then(|_| self.ctx.transmit(data));
        let released = self.ctx.select(false);

        result.and(released)
    }

    pub fn read(&mut self, address: u16, bank: Bank, buffer: &mut [u8]) -> Result<()> {
        let header = frame_header(address, bank, false)?;

        self.ctx.select(true)?;
        let result = self
            .ctx
            .transmit(&header)
            .and_then(|_| self.ctx.receive(buffer));
        let released = self.ctx.select(false);

        trace!("SPI read {:?} @ {:#06x}: {:x?}", bank, address, buffer);
        result.and(released)
    }

    pub fn read_u8(&mut self, address: u16, bank: Bank) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(address, bank, &mut byte)?;
        Ok(byte[0])
    }

    pub fn write_u8(&mut self, address: u16, bank: Bank, value: u8) -> Result<()> {
        self.write(address, bank, &[value])
    }

    // Multi byte registers are big endian on the wire
    pub fn read_u16(&mut self, address: u16, bank: Bank) -> Result<u16> {
        let mut bytes = [0u8; 2];
        self.read(address, bank, &mut bytes)?;
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn write_u16(&mut self, address: u16, bank: Bank, value: u16) -> Result<()> {
        self.write(address, bank, &value.to_be_bytes())
    }
}

pub fn frame_header(address: u16, bank: Bank, write: bool) -> Result<[u8; 3]> {
    let [high, low] = address.to_be_bytes();
    let [control] = ControlPhase::new(bank, write).pack()?;
    Ok([high, low, control])
}

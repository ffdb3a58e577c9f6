use anyhow::Result;
use log::{trace, warn};

use crate::wiznet::registers::*;
use crate::wiznet::{Socket, Wiznet};
use crate::ChipContext;

// Size of the 16 bit buffer address space
const BUFFER_SPACE: usize = 0x10000;

impl<C: ChipContext> Wiznet<C> {
    /// Number of received bytes waiting between the RX read and write pointers
    pub fn pending_len(&mut self, sock: &Socket) -> Result<usize> {
        let id = self.bound_slot(sock)?;
        let (start, end) = self.rx_pointers(id)?;
        Ok(end.wrapping_sub(start) as usize)
    }

    /// Copy all pending data into `buffer` and acknowledge it.
    ///
    /// If the pending data does not fit, nothing is read or acknowledged and 0 is returned,
    /// so the data stays available for a call with a bigger buffer.
    pub fn receive(&mut self, sock: &Socket, buffer: &mut [u8]) -> Result<usize> {
        let id = self.bound_slot(sock)?;
        let (start, end) = self.rx_pointers(id)?;

        let length = end.wrapping_sub(start) as usize;
        if length == 0 {
            return Ok(0);
        }
        if length > buffer.len() {
            warn!(
                "Socket {}: received {} bytes, bigger than buffer of {}",
                id,
                length,
                buffer.len()
            );
            return Ok(0);
        }

        self.read_rx_region(id, start, end, &mut buffer[..length])?;
        self.acknowledge_rx(id, end)?;
        Ok(length)
    }

    /// Append all pending data to `buffer`, growing it as needed, and acknowledge it
    pub fn receive_into(&mut self, sock: &Socket, buffer: &mut Vec<u8>) -> Result<usize> {
        let id = self.bound_slot(sock)?;
        let (start, end) = self.rx_pointers(id)?;

        let length = end.wrapping_sub(start) as usize;
        if length == 0 {
            return Ok(0);
        }

        let offset = buffer.len();
        buffer.resize(offset + length, 0);
        // Unacknowledged data stays pending, so it must not stay in `buffer` either
        let result = self
            .read_rx_region(id, start, end, &mut buffer[offset..])
            .and_then(|_| self.acknowledge_rx(id, end));
        if let Err(err) = result {
            buffer.truncate(offset);
            return Err(err);
        }
        Ok(length)
    }

    fn rx_pointers(&mut self, id: u8) -> Result<(u16, u16)> {
        let registers = Bank::SocketRegisters(id);
        let start = self.read_u16(socket::RX_RD, registers)?;
        let end = self.read_u16(socket::RX_WR, registers)?;
        Ok((start, end))
    }

    // `destination` is exactly as long as the region between the pointers
    fn read_rx_region(
        &mut self, id: u8, start: u16, end: u16, destination: &mut [u8],
    ) -> Result<()> {
        let bank = Bank::SocketRxBuffer(id);

        if end < start {
            // Data wrapped: [start, top of address space) then [0, end)
            trace!("Socket {}: RX wrapped {:#06x}..{:#06x}", id, start, end);
            let (head, tail) = destination.split_at_mut(BUFFER_SPACE - start as usize);
            self.read(start, bank, head)?;
            if !tail.is_empty() {
                self.read(0x0000, bank, tail)?;
            }
        } else {
            trace!("Socket {}: RX {:#06x}..{:#06x}", id, start, end);
            self.read(start, bank, destination)?;
        }
        Ok(())
    }

    // Move the read pointer to what was observed and let the chip free the region
    fn acknowledge_rx(&mut self, id: u8, end: u16) -> Result<()> {
        self.write_u16(socket::RX_RD, Bank::SocketRegisters(id), end)?;
        self.command(id, SocketCommand::Recv)
    }
}

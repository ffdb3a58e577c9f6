use anyhow::Result;
use log::{debug, trace};

use crate::error::DriverError;
use crate::wiznet::registers::*;
use crate::wiznet::{PollOutcome, Socket, Wiznet};
use crate::ChipContext;

impl<C: ChipContext> Wiznet<C> {
    /// Queue `data` for transmission on `sock`.
    ///
    /// Data bigger than the free TX buffer space is split into fragments, each one
    /// written at the current TX write pointer and flushed before the next is queued.
    /// Returns once every fragment was flushed.
    pub fn send(&mut self, sock: &Socket, data: &[u8]) -> Result<()> {
        let id = self.bound_slot(sock)?;
        let flush = match sock.kind {
            SocketType::MacRaw => SocketCommand::SendMac,
            SocketType::Tcp | SocketType::Udp => SocketCommand::Send,
        };

        let mut remaining = data;
        while !remaining.is_empty() {
            let free_size = self.wait_for_tx_space(id)? as usize;
            let (fragment, rest) = remaining.split_at(free_size.min(remaining.len()));
            if !rest.is_empty() {
                debug!(
                    "Socket {}: fragmenting, {} of {} bytes fit",
                    id,
                    fragment.len(),
                    remaining.len()
                );
            }

            self.queue_fragment(id, fragment)?;
            self.command(id, flush)?;
            remaining = rest;
        }

        trace!("Socket {}: sent {} bytes", id, data.len());
        Ok(())
    }

    /// Free space of the socket's TX buffer as reported by the chip
    pub fn tx_free_size(&mut self, sock: &Socket) -> Result<u16> {
        let id = self.bound_slot(sock)?;
        self.read_u16(socket::TX_FSR, Bank::SocketRegisters(id))
    }

    // Write at the TX write pointer and advance it, wrapping in the 16 bit space
    fn queue_fragment(&mut self, id: u8, fragment: &[u8]) -> Result<()> {
        let registers = Bank::SocketRegisters(id);

        let start = self.read_u16(socket::TX_WR, registers)?;
        self.write(start, Bank::SocketTxBuffer(id), fragment)?;

        let end = start.wrapping_add(fragment.len() as u16);
        self.write_u16(socket::TX_WR, registers, end)?;
        trace!("Socket {}: TX {:#06x}..{:#06x}", id, start, end);
        Ok(())
    }

    fn wait_for_tx_space(&mut self, id: u8) -> Result<u16> {
        let timeout = self.config.timeouts.send;
        let outcome = self.poll_until(
            timeout,
            |wiznet| wiznet.read_u16(socket::TX_FSR, Bank::SocketRegisters(id)),
            |free_size| *free_size > 0,
        )?;

        match outcome {
            PollOutcome::Reached(free_size) => Ok(free_size),
            PollOutcome::TimedOut(_) => Err(DriverError::SendTimeout {
                socket: id,
                timeout_ms: timeout.as_millis(),
            }
            .into()),
        }
    }
}

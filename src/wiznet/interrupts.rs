use anyhow::Result;
use log::{debug, trace, warn};
use packed_struct::PackedStruct;

use crate::wiznet::registers::*;
use crate::wiznet::Wiznet;
use crate::ChipContext;

impl<C: ChipContext> Wiznet<C> {
    /// Service the INTn line: call `handler` for every pending socket event and clear them.
    ///
    /// All sockets flagged in SIR are handled in one call, lowest socket first and each
    /// socket's causes in ascending bit order. SIR is cleared even if nothing was pending.
    /// Returns the number of dispatched events.
    pub fn handle_interrupt(
        &mut self, mut handler: impl FnMut(u8, SocketEvent),
    ) -> Result<usize> {
        let pending = self.read_u8(common::SIR, Bank::Common)?;
        trace!("SIR: {:#010b}", pending);

        let mut dispatched = 0;
        for id in (0..NUM_OF_SOCKETS as u8).filter(|id| pending & (1 << id) != 0) {
            if self.socket_slot(id).is_none() {
                warn!("Interrupt for socket {} which is not open", id);
            }

            let registers = Bank::SocketRegisters(id);
            let causes = self.read_u8(socket::IR, registers)?;
            let interrupt = SocketInterrupt::unpack(&[causes])?;

            for event in interrupt.events() {
                debug!("Socket {}: interrupt {:?}", id, event);
                handler(id, event);
                dispatched += 1;
            }

            // Write back observed causes to clear exactly those
            self.write_u8(socket::IR, registers, causes)?;
        }

        self.write_u8(common::SIR, Bank::Common, 0)?;
        Ok(dispatched)
    }
}

use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use log::{debug, trace};
use packed_struct::PackedStruct;

use crate::sim::sockets::SimSocket;
use crate::wiznet::registers::*;
use crate::ChipContext;

mod sockets;

pub use sockets::TcpPeer;

const COMMON_REGISTERS_SIZE: usize = 0x40;

// Virtual time every chip select costs, lets polling loops run into their timeouts
const TRANSACTION_TIME: Duration = Duration::from_millis(1);

/// A write frame as it arrived at the chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub bank: Bank,
    pub address: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    bank: Bank,
    start: u16,
    address: u16, // Auto incremented, wraps in the 16 bit space
    write: bool,
}

#[derive(Debug, Default)]
struct Frame {
    header: Vec<u8>,
    cursor: Option<Cursor>,
    written: Vec<u8>,
}

/// Behavioral model of the offload chip behind its serial link.
///
/// Decodes address/control/data frames, keeps the common and per socket register files
/// plus 64 KiB TX and RX banks per socket, and executes socket commands instantly.
/// Time only advances through chip selects and delays.
#[derive(Debug)]
pub struct SimulatedChip {
    common: [u8; COMMON_REGISTERS_SIZE],
    sockets: Vec<SimSocket>,

    frame: Option<Frame>,
    in_reset: bool,
    clock: Duration,
    transactions: usize,
    writes: Vec<RecordedWrite>,

    // Knobs
    pub link_up: bool,
    pub version: u8,
    pub tcp_peer: TcpPeer,
    // Accept commands but never act on them
    pub stalled: bool,
    pub transport_failure: bool,
    // Fail every write frame once its header is decoded, reads keep working
    pub reject_writes: bool,
}

impl Default for SimulatedChip {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipContext for SimulatedChip {
    fn select(&mut self, selected: bool) -> Result<()> {
        if !selected {
            if let Some(frame) = self.frame.take() {
                self.finish_frame(frame);
            }
            return Ok(());
        }

        ensure!(!self.in_reset, "Chip is held in reset");
        ensure!(self.frame.is_none(), "Chip selected twice");
        if self.transport_failure {
            bail!("Simulated transport failure");
        }

        self.clock += TRANSACTION_TIME;
        self.transactions += 1;
        self.frame = Some(Frame::default());
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        if self.transport_failure {
            bail!("Simulated transport failure");
        }
        let mut frame = self.frame.take().context("Transmit without chip select")?;

        let result = data
            .iter()
            .try_for_each(|byte| self.transmit_byte(&mut frame, *byte));
        self.frame = Some(frame);
        result
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<()> {
        if self.transport_failure {
            bail!("Simulated transport failure");
        }
        let frame = self.frame.as_mut().context("Receive without chip select")?;
        let mut cursor = frame.cursor.context("Receive before address and control phase")?;
        ensure!(!cursor.write, "Receive during a write frame");

        for byte in buffer.iter_mut() {
            *byte = self.read_byte(cursor.bank, cursor.address)?;
            cursor.address = cursor.address.wrapping_add(1);
        }

        if let Some(frame) = self.frame.as_mut() {
            frame.cursor = Some(cursor);
        }
        Ok(())
    }

    fn set_reset(&mut self, asserted: bool) -> Result<()> {
        if asserted {
            self.in_reset = true;
        } else if self.in_reset {
            self.in_reset = false;
            self.power_on();
        }
        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        self.clock += duration;
    }

    fn uptime(&mut self) -> Duration {
        self.clock
    }
}

impl SimulatedChip {
    pub fn new() -> Self {
        SimulatedChip {
            common: [0; COMMON_REGISTERS_SIZE],
            sockets: (0..NUM_OF_SOCKETS).map(|_| SimSocket::default()).collect(),
            frame: None,
            in_reset: false,
            clock: Duration::ZERO,
            transactions: 0,
            writes: Vec::new(),
            link_up: true,
            version: CHIP_VERSION,
            tcp_peer: TcpPeer::Accept,
            stalled: false,
            transport_failure: false,
            reject_writes: false,
        }
    }

    fn power_on(&mut self) {
        debug!("Sim: reset released, registers back to defaults");
        self.common = [0; COMMON_REGISTERS_SIZE];
        self.sockets.iter_mut().for_each(SimSocket::reset);
    }

    fn transmit_byte(&mut self, frame: &mut Frame, byte: u8) -> Result<()> {
        let Some(cursor) = frame.cursor.as_mut() else {
            frame.header.push(byte);
            if frame.header.len() == 3 {
                let cursor = decode_header(&frame.header)?;
                if cursor.write && self.reject_writes {
                    bail!("Simulated write failure");
                }
                frame.cursor = Some(cursor);
            }
            return Ok(());
        };

        ensure!(cursor.write, "Transmitting data during a read frame");
        let (bank, address) = (cursor.bank, cursor.address);
        cursor.address = cursor.address.wrapping_add(1);
        frame.written.push(byte);

        self.write_byte(bank, address, byte);
        Ok(())
    }

    fn finish_frame(&mut self, frame: Frame) {
        if let Some(cursor) = frame.cursor {
            if cursor.write && !frame.written.is_empty() {
                self.writes.push(RecordedWrite {
                    bank: cursor.bank,
                    address: cursor.start,
                    data: frame.written,
                });
            }
        }
    }

    fn read_byte(&self, bank: Bank, address: u16) -> Result<u8> {
        Ok(match bank {
            Bank::Common => match address {
                common::PHYCFGR => {
                    let phy = PhyConfig {
                        LNK: self.link_up,
                        SPD: self.link_up,
                        DPX: self.link_up,
                        RST: true,
                    };
                    phy.pack()?[0]
                }
                common::VERSIONR => self.version,
                common::SIR => self.socket_interrupts(),
                _ => self.common.get(address as usize).copied().unwrap_or(0),
            },
            Bank::SocketRegisters(id) => self.sockets[id as usize].read_register(address),
            Bank::SocketTxBuffer(id) => self.sockets[id as usize].tx[address as usize],
            Bank::SocketRxBuffer(id) => self.sockets[id as usize].rx[address as usize],
        })
    }

    fn write_byte(&mut self, bank: Bank, address: u16, value: u8) {
        match bank {
            Bank::Common => match address {
                // Read only, SIR follows the socket interrupt registers
                common::SIR | common::PHYCFGR | common::VERSIONR => {
                    trace!("Sim: ignoring write to read only register {:#06x}", address);
                }
                _ => {
                    if let Some(register) = self.common.get_mut(address as usize) {
                        *register = value;
                    }
                }
            },
            Bank::SocketRegisters(id) => {
                if let Some(command) = self.sockets[id as usize].write_register(address, value) {
                    self.execute_command(id, command);
                }
            }
            Bank::SocketTxBuffer(id) => self.sockets[id as usize].tx[address as usize] = value,
            Bank::SocketRxBuffer(id) => self.sockets[id as usize].rx[address as usize] = value,
        }
    }

    // Sockets with pending causes, masked by SIMR
    fn socket_interrupts(&self) -> u8 {
        let mask = self.common[common::SIMR as usize];
        let pending = self
            .sockets
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.register(socket::IR) != 0)
            .fold(0u8, |bits, (id, _)| bits | (1 << id));
        pending & mask
    }

    // Inspection and stimulus helpers

    pub fn transactions(&self) -> usize {
        self.transactions
    }

    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Data frames written into the TX buffer of socket `id`, in order
    pub fn tx_writes(&self, id: u8) -> Vec<&RecordedWrite> {
        self.writes
            .iter()
            .filter(|write| write.bank == Bank::SocketTxBuffer(id))
            .collect()
    }

    /// Payloads flushed by SEND / SEND_MAC on socket `id`
    pub fn sent_frames(&self, id: u8) -> &[Vec<u8>] {
        &self.sockets[id as usize].sent
    }

    pub fn common_registers(&self, address: u16, length: usize) -> &[u8] {
        let start = address as usize;
        &self.common[start..start + length]
    }

    pub fn socket_register(&self, id: u8, address: u16) -> u8 {
        self.sockets[id as usize].read_register(address)
    }

    pub fn socket_register_u16(&self, id: u8, address: u16) -> u16 {
        u16::from_be_bytes([
            self.socket_register(id, address),
            self.socket_register(id, address + 1),
        ])
    }

    pub fn socket_status(&self, id: u8) -> SocketStatus {
        SocketStatus::from_register(self.socket_register(id, socket::SR))
    }

    pub fn force_status(&mut self, id: u8, status: SocketStatus) {
        self.sockets[id as usize].set_status(status);
    }

    pub fn set_tx_capacity(&mut self, id: u8, capacity: u16) {
        self.sockets[id as usize].tx_capacity = capacity;
    }

    /// Capacities socket `id` switches to after each of its next flushes, in order
    pub fn schedule_tx_capacity(&mut self, id: u8, capacities: &[u16]) {
        self.sockets[id as usize]
            .tx_capacity_schedule
            .extend(capacities.iter().copied());
    }

    pub fn set_tx_pointers(&mut self, id: u8, read: u16, write: u16) {
        let slot = &mut self.sockets[id as usize];
        slot.set_u16(socket::TX_RD, read);
        slot.set_u16(socket::TX_WR, write);
    }

    pub fn set_rx_pointers(&mut self, id: u8, read: u16, write: u16) {
        let slot = &mut self.sockets[id as usize];
        slot.set_u16(socket::RX_RD, read);
        slot.set_u16(socket::RX_WR, write);
    }

    /// Place `data` in the RX bank at `offset` without touching the pointers
    pub fn fill_rx(&mut self, id: u8, offset: u16, data: &[u8]) {
        let rx = &mut self.sockets[id as usize].rx;
        for (index, byte) in data.iter().enumerate() {
            rx[offset.wrapping_add(index as u16) as usize] = *byte;
        }
    }

    /// Network delivered `data` to socket `id`: store it, advance RX_WR, flag RECV
    pub fn inject_rx(&mut self, id: u8, data: &[u8]) {
        let write = self.sockets[id as usize].u16(socket::RX_WR);
        self.fill_rx(id, write, data);
        self.sockets[id as usize].set_u16(socket::RX_WR, write.wrapping_add(data.len() as u16));
        self.raise_interrupt(id, SocketEvent::Received);
    }

    pub fn raise_interrupt(&mut self, id: u8, event: SocketEvent) {
        self.sockets[id as usize].raise(event);
    }
}

fn decode_header(header: &[u8]) -> Result<Cursor> {
    let address = u16::from_be_bytes([header[0], header[1]]);
    let control = ControlPhase::unpack(&[header[2]])?;
    ensure!(control.OM == 0, "Only variable length data mode is modelled");
    let bank = Bank::from_selector(control.BSB).context("Reserved block select bits")?;

    trace!(
        "Sim: {} {:?} @ {:#06x}",
        if control.RWB { "write" } else { "read" },
        bank,
        address
    );
    Ok(Cursor {
        bank,
        start: address,
        address,
        write: control.RWB,
    })
}

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::sim::SimulatedChip;
use crate::wiznet::registers::*;

const SOCKET_REGISTERS_SIZE: usize = 0x30;
const BUFFER_SPACE: usize = 0x10000;
const DEFAULT_TX_CAPACITY: u16 = 2048;

/// How the remote end answers a TCP CONNECT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpPeer {
    Accept,
    // SYN stays unanswered, socket hangs in SYNSENT
    Silent,
    // RST or ARP failure, socket falls back to CLOSED with a timeout cause
    Refuse,
}

#[derive(Debug)]
pub(crate) struct SimSocket {
    registers: [u8; SOCKET_REGISTERS_SIZE],
    pub tx: Vec<u8>,
    pub rx: Vec<u8>,
    pub tx_capacity: u16,
    // Capacities taking effect one per flush, models a TX buffer shared with other traffic
    pub tx_capacity_schedule: VecDeque<u16>,
    pub sent: Vec<Vec<u8>>,
}

impl Default for SimSocket {
    fn default() -> Self {
        SimSocket {
            registers: [0; SOCKET_REGISTERS_SIZE],
            tx: vec![0; BUFFER_SPACE],
            rx: vec![0; BUFFER_SPACE],
            tx_capacity: DEFAULT_TX_CAPACITY,
            tx_capacity_schedule: VecDeque::new(),
            sent: Vec::new(),
        }
    }
}

impl SimSocket {
    pub fn reset(&mut self) {
        self.registers = [0; SOCKET_REGISTERS_SIZE];
        self.sent.clear();
    }

    pub fn register(&self, address: u16) -> u8 {
        self.registers.get(address as usize).copied().unwrap_or(0)
    }

    pub fn u16(&self, address: u16) -> u16 {
        u16::from_be_bytes([self.register(address), self.register(address + 1)])
    }

    pub fn set_u16(&mut self, address: u16, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.registers[address as usize] = high;
        self.registers[address as usize + 1] = low;
    }

    pub fn set_status(&mut self, status: SocketStatus) {
        self.registers[socket::SR as usize] = status.code() as u8;
    }

    fn status(&self) -> SocketStatus {
        SocketStatus::from_register(self.register(socket::SR))
    }

    pub fn raise(&mut self, event: SocketEvent) {
        self.registers[socket::IR as usize] |= event.bit();
    }

    fn tx_free_size(&self) -> u16 {
        let used = self.u16(socket::TX_WR).wrapping_sub(self.u16(socket::TX_RD));
        self.tx_capacity.saturating_sub(used)
    }

    fn rx_received_size(&self) -> u16 {
        self.u16(socket::RX_WR).wrapping_sub(self.u16(socket::RX_RD))
    }

    pub fn read_register(&self, address: u16) -> u8 {
        match address {
            socket::TX_FSR => self.tx_free_size().to_be_bytes()[0],
            0x0021 => self.tx_free_size().to_be_bytes()[1],
            socket::RX_RSR => self.rx_received_size().to_be_bytes()[0],
            0x0027 => self.rx_received_size().to_be_bytes()[1],
            _ => self.register(address),
        }
    }

    /// Store a register byte, returns the command if Sn_CR was written
    pub fn write_register(&mut self, address: u16, value: u8) -> Option<u8> {
        match address {
            socket::CR => return Some(value),
            // Write 1 to clear
            socket::IR => self.registers[socket::IR as usize] &= !value,
            // Driven by the chip only
            socket::SR | socket::TX_FSR | 0x0021 | socket::RX_RSR | 0x0027 => {
                trace!("Sim: ignoring write to read only socket register {:#06x}", address)
            }
            _ => {
                if let Some(register) = self.registers.get_mut(address as usize) {
                    *register = value;
                }
            }
        }
        None
    }

    // Hand everything between TX_RD and TX_WR to the network
    fn flush_tx(&mut self) {
        let read = self.u16(socket::TX_RD);
        let write = self.u16(socket::TX_WR);
        let length = write.wrapping_sub(read);

        let frame: Vec<u8> = (0..length)
            .map(|index| self.tx[read.wrapping_add(index) as usize])
            .collect();
        debug!("Sim: sending {} bytes", frame.len());

        self.sent.push(frame);
        self.set_u16(socket::TX_RD, write);
        self.raise(SocketEvent::SendOk);

        if let Some(capacity) = self.tx_capacity_schedule.pop_front() {
            trace!("Sim: TX capacity now {}", capacity);
            self.tx_capacity = capacity;
        }
    }
}

impl SimulatedChip {
    pub(crate) fn execute_command(&mut self, id: u8, byte: u8) {
        let Some(command) = SocketCommand::from_byte(byte) else {
            warn!("Sim: socket {} unknown command {:#04x}", id, byte);
            return;
        };

        if self.stalled {
            debug!("Sim: socket {} stalled, ignoring {:?}", id, command);
            return;
        }

        let tcp_peer = self.tcp_peer;
        let slot = &mut self.sockets[id as usize];
        trace!("Sim: socket {} executing {:?} in {:?}", id, command, slot.status());

        match command {
            SocketCommand::Open => {
                let status = match SocketType::from_mode(slot.register(socket::MR)) {
                    // MACRAW only exists on socket 0
                    Some(SocketType::MacRaw) if id != 0 => SocketStatus::Closed,
                    Some(kind) => kind.opened_status(),
                    None => SocketStatus::Closed,
                };
                slot.set_status(status);
            }
            SocketCommand::Connect => {
                if slot.status() != SocketStatus::Init {
                    warn!("Sim: socket {} CONNECT outside of INIT", id);
                    return;
                }
                match tcp_peer {
                    TcpPeer::Accept => {
                        slot.set_status(SocketStatus::Established);
                        slot.raise(SocketEvent::Connected);
                    }
                    TcpPeer::Silent => slot.set_status(SocketStatus::SynSent),
                    TcpPeer::Refuse => {
                        slot.set_status(SocketStatus::Closed);
                        slot.raise(SocketEvent::Timeout);
                    }
                }
            }
            SocketCommand::Disconnect => {
                slot.set_status(SocketStatus::Closed);
                slot.raise(SocketEvent::Disconnected);
            }
            SocketCommand::Close => slot.set_status(SocketStatus::Closed),
            SocketCommand::Send | SocketCommand::SendMac => slot.flush_tx(),
            SocketCommand::Recv => {
                trace!("Sim: socket {} RX freed up to {:#06x}", id, slot.u16(socket::RX_RD));
            }
            SocketCommand::Listen | SocketCommand::SendKeep => {
                warn!("Sim: socket {} {:?} is not modelled", id, command);
            }
        }
    }
}

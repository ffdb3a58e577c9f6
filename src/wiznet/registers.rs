// Allow naming fields by their official all upper case abbreviations
#![allow(non_snake_case)]

use packed_struct::derive::PackedStruct;

pub const NUM_OF_SOCKETS: usize = 8;

// Expected content of VERSIONR
pub const CHIP_VERSION: u8 = 0x04;

// Interrupt Assert Wait Time, 31249 -> 5ms @ 25MHz
pub const DEFAULT_INTERRUPT_PACING: u16 = 31249;

pub const MAX_TCP_SEGMENT_SIZE: u16 = 1460;

/// Offsets inside the common register block
pub mod common {
    pub const MR: u16 = 0x0000; // Mode (1 byte)
    pub const GAR: u16 = 0x0001; // Gateway IP Address (4 bytes)
    pub const SUBR: u16 = 0x0005; // Subnet Mask (4 bytes)
    pub const SHAR: u16 = 0x0009; // Source MAC Address (6 bytes)
    pub const SIPR: u16 = 0x000F; // Source IP Address (4 bytes)
    pub const INTLEVEL: u16 = 0x0013; // Interrupt Assert Wait Time (2 bytes)
    pub const SIR: u16 = 0x0017; // Socket Interrupt (1 byte)
    pub const SIMR: u16 = 0x0018; // Socket Interrupt Mask (1 byte)
    pub const PHYCFGR: u16 = 0x002E; // PHY Configuration (1 byte)
    pub const VERSIONR: u16 = 0x0039; // Chip Version (1 byte)
}

/// Offsets inside a per socket register block
pub mod socket {
    pub const MR: u16 = 0x0000; // Mode (1 byte)
    pub const CR: u16 = 0x0001; // Command (1 byte)
    pub const IR: u16 = 0x0002; // Interrupt (1 byte)
    pub const SR: u16 = 0x0003; // Status (1 byte)
    pub const PORT: u16 = 0x0004; // Source Port (2 bytes)
    pub const DHAR: u16 = 0x0006; // Destination MAC Address, bypasses ARP (6 bytes)
    pub const DIPR: u16 = 0x000C; // Destination IP Address (4 bytes)
    pub const DPORT: u16 = 0x0010; // Destination Port (2 bytes)
    pub const MSSR: u16 = 0x0012; // Maximum Segment Size (2 bytes)
    pub const TX_FSR: u16 = 0x0020; // TX Free Size (2 bytes)
    pub const TX_RD: u16 = 0x0022; // TX Read Pointer (2 bytes)
    pub const TX_WR: u16 = 0x0024; // TX Write Pointer (2 bytes)
    pub const RX_RSR: u16 = 0x0026; // RX Received Size (2 bytes)
    pub const RX_RD: u16 = 0x0028; // RX Read Pointer (2 bytes)
    pub const RX_WR: u16 = 0x002A; // RX Write Pointer (2 bytes)
}

/// Block the address phase refers to, encoded as BSB[4:0] of the control phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bank {
    Common,
    SocketRegisters(u8),
    SocketTxBuffer(u8),
    SocketRxBuffer(u8),
}

impl Bank {
    pub fn selector(self) -> u8 {
        match self {
            Bank::Common => 0b00000,
            Bank::SocketRegisters(socket) => socket * 4 + 1,
            Bank::SocketTxBuffer(socket) => socket * 4 + 2,
            Bank::SocketRxBuffer(socket) => socket * 4 + 3,
        }
    }

    pub fn from_selector(selector: u8) -> Option<Bank> {
        let socket = selector / 4;
        match (selector % 4, socket) {
            (0, 0) => Some(Bank::Common),
            (1, _) => Some(Bank::SocketRegisters(socket)),
            (2, _) => Some(Bank::SocketTxBuffer(socket)),
            (3, _) => Some(Bank::SocketRxBuffer(socket)),
            _ => None, // Reserved
        }
    }
}

// Second byte after the 16 bit address of every frame
#[derive(PackedStruct, Clone, Copy, Default, Debug, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct ControlPhase {
    #[packed_field(bits = "0:1")]
    pub OM: u8, // Operation Mode, 00 -> variable length data

    #[packed_field(bits = "2")]
    pub RWB: bool, // 1 -> write, 0 -> read

    #[packed_field(bits = "3:7")]
    pub BSB: u8, // Block Select Bits
}

impl ControlPhase {
    pub fn new(bank: Bank, write: bool) -> Self {
        ControlPhase {
            OM: 0,
            RWB: write,
            BSB: bank.selector(),
        }
    }
}

#[derive(PackedStruct, Clone, Copy, Default, Debug, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct PhyConfig {
    #[packed_field(bits = "0")]
    pub LNK: bool, // Link up

    #[packed_field(bits = "1")]
    pub SPD: bool, // 1 -> 100Mbps

    #[packed_field(bits = "2")]
    pub DPX: bool, // 1 -> Full duplex

    #[packed_field(bits = "7")]
    pub RST: bool, // Reset completed, PHY in normal operation
}

// Sn_IR layout, write 1 to clear
#[derive(PackedStruct, Clone, Copy, Default, Debug, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct SocketInterrupt {
    #[packed_field(bits = "0")]
    pub CON: bool, // Connection established

    #[packed_field(bits = "1")]
    pub DISCON: bool, // FIN or FIN/ACK received

    #[packed_field(bits = "2")]
    pub RECV: bool, // Data received

    #[packed_field(bits = "3")]
    pub TIMEOUT: bool, // ARP or TCP timeout

    #[packed_field(bits = "4")]
    pub SEND_OK: bool, // SEND command completed
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    Connected,
    Disconnected,
    Received,
    Timeout,
    SendOk,
}

impl SocketInterrupt {
    /// Set causes in ascending bit order
    pub fn events(&self) -> Vec<SocketEvent> {
        [
            (self.CON, SocketEvent::Connected),
            (self.DISCON, SocketEvent::Disconnected),
            (self.RECV, SocketEvent::Received),
            (self.TIMEOUT, SocketEvent::Timeout),
            (self.SEND_OK, SocketEvent::SendOk),
        ]
        .into_iter()
        .filter_map(|(set, event)| set.then_some(event))
        .collect()
    }
}

impl SocketEvent {
    pub fn bit(self) -> u8 {
        match self {
            SocketEvent::Connected => 1 << 0,
            SocketEvent::Disconnected => 1 << 1,
            SocketEvent::Received => 1 << 2,
            SocketEvent::Timeout => 1 << 3,
            SocketEvent::SendOk => 1 << 4,
        }
    }
}

/// Protocol of a socket, as written to Sn_MR
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketType {
    Tcp,
    Udp,
    MacRaw,
}

pub const SOCKET_MODE_CLOSED: u8 = 0b0000;

impl SocketType {
    pub fn mode(self) -> u8 {
        match self {
            SocketType::Tcp => 0b0001,
            SocketType::Udp => 0b0010,
            SocketType::MacRaw => 0b0100,
        }
    }

    pub fn from_mode(mode: u8) -> Option<SocketType> {
        match mode & 0x0F {
            0b0001 => Some(SocketType::Tcp),
            0b0010 => Some(SocketType::Udp),
            0b0100 => Some(SocketType::MacRaw),
            _ => None,
        }
    }

    /// Status the chip reports once OPEN completed for this type
    pub fn opened_status(self) -> SocketStatus {
        match self {
            SocketType::Tcp => SocketStatus::Init,
            SocketType::Udp => SocketStatus::Udp,
            SocketType::MacRaw => SocketStatus::MacRaw,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketCommand {
    Open = 0x01,
    Listen = 0x02,
    Connect = 0x04,
    Disconnect = 0x08,
    Close = 0x10,
    Send = 0x20,
    SendMac = 0x21,
    SendKeep = 0x22,
    Recv = 0x40,
}

impl SocketCommand {
    pub fn from_byte(byte: u8) -> Option<SocketCommand> {
        Some(match byte {
            0x01 => SocketCommand::Open,
            0x02 => SocketCommand::Listen,
            0x04 => SocketCommand::Connect,
            0x08 => SocketCommand::Disconnect,
            0x10 => SocketCommand::Close,
            0x20 => SocketCommand::Send,
            0x21 => SocketCommand::SendMac,
            0x22 => SocketCommand::SendKeep,
            0x40 => SocketCommand::Recv,
            _ => return None,
        })
    }
}

/// Content of Sn_SR plus the driver's own negative outcomes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketStatus {
    Closed,
    Init,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
    Udp,
    MacRaw,
    // Transitional or undocumented chip value
    Other(u8),

    // Driver only
    NumExceeded,
    MacRawTaken,
    CantOpen,
    CantClose,
}

impl SocketStatus {
    pub fn from_register(value: u8) -> Self {
        match value {
            0x00 => SocketStatus::Closed,
            0x13 => SocketStatus::Init,
            0x14 => SocketStatus::Listen,
            0x15 => SocketStatus::SynSent,
            0x16 => SocketStatus::SynRecv,
            0x17 => SocketStatus::Established,
            0x18 => SocketStatus::FinWait,
            0x1A => SocketStatus::Closing,
            0x1B => SocketStatus::TimeWait,
            0x1C => SocketStatus::CloseWait,
            0x1D => SocketStatus::LastAck,
            0x22 => SocketStatus::Udp,
            0x42 => SocketStatus::MacRaw,
            x => SocketStatus::Other(x),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            SocketStatus::Closed => 0x00,
            SocketStatus::Init => 0x13,
            SocketStatus::Listen => 0x14,
            SocketStatus::SynSent => 0x15,
            SocketStatus::SynRecv => 0x16,
            SocketStatus::Established => 0x17,
            SocketStatus::FinWait => 0x18,
            SocketStatus::Closing => 0x1A,
            SocketStatus::TimeWait => 0x1B,
            SocketStatus::CloseWait => 0x1C,
            SocketStatus::LastAck => 0x1D,
            SocketStatus::Udp => 0x22,
            SocketStatus::MacRaw => 0x42,
            SocketStatus::Other(x) => *x as i16,
            SocketStatus::NumExceeded => -2,
            SocketStatus::MacRawTaken => -3,
            SocketStatus::CantOpen => -4,
            SocketStatus::CantClose => -5,
        }
    }

    /// Anything but closed or a driver error counts as a live socket
    pub fn is_ok(&self) -> bool {
        self.code() > 0
    }
}

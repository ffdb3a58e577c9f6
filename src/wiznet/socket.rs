use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{ensure, Result};
use log::{debug, info, trace, warn};

use crate::error::DriverError;
use crate::wiznet::registers::*;
use crate::wiznet::{PollOutcome, Wiznet};
use crate::ChipContext;

// Socket 0 is kept free for MACRAW as long as possible
const MAC_RAW_SLOT: u8 = 0;
const ALL_BUT_MAC_RAW_SLOT: u8 = 0b1111_1110;

/// Caller owned description of a TCP (client), UDP or MACRAW socket.
///
/// Bound to a hardware slot of one device by [`Wiznet::open_socket`],
/// unbound again by [`Wiznet::deinit_socket`] or a failed open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    id: Option<u8>,
    host: Option<usize>, // Identity of the device the slot belongs to
    generation: u32,     // Slot generation at bind time, stale once the slot is freed

    pub kind: SocketType,
    pub status: SocketStatus,
    pub ip: Ipv4Addr,
    pub port: u16,
    // Destination for MACRAW frames only
    pub mac_raw_dst: [u8; 6],
}

impl Socket {
    pub fn new(kind: SocketType) -> Self {
        Socket {
            id: None,
            host: None,
            generation: 0,
            kind,
            status: SocketStatus::Closed,
            ip: Ipv4Addr::UNSPECIFIED,
            port: 0,
            mac_raw_dst: [0; 6],
        }
    }

    pub fn tcp(ip: Ipv4Addr, port: u16) -> Self {
        Socket {
            ip,
            port,
            ..Self::new(SocketType::Tcp)
        }
    }

    pub fn udp(ip: Ipv4Addr, port: u16) -> Self {
        Socket {
            ip,
            port,
            ..Self::new(SocketType::Udp)
        }
    }

    pub fn mac_raw(destination: [u8; 6]) -> Self {
        Socket {
            mac_raw_dst: destination,
            ..Self::new(SocketType::MacRaw)
        }
    }

    /// Hardware slot, while bound.
    ///
    /// A handle keeps reporting its slot after the slot was freed through another handle
    /// or a device deinit, the device then rejects it with `SocketNotBound`.
    pub fn id(&self) -> Option<u8> {
        self.id
    }

    pub fn is_bound(&self) -> bool {
        self.id.is_some()
    }

    fn unbind(&mut self) {
        self.id = None;
        self.host = None;
    }
}

impl<C: ChipContext> Wiznet<C> {
    /// Pick a hardware slot for `sock`, program it, open it and for TCP connect it.
    ///
    /// The resulting status is stored in `sock.status` and returned. Only on a live status
    /// the slot is registered, otherwise `sock` is left unbound and can be retried.
    pub fn open_socket(&mut self, sock: &mut Socket) -> Result<SocketStatus> {
        let host = self.id.ok_or(DriverError::DeviceNotBound)?;
        // A handle left over from a freed slot of this device may be opened again
        if sock.host == Some(host) && self.claimed_slot(sock).is_err() {
            sock.unbind();
        }
        ensure!(!sock.is_bound(), "Socket is already bound to slot {:?}", sock.id);

        if self.sockets_cnt as usize >= NUM_OF_SOCKETS {
            warn!("Number of sockets for device {} exceeded", host);
            sock.status = SocketStatus::NumExceeded;
            return Ok(sock.status);
        }

        let id = match self.free_slot(sock.kind) {
            Some(id) => id,
            None => {
                warn!("Socket {} for MACRAW already occupied", MAC_RAW_SLOT);
                sock.status = SocketStatus::MacRawTaken;
                return Ok(sock.status);
            }
        };
        debug!("Socket {}: opening as {:?}", id, sock.kind);

        // Bind for opening (and connecting), undone below on failure
        sock.id = Some(id);
        sock.host = Some(host);
        sock.generation = self.generations[id as usize];

        let status = match self.setup_and_open(id, sock) {
            Ok(status) => status,
            Err(err) => {
                sock.unbind();
                return Err(err);
            }
        };

        if status.is_ok() {
            self.sockets_cnt += 1;
            self.sockets_taken |= 1 << id;
            self.sockets[id as usize] = Some(sock.kind);
            self.set_socket_interrupt(id, true)?;
            info!("Socket {}: {:?} ({:#04x})", id, status, status.code());
        } else {
            warn!("Socket {}: failed to open, status {:?}", id, status);
            sock.unbind();
        }

        Ok(status)
    }

    fn free_slot(&self, kind: SocketType) -> Option<u8> {
        let mac_raw_free = self.sockets_taken & (1 << MAC_RAW_SLOT) == 0;

        if kind == SocketType::MacRaw {
            return mac_raw_free.then_some(MAC_RAW_SLOT);
        }

        // All but slot 0 taken, share it with non MACRAW sockets
        if self.sockets_taken == ALL_BUT_MAC_RAW_SLOT {
            return Some(MAC_RAW_SLOT);
        }

        (1..NUM_OF_SOCKETS as u8).find(|id| self.sockets_taken & (1 << id) == 0)
    }

    fn setup_and_open(&mut self, id: u8, sock: &mut Socket) -> Result<SocketStatus> {
        let bank = Bank::SocketRegisters(id);

        match sock.kind {
            SocketType::Tcp => {
                self.write_u16(socket::MSSR, bank, MAX_TCP_SEGMENT_SIZE)?;
            }
            SocketType::MacRaw => {
                self.write(socket::DHAR, bank, &sock.mac_raw_dst)?;
            }
            SocketType::Udp => {}
        }
        self.write_u8(socket::MR, bank, sock.kind.mode())?;

        if sock.kind != SocketType::MacRaw {
            // Same port for source and destination
            self.write_u16(socket::PORT, bank, sock.port)?;
            self.write_u16(socket::DPORT, bank, sock.port)?;
            self.write(socket::DIPR, bank, &sock.ip.octets())?;
        }

        let status = self.open(sock)?;
        if sock.kind == SocketType::Tcp && status.is_ok() {
            return self.connect(sock);
        }
        Ok(status)
    }

    /// Send OPEN and wait until the chip reports the status expected for the socket type
    pub fn open(&mut self, sock: &mut Socket) -> Result<SocketStatus> {
        let id = self.claimed_slot(sock)?;
        let expected = sock.kind.opened_status();

        self.command(id, SocketCommand::Open)?;
        sock.status = match self.poll_status(id, self.config.timeouts.open, |s| s == expected)? {
            PollOutcome::Reached(status) => status,
            PollOutcome::TimedOut(_) => SocketStatus::CantOpen,
        };
        Ok(sock.status)
    }

    /// Send CONNECT (TCP client) and wait for ESTABLISHED.
    /// On timeout the last observed chip status is kept.
    pub fn connect(&mut self, sock: &mut Socket) -> Result<SocketStatus> {
        let id = self.claimed_slot(sock)?;

        self.command(id, SocketCommand::Connect)?;
        sock.status = match self.poll_status(id, self.config.timeouts.connect, |s| {
            s == SocketStatus::Established
        })? {
            PollOutcome::Reached(status) => status,
            PollOutcome::TimedOut(status) => {
                warn!("Socket {}: connect timed out in {:?}", id, status);
                status
            }
        };
        Ok(sock.status)
    }

    /// Send DISCON (TCP) regardless of the current status and wait for CLOSED
    pub fn disconnect(&mut self, sock: &mut Socket) -> Result<SocketStatus> {
        let timeout = self.config.timeouts.disconnect;
        self.close_with(sock, SocketCommand::Disconnect, timeout)
    }

    /// Send CLOSE regardless of type and current status and wait for CLOSED
    pub fn close(&mut self, sock: &mut Socket) -> Result<SocketStatus> {
        let timeout = self.config.timeouts.close;
        self.close_with(sock, SocketCommand::Close, timeout)
    }

    fn close_with(
        &mut self, sock: &mut Socket, command: SocketCommand, timeout: Duration,
    ) -> Result<SocketStatus> {
        let id = self.bound_slot(sock)?;

        self.command(id, command)?;
        sock.status = match self.poll_status(id, timeout, |s| s == SocketStatus::Closed)? {
            PollOutcome::Reached(status) => status,
            PollOutcome::TimedOut(_) => SocketStatus::CantClose,
        };
        debug!("Socket {}: {:?} -> {:?}", id, command, sock.status);
        Ok(sock.status)
    }

    /// Zero the meaningful socket registers, meant to run after closing
    pub fn reset_socket(&mut self, sock: &Socket) -> Result<()> {
        let id = self.bound_slot(sock)?;
        let bank = Bank::SocketRegisters(id);

        self.write_u8(socket::MR, bank, SOCKET_MODE_CLOSED)?;
        self.write_u16(socket::PORT, bank, 0)?;
        self.write_u16(socket::DPORT, bank, 0)?;
        self.write_u16(socket::MSSR, bank, 0)?;
        self.write(socket::DHAR, bank, &[0; 6])?;
        self.write(socket::DIPR, bank, &[0; 4])?;
        Ok(())
    }

    /// Reset the socket registers and free its hardware slot for reuse
    pub fn deinit_socket(&mut self, sock: &mut Socket) -> Result<()> {
        let id = self.bound_slot(sock)?;

        self.reset_socket(sock)?;
        self.set_socket_interrupt(id, false)?;

        if self.sockets_taken & (1 << id) != 0 {
            self.sockets_cnt = self.sockets_cnt.saturating_sub(1);
        }
        self.sockets_taken &= !(1 << id);
        self.sockets[id as usize] = None;
        self.retire_slot(id);

        sock.unbind();
        debug!("Socket {}: released", id);
        Ok(())
    }

    /// Full teardown: disconnect an established TCP socket, close, release the slot.
    /// Returns the closing status, the slot is released even if closing timed out.
    pub fn release_socket(&mut self, sock: &mut Socket) -> Result<SocketStatus> {
        self.bound_slot(sock)?;

        if sock.kind == SocketType::Tcp && sock.status == SocketStatus::Established {
            self.disconnect(sock)?;
        }
        let status = self.close(sock)?;
        self.deinit_socket(sock)?;

        // deinit resets the registers, keep the outcome of closing visible
        sock.status = status;
        Ok(status)
    }

    /// Refresh `sock.status` from Sn_SR
    pub fn socket_status(&mut self, sock: &mut Socket) -> Result<SocketStatus> {
        let id = self.bound_slot(sock)?;
        let byte = self.read_u8(socket::SR, Bank::SocketRegisters(id))?;
        sock.status = SocketStatus::from_register(byte);
        Ok(sock.status)
    }

    // Slot of a registered socket whose handle is still current
    pub(crate) fn bound_slot(&self, sock: &Socket) -> Result<u8> {
        let id = self.claimed_slot(sock)?;
        if self.sockets_taken & (1 << id) == 0 {
            return Err(DriverError::SocketNotBound.into());
        }
        Ok(id)
    }

    // Like `bound_slot`, but also accepts the slot `open_socket` is still opening
    fn claimed_slot(&self, sock: &Socket) -> Result<u8> {
        let id = sock.id.ok_or(DriverError::SocketNotBound)?;
        if sock.host.is_none() || sock.host != self.id {
            return Err(DriverError::ForeignSocket.into());
        }
        if sock.generation != self.generations[id as usize] {
            return Err(DriverError::SocketNotBound.into());
        }
        Ok(id)
    }

    // Invalidate every handle still pointing at slot `id`
    pub(crate) fn retire_slot(&mut self, id: u8) {
        let generation = &mut self.generations[id as usize];
        *generation = generation.wrapping_add(1);
    }

    pub(crate) fn command(&mut self, id: u8, command: SocketCommand) -> Result<()> {
        trace!("Socket {}: command {:?}", id, command);
        self.write_u8(socket::CR, Bank::SocketRegisters(id), command as u8)
    }

    fn poll_status(
        &mut self, id: u8, timeout: Duration, done: impl Fn(SocketStatus) -> bool,
    ) -> Result<PollOutcome<SocketStatus>> {
        self.poll_until(
            timeout,
            |wiznet| {
                let byte = wiznet.read_u8(socket::SR, Bank::SocketRegisters(id))?;
                Ok(SocketStatus::from_register(byte))
            },
            |status| done(*status),
        )
    }

    // Enable or disable the socket's bit in SIMR
    fn set_socket_interrupt(&mut self, id: u8, enabled: bool) -> Result<()> {
        let mut mask = self.read_u8(common::SIMR, Bank::Common)?;
        if enabled {
            mask |= 1 << id;
        } else {
            mask &= !(1 << id);
        }
        self.write_u8(common::SIMR, Bank::Common, mask)
    }
}

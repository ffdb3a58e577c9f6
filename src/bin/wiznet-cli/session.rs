use std::net::SocketAddrV4;

use anyhow::{ensure, Result};
use log::{debug, info, warn};

use wiznet_driver::sim::SimulatedChip;
use wiznet_driver::wiznet::config::Config;
use wiznet_driver::wiznet::registers::{SocketEvent, NUM_OF_SOCKETS};
use wiznet_driver::wiznet::registry::Registry;
use wiznet_driver::wiznet::{Socket, Wiznet};

// One simulated chip brought up with the user's network identity
pub struct Session {
    registry: Registry,
    wiznet: Wiznet<SimulatedChip>,
}

impl Session {
    pub fn start(config: Config, tx_capacity: u16) -> Result<Self> {
        let mut chip = SimulatedChip::new();
        for id in 0..NUM_OF_SOCKETS as u8 {
            chip.set_tx_capacity(id, tx_capacity);
        }

        let mut registry = Registry::new();
        let mut wiznet = Wiznet::new(chip, config);
        wiznet.init(&mut registry)?;

        let programmed = wiznet.read_network_config()?;
        info!(
            "Device up: mac={:02x?} ip={} subnet={} gateway={}",
            programmed.mac, programmed.ip, programmed.subnet, programmed.gateway
        );

        Ok(Session { registry, wiznet })
    }

    /// Send `payload` to `peer` over UDP and wait for the simulated echo
    pub fn udp_echo(&mut self, peer: SocketAddrV4, payload: &[u8]) -> Result<Vec<u8>> {
        let mut sock = Socket::udp(*peer.ip(), peer.port());
        let status = self.wiznet.open_socket(&mut sock)?;
        ensure!(status.is_ok(), "Could not open UDP socket: {:?}", status);
        let id = sock.id().unwrap_or_default();

        self.wiznet.send(&sock, payload)?;
        let frames = self.wiznet.ctx.sent_frames(id).len();
        info!("Sent {} bytes in {} frame(s)", payload.len(), frames);

        // Peer answers with the same payload
        self.wiznet.ctx.inject_rx(id, payload);

        let mut received = Vec::new();
        let mut data_ready = false;
        self.wiznet.handle_interrupt(|socket, event| {
            debug!("Socket {}: {:?}", socket, event);
            data_ready |= socket == id && event == SocketEvent::Received;
        })?;

        if data_ready {
            let pending = self.wiznet.pending_len(&sock)?;
            debug!("{} bytes pending", pending);
            self.wiznet.receive_into(&sock, &mut received)?;
        } else {
            warn!("No receive interrupt for socket {}", id);
        }

        let status = self.wiznet.release_socket(&mut sock)?;
        debug!("Socket released: {:?}", status);
        Ok(received)
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.wiznet.deinit(&mut self.registry)?;
        info!("Device down after {} transactions", self.wiznet.ctx.transactions());
        Ok(())
    }
}

use wiznet_driver::error::DriverError;
use wiznet_driver::sim::SimulatedChip;
use wiznet_driver::wiznet::registers::{socket, Bank, SocketCommand};
use wiznet_driver::wiznet::registry::Registry;
use wiznet_driver::wiznet::{Socket, Wiznet};

mod common;
use common::*;

fn open_udp() -> (Registry, Wiznet<SimulatedChip>, Socket) {
    let (registry, mut wiznet) = device();
    let mut sock = Socket::udp(PEER, 5000);
    wiznet.open_socket(&mut sock).unwrap();
    wiznet.ctx.clear_writes();
    (registry, wiznet, sock)
}

fn payload(length: usize) -> Vec<u8> {
    (0..length).map(|n| (n % 251) as u8).collect()
}

fn commands(wiznet: &Wiznet<SimulatedChip>, id: u8) -> Vec<u8> {
    wiznet
        .ctx
        .writes()
        .iter()
        .filter(|write| write.bank == Bank::SocketRegisters(id) && write.address == socket::CR)
        .map(|write| write.data[0])
        .collect()
}

#[test]
fn send_fits_in_one_fragment() {
    let (_registry, mut wiznet, sock) = open_udp();
    let data = payload(300);

    wiznet.send(&sock, &data).unwrap();

    let writes = wiznet.ctx.tx_writes(1);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].address, 0);
    assert_eq!(writes[0].data, data);
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::TX_WR), 300);
    assert_eq!(wiznet.ctx.sent_frames(1), &[data]);
    assert_eq!(commands(&wiznet, 1), vec![SocketCommand::Send as u8]);
}

#[test]
fn send_fragments_to_free_space() {
    let (_registry, mut wiznet, sock) = open_udp();
    wiznet.ctx.set_tx_capacity(1, 100);
    let data = payload(250);

    wiznet.send(&sock, &data).unwrap();

    let writes = wiznet.ctx.tx_writes(1);
    let layout: Vec<_> = writes.iter().map(|w| (w.address, w.data.len())).collect();
    assert_eq!(layout, vec![(0, 100), (100, 100), (200, 50)]);

    let queued: Vec<u8> = writes.iter().flat_map(|w| w.data.clone()).collect();
    assert_eq!(queued, data);
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::TX_WR), 250);

    // One flush per fragment
    assert_eq!(wiznet.ctx.sent_frames(1).len(), 3);
    assert_eq!(commands(&wiznet, 1).len(), 3);
}

#[test]
fn send_wraps_write_pointer() {
    let (_registry, mut wiznet, sock) = open_udp();
    wiznet.ctx.set_tx_capacity(1, 100);
    wiznet.ctx.set_tx_pointers(1, 0xFFC0, 0xFFC0);
    let data = payload(250);

    wiznet.send(&sock, &data).unwrap();

    let offsets: Vec<_> = wiznet.ctx.tx_writes(1).iter().map(|w| w.address).collect();
    assert_eq!(offsets, vec![0xFFC0, 0x0024, 0x0088]);
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::TX_WR), 0x00BA);

    let flushed: Vec<u8> = wiznet.ctx.sent_frames(1).concat();
    assert_eq!(flushed, data);
}

#[test]
fn send_follows_free_space_changes() {
    let (_registry, mut wiznet, sock) = open_udp();
    wiznet.ctx.set_tx_capacity(1, 100);
    wiznet.ctx.schedule_tx_capacity(1, &[30, 200]);
    let data = payload(250);

    wiznet.send(&sock, &data).unwrap();

    let layout: Vec<_> = wiznet
        .ctx
        .tx_writes(1)
        .iter()
        .map(|w| (w.address, w.data.len()))
        .collect();
    assert_eq!(layout, vec![(0, 100), (100, 30), (130, 120)]);
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::TX_WR), 250);
    assert_eq!(wiznet.ctx.sent_frames(1).concat(), data);
}

#[test]
fn send_empty_is_a_no_op() {
    let (_registry, mut wiznet, sock) = open_udp();

    wiznet.send(&sock, &[]).unwrap();

    assert!(wiznet.ctx.writes().is_empty());
    assert!(wiznet.ctx.sent_frames(1).is_empty());
}

#[test]
fn mac_raw_send_uses_send_mac() {
    let (_registry, mut wiznet) = device();
    let mut raw = Socket::mac_raw([0xFF; 6]);
    wiznet.open_socket(&mut raw).unwrap();
    wiznet.ctx.clear_writes();

    wiznet.send(&raw, b"frame").unwrap();

    assert_eq!(commands(&wiznet, 0), vec![SocketCommand::SendMac as u8]);
    assert_eq!(wiznet.ctx.sent_frames(0), &[b"frame".to_vec()]);
}

#[test]
fn send_times_out_without_free_space() {
    let (_registry, mut wiznet, sock) = open_udp();
    wiznet.ctx.set_tx_capacity(1, 0);
    assert_eq!(wiznet.tx_free_size(&sock).unwrap(), 0);

    let err = wiznet.send(&sock, b"stuck").unwrap_err();

    assert!(matches!(
        err.downcast_ref::<DriverError>(),
        Some(DriverError::SendTimeout { socket: 1, .. })
    ));
    assert!(wiznet.ctx.tx_writes(1).is_empty());
}

#[test]
fn receive_nothing_pending() {
    let (_registry, mut wiznet, sock) = open_udp();
    let mut buffer = [0u8; 64];

    assert_eq!(wiznet.pending_len(&sock).unwrap(), 0);
    assert_eq!(wiznet.receive(&sock, &mut buffer).unwrap(), 0);
    assert!(commands(&wiznet, 1).is_empty());
}

#[test]
fn receive_linear_region() {
    let (_registry, mut wiznet, sock) = open_udp();
    wiznet.ctx.inject_rx(1, b"hello world");
    let mut buffer = [0u8; 64];

    assert_eq!(wiznet.pending_len(&sock).unwrap(), 11);
    assert_eq!(wiznet.receive(&sock, &mut buffer).unwrap(), 11);
    assert_eq!(&buffer[..11], b"hello world");

    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), 11);
    assert_eq!(commands(&wiznet, 1), vec![SocketCommand::Recv as u8]);
    assert_eq!(wiznet.pending_len(&sock).unwrap(), 0);
}

#[test]
fn receive_wrapped_region() {
    let (_registry, mut wiznet, sock) = open_udp();
    let data = payload(0x20);
    wiznet.ctx.fill_rx(1, 0xFFF0, &data);
    wiznet.ctx.set_rx_pointers(1, 0xFFF0, 0x0010);
    wiznet.ctx.clear_writes();
    let mut buffer = [0u8; 0x20];

    assert_eq!(wiznet.pending_len(&sock).unwrap(), 0x20);
    assert_eq!(wiznet.receive(&sock, &mut buffer).unwrap(), 0x20);
    assert_eq!(buffer.to_vec(), data);
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), 0x0010);
}

#[test]
fn receive_ending_at_top_of_buffer() {
    let (_registry, mut wiznet, sock) = open_udp();
    let data = payload(0x10);
    wiznet.ctx.fill_rx(1, 0xFFF0, &data);
    wiznet.ctx.set_rx_pointers(1, 0xFFF0, 0x0000);
    let mut buffer = [0u8; 0x10];

    assert_eq!(wiznet.receive(&sock, &mut buffer).unwrap(), 0x10);
    assert_eq!(buffer.to_vec(), data);
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), 0);
}

#[test]
fn receive_boundary_pointers() {
    let cases: [(u16, u16); 7] = [
        (0x0001, 0x0000), // Longest wrapped region
        (0x0000, 0xFFFF), // Longest linear region
        (0xFFFF, 0x0000), // Single byte at the top
        (0xFFFF, 0x0001), // One byte on each side
        (0x0000, 0x0001),
        (0x8000, 0x7FFF),
        (0x8000, 0x8000), // Nothing pending
    ];

    for (read, write) in cases {
        let (_registry, mut wiznet, sock) = open_udp();
        let length = write.wrapping_sub(read) as usize;
        let data = payload(length);
        wiznet.ctx.fill_rx(1, read, &data);
        wiznet.ctx.set_rx_pointers(1, read, write);
        let case = format!("read {:#06x} write {:#06x}", read, write);

        assert_eq!(wiznet.pending_len(&sock).unwrap(), length, "{}", case);

        if length > 0 {
            let mut short = vec![0u8; length - 1];
            assert_eq!(wiznet.receive(&sock, &mut short).unwrap(), 0, "{}", case);
            assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), read, "{}", case);
            assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_WR), write, "{}", case);
        }

        let mut buffer = vec![0u8; length];
        assert_eq!(wiznet.receive(&sock, &mut buffer).unwrap(), length, "{}", case);
        assert!(buffer == data, "{}: received bytes differ", case);
        assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), write, "{}", case);
        assert_eq!(wiznet.pending_len(&sock).unwrap(), 0, "{}", case);
    }
}

#[test]
fn receive_into_small_buffer_keeps_data() {
    let (_registry, mut wiznet, sock) = open_udp();
    wiznet.ctx.inject_rx(1, &payload(40));
    let mut buffer = [0u8; 16];

    for _ in 0..3 {
        assert_eq!(wiznet.receive(&sock, &mut buffer).unwrap(), 0);
    }
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), 0);
    assert!(commands(&wiznet, 1).is_empty());

    let mut bigger = [0u8; 64];
    assert_eq!(wiznet.receive(&sock, &mut bigger).unwrap(), 40);
    assert_eq!(bigger[..40].to_vec(), payload(40));
}

#[test]
fn receive_into_appends() {
    let (_registry, mut wiznet, sock) = open_udp();
    let mut collected = b"head:".to_vec();

    wiznet.ctx.inject_rx(1, b"first ");
    assert_eq!(wiznet.receive_into(&sock, &mut collected).unwrap(), 6);
    wiznet.ctx.inject_rx(1, b"second");
    assert_eq!(wiznet.receive_into(&sock, &mut collected).unwrap(), 6);
    assert_eq!(wiznet.receive_into(&sock, &mut collected).unwrap(), 0);

    assert_eq!(collected, b"head:first second");
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), 12);
}

#[test]
fn transfers_need_bound_socket() {
    let (_registry, mut wiznet) = device();
    let sock = Socket::udp(PEER, 5000);
    let mut buffer = [0u8; 8];

    for err in [
        wiznet.send(&sock, b"x").unwrap_err(),
        wiznet.receive(&sock, &mut buffer).unwrap_err(),
    ] {
        assert_eq!(
            err.downcast_ref::<DriverError>(),
            Some(&DriverError::SocketNotBound)
        );
    }
}

#[test]
fn receive_into_drops_data_it_could_not_acknowledge() {
    let (_registry, mut wiznet, sock) = open_udp();
    wiznet.ctx.inject_rx(1, b"reply");
    let mut collected = b"head:".to_vec();

    wiznet.ctx.reject_writes = true;
    let err = wiznet.receive_into(&sock, &mut collected).unwrap_err();
    assert!(format!("{:#}", err).contains("Simulated write failure"));
    assert_eq!(collected, b"head:");
    assert_eq!(wiznet.ctx.socket_register_u16(1, socket::RX_RD), 0);

    wiznet.ctx.reject_writes = false;
    assert_eq!(wiznet.receive_into(&sock, &mut collected).unwrap(), 5);
    assert_eq!(collected, b"head:reply");
}

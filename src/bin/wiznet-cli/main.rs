use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::Result;
use clap::ArgAction;
use clap::Parser;
use ipnet::Ipv4Net;
use log::{info, LevelFilter};
use macaddr::MacAddr6;

use wiznet_driver::wiznet::config::Config;

use crate::session::Session;

mod session;

#[derive(Parser, Debug)]
#[command(long_about = "")] // long_about required for long help, otherwise help is always short
struct Args {
    /// Ethernet address programmed into the chip
    // Default mac x2-... is in locally administered range and
    // should hopefully not conflict with anything
    #[arg(short, long, default_value_t = MacAddr6::new(0x02, 0x08, 0xDC, 0x12, 0x34, 0x56))]
    mac: MacAddr6,

    /// Address and prefix of the chip, for example --net 192.168.1.20/24
    #[arg(short, long, default_value = "192.168.1.20/24")]
    net: Ipv4Net,

    /// Default gateway
    #[arg(short, long, default_value = "192.168.1.1")]
    gateway: Ipv4Addr,

    /// UDP peer to exchange the payload with, its port is also used as source port
    #[arg(short, long, default_value = "192.168.1.50:5000")]
    peer: SocketAddrV4,

    /// Payload sent to the peer, the simulated peer echoes it back
    #[arg(long, default_value = "hello from wiznet-cli")]
    payload: String,

    /// TX buffer capacity of the simulated chip, small values force fragmentation
    #[arg(long, default_value_t = 2048)]
    tx_capacity: u16,

    /// Increase verbosity, 1 time => Debug logs, multiple times => Trace logs
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    pretty_env_logger::formatted_builder()
        .filter_level(match args.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .parse_default_env() // Overwrite from RUST_LOG env var
        .init();

    let config = Config::default()
        .with_mac(args.mac.into_array())
        .with_ip(args.net.addr())
        .with_subnet(args.net.netmask())
        .with_gateway(args.gateway);

    let mut session = Session::start(config, args.tx_capacity)?;
    let echoed = session.udp_echo(args.peer, args.payload.as_bytes())?;
    info!("Echo: {:?}", String::from_utf8_lossy(&echoed));
    session.shutdown()?;

    Ok(())
}

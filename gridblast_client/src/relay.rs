// The bridge between the interface datagrams and the server stream.
//
// Architecture: two reader threads and a central `mpsc` mailbox.
//
// - **Server reader thread**: decodes `ServerToClient` messages off the
//   TCP stream and forwards them to the main loop. Any failure on this
//   path means the authoritative stream is gone and is fatal for the whole
//   process: the error is forwarded and the loop returns it.
// - **Interface reader thread**: receives one datagram at a time, decodes
//   exactly one `InterfaceToClient` from it (trailing bytes are a protocol
//   error), and forwards valid intents. Bad datagrams are logged and
//   dropped; the interface link is best-effort.
// - **Main loop**: owns the `Projection`, the server write half, and the
//   outbound UDP socket. Snapshots go out as single datagrams; translated
//   commands go down the stream. A failed snapshot send is logged and
//   ignored, a failed command write is fatal.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use gridblast_protocol::{
    decode_datagram, encode_to_vec, read_message, write_message, CodecError, InterfaceToClient,
    ServerToClient,
};

use crate::projection::Projection;

/// Largest payload one datagram can carry (IPv6 worst case).
const MAX_DATAGRAM: usize = 65_527;

/// Configuration for starting the client relay.
pub struct ClientConfig {
    /// Name sent in the synthesized `Join`.
    pub player_name: String,
    /// Game server `host:port`.
    pub server_address: String,
    /// Interface `host:port` for outbound snapshots.
    pub gui_address: String,
    /// UDP port to bind for inbound interface intents.
    pub port: u16,
}

/// Handle for the running relay.
pub struct ClientHandle {
    thread: Option<JoinHandle<Result<()>>>,
}

impl ClientHandle {
    /// Wait for the relay loop to finish. Returns the error that stopped
    /// it, if any; a server-path failure surfaces here.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("relay thread panicked"))?,
            None => Ok(()),
        }
    }
}

enum RelayEvent {
    FromServer(ServerToClient),
    ServerClosed(CodecError),
    Intent(InterfaceToClient),
}

/// Connect to the server, bind the interface sockets, and start the relay
/// on a background thread. Returns the handle and the bound inbound UDP
/// address (useful when port 0 lets the OS pick).
pub fn start_client(config: ClientConfig) -> Result<(ClientHandle, SocketAddr)> {
    // Server stream.
    let server_addr = resolve(&config.server_address)
        .with_context(|| format!("cannot resolve server address {}", config.server_address))?;
    let stream = TcpStream::connect(server_addr)
        .with_context(|| format!("cannot connect to server at {server_addr}"))?;
    stream.set_nodelay(true).ok();

    // Interface endpoints: one socket bound for input, one resolved for
    // output.
    let udp_in = UdpSocket::bind(("::", config.port))
        .or_else(|_| UdpSocket::bind(("0.0.0.0", config.port)))
        .context("cannot bind interface input socket")?;
    let udp_in_addr = udp_in.local_addr()?;

    let gui_addr = resolve(&config.gui_address)
        .with_context(|| format!("cannot resolve interface address {}", config.gui_address))?;
    let udp_out = match gui_addr {
        SocketAddr::V4(_) => UdpSocket::bind(("0.0.0.0", 0)),
        SocketAddr::V6(_) => UdpSocket::bind(("::", 0)),
    }
    .context("cannot bind interface output socket")?;
    udp_out
        .connect(gui_addr)
        .with_context(|| format!("cannot direct interface output at {gui_addr}"))?;

    info!(server = %server_addr, interface = %gui_addr, input = %udp_in_addr, "relay connected");

    let (tx, rx) = mpsc::channel::<RelayEvent>();

    let reader_stream = stream.try_clone().context("cannot clone server stream")?;
    let tx_server = tx.clone();
    thread::spawn(move || server_reader_loop(reader_stream, tx_server));

    let tx_intents = tx;
    thread::spawn(move || interface_reader_loop(udp_in, tx_intents));

    let player_name = config.player_name;
    let thread = thread::spawn(move || {
        let mut projection = Projection::new(player_name);
        let mut server_writer = BufWriter::new(stream);
        for event in rx.iter() {
            match event {
                RelayEvent::FromServer(msg) => {
                    if let Some(snapshot) = projection.handle_server(msg) {
                        match encode_to_vec(&snapshot) {
                            Ok(bytes) if bytes.len() <= MAX_DATAGRAM => {
                                if let Err(e) = udp_out.send(&bytes) {
                                    warn!(error = %e, "snapshot datagram dropped");
                                }
                            }
                            Ok(bytes) => {
                                warn!(len = bytes.len(), "snapshot exceeds datagram limit, dropped");
                            }
                            Err(e) => {
                                warn!(error = %e, "snapshot failed to encode, dropped");
                            }
                        }
                    }
                }
                RelayEvent::Intent(intent) => {
                    if let Some(command) = projection.handle_interface(intent) {
                        write_message(&mut server_writer, &command)
                            .context("server stream write failed")?;
                    }
                }
                RelayEvent::ServerClosed(e) => {
                    return Err(e).context("server stream read failed");
                }
            }
        }
        Ok(())
    });

    Ok((
        ClientHandle {
            thread: Some(thread),
        },
        udp_in_addr,
    ))
}

fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("no usable address"))
}

/// Read the authoritative stream until it breaks.
fn server_reader_loop(stream: TcpStream, tx: Sender<RelayEvent>) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_message::<_, ServerToClient>(&mut reader) {
            Ok(msg) => {
                if tx.send(RelayEvent::FromServer(msg)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(RelayEvent::ServerClosed(e));
                break;
            }
        }
    }
}

/// Receive interface datagrams, decoding one intent per datagram.
fn interface_reader_loop(socket: UdpSocket, tx: Sender<RelayEvent>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => match decode_datagram::<InterfaceToClient>(&buf[..len]) {
                Ok(intent) => {
                    if tx.send(RelayEvent::Intent(intent)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%from, len, error = %e, "interface datagram discarded");
                }
            },
            Err(e) => {
                // Datagram receive errors are transient on this best-effort
                // link; log and keep listening.
                warn!(error = %e, "interface receive failed");
            }
        }
    }
}

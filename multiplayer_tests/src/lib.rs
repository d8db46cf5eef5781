// Test-only harness for multiplayer integration tests.
//
// Two synchronous wrappers let tests exercise the real wire:
// - `TestClient` speaks the server protocol over a real TCP stream — the
//   same codec and framing rules as the production client, with blocking,
//   timeout-guarded receive helpers.
// - `FakeInterface` stands in for the human-facing interface: a bound UDP
//   socket that sends intent datagrams at the relay and receives snapshot
//   datagrams back.
//
// All networking uses the same code paths as the live system; the only
// test-specific code is the blocking wrappers.
//
// See also: `tests/server_lifecycle.rs` and `tests/full_pipeline.rs` for
// the scenarios.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use gridblast_protocol::{
    decode_datagram, encode_to_vec, read_message, write_message, ClientToInterface,
    ClientToServer, InterfaceToClient, ServerToClient,
};

/// Default timeout for blocking receive operations.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A synchronous game client over a real TCP connection.
pub struct TestClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerToClient>,
}

impl TestClient {
    /// Connect to a server listening on `port` (loopback).
    pub fn connect(port: u16) -> Self {
        let stream =
            TcpStream::connect(("127.0.0.1", port)).expect("TestClient::connect failed");
        stream.set_nodelay(true).ok();
        let reader_stream = stream.try_clone().expect("stream clone failed");

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(reader_stream);
            while let Ok(msg) = read_message::<_, ServerToClient>(&mut reader) {
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });

        Self {
            writer: BufWriter::new(stream),
            inbox: rx,
        }
    }

    pub fn send(&mut self, msg: &ClientToServer) {
        write_message(&mut self.writer, msg).expect("send failed");
    }

    pub fn join(&mut self, name: &str) {
        self.send(&ClientToServer::Join { name: name.into() });
    }

    /// Blocking receive; panics after `RECV_TIMEOUT`.
    pub fn recv(&self) -> ServerToClient {
        self.inbox
            .recv_timeout(RECV_TIMEOUT)
            .expect("timed out waiting for a server message")
    }

    /// Collect every message that arrives within `window`.
    pub fn collect_for(&self, window: Duration) -> Vec<ServerToClient> {
        let deadline = Instant::now() + window;
        let mut messages = Vec::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.inbox.recv_timeout(deadline - now) {
                Ok(msg) => messages.push(msg),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        messages
    }

    /// Shut the connection down so the server observes the disconnect.
    pub fn disconnect(self) {
        let _ = self.writer.get_ref().shutdown(std::net::Shutdown::Both);
    }

    /// Skip forward until a `Turn` numbered at least `wanted` arrives.
    pub fn recv_until_turn(&self, wanted: u16) -> ServerToClient {
        let deadline = Instant::now() + RECV_TIMEOUT;
        loop {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for turn {wanted}"
            );
            let msg = self.recv();
            if let ServerToClient::Turn { turn, .. } = &msg {
                if *turn >= wanted {
                    return msg;
                }
            }
        }
    }
}

/// A stand-in for the human-facing interface: one UDP socket that sends
/// intents and receives snapshots.
pub struct FakeInterface {
    socket: UdpSocket,
}

impl FakeInterface {
    pub fn bind() -> Self {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).expect("FakeInterface bind failed");
        socket.set_read_timeout(Some(RECV_TIMEOUT)).ok();
        Self { socket }
    }

    /// Address the relay should push snapshots to (`--gui-address`).
    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("no local addr")
    }

    pub fn send_intent(&self, relay_port: u16, intent: &InterfaceToClient) {
        let bytes = encode_to_vec(intent).expect("intent encode failed");
        self.send_raw(relay_port, &bytes);
    }

    pub fn send_raw(&self, relay_port: u16, bytes: &[u8]) {
        self.socket
            .send_to(bytes, ("127.0.0.1", relay_port))
            .expect("datagram send failed");
    }

    /// Blocking snapshot receive; panics on timeout or a malformed
    /// datagram (the relay must never emit one).
    pub fn recv_snapshot(&self) -> ClientToInterface {
        let mut buf = vec![0u8; 65_527];
        let (len, _) = self
            .socket
            .recv_from(&mut buf)
            .expect("timed out waiting for a snapshot");
        decode_datagram(&buf[..len]).expect("relay sent a malformed snapshot")
    }

    /// Non-panicking receive bounded by `window`; `None` when nothing
    /// arrives in time.
    pub fn try_recv_snapshot(&self, window: Duration) -> Option<ClientToInterface> {
        self.socket.set_read_timeout(Some(window)).ok();
        let mut buf = vec![0u8; 65_527];
        let result = self
            .socket
            .recv_from(&mut buf)
            .ok()
            .map(|(len, _)| decode_datagram(&buf[..len]).expect("relay sent a malformed snapshot"));
        self.socket.set_read_timeout(Some(RECV_TIMEOUT)).ok();
        result
    }

    /// Receive snapshots until `pred` matches one, panicking after
    /// `RECV_TIMEOUT` overall.
    pub fn recv_snapshot_until<F>(&self, mut pred: F) -> ClientToInterface
    where
        F: FnMut(&ClientToInterface) -> bool,
    {
        let deadline = Instant::now() + RECV_TIMEOUT;
        loop {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for a matching snapshot"
            );
            let snapshot = self.recv_snapshot();
            if pred(&snapshot) {
                return snapshot;
            }
        }
    }
}

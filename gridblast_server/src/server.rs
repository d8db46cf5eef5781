// TCP server and main event loop.
//
// Architecture: thread-per-connection readers and writers with a central
// `mpsc` mailbox.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   streams and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per connection): decode `ClientToServer`
//   messages straight off the stream (the codec is self-delimiting, so
//   there is no outer framing step) and send `InternalEvent::MessageFrom`.
//   On any read or decode failure they send `InternalEvent::Disconnected`.
// - **Writer threads** (one per connection): drain that connection's
//   outbound FIFO channel, encoding and writing each message whole. A slow
//   or stalled client therefore backs up only its own queue, never the
//   engine or the other clients.
// - **Main thread**: owns the `Engine` and the connection table. It is the
//   only code that mutates game state and the only code that enqueues
//   outbound messages, so every client observes the same totally-ordered
//   broadcast sequence. The turn timer is `recv_timeout` against an
//   absolute deadline; the deadline is checked before each receive so a
//   busy mailbox cannot starve the tick cadence.
//
// A connection failure affects only that connection: its queue is dropped
// and its robot simply stops receiving commands. The engine never removes
// a player mid-game.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use gridblast_protocol::{read_message, write_message, ClientToServer, PlayerId, ServerToClient};

use crate::engine::{Engine, Settings};

/// Most concurrent TCP streams the server will hold open.
const MAX_CLIENTS: usize = 25;

/// How long the accept loop sleeps between polls of a quiet listener.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

type ConnId = u64;

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
        addr: SocketAddr,
    },
    MessageFrom {
        conn: ConnId,
        message: ClientToServer,
    },
    Disconnected {
        conn: ConnId,
    },
}

/// Per-connection state owned by the main thread.
struct Connection {
    addr: SocketAddr,
    outbound: Sender<ServerToClient>,
    player: Option<PlayerId>,
}

/// Configuration for starting a game server.
pub struct ServerConfig {
    pub settings: Settings,
    pub port: u16,
    pub turn_duration: Duration,
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for the main loop to exit.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }

    /// Block until the main loop exits on its own.
    pub fn join(mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Start the game server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used to
/// let the OS pick a free port).
pub fn start_server(config: ServerConfig) -> std::io::Result<(ServerHandle, SocketAddr)> {
    let listener = bind_listener(config.port)?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::spawn(move || {
        run_server(listener, config, keep_running_clone);
    });

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Bind the listening socket, preferring the IPv6 wildcard (dual-stack
/// where the platform maps IPv4 peers onto it) and falling back to IPv4.
fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("::", port)).or_else(|_| TcpListener::bind(("0.0.0.0", port)))
}

/// Main server loop. Runs until `keep_running` is set to false.
fn run_server(listener: TcpListener, config: ServerConfig, keep_running: Arc<AtomicBool>) {
    let mut engine = Engine::new(config.settings);

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking accepts so the listener thread can notice shutdown.
    listener.set_nonblocking(true).ok();
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream, addr });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(_) => break,
            }
        }
    });

    let mut conns: BTreeMap<ConnId, Connection> = BTreeMap::new();
    let mut next_conn_id: ConnId = 0;
    let mut next_tick = Instant::now() + config.turn_duration;

    while keep_running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= next_tick {
            for msg in engine.on_tick() {
                let game_over = matches!(msg, ServerToClient::GameEnded { .. });
                broadcast(&mut conns, &msg);
                if game_over {
                    // Fresh lobby: every connection may join again.
                    for connection in conns.values_mut() {
                        connection.player = None;
                    }
                }
            }
            next_tick += config.turn_duration;
            continue;
        }

        match rx.recv_timeout(next_tick - now) {
            Ok(event) => handle_event(&mut engine, &mut conns, &mut next_conn_id, event, &tx),
            Err(RecvTimeoutError::Timeout) => {
                // Deadline reached with an empty mailbox; the tick fires at
                // the top of the loop.
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("server loop stopped");
    // Dropping the connection table closes every outbound channel, which
    // ends the writer threads.
    conns.clear();
}

/// Dispatch a single event on the main thread.
fn handle_event(
    engine: &mut Engine,
    conns: &mut BTreeMap<ConnId, Connection>,
    next_conn_id: &mut ConnId,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
) {
    match event {
        InternalEvent::NewConnection { stream, addr } => {
            handle_new_connection(engine, conns, next_conn_id, stream, addr, tx);
        }
        InternalEvent::MessageFrom { conn, message } => {
            handle_message(engine, conns, conn, message);
        }
        InternalEvent::Disconnected { conn } => {
            if conns.remove(&conn).is_some() {
                info!(conn, "connection closed");
            }
            // The player's robot stays in the game; it just stops
            // submitting commands.
        }
    }
}

/// Register a new connection: spawn its reader and writer threads and
/// queue the handshake plus whatever catch-up the current phase requires.
fn handle_new_connection(
    engine: &mut Engine,
    conns: &mut BTreeMap<ConnId, Connection>,
    next_conn_id: &mut ConnId,
    stream: TcpStream,
    addr: SocketAddr,
    tx: &Sender<InternalEvent>,
) {
    if conns.len() >= MAX_CLIENTS {
        warn!(%addr, "connection limit reached, refusing stream");
        return;
    }
    stream.set_nodelay(true).ok();

    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(%addr, error = %e, "failed to clone stream");
            return;
        }
    };

    let conn = *next_conn_id;
    *next_conn_id += 1;

    let (out_tx, out_rx) = mpsc::channel::<ServerToClient>();

    let tx_reader = tx.clone();
    thread::spawn(move || reader_loop(reader_stream, conn, tx_reader));
    thread::spawn(move || writer_loop(stream, out_rx));

    // Hello first, then catch-up, all enqueued before this connection can
    // observe any live broadcast: the main thread is the only enqueuer, so
    // replayed turns always precede live ones.
    let _ = out_tx.send(engine.hello());
    for msg in engine.catch_up() {
        let _ = out_tx.send(msg);
    }

    info!(conn, %addr, "connection accepted");
    conns.insert(
        conn,
        Connection {
            addr,
            outbound: out_tx,
            player: None,
        },
    );
}

/// Apply one decoded client message.
fn handle_message(
    engine: &mut Engine,
    conns: &mut BTreeMap<ConnId, Connection>,
    conn: ConnId,
    message: ClientToServer,
) {
    let Some(connection) = conns.get(&conn) else {
        return;
    };
    match message {
        ClientToServer::Join { name } => {
            if connection.player.is_some() {
                // Already admitted; a second Join is noise.
                return;
            }
            let address = connection.addr.to_string();
            if let Some((id, accepted)) = engine.try_join(name, address) {
                if let Some(connection) = conns.get_mut(&conn) {
                    connection.player = Some(id);
                }
                broadcast(conns, &accepted);
            } else {
                debug!(conn, "join ignored (game running or lobby full)");
            }
        }
        command => {
            if let Some(player) = connection.player {
                engine.submit(player, command);
            } else {
                debug!(conn, "command from non-admitted connection discarded");
            }
        }
    }
}

/// Enqueue a message to every connection in id order. Connections whose
/// writer is gone are dropped here.
fn broadcast(conns: &mut BTreeMap<ConnId, Connection>, msg: &ServerToClient) {
    let mut dead = Vec::new();
    for (conn, connection) in conns.iter() {
        if connection.outbound.send(msg.clone()).is_err() {
            dead.push(*conn);
        }
    }
    for conn in dead {
        conns.remove(&conn);
        info!(conn, "dropped connection with closed writer");
    }
}

/// Reader loop for a single connection. Runs in its own thread.
fn reader_loop(stream: TcpStream, conn: ConnId, tx: Sender<InternalEvent>) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_message::<_, ClientToServer>(&mut reader) {
            Ok(message) => {
                if tx.send(InternalEvent::MessageFrom { conn, message }).is_err() {
                    break;
                }
            }
            Err(_) => {
                // Read failure, EOF, or malformed bytes: either way this
                // connection is done.
                let _ = tx.send(InternalEvent::Disconnected { conn });
                break;
            }
        }
    }
}

/// Writer loop for a single connection: drain the FIFO until the channel
/// closes or the peer breaks.
fn writer_loop(stream: TcpStream, rx: Receiver<ServerToClient>) {
    let mut writer = std::io::BufWriter::new(stream);
    for msg in rx.iter() {
        if write_message(&mut writer, &msg).is_err() {
            break;
        }
    }
}

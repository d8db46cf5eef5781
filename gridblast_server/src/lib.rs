// gridblast_server — the authoritative game server.
//
// The server admits a fixed number of players into a lobby, then drives the
// game in fixed-duration turns: it simulates movement, bomb timers,
// explosions, respawns, and scoring, and broadcasts a totally-ordered event
// log to every connected client, replaying history to late connections.
//
// Module overview:
// - `engine.rs`: Lobby/Active lifecycle, deterministic turn simulation,
//                and the catch-up log. Pure state machine, no sockets.
// - `server.rs`: TCP listener, per-connection reader/writer threads, and
//                the single-writer main loop with the turn timer.
// - `rng.rs`:    The pinned minstd generator behind every random placement.
//
// The binary entry point (`main.rs`) owns CLI parsing and logging setup.

pub mod engine;
pub mod rng;
pub mod server;

pub use engine::{Engine, Settings};
pub use server::{start_server, ServerConfig, ServerHandle};

/// Install the process-wide tracing subscriber. Safe to call more than
/// once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

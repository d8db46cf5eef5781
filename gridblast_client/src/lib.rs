// gridblast_client — the relay between a human-facing interface and the
// game server.
//
// The client speaks two protocols at once: it holds one TCP stream to the
// authoritative server and exchanges single-message datagrams with the
// interface. Inbound intents become server commands (the first one in a
// lobby becomes the `Join`); the inbound broadcast stream is folded into a
// projection of game state and pushed back to the interface as complete
// `Lobby`/`Game` snapshots, one per server message that warrants it.
//
// Module overview:
// - `projection.rs`: The state projection — event folding, pending-bomb
//                    timers, client-side explosion re-derivation, intent
//                    translation. Pure, no sockets.
// - `relay.rs`:      The bridge loop — reader threads for both links, the
//                    central mailbox, and the fatal-vs-best-effort error
//                    split between the server and interface paths.
//
// The binary entry point (`main.rs`) owns CLI parsing and logging setup.

pub mod projection;
pub mod relay;

pub use projection::Projection;
pub use relay::{start_client, ClientConfig, ClientHandle};

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

// CLI entry point for the gridblast game server.
//
// Parses the game settings, binds the listening socket, and runs the
// server until the process is killed. Signal handling is deliberately left
// to the default dispositions; there is no graceful drain.

use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::info;

use gridblast_server::{init_tracing, start_server, ServerConfig, Settings};

#[derive(Debug, Parser)]
#[command(name = "gridblast-server", about = "Turn-based bomb-game server")]
struct Args {
    /// Turns from bomb placement until detonation.
    #[arg(short = 'b', long = "bomb-timer")]
    bomb_timer: u16,

    /// Exact number of players needed to start a game (1..=255).
    #[arg(short = 'c', long = "players-count", value_parser = parse_players_count)]
    players_count: u8,

    /// Milliseconds between turn ticks.
    #[arg(short = 'd', long = "turn-duration")]
    turn_duration: u64,

    /// Explosion ray length in cells.
    #[arg(short = 'e', long = "explosion-radius")]
    explosion_radius: u16,

    /// Number of random blocks placed at turn 0.
    #[arg(short = 'k', long = "initial-blocks")]
    initial_blocks: u16,

    /// Number of turns to simulate after turn 0.
    #[arg(short = 'l', long = "game-length")]
    game_length: u16,

    /// Name broadcast to every client in the handshake.
    #[arg(short = 'n', long = "server-name", value_parser = parse_wire_string)]
    server_name: String,

    /// TCP listening port.
    #[arg(short = 'p', long = "port")]
    port: u16,

    /// RNG seed; derived from the wall clock when absent.
    #[arg(short = 's', long = "seed")]
    seed: Option<u32>,

    /// Board width in cells.
    #[arg(short = 'x', long = "size-x", value_parser = parse_board_size)]
    size_x: u16,

    /// Board height in cells.
    #[arg(short = 'y', long = "size-y", value_parser = parse_board_size)]
    size_y: u16,
}

/// The player count travels as a u8 on the wire; reject anything the wire
/// cannot carry, and zero, which could never fill a lobby.
fn parse_players_count(arg: &str) -> Result<u8, String> {
    let value: u16 = arg.parse().map_err(|_| "not a number".to_string())?;
    if value == 0 {
        return Err("must be at least 1".into());
    }
    u8::try_from(value).map_err(|_| "must be at most 255".into())
}

/// Strings are length-prefixed with a single byte on the wire.
fn parse_wire_string(arg: &str) -> Result<String, String> {
    if arg.len() > 255 {
        return Err(format!("{} bytes is over the 255-byte limit", arg.len()));
    }
    Ok(arg.to_string())
}

fn parse_board_size(arg: &str) -> Result<u16, String> {
    let value: u16 = arg.parse().map_err(|_| "not a number".to_string())?;
    if value == 0 {
        return Err("board dimensions must be at least 1".into());
    }
    Ok(value)
}

fn main() {
    init_tracing();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("{e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let seed = args.seed.unwrap_or_else(wall_clock_seed);
    let settings = Settings {
        server_name: args.server_name,
        players_count: args.players_count,
        size_x: args.size_x,
        size_y: args.size_y,
        game_length: args.game_length,
        explosion_radius: args.explosion_radius,
        bomb_timer: args.bomb_timer,
        initial_blocks: args.initial_blocks,
        seed,
    };
    let config = ServerConfig {
        settings,
        port: args.port,
        turn_duration: Duration::from_millis(args.turn_duration),
    };

    let (handle, addr) = start_server(config).context("failed to bind listening socket")?;
    info!(%addr, seed, "server listening");

    // Runs until the process is killed.
    handle.join();
    Ok(())
}

fn wall_clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(1)
}

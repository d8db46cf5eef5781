// CLI entry point for the gridblast client relay.
//
// Parses addresses and the player name, connects to the game server, and
// bridges interface datagrams until the server stream breaks or the
// process is killed.

use std::process;

use clap::error::ErrorKind;
use clap::Parser;

use gridblast_client::{init_tracing, start_client, ClientConfig};

#[derive(Debug, Parser)]
#[command(name = "gridblast-client", about = "Relay between interface and game server")]
struct Args {
    /// Interface address (`host:port`) for outbound snapshots.
    #[arg(short = 'd', long = "gui-address")]
    gui_address: String,

    /// Player name sent when joining.
    #[arg(short = 'n', long = "player-name", value_parser = parse_wire_string)]
    player_name: String,

    /// UDP port to bind for inbound interface intents.
    #[arg(short = 'p', long = "port")]
    port: u16,

    /// Game server address (`host:port`).
    #[arg(short = 's', long = "server-address")]
    server_address: String,
}

/// Strings are length-prefixed with a single byte on the wire.
fn parse_wire_string(arg: &str) -> Result<String, String> {
    if arg.len() > 255 {
        return Err(format!("{} bytes is over the 255-byte limit", arg.len()));
    }
    Ok(arg.to_string())
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

    let config = ClientConfig {
        player_name: args.player_name,
        server_address: args.server_address,
        gui_address: args.gui_address,
        port: args.port,
    };

    let result = start_client(config).and_then(|(handle, _)| handle.join());
    if let Err(e) = result {
        eprintln!("{e:#}");
        process::exit(1);
    }
}

// Projection of the authoritative server stream into renderable snapshots.
//
// `Projection` is the client's model of the game. It consumes the
// `ServerToClient` broadcast in order and produces at most one
// `ClientToInterface` snapshot per incoming message; it also turns
// interface intents into `ClientToServer` commands, synthesizing the
// initial `Join`. All mutation happens from the relay's single-threaded
// main loop — no internal locking.
//
// Two derivations go beyond simple bookkeeping:
// - **Pending bomb timers.** The server never sends a bomb's remaining
//   timer, so the client records `bomb_timer` from the handshake when it
//   sees `BombPlaced` and counts down once per received turn.
// - **Explosion cells.** `BombExploded` enumerates destroyed robots and
//   blocks but not the full blast area, so the client re-derives the cell
//   set geometrically from the bomb's recorded position, the handshake's
//   `explosion_radius`, and its own block projection at the moment the
//   event is folded. Destroyed blocks are applied only after the whole
//   event list, matching the server's pass structure.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use gridblast_protocol::{
    Bomb, BombId, ClientToInterface, ClientToServer, Direction, Event, InterfaceToClient, Player,
    PlayerId, Position, Score, ServerToClient,
};

/// Settings captured from the server's `Hello`.
#[derive(Clone, Debug)]
struct HelloInfo {
    server_name: String,
    players_count: u8,
    size_x: u16,
    size_y: u16,
    game_length: u16,
    explosion_radius: u16,
    bomb_timer: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Connected, nothing known yet. No snapshot leaves in this phase.
    AwaitingHello,
    Lobby,
    Game,
}

/// The client's reconstruction of server state, plus local derivations.
pub struct Projection {
    player_name: String,
    phase: Phase,
    hello: Option<HelloInfo>,
    join_sent: bool,
    turn: u16,
    players: BTreeMap<PlayerId, Player>,
    positions: BTreeMap<PlayerId, Position>,
    blocks: BTreeSet<Position>,
    bombs: BTreeMap<BombId, Bomb>,
    explosions: BTreeSet<Position>,
    scores: BTreeMap<PlayerId, Score>,
}

impl Projection {
    pub fn new(player_name: String) -> Self {
        Self {
            player_name,
            phase: Phase::AwaitingHello,
            hello: None,
            join_sent: false,
            turn: 0,
            players: BTreeMap::new(),
            positions: BTreeMap::new(),
            blocks: BTreeSet::new(),
            bombs: BTreeMap::new(),
            explosions: BTreeSet::new(),
            scores: BTreeMap::new(),
        }
    }

    /// Fold one server message into the projection. Returns the snapshot to
    /// push to the interface, if this message warrants one.
    pub fn handle_server(&mut self, msg: ServerToClient) -> Option<ClientToInterface> {
        match msg {
            ServerToClient::Hello {
                server_name,
                players_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
            } => {
                if self.phase != Phase::AwaitingHello {
                    return None;
                }
                self.hello = Some(HelloInfo {
                    server_name,
                    players_count,
                    size_x,
                    size_y,
                    game_length,
                    explosion_radius,
                    bomb_timer,
                });
                self.phase = Phase::Lobby;
                self.lobby_snapshot()
            }
            ServerToClient::AcceptedPlayer { id, player } => {
                if self.phase != Phase::Lobby {
                    return None;
                }
                self.players.insert(id, player);
                self.scores.insert(id, 0);
                self.lobby_snapshot()
            }
            ServerToClient::GameStarted { players } => {
                if self.phase == Phase::Game {
                    return None;
                }
                self.positions.clear();
                self.blocks.clear();
                self.bombs.clear();
                self.explosions.clear();
                self.scores = players.keys().map(|id| (*id, 0)).collect();
                self.players = players;
                self.turn = 0;
                self.phase = Phase::Game;
                self.join_sent = false;
                None
            }
            ServerToClient::Turn { turn, events } => {
                if self.phase != Phase::Game {
                    return None;
                }
                self.fold_turn(turn, events);
                self.game_snapshot()
            }
            ServerToClient::GameEnded { scores } => {
                if self.phase != Phase::Game {
                    return None;
                }
                debug!(?scores, "game over");
                self.reset_to_lobby();
                self.lobby_snapshot()
            }
        }
    }

    /// Translate one interface intent. Returns the command to send to the
    /// server, if any: the first intent in the lobby becomes `Join`, intents
    /// during a game translate directly, everything else is dropped.
    pub fn handle_interface(&mut self, intent: InterfaceToClient) -> Option<ClientToServer> {
        match self.phase {
            Phase::AwaitingHello => None,
            Phase::Lobby => {
                if self.join_sent {
                    return None;
                }
                self.join_sent = true;
                Some(ClientToServer::Join {
                    name: self.player_name.clone(),
                })
            }
            Phase::Game => Some(match intent {
                InterfaceToClient::PlaceBomb => ClientToServer::PlaceBomb,
                InterfaceToClient::PlaceBlock => ClientToServer::PlaceBlock,
                InterfaceToClient::Move { direction } => ClientToServer::Move { direction },
            }),
        }
    }

    fn fold_turn(&mut self, turn: u16, events: Vec<Event>) {
        let (radius, size_x, size_y, bomb_timer) = match &self.hello {
            Some(h) => (h.explosion_radius, h.size_x, h.size_y, h.bomb_timer),
            None => return,
        };

        // Every tracked bomb is one turn closer to detonation.
        for bomb in self.bombs.values_mut() {
            bomb.timer = bomb.timer.saturating_sub(1);
        }

        self.explosions.clear();
        let mut destroyed_robots: BTreeSet<PlayerId> = BTreeSet::new();
        let mut destroyed_blocks: BTreeSet<Position> = BTreeSet::new();

        for event in events {
            match event {
                Event::BombPlaced { id, position } => {
                    self.bombs.insert(
                        id,
                        Bomb {
                            position,
                            timer: bomb_timer,
                        },
                    );
                }
                Event::BombExploded {
                    id,
                    robots_destroyed,
                    blocks_destroyed,
                } => {
                    if let Some(bomb) = self.bombs.remove(&id) {
                        self.explosions.extend(explosion_cells(
                            bomb.position,
                            radius,
                            size_x,
                            size_y,
                            &self.blocks,
                        ));
                    }
                    destroyed_robots.extend(robots_destroyed);
                    destroyed_blocks.extend(blocks_destroyed);
                }
                Event::PlayerMoved { id, position } => {
                    self.positions.insert(id, position);
                }
                Event::BlockPlaced { position } => {
                    self.blocks.insert(position);
                }
            }
        }

        for block in &destroyed_blocks {
            self.blocks.remove(block);
        }
        for robot in destroyed_robots {
            if let Some(score) = self.scores.get_mut(&robot) {
                *score += 1;
            }
        }
        self.turn = turn;
    }

    fn reset_to_lobby(&mut self) {
        self.phase = Phase::Lobby;
        self.join_sent = false;
        self.turn = 0;
        self.players.clear();
        self.positions.clear();
        self.blocks.clear();
        self.bombs.clear();
        self.explosions.clear();
        self.scores.clear();
    }

    fn lobby_snapshot(&self) -> Option<ClientToInterface> {
        let hello = self.hello.as_ref()?;
        Some(ClientToInterface::Lobby {
            server_name: hello.server_name.clone(),
            players_count: hello.players_count,
            size_x: hello.size_x,
            size_y: hello.size_y,
            game_length: hello.game_length,
            explosion_radius: hello.explosion_radius,
            bomb_timer: hello.bomb_timer,
            players: self.players.clone(),
        })
    }

    fn game_snapshot(&self) -> Option<ClientToInterface> {
        let hello = self.hello.as_ref()?;
        Some(ClientToInterface::Game {
            server_name: hello.server_name.clone(),
            size_x: hello.size_x,
            size_y: hello.size_y,
            game_length: hello.game_length,
            turn: self.turn,
            players: self.players.clone(),
            player_positions: self.positions.clone(),
            blocks: self.blocks.iter().copied().collect(),
            bombs: self.bombs.values().copied().collect(),
            explosions: self.explosions.iter().copied().collect(),
            scores: self.scores.clone(),
        })
    }
}

/// The cells a bomb at `origin` reaches: its own cell plus four
/// independent rays of up to `radius` cells, each absorbed by the first
/// block it meets. A block on the bomb's own cell does not suppress the
/// rays. Same geometry as the server's explosion pass.
fn explosion_cells(
    origin: Position,
    radius: u16,
    size_x: u16,
    size_y: u16,
    blocks: &BTreeSet<Position>,
) -> Vec<Position> {
    let mut cells = vec![origin];
    for direction in Direction::ALL {
        let mut cell = origin;
        for _ in 0..radius {
            match cell.step(direction, size_x, size_y) {
                Some(next) => cell = next,
                None => break,
            }
            cells.push(cell);
            if blocks.contains(&cell) {
                break;
            }
        }
    }
    cells
}

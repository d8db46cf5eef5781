// Game engine: lobby admission, turn simulation, and the broadcast log.
//
// `Engine` is the central data structure that `server.rs` drives. It owns
// the whole game state — roster, robot positions, bombs, blocks, scores,
// pending commands, the replay log — and is mutated only from the server's
// single-threaded main loop, so it needs no internal locking. It touches no
// sockets: inputs arrive through `try_join`/`submit`/`on_tick`, outputs are
// returned as broadcast message lists. That keeps the simulation a pure
// function of `(settings, seed, command sequence)` and makes determinism
// directly testable.
//
// Lifecycle: Lobby → Active → (Ended) → Lobby. The lobby fills through
// `try_join`; the game starts on the first tick after the roster is
// complete. Turn 0 is the initialization turn (robot spawns and initial
// blocks); each subsequent tick simulates one turn; after the turn numbered
// `game_length` is broadcast, `GameEnded` follows and every per-game
// counter resets for the next lobby.
//
// Turn simulation order (normative for the event log):
// 1. Bomb pass — every bomb in ascending id order ticks down; due bombs
//    explode against the robot and block state as it stood at the start of
//    the pass. Destroyed blocks are removed only after the pass, so two
//    explosions in the same turn cannot shadow each other.
// 2. Action pass — every admitted player in ascending id order: destroyed
//    robots respawn (score +1, queued command dropped); everyone else gets
//    their latest queued command applied. Queued commands are cleared at
//    turn end whether or not they applied.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use tracing::{debug, info};

use gridblast_protocol::{
    Bomb, BombId, ClientToServer, Direction, Event, Player, PlayerId, Position, Score,
    ServerToClient,
};

use crate::rng::Minstd;

/// Game parameters, fixed for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct Settings {
    pub server_name: String,
    pub players_count: u8,
    pub size_x: u16,
    pub size_y: u16,
    pub game_length: u16,
    pub explosion_radius: u16,
    pub bomb_timer: u16,
    pub initial_blocks: u16,
    pub seed: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Lobby,
    Active,
}

/// The authoritative game state machine.
pub struct Engine {
    settings: Settings,
    rng: Minstd,
    phase: Phase,
    turn: u16,
    players: BTreeMap<PlayerId, Player>,
    positions: BTreeMap<PlayerId, Position>,
    scores: BTreeMap<PlayerId, Score>,
    bombs: BTreeMap<BombId, Bomb>,
    blocks: BTreeSet<Position>,
    pending: BTreeMap<PlayerId, ClientToServer>,
    next_player_id: u8,
    next_bomb_id: u32,
    // Catch-up logs for late connections: admissions while in the lobby,
    // turns while a game is running.
    accepted_log: Vec<ServerToClient>,
    turn_log: Vec<ServerToClient>,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        let rng = Minstd::new(settings.seed);
        Self {
            settings,
            rng,
            phase: Phase::Lobby,
            turn: 0,
            players: BTreeMap::new(),
            positions: BTreeMap::new(),
            scores: BTreeMap::new(),
            bombs: BTreeMap::new(),
            blocks: BTreeSet::new(),
            pending: BTreeMap::new(),
            next_player_id: 0,
            next_bomb_id: 0,
            accepted_log: Vec::new(),
            turn_log: Vec::new(),
        }
    }

    /// The settings message every connection receives first.
    pub fn hello(&self) -> ServerToClient {
        ServerToClient::Hello {
            server_name: self.settings.server_name.clone(),
            players_count: self.settings.players_count,
            size_x: self.settings.size_x,
            size_y: self.settings.size_y,
            game_length: self.settings.game_length,
            explosion_radius: self.settings.explosion_radius,
            bomb_timer: self.settings.bomb_timer,
        }
    }

    /// Everything a just-connected client must receive after `Hello` to be
    /// in sync: prior admissions while the lobby is open, or the game start
    /// plus every turn broadcast so far while a game is running.
    pub fn catch_up(&self) -> Vec<ServerToClient> {
        match self.phase {
            Phase::Lobby => self.accepted_log.clone(),
            Phase::Active => {
                let mut msgs = Vec::with_capacity(1 + self.turn_log.len());
                msgs.push(ServerToClient::GameStarted {
                    players: self.players.clone(),
                });
                msgs.extend(self.turn_log.iter().cloned());
                msgs
            }
        }
    }

    /// Admit a player to the lobby. Returns the assigned id and the
    /// `AcceptedPlayer` broadcast on success; `None` while a game is
    /// running or once the lobby is full.
    pub fn try_join(
        &mut self,
        name: String,
        address: String,
    ) -> Option<(PlayerId, ServerToClient)> {
        if self.phase != Phase::Lobby {
            return None;
        }
        if self.players.len() >= usize::from(self.settings.players_count) {
            return None;
        }
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        let player = Player { name, address };
        info!(id = id.0, name = %player.name, "player admitted");
        self.players.insert(id, player.clone());
        let msg = ServerToClient::AcceptedPlayer { id, player };
        self.accepted_log.push(msg.clone());
        Some((id, msg))
    }

    /// Record a player's latest command for the next turn. Only the most
    /// recent command per player survives; `Join` is never a game command.
    pub fn submit(&mut self, player: PlayerId, command: ClientToServer) {
        if self.phase != Phase::Active {
            return;
        }
        if matches!(command, ClientToServer::Join { .. }) {
            return;
        }
        if self.players.contains_key(&player) {
            self.pending.insert(player, command);
        }
    }

    /// Advance one turn tick. Returns the broadcasts this tick produced:
    /// nothing while the lobby is filling; `GameStarted` + turn 0 (+
    /// `GameEnded` for a zero-length game) when the roster completes; one
    /// `Turn` (+ `GameEnded` after the final turn) while running.
    pub fn on_tick(&mut self) -> Vec<ServerToClient> {
        match self.phase {
            Phase::Lobby => {
                if self.players.len() < usize::from(self.settings.players_count)
                    || self.players.is_empty()
                {
                    return Vec::new();
                }
                self.start_game()
            }
            Phase::Active => {
                self.turn += 1;
                let events = self.simulate_turn();
                let turn_msg = ServerToClient::Turn {
                    turn: self.turn,
                    events,
                };
                self.turn_log.push(turn_msg.clone());
                let mut msgs = vec![turn_msg];
                if self.turn >= self.settings.game_length {
                    msgs.push(self.end_game());
                }
                msgs
            }
        }
    }

    fn start_game(&mut self) -> Vec<ServerToClient> {
        info!(players = self.players.len(), "lobby full, starting game");
        self.phase = Phase::Active;
        self.turn = 0;

        let mut events = Vec::new();
        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            let position = self.random_position();
            self.positions.insert(id, position);
            self.scores.insert(id, 0);
            events.push(Event::PlayerMoved { id, position });
        }
        for _ in 0..self.settings.initial_blocks {
            let position = self.random_position();
            if self.blocks.insert(position) {
                events.push(Event::BlockPlaced { position });
            }
        }

        let started = ServerToClient::GameStarted {
            players: self.players.clone(),
        };
        let turn0 = ServerToClient::Turn { turn: 0, events };
        self.turn_log.push(turn0.clone());
        let mut msgs = vec![started, turn0];
        if self.settings.game_length == 0 {
            msgs.push(self.end_game());
        }
        msgs
    }

    fn simulate_turn(&mut self) -> Vec<Event> {
        let mut events = Vec::new();

        // Bomb pass. Timers tick down with saturation so a zero bomb_timer
        // detonates on the next turn instead of wrapping.
        let mut due = Vec::new();
        for (id, bomb) in self.bombs.iter_mut() {
            bomb.timer = bomb.timer.saturating_sub(1);
            if bomb.timer == 0 {
                due.push((*id, bomb.position));
            }
        }

        let mut destroyed_robots: BTreeSet<PlayerId> = BTreeSet::new();
        let mut destroyed_blocks: BTreeSet<Position> = BTreeSet::new();
        for (id, origin) in due {
            let (robots, blocks_hit) = self.explode(origin);
            debug!(bomb = id.0, robots = robots.len(), blocks = blocks_hit.len(), "bomb exploded");
            destroyed_robots.extend(robots.iter().copied());
            destroyed_blocks.extend(blocks_hit.iter().copied());
            events.push(Event::BombExploded {
                id,
                robots_destroyed: robots,
                blocks_destroyed: blocks_hit,
            });
            self.bombs.remove(&id);
        }
        for block in &destroyed_blocks {
            self.blocks.remove(block);
        }

        // Action pass.
        let pending = mem::take(&mut self.pending);
        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            if destroyed_robots.contains(&id) {
                let position = self.random_position();
                self.positions.insert(id, position);
                if let Some(score) = self.scores.get_mut(&id) {
                    *score += 1;
                }
                events.push(Event::PlayerMoved { id, position });
                continue;
            }
            let Some(command) = pending.get(&id) else {
                continue;
            };
            let Some(current) = self.positions.get(&id).copied() else {
                continue;
            };
            match command {
                ClientToServer::Move { direction } => {
                    let next = current.step(*direction, self.settings.size_x, self.settings.size_y);
                    if let Some(position) = next {
                        if !self.blocks.contains(&position) {
                            self.positions.insert(id, position);
                            events.push(Event::PlayerMoved { id, position });
                        }
                    }
                }
                ClientToServer::PlaceBomb => {
                    let bomb_id = BombId(self.next_bomb_id);
                    self.next_bomb_id += 1;
                    self.bombs.insert(
                        bomb_id,
                        Bomb {
                            position: current,
                            timer: self.settings.bomb_timer,
                        },
                    );
                    events.push(Event::BombPlaced {
                        id: bomb_id,
                        position: current,
                    });
                }
                ClientToServer::PlaceBlock => {
                    if self.blocks.insert(current) {
                        events.push(Event::BlockPlaced { position: current });
                    }
                }
                ClientToServer::Join { .. } => {}
            }
        }

        events
    }

    /// Explosion geometry: the bomb's own cell plus four independent rays,
    /// each up to `explosion_radius` cells. A block absorbs the ray it sits
    /// on (and is destroyed); robots are destroyed but do not stop it. The
    /// bomb's own cell is checked like any ray cell but never halts the
    /// rays. Cells are visited center-first, then rays in
    /// direction-discriminant order, and robots at a cell are listed in
    /// ascending id order, so the event payload is deterministic.
    fn explode(&self, origin: Position) -> (Vec<PlayerId>, Vec<Position>) {
        let mut robots = Vec::new();
        let mut blocks_hit = Vec::new();

        self.scan_cell(origin, &mut robots, &mut blocks_hit);
        for direction in Direction::ALL {
            let mut cell = origin;
            for _ in 0..self.settings.explosion_radius {
                match cell.step(direction, self.settings.size_x, self.settings.size_y) {
                    Some(next) => cell = next,
                    None => break,
                }
                if self.scan_cell(cell, &mut robots, &mut blocks_hit) {
                    break;
                }
            }
        }

        (robots, blocks_hit)
    }

    /// Record robots and blocks hit at `cell`; true if a block stops the ray.
    fn scan_cell(
        &self,
        cell: Position,
        robots: &mut Vec<PlayerId>,
        blocks_hit: &mut Vec<Position>,
    ) -> bool {
        for (id, position) in &self.positions {
            if *position == cell {
                robots.push(*id);
            }
        }
        if self.blocks.contains(&cell) {
            blocks_hit.push(cell);
            true
        } else {
            false
        }
    }

    fn end_game(&mut self) -> ServerToClient {
        info!(turn = self.turn, "game over, returning to lobby");
        let msg = ServerToClient::GameEnded {
            scores: mem::take(&mut self.scores),
        };
        self.phase = Phase::Lobby;
        self.turn = 0;
        self.players.clear();
        self.positions.clear();
        self.bombs.clear();
        self.blocks.clear();
        self.pending.clear();
        self.accepted_log.clear();
        self.turn_log.clear();
        self.next_player_id = 0;
        self.next_bomb_id = 0;
        msg
    }

    fn random_position(&mut self) -> Position {
        let x = (self.rng.next_u32() % u32::from(self.settings.size_x)) as u16;
        let y = (self.rng.next_u32() % u32::from(self.settings.size_y)) as u16;
        Position { x, y }
    }
}

#[cfg(test)]
mod tests {
    use gridblast_protocol::encode_to_vec;

    use super::*;

    fn settings() -> Settings {
        Settings {
            server_name: "test".into(),
            players_count: 1,
            size_x: 5,
            size_y: 5,
            game_length: 10,
            explosion_radius: 10,
            bomb_timer: 2,
            initial_blocks: 0,
            seed: 7,
        }
    }

    fn join(engine: &mut Engine, name: &str) -> PlayerId {
        let (id, _) = engine
            .try_join(name.into(), "127.0.0.1:1".into())
            .expect("join rejected");
        id
    }

    /// Start a game and return the position of each player after turn 0.
    fn start(engine: &mut Engine) -> BTreeMap<PlayerId, Position> {
        let msgs = engine.on_tick();
        let mut positions = BTreeMap::new();
        let Some(ServerToClient::Turn { turn: 0, events }) = msgs.get(1) else {
            panic!("expected turn 0, got {msgs:?}");
        };
        for event in events {
            if let Event::PlayerMoved { id, position } = event {
                positions.insert(*id, *position);
            }
        }
        positions
    }

    fn turn_events(msgs: &[ServerToClient]) -> &[Event] {
        match msgs.first() {
            Some(ServerToClient::Turn { events, .. }) => events,
            other => panic!("expected a turn broadcast, got {other:?}"),
        }
    }

    #[test]
    fn lobby_admission_assigns_ids_in_join_order() {
        let mut cfg = settings();
        cfg.players_count = 2;
        let mut engine = Engine::new(cfg);

        let a = join(&mut engine, "a");
        let b = join(&mut engine, "b");
        assert_eq!(a, PlayerId(0));
        assert_eq!(b, PlayerId(1));

        // The lobby is full: a third join is rejected.
        assert!(engine.try_join("c".into(), "127.0.0.1:3".into()).is_none());
    }

    #[test]
    fn no_broadcast_until_lobby_fills() {
        let mut cfg = settings();
        cfg.players_count = 2;
        let mut engine = Engine::new(cfg);

        join(&mut engine, "a");
        assert!(engine.on_tick().is_empty());

        join(&mut engine, "b");
        let msgs = engine.on_tick();
        assert!(matches!(msgs[0], ServerToClient::GameStarted { .. }));
        assert!(matches!(msgs[1], ServerToClient::Turn { turn: 0, .. }));
    }

    #[test]
    fn turn_zero_spawns_every_player_in_id_order() {
        let mut cfg = settings();
        cfg.players_count = 3;
        let mut engine = Engine::new(cfg);
        for name in ["a", "b", "c"] {
            join(&mut engine, name);
        }

        let msgs = engine.on_tick();
        let Some(ServerToClient::Turn { events, .. }) = msgs.get(1) else {
            panic!("expected turn 0");
        };
        let moved: Vec<PlayerId> = events
            .iter()
            .filter_map(|e| match e {
                Event::PlayerMoved { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(moved, vec![PlayerId(0), PlayerId(1), PlayerId(2)]);
    }

    #[test]
    fn zero_length_game_ends_right_after_turn_zero() {
        let mut cfg = settings();
        cfg.game_length = 0;
        let mut engine = Engine::new(cfg);
        join(&mut engine, "a");

        let msgs = engine.on_tick();
        assert_eq!(msgs.len(), 3);
        assert!(matches!(msgs[0], ServerToClient::GameStarted { .. }));
        assert!(matches!(msgs[1], ServerToClient::Turn { turn: 0, .. }));
        match &msgs[2] {
            ServerToClient::GameEnded { scores } => {
                assert_eq!(scores.get(&PlayerId(0)), Some(&0));
            }
            other => panic!("expected GameEnded, got {other:?}"),
        }

        // Back in the lobby: a fresh join gets id 0 again.
        let (id, _) = engine
            .try_join("b".into(), "127.0.0.1:2".into())
            .expect("rejoin rejected");
        assert_eq!(id, PlayerId(0));
    }

    #[test]
    fn bomb_detonates_when_its_timer_runs_out() {
        let mut engine = Engine::new(settings());
        let id = join(&mut engine, "a");
        let spawn = start(&mut engine)[&id];

        // Turn 1: place the bomb (timer 2).
        engine.submit(id, ClientToServer::PlaceBomb);
        let msgs = engine.on_tick();
        assert_eq!(
            turn_events(&msgs),
            &[Event::BombPlaced {
                id: BombId(0),
                position: spawn,
            }]
        );

        // Turn 2: the timer ticks to 1, nothing happens yet.
        let msgs = engine.on_tick();
        assert!(turn_events(&msgs).is_empty());

        // Turn 3: the timer reaches zero and the bomb explodes. The robot
        // still stands on the bomb, so it is destroyed and respawns.
        let msgs = engine.on_tick();
        let events = turn_events(&msgs);
        match &events[0] {
            Event::BombExploded {
                id: bomb,
                robots_destroyed,
                blocks_destroyed,
            } => {
                assert_eq!(*bomb, BombId(0));
                assert_eq!(robots_destroyed, &[id]);
                assert!(blocks_destroyed.is_empty());
            }
            other => panic!("expected BombExploded, got {other:?}"),
        }
        assert!(matches!(events[1], Event::PlayerMoved { .. }));
    }

    #[test]
    fn respawn_increments_score_and_drops_the_queued_command() {
        let mut engine = Engine::new(settings());
        let id = join(&mut engine, "a");
        start(&mut engine);

        engine.submit(id, ClientToServer::PlaceBomb);
        engine.on_tick(); // turn 1: placed
        engine.on_tick(); // turn 2: ticking

        // The move queued for the detonation turn must be ignored.
        engine.submit(
            id,
            ClientToServer::Move {
                direction: Direction::Up,
            },
        );
        let msgs = engine.on_tick(); // turn 3: explosion + respawn
        let events = turn_events(&msgs);
        let respawns = events
            .iter()
            .filter(|e| matches!(e, Event::PlayerMoved { .. }))
            .count();
        assert_eq!(respawns, 1);

        // Play out the rest of the game and check the score in GameEnded.
        let final_scores = loop {
            let msgs = engine.on_tick();
            if let Some(ServerToClient::GameEnded { scores }) = msgs.last() {
                break scores.clone();
            }
        };
        assert_eq!(final_scores.get(&id), Some(&1));
    }

    #[test]
    fn move_into_bounds_moves_the_robot() {
        let mut engine = Engine::new(settings());
        let id = join(&mut engine, "a");
        let spawn = start(&mut engine)[&id];

        // Pick a direction whose neighbor is on the board.
        let direction = Direction::ALL
            .into_iter()
            .find(|d| spawn.step(*d, 5, 5).is_some())
            .expect("spawn has no legal move on a 5x5 board");
        let target = spawn.step(direction, 5, 5).unwrap();

        engine.submit(id, ClientToServer::Move { direction });
        let msgs = engine.on_tick();
        assert_eq!(
            turn_events(&msgs),
            &[Event::PlayerMoved {
                id,
                position: target,
            }]
        );
    }

    #[test]
    fn block_stops_movement() {
        let mut engine = Engine::new(settings());
        let id = join(&mut engine, "a");
        let spawn = start(&mut engine)[&id];

        let out = Direction::ALL
            .into_iter()
            .find(|d| spawn.step(*d, 5, 5).is_some())
            .expect("no legal move");
        let back = match out {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        };

        // Raise a block at the spawn cell, step off it, then try to step
        // back onto the block: the return move must be a silent no-op.
        engine.submit(id, ClientToServer::PlaceBlock);
        let msgs = engine.on_tick();
        assert_eq!(turn_events(&msgs), &[Event::BlockPlaced { position: spawn }]);

        engine.submit(id, ClientToServer::Move { direction: out });
        let msgs = engine.on_tick();
        assert_eq!(turn_events(&msgs).len(), 1);

        engine.submit(id, ClientToServer::Move { direction: back });
        let msgs = engine.on_tick();
        assert!(turn_events(&msgs).is_empty());
    }

    #[test]
    fn move_off_the_board_is_a_no_op() {
        let mut cfg = settings();
        cfg.size_x = 1;
        cfg.size_y = 1;
        let mut engine = Engine::new(cfg);
        let id = join(&mut engine, "a");
        start(&mut engine);

        for direction in Direction::ALL {
            engine.submit(id, ClientToServer::Move { direction });
            let msgs = engine.on_tick();
            assert!(turn_events(&msgs).is_empty());
        }
    }

    #[test]
    fn place_block_on_existing_block_is_a_no_op() {
        let mut engine = Engine::new(settings());
        let id = join(&mut engine, "a");
        let spawn = start(&mut engine)[&id];

        engine.submit(id, ClientToServer::PlaceBlock);
        let msgs = engine.on_tick();
        assert_eq!(turn_events(&msgs), &[Event::BlockPlaced { position: spawn }]);

        engine.submit(id, ClientToServer::PlaceBlock);
        let msgs = engine.on_tick();
        assert!(turn_events(&msgs).is_empty());
    }

    #[test]
    fn latest_command_wins_within_a_turn() {
        let mut engine = Engine::new(settings());
        let id = join(&mut engine, "a");
        let spawn = start(&mut engine)[&id];

        engine.submit(id, ClientToServer::PlaceBomb);
        engine.submit(id, ClientToServer::PlaceBlock);
        let msgs = engine.on_tick();
        assert_eq!(turn_events(&msgs), &[Event::BlockPlaced { position: spawn }]);
    }

    #[test]
    fn explosion_ray_stops_at_a_block_and_destroys_it() {
        // Deterministic geometry check, independent of spawn positions.
        let mut engine = Engine::new(settings());
        engine.positions.insert(PlayerId(0), Position { x: 2, y: 4 });
        engine.positions.insert(PlayerId(1), Position { x: 0, y: 2 });
        engine.blocks.insert(Position { x: 2, y: 3 });

        let (robots, blocks) = engine.explode(Position { x: 2, y: 2 });
        // The block above absorbs the up ray before it reaches player 0;
        // the left ray passes through player 1 and continues to the edge.
        assert_eq!(robots, vec![PlayerId(1)]);
        assert_eq!(blocks, vec![Position { x: 2, y: 3 }]);
    }

    #[test]
    fn bomb_on_a_block_still_fires_all_four_rays() {
        let mut engine = Engine::new(settings());
        engine.blocks.insert(Position { x: 2, y: 2 });
        engine.blocks.insert(Position { x: 2, y: 3 });
        engine.positions.insert(PlayerId(0), Position { x: 3, y: 2 });

        let (robots, blocks) = engine.explode(Position { x: 2, y: 2 });
        // The block under the bomb is destroyed but does not gate the rays:
        // the up ray still burns the neighbor block and the right ray still
        // reaches the robot.
        assert_eq!(robots, vec![PlayerId(0)]);
        assert_eq!(
            blocks,
            vec![Position { x: 2, y: 2 }, Position { x: 2, y: 3 }]
        );
    }

    #[test]
    fn explosion_radius_is_clamped_by_the_border() {
        let mut cfg = settings();
        cfg.size_x = 3;
        cfg.size_y = 3;
        cfg.explosion_radius = 100;
        let mut engine = Engine::new(cfg);
        engine.positions.insert(PlayerId(0), Position { x: 0, y: 0 });
        engine.positions.insert(PlayerId(1), Position { x: 2, y: 2 });

        let (robots, _) = engine.explode(Position { x: 0, y: 0 });
        // Rays stay on the row and column of the origin: the robot at the
        // opposite corner is out of reach however large the radius.
        assert_eq!(robots, vec![PlayerId(0)]);
    }

    #[test]
    fn same_turn_explosions_share_the_initial_state() {
        // Two bombs due the same turn: a block destroyed by the first must
        // still absorb the second bomb's ray, and a robot killed by the
        // first is still reported by the second.
        let mut engine = Engine::new(settings());
        engine.positions.insert(PlayerId(0), Position { x: 2, y: 2 });
        engine.blocks.insert(Position { x: 2, y: 2 });
        engine.bombs.insert(
            BombId(0),
            Bomb {
                position: Position { x: 2, y: 0 },
                timer: 1,
            },
        );
        engine.bombs.insert(
            BombId(1),
            Bomb {
                position: Position { x: 2, y: 4 },
                timer: 1,
            },
        );
        engine.players.insert(
            PlayerId(0),
            Player {
                name: "a".into(),
                address: "x".into(),
            },
        );
        engine.scores.insert(PlayerId(0), 0);
        engine.phase = Phase::Active;

        engine.turn += 1;
        let events = engine.simulate_turn();
        let exploded: Vec<(&Vec<PlayerId>, &Vec<Position>)> = events
            .iter()
            .filter_map(|e| match e {
                Event::BombExploded {
                    robots_destroyed,
                    blocks_destroyed,
                    ..
                } => Some((robots_destroyed, blocks_destroyed)),
                _ => None,
            })
            .collect();
        assert_eq!(exploded.len(), 2);
        // Both rays stop at (2,2): both report the block and the robot.
        assert_eq!(exploded[0], (&vec![PlayerId(0)], &vec![Position { x: 2, y: 2 }]));
        assert_eq!(exploded[1], (&vec![PlayerId(0)], &vec![Position { x: 2, y: 2 }]));
        // The robot died once: one respawn, one point.
        let respawns = events
            .iter()
            .filter(|e| matches!(e, Event::PlayerMoved { .. }))
            .count();
        assert_eq!(respawns, 1);
        assert_eq!(engine.scores.get(&PlayerId(0)), Some(&1));
        // The block is gone after the pass.
        assert!(engine.blocks.is_empty());
    }

    #[test]
    fn joins_and_commands_ignored_while_active() {
        let mut engine = Engine::new(settings());
        let id = join(&mut engine, "a");
        start(&mut engine);

        assert!(engine.try_join("late".into(), "127.0.0.1:9".into()).is_none());

        // A Join smuggled in as a command changes nothing.
        engine.submit(id, ClientToServer::Join { name: "x".into() });
        let msgs = engine.on_tick();
        assert!(turn_events(&msgs).is_empty());
    }

    #[test]
    fn catch_up_replays_lobby_admissions() {
        let mut cfg = settings();
        cfg.players_count = 3;
        let mut engine = Engine::new(cfg);
        join(&mut engine, "a");
        join(&mut engine, "b");

        let msgs = engine.catch_up();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(
            msgs[0],
            ServerToClient::AcceptedPlayer {
                id: PlayerId(0),
                ..
            }
        ));
        assert!(matches!(
            msgs[1],
            ServerToClient::AcceptedPlayer {
                id: PlayerId(1),
                ..
            }
        ));
    }

    #[test]
    fn catch_up_replays_game_start_and_every_turn() {
        let mut engine = Engine::new(settings());
        join(&mut engine, "a");
        engine.on_tick(); // GameStarted + turn 0
        engine.on_tick(); // turn 1
        engine.on_tick(); // turn 2

        let msgs = engine.catch_up();
        assert_eq!(msgs.len(), 4);
        assert!(matches!(msgs[0], ServerToClient::GameStarted { .. }));
        for (i, msg) in msgs[1..].iter().enumerate() {
            match msg {
                ServerToClient::Turn { turn, .. } => assert_eq!(*turn as usize, i),
                other => panic!("expected Turn, got {other:?}"),
            }
        }
    }

    #[test]
    fn identical_inputs_produce_byte_identical_broadcasts() {
        let run = || {
            let mut cfg = settings();
            cfg.players_count = 2;
            cfg.game_length = 6;
            cfg.initial_blocks = 4;
            cfg.seed = 42;
            let mut engine = Engine::new(cfg);
            let a = join(&mut engine, "a");
            let b = join(&mut engine, "b");

            let mut wire = Vec::new();
            let mut push = |msgs: Vec<ServerToClient>, wire: &mut Vec<u8>| {
                for msg in msgs {
                    wire.extend(encode_to_vec(&msg).unwrap());
                }
            };
            push(engine.on_tick(), &mut wire);
            for turn in 0..6u16 {
                if turn % 2 == 0 {
                    engine.submit(a, ClientToServer::PlaceBomb);
                }
                engine.submit(
                    b,
                    ClientToServer::Move {
                        direction: Direction::ALL[usize::from(turn) % 4],
                    },
                );
                push(engine.on_tick(), &mut wire);
            }
            wire
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn scores_equal_respawn_count() {
        let mut cfg = settings();
        cfg.game_length = 8;
        cfg.bomb_timer = 1;
        let mut engine = Engine::new(cfg);
        let id = join(&mut engine, "a");
        start(&mut engine);

        let mut respawns = 0usize;
        let mut scores = BTreeMap::new();
        for _ in 0..8 {
            // Keep dropping bombs; with radius 10 on a 5x5 board every
            // detonation catches the robot wherever it respawned.
            engine.submit(id, ClientToServer::PlaceBomb);
            let msgs = engine.on_tick();
            for msg in msgs {
                match msg {
                    ServerToClient::Turn { events, .. } => {
                        let mut destroyed = false;
                        for event in events {
                            if let Event::BombExploded { robots_destroyed, .. } = &event {
                                destroyed |= !robots_destroyed.is_empty();
                            }
                            if let Event::PlayerMoved { .. } = event {
                                if destroyed {
                                    respawns += 1;
                                }
                            }
                        }
                    }
                    ServerToClient::GameEnded { scores: s } => scores = s,
                    _ => {}
                }
            }
        }
        assert!(respawns > 0, "the scenario should kill the robot at least once");
        assert_eq!(scores.get(&id).copied(), Some(respawns as u32));
    }

    #[test]
    fn bomb_ids_are_monotonic_and_reset_per_game() {
        let mut cfg = settings();
        cfg.game_length = 2;
        cfg.explosion_radius = 0;
        cfg.bomb_timer = 100;
        let mut engine = Engine::new(cfg);
        let id = join(&mut engine, "a");
        start(&mut engine);

        engine.submit(id, ClientToServer::PlaceBomb);
        let msgs = engine.on_tick();
        assert!(matches!(
            turn_events(&msgs)[0],
            Event::BombPlaced { id: BombId(0), .. }
        ));
        engine.submit(id, ClientToServer::PlaceBomb);
        let msgs = engine.on_tick(); // turn 2 ends the game
        assert!(matches!(
            turn_events(&msgs)[0],
            Event::BombPlaced { id: BombId(1), .. }
        ));
        assert!(matches!(msgs.last(), Some(ServerToClient::GameEnded { .. })));

        // Next game starts counting from zero again.
        let id = join(&mut engine, "a");
        start(&mut engine);
        engine.submit(id, ClientToServer::PlaceBomb);
        let msgs = engine.on_tick();
        assert!(matches!(
            turn_events(&msgs)[0],
            Event::BombPlaced { id: BombId(0), .. }
        ));
    }
}

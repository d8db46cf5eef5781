// Protocol messages for the three links of the system.
//
// Five enums define the full wire vocabulary:
// - `ClientToServer`:    player commands sent over the server stream.
// - `ServerToClient`:    the broadcast event log and lobby handshake.
// - `InterfaceToClient`: intents arriving from the interface by datagram.
// - `ClientToInterface`: render-ready snapshots pushed to the interface.
// - `Event`:             per-turn simulation events carried inside `Turn`.
//
// Discriminant values and field orders are part of the wire format: every
// `encode` emits the variant's pinned ordinal and every `decode` matches on
// it explicitly. They are never derived from source order, so reordering
// variants here would be caught by the pinned-byte tests, not silently
// change the protocol.

use std::collections::BTreeMap;
use std::io::Read;

use crate::types::{Bomb, BombId, Direction, Player, PlayerId, Position, Score};
use crate::wire::{CodecError, Decode, Encode};

/// Commands from a player's client to the game server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientToServer {
    /// Ask to be admitted to the lobby under `name`.
    Join { name: String },
    /// Drop a bomb at the robot's current position.
    PlaceBomb,
    /// Raise a block at the robot's current position.
    PlaceBlock,
    /// Step one cell in `direction`.
    Move { direction: Direction },
}

/// The authoritative broadcast stream from server to every client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerToClient {
    /// First message on every connection: the game settings.
    Hello {
        server_name: String,
        players_count: u8,
        size_x: u16,
        size_y: u16,
        game_length: u16,
        explosion_radius: u16,
        bomb_timer: u16,
    },
    /// A player was admitted to the lobby.
    AcceptedPlayer { id: PlayerId, player: Player },
    /// The lobby filled; the game begins with this roster.
    GameStarted { players: BTreeMap<PlayerId, Player> },
    /// One simulated turn and everything that happened in it.
    Turn { turn: u16, events: Vec<Event> },
    /// Final scores; the server returns to the lobby.
    GameEnded { scores: BTreeMap<PlayerId, Score> },
}

/// Snapshots pushed from the client relay to the interface, one per
/// datagram. Each carries the entirety of the renderable state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientToInterface {
    Lobby {
        server_name: String,
        players_count: u8,
        size_x: u16,
        size_y: u16,
        game_length: u16,
        explosion_radius: u16,
        bomb_timer: u16,
        players: BTreeMap<PlayerId, Player>,
    },
    Game {
        server_name: String,
        size_x: u16,
        size_y: u16,
        game_length: u16,
        turn: u16,
        players: BTreeMap<PlayerId, Player>,
        player_positions: BTreeMap<PlayerId, Position>,
        blocks: Vec<Position>,
        bombs: Vec<Bomb>,
        explosions: Vec<Position>,
        scores: BTreeMap<PlayerId, Score>,
    },
}

/// Intents from the interface to the client relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceToClient {
    PlaceBomb,
    PlaceBlock,
    Move { direction: Direction },
}

/// One simulation event inside a `Turn`, in simulation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    BombPlaced {
        id: BombId,
        position: Position,
    },
    BombExploded {
        id: BombId,
        robots_destroyed: Vec<PlayerId>,
        blocks_destroyed: Vec<Position>,
    },
    PlayerMoved {
        id: PlayerId,
        position: Position,
    },
    BlockPlaced {
        position: Position,
    },
}

impl Encode for ClientToServer {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            ClientToServer::Join { name } => {
                0u8.encode(out)?;
                name.encode(out)
            }
            ClientToServer::PlaceBomb => 1u8.encode(out),
            ClientToServer::PlaceBlock => 2u8.encode(out),
            ClientToServer::Move { direction } => {
                3u8.encode(out)?;
                direction.encode(out)
            }
        }
    }
}

impl Decode for ClientToServer {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => Ok(ClientToServer::Join {
                name: String::decode(reader)?,
            }),
            1 => Ok(ClientToServer::PlaceBomb),
            2 => Ok(ClientToServer::PlaceBlock),
            3 => Ok(ClientToServer::Move {
                direction: Direction::decode(reader)?,
            }),
            tag => Err(CodecError::UnknownDiscriminant("ClientToServer", tag)),
        }
    }
}

impl Encode for ServerToClient {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            ServerToClient::Hello {
                server_name,
                players_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
            } => {
                0u8.encode(out)?;
                server_name.encode(out)?;
                players_count.encode(out)?;
                size_x.encode(out)?;
                size_y.encode(out)?;
                game_length.encode(out)?;
                explosion_radius.encode(out)?;
                bomb_timer.encode(out)
            }
            ServerToClient::AcceptedPlayer { id, player } => {
                1u8.encode(out)?;
                id.encode(out)?;
                player.encode(out)
            }
            ServerToClient::GameStarted { players } => {
                2u8.encode(out)?;
                players.encode(out)
            }
            ServerToClient::Turn { turn, events } => {
                3u8.encode(out)?;
                turn.encode(out)?;
                events.encode(out)
            }
            ServerToClient::GameEnded { scores } => {
                4u8.encode(out)?;
                scores.encode(out)
            }
        }
    }
}

impl Decode for ServerToClient {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => {
                let server_name = String::decode(reader)?;
                let players_count = u8::decode(reader)?;
                let size_x = u16::decode(reader)?;
                let size_y = u16::decode(reader)?;
                let game_length = u16::decode(reader)?;
                let explosion_radius = u16::decode(reader)?;
                let bomb_timer = u16::decode(reader)?;
                Ok(ServerToClient::Hello {
                    server_name,
                    players_count,
                    size_x,
                    size_y,
                    game_length,
                    explosion_radius,
                    bomb_timer,
                })
            }
            1 => {
                let id = PlayerId::decode(reader)?;
                let player = Player::decode(reader)?;
                Ok(ServerToClient::AcceptedPlayer { id, player })
            }
            2 => Ok(ServerToClient::GameStarted {
                players: BTreeMap::decode(reader)?,
            }),
            3 => {
                let turn = u16::decode(reader)?;
                let events = Vec::decode(reader)?;
                Ok(ServerToClient::Turn { turn, events })
            }
            4 => Ok(ServerToClient::GameEnded {
                scores: BTreeMap::decode(reader)?,
            }),
            tag => Err(CodecError::UnknownDiscriminant("ServerToClient", tag)),
        }
    }
}

impl Encode for ClientToInterface {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            ClientToInterface::Lobby {
                server_name,
                players_count,
                size_x,
                size_y,
                game_length,
                explosion_radius,
                bomb_timer,
                players,
            } => {
                0u8.encode(out)?;
                server_name.encode(out)?;
                players_count.encode(out)?;
                size_x.encode(out)?;
                size_y.encode(out)?;
                game_length.encode(out)?;
                explosion_radius.encode(out)?;
                bomb_timer.encode(out)?;
                players.encode(out)
            }
            ClientToInterface::Game {
                server_name,
                size_x,
                size_y,
                game_length,
                turn,
                players,
                player_positions,
                blocks,
                bombs,
                explosions,
                scores,
            } => {
                1u8.encode(out)?;
                server_name.encode(out)?;
                size_x.encode(out)?;
                size_y.encode(out)?;
                game_length.encode(out)?;
                turn.encode(out)?;
                players.encode(out)?;
                player_positions.encode(out)?;
                blocks.encode(out)?;
                bombs.encode(out)?;
                explosions.encode(out)?;
                scores.encode(out)
            }
        }
    }
}

impl Decode for ClientToInterface {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => {
                let server_name = String::decode(reader)?;
                let players_count = u8::decode(reader)?;
                let size_x = u16::decode(reader)?;
                let size_y = u16::decode(reader)?;
                let game_length = u16::decode(reader)?;
                let explosion_radius = u16::decode(reader)?;
                let bomb_timer = u16::decode(reader)?;
                let players = BTreeMap::decode(reader)?;
                Ok(ClientToInterface::Lobby {
                    server_name,
                    players_count,
                    size_x,
                    size_y,
                    game_length,
                    explosion_radius,
                    bomb_timer,
                    players,
                })
            }
            1 => {
                let server_name = String::decode(reader)?;
                let size_x = u16::decode(reader)?;
                let size_y = u16::decode(reader)?;
                let game_length = u16::decode(reader)?;
                let turn = u16::decode(reader)?;
                let players = BTreeMap::decode(reader)?;
                let player_positions = BTreeMap::decode(reader)?;
                let blocks = Vec::decode(reader)?;
                let bombs = Vec::decode(reader)?;
                let explosions = Vec::decode(reader)?;
                let scores = BTreeMap::decode(reader)?;
                Ok(ClientToInterface::Game {
                    server_name,
                    size_x,
                    size_y,
                    game_length,
                    turn,
                    players,
                    player_positions,
                    blocks,
                    bombs,
                    explosions,
                    scores,
                })
            }
            tag => Err(CodecError::UnknownDiscriminant("ClientToInterface", tag)),
        }
    }
}

impl Encode for InterfaceToClient {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            InterfaceToClient::PlaceBomb => 0u8.encode(out),
            InterfaceToClient::PlaceBlock => 1u8.encode(out),
            InterfaceToClient::Move { direction } => {
                2u8.encode(out)?;
                direction.encode(out)
            }
        }
    }
}

impl Decode for InterfaceToClient {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => Ok(InterfaceToClient::PlaceBomb),
            1 => Ok(InterfaceToClient::PlaceBlock),
            2 => Ok(InterfaceToClient::Move {
                direction: Direction::decode(reader)?,
            }),
            tag => Err(CodecError::UnknownDiscriminant("InterfaceToClient", tag)),
        }
    }
}

impl Encode for Event {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            Event::BombPlaced { id, position } => {
                0u8.encode(out)?;
                id.encode(out)?;
                position.encode(out)
            }
            Event::BombExploded {
                id,
                robots_destroyed,
                blocks_destroyed,
            } => {
                1u8.encode(out)?;
                id.encode(out)?;
                robots_destroyed.encode(out)?;
                blocks_destroyed.encode(out)
            }
            Event::PlayerMoved { id, position } => {
                2u8.encode(out)?;
                id.encode(out)?;
                position.encode(out)
            }
            Event::BlockPlaced { position } => {
                3u8.encode(out)?;
                position.encode(out)
            }
        }
    }
}

impl Decode for Event {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => {
                let id = BombId::decode(reader)?;
                let position = Position::decode(reader)?;
                Ok(Event::BombPlaced { id, position })
            }
            1 => {
                let id = BombId::decode(reader)?;
                let robots_destroyed = Vec::decode(reader)?;
                let blocks_destroyed = Vec::decode(reader)?;
                Ok(Event::BombExploded {
                    id,
                    robots_destroyed,
                    blocks_destroyed,
                })
            }
            2 => {
                let id = PlayerId::decode(reader)?;
                let position = Position::decode(reader)?;
                Ok(Event::PlayerMoved { id, position })
            }
            3 => Ok(Event::BlockPlaced {
                position: Position::decode(reader)?,
            }),
            tag => Err(CodecError::UnknownDiscriminant("Event", tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::wire::{decode_datagram, encode_to_vec};

    use super::*;

    #[test]
    fn join_bytes_are_pinned() {
        let msg = ClientToServer::Join { name: "ab".into() };
        assert_eq!(encode_to_vec(&msg).unwrap(), [0, 2, b'a', b'b']);
    }

    #[test]
    fn zero_field_variants_are_one_byte() {
        assert_eq!(encode_to_vec(&ClientToServer::PlaceBomb).unwrap(), [1]);
        assert_eq!(encode_to_vec(&ClientToServer::PlaceBlock).unwrap(), [2]);
        assert_eq!(encode_to_vec(&InterfaceToClient::PlaceBomb).unwrap(), [0]);
        assert_eq!(encode_to_vec(&InterfaceToClient::PlaceBlock).unwrap(), [1]);
    }

    #[test]
    fn move_carries_direction_ordinal() {
        let msg = ClientToServer::Move {
            direction: Direction::Left,
        };
        assert_eq!(encode_to_vec(&msg).unwrap(), [3, 3]);
        let msg = InterfaceToClient::Move {
            direction: Direction::Up,
        };
        assert_eq!(encode_to_vec(&msg).unwrap(), [2, 0]);
    }

    #[test]
    fn hello_field_order_is_pinned() {
        let msg = ServerToClient::Hello {
            server_name: "s".into(),
            players_count: 2,
            size_x: 3,
            size_y: 4,
            game_length: 5,
            explosion_radius: 6,
            bomb_timer: 7,
        };
        assert_eq!(
            encode_to_vec(&msg).unwrap(),
            [0, 1, b's', 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7]
        );
    }

    #[test]
    fn server_stream_tag_out_of_range() {
        let mut cursor = Cursor::new(vec![0x05u8]);
        match ServerToClient::decode(&mut cursor) {
            Err(CodecError::UnknownDiscriminant("ServerToClient", 5)) => {}
            other => panic!("expected UnknownDiscriminant, got {other:?}"),
        }
    }

    #[test]
    fn turn_with_events_roundtrip() {
        let msg = ServerToClient::Turn {
            turn: 3,
            events: vec![
                Event::BombExploded {
                    id: BombId(0),
                    robots_destroyed: vec![PlayerId(0), PlayerId(2)],
                    blocks_destroyed: vec![Position { x: 1, y: 1 }],
                },
                Event::PlayerMoved {
                    id: PlayerId(0),
                    position: Position { x: 2, y: 3 },
                },
                Event::BombPlaced {
                    id: BombId(1),
                    position: Position { x: 2, y: 2 },
                },
                Event::BlockPlaced {
                    position: Position { x: 0, y: 0 },
                },
            ],
        };
        let bytes = encode_to_vec(&msg).unwrap();
        let mut cursor = Cursor::new(&bytes);
        let decoded = ServerToClient::decode(&mut cursor).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(cursor.position() as usize, bytes.len());
    }

    #[test]
    fn game_snapshot_roundtrip() {
        let mut players = BTreeMap::new();
        players.insert(
            PlayerId(1),
            Player {
                name: "a".into(),
                address: "x:1".into(),
            },
        );
        let mut positions = BTreeMap::new();
        positions.insert(PlayerId(1), Position { x: 3, y: 4 });
        let mut scores = BTreeMap::new();
        scores.insert(PlayerId(1), 42u32);
        let msg = ClientToInterface::Game {
            server_name: "n".into(),
            size_x: 7,
            size_y: 7,
            game_length: 9,
            turn: 6,
            players,
            player_positions: positions,
            blocks: vec![
                Position { x: 3, y: 1 },
                Position { x: 3, y: 2 },
                Position { x: 3, y: 3 },
            ],
            bombs: vec![
                Bomb {
                    position: Position { x: 2, y: 1 },
                    timer: 1,
                },
                Bomb {
                    position: Position { x: 4, y: 1 },
                    timer: 1,
                },
            ],
            explosions: vec![Position { x: 3, y: 5 }],
            scores,
        };
        let bytes = encode_to_vec(&msg).unwrap();
        assert_eq!(decode_datagram::<ClientToInterface>(&bytes).unwrap(), msg);
    }

    #[test]
    fn lobby_snapshot_roundtrip() {
        let mut players = BTreeMap::new();
        players.insert(
            PlayerId(0),
            Player {
                name: "first".into(),
                address: "10.0.0.1:2000".into(),
            },
        );
        players.insert(
            PlayerId(1),
            Player {
                name: "second".into(),
                address: "10.0.0.2:2001".into(),
            },
        );
        let msg = ClientToInterface::Lobby {
            server_name: "lobby".into(),
            players_count: 2,
            size_x: 10,
            size_y: 10,
            game_length: 100,
            explosion_radius: 2,
            bomb_timer: 5,
            players,
        };
        let bytes = encode_to_vec(&msg).unwrap();
        assert_eq!(decode_datagram::<ClientToInterface>(&bytes).unwrap(), msg);
    }

    #[test]
    fn intent_datagram_with_garbage_suffix_rejected() {
        let mut bytes = encode_to_vec(&InterfaceToClient::Move {
            direction: Direction::Right,
        })
        .unwrap();
        bytes.extend_from_slice(&[0, 0]);
        match decode_datagram::<InterfaceToClient>(&bytes) {
            Err(CodecError::TrailingBytes(2)) => {}
            other => panic!("expected TrailingBytes(2), got {other:?}"),
        }
    }

    #[test]
    fn game_ended_scores_ascending() {
        let mut scores = BTreeMap::new();
        scores.insert(PlayerId(2), 1u32);
        scores.insert(PlayerId(0), 3u32);
        let bytes = encode_to_vec(&ServerToClient::GameEnded { scores }).unwrap();
        // Tag, count 2, then player 0 before player 2.
        assert_eq!(
            bytes,
            [4, 0, 0, 0, 2, 0, 0, 0, 0, 3, 2, 0, 0, 0, 1]
        );
    }
}

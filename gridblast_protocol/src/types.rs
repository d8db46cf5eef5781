// Core value types shared by every message in the protocol.
//
// Ids are lightweight newtypes so `BTreeMap` keys order the way the wire
// format requires (maps encode ascending by key). `Position` carries the
// board geometry helper used on both sides of the wire: the server for
// movement and explosion rays, the client for re-deriving explosion cells
// from its own block projection.

use std::io::Read;

use crate::wire::{CodecError, Decode, Encode};

/// Server-assigned player id, allocated in join order starting at 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u8);

/// Server-assigned bomb id, allocated in placement order per game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BombId(pub u32);

/// Death counter: increments each time a player's robot is destroyed.
pub type Score = u32;

/// A cell on the board, within `[0, size_x) x [0, size_y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

/// Movement and ray direction. Discriminants are part of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Direction {
    /// All directions in discriminant order. Explosion rays walk these in
    /// this order so event payloads are deterministic.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// Grid offset: `Up` increases `y`, `Right` increases `x`.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Right => (1, 0),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
        }
    }
}

impl Position {
    /// The neighboring cell in `direction`, or `None` if it would leave a
    /// board of `size_x` by `size_y` cells.
    pub fn step(self, direction: Direction, size_x: u16, size_y: u16) -> Option<Position> {
        let (dx, dy) = direction.offset();
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        if x < 0 || y < 0 || x >= i32::from(size_x) || y >= i32::from(size_y) {
            return None;
        }
        Some(Position {
            x: x as u16,
            y: y as u16,
        })
    }
}

/// A placed bomb. The timer counts turns until detonation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bomb {
    pub position: Position,
    pub timer: u16,
}

/// An admitted player: the joined name plus the server-observed remote
/// endpoint rendered as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub address: String,
}

impl Encode for PlayerId {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.0.encode(out)
    }
}

impl Decode for PlayerId {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(PlayerId(u8::decode(reader)?))
    }
}

impl Encode for BombId {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.0.encode(out)
    }
}

impl Decode for BombId {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(BombId(u32::decode(reader)?))
    }
}

impl Encode for Position {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.x.encode(out)?;
        self.y.encode(out)
    }
}

impl Decode for Position {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let x = u16::decode(reader)?;
        let y = u16::decode(reader)?;
        Ok(Position { x, y })
    }
}

impl Encode for Direction {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        (*self as u8).encode(out)
    }
}

impl Decode for Direction {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => Ok(Direction::Up),
            1 => Ok(Direction::Right),
            2 => Ok(Direction::Down),
            3 => Ok(Direction::Left),
            tag => Err(CodecError::UnknownDiscriminant("Direction", tag)),
        }
    }
}

impl Encode for Bomb {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.position.encode(out)?;
        self.timer.encode(out)
    }
}

impl Decode for Bomb {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let position = Position::decode(reader)?;
        let timer = u16::decode(reader)?;
        Ok(Bomb { position, timer })
    }
}

impl Encode for Player {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.name.encode(out)?;
        self.address.encode(out)
    }
}

impl Decode for Player {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let name = String::decode(reader)?;
        let address = String::decode(reader)?;
        Ok(Player { name, address })
    }
}

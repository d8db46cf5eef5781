// gridblast_protocol — wire protocol shared by the game server and the
// client relay.
//
// This crate defines the message vocabulary and its byte-level encoding for
// all three links of the system: the client↔server TCP stream and both
// directions of the interface↔client datagram exchange. It is shared by
// both executables and depends on neither.
//
// Module overview:
// - `types.rs`:   Value types — ids, `Position`, `Direction`, `Bomb`,
//                 `Player` — plus the board-geometry helper both sides use.
// - `message.rs`: The five message enums with their pinned discriminants
//                 and field orders.
// - `wire.rs`:    Encode/decode traits, primitive encodings, and the
//                 stream/datagram entry points (`write_message`,
//                 `read_message`, `decode_datagram`).
//
// Design decisions:
// - **Hand-written codec glue.** Discriminant values, field order, byte
//   order, and length-prefix widths are all normative, so every record and
//   variant is encoded by an explicit match rather than a derive. The
//   pinned-byte tests in each module keep the format honest.
// - **No outer framing on the stream.** Messages are self-delimiting given
//   a reader that blocks for exact byte counts; datagrams carry exactly one
//   message and reject trailing bytes.
// - **No async runtime.** The codec reads from any `std::io::Read`,
//   compatible with blocking TCP streams, buffered wrappers, and in-memory
//   cursors.

pub mod message;
pub mod types;
pub mod wire;

pub use message::{ClientToInterface, ClientToServer, Event, InterfaceToClient, ServerToClient};
pub use types::{Bomb, BombId, Direction, Player, PlayerId, Position, Score};
pub use wire::{
    decode_datagram, encode_to_vec, read_message, write_message, CodecError, Decode, Encode,
};

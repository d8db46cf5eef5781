// Byte-level codec primitives shared by every message on every link.
//
// The wire format is self-describing and carries no outer length prefix:
// a message is delimited purely by its type-driven self-length. All
// multi-byte integers are big-endian. Containers are length-prefixed,
// strings by a `u8` byte count, sequences and maps by a `u32` element
// count. Sum types emit a `u8` discriminant followed by the payload of the
// active variant (see `message.rs` for the discriminant registry).
//
// `Decode` reads from any `std::io::Read`. The reader is the codec's read
// primitive: fetch exactly N bytes, blocking if necessary. A clean EOF
// mid-value maps to `CodecError::UnexpectedEnd`; any other I/O failure is
// surfaced as `CodecError::Io` and treated by callers as a transport
// failure. The decoder never peeks, so it composes with both blocking TCP
// streams and in-memory cursors.
//
// On the datagram link exactly one top-level message fits one datagram;
// `decode_datagram` rejects leftover bytes with `TrailingBytes` so a
// malformed datagram is discarded rather than partially accepted.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};

use thiserror::Error;

/// Protocol violations and transport failures surfaced by the codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream closed before a complete value was read.
    #[error("unexpected end of stream")]
    UnexpectedEnd,
    /// A sum-type tag exceeded the variant count for that sum.
    #[error("unknown discriminant {1} for {0}")]
    UnknownDiscriminant(&'static str, u8),
    /// A string exceeded the 255-byte wire limit on encode.
    #[error("string of {0} bytes exceeds the 255-byte wire limit")]
    StringTooLong(usize),
    /// Bytes remained in a datagram after a complete decode.
    #[error("{0} trailing byte(s) after a complete message")]
    TrailingBytes(usize),
    /// A length-prefixed string held bytes that are not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// The underlying stream failed mid-read or mid-write.
    #[error("stream i/o failed")]
    Io(#[from] io::Error),
}

/// Append the wire encoding of a value to an output buffer.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError>;
}

/// Reconstruct a value from its wire encoding.
pub trait Decode: Sized {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError>;
}

/// Fill `buf` from the reader, mapping a clean EOF to `UnexpectedEnd`.
pub(crate) fn read_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), CodecError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CodecError::UnexpectedEnd,
        _ => CodecError::Io(e),
    })
}

impl Encode for u8 {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.push(*self);
        Ok(())
    }
}

impl Decode for u8 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let mut buf = [0u8; 1];
        read_bytes(reader, &mut buf)?;
        Ok(buf[0])
    }
}

impl Encode for u16 {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl Decode for u16 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let mut buf = [0u8; 2];
        read_bytes(reader, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl Encode for u32 {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }
}

impl Decode for u32 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let mut buf = [0u8; 4];
        read_bytes(reader, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
}

impl Encode for String {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let len = self.len();
        if len > usize::from(u8::MAX) {
            return Err(CodecError::StringTooLong(len));
        }
        out.push(len as u8);
        out.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl Decode for String {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let len = u8::decode(reader)?;
        let mut buf = vec![0u8; usize::from(len)];
        read_bytes(reader, &mut buf)?;
        String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        // Element counts are bounded by u32::MAX on the wire; a sequence
        // that large cannot be built by this system.
        (self.len() as u32).encode(out)?;
        for element in self {
            element.encode(out)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let count = u32::decode(reader)?;
        let mut elements = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            elements.push(T::decode(reader)?);
        }
        Ok(elements)
    }
}

impl<K: Encode + Ord, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        // BTreeMap iteration is ascending by key, which is exactly the
        // order the wire format requires.
        (self.len() as u32).encode(out)?;
        for (key, value) in self {
            key.encode(out)?;
            value.encode(out)?;
        }
        Ok(())
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let count = u32::decode(reader)?;
        let mut pairs = BTreeMap::new();
        for _ in 0..count {
            let key = K::decode(reader)?;
            let value = V::decode(reader)?;
            pairs.insert(key, value);
        }
        Ok(pairs)
    }
}

/// Encode a value into a fresh buffer.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    value.encode(&mut out)?;
    Ok(out)
}

/// Encode a message and write it to the stream as one whole send.
///
/// The flush keeps each message on the wire as a unit; combined with
/// `TCP_NODELAY` this bounds per-turn latency.
pub fn write_message<W: Write, T: Encode>(writer: &mut W, msg: &T) -> Result<(), CodecError> {
    let bytes = encode_to_vec(msg)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one message from the stream.
///
/// There is no outer framing: the message is delimited by its own
/// type-driven self-length.
pub fn read_message<R: Read, T: Decode>(reader: &mut R) -> Result<T, CodecError> {
    T::decode(reader)
}

/// Decode exactly one message from a datagram payload.
///
/// Any bytes left over after a successful decode are a protocol error and
/// the caller must discard the datagram.
pub fn decode_datagram<T: Decode>(datagram: &[u8]) -> Result<T, CodecError> {
    let mut cursor = Cursor::new(datagram);
    let value = T::decode(&mut cursor)?;
    let remaining = datagram.len() - cursor.position() as usize;
    if remaining != 0 {
        return Err(CodecError::TrailingBytes(remaining));
    }
    Ok(value)
}

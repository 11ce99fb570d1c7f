//! The wire protocol spoken between the outpost server and its clients.
//!
//! Every frame on the wire is a little-endian `u32` length followed by that
//! many body bytes. The body begins with a little-endian `u16` packet id and
//! continues with the fixed schema of that packet. Strings are UTF-8 with an
//! unsigned LEB128 byte-length prefix (see [`VarUint`]).

pub mod decode;
pub mod encode;
mod impls;
pub mod packets;
mod update_flags;
pub mod var_uint;

use std::io::Write;

use anyhow::Context;
use byteorder::{LittleEndian, WriteBytesExt};
pub use decode::{PacketDecoder, PacketFrame};
pub use encode::PacketEncoder;
pub use packets::*;
pub use update_flags::UpdateFlags;
pub use var_uint::VarUint;

/// The maximum number of bytes in a single frame body.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// The number of bytes in the length prefix of a frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// The `Encode` trait allows objects to be written to the wire. It is the
/// inverse of [`Decode`].
///
/// All multi-byte values are written little-endian. Implementations are
/// expected to be deterministic: encoding the same value twice produces the
/// same bytes.
pub trait Encode {
    /// Writes this object to the provided writer.
    ///
    /// If this type also implements [`Decode`] then successful calls to this
    /// function returning `Ok(())` must always successfully [`decode`] using
    /// the data that was written to the writer. The exact number of bytes
    /// that were originally written must be consumed during the decoding.
    ///
    /// [`decode`]: Decode::decode
    fn encode(&self, w: impl Write) -> anyhow::Result<()>;
}

/// The `Decode` trait allows objects to be read from the wire. It is the
/// inverse of [`Encode`].
///
/// `Decode` is parameterized by a lifetime. This allows the decoded value to
/// borrow data from the byte slice it was read from.
pub trait Decode<'a>: Sized {
    /// Reads this object from the provided byte slice.
    ///
    /// Implementations of `Decode` are expected to shrink the slice from the
    /// front as bytes are read.
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self>;
}

/// Types considered to be packets.
///
/// In serialized form, a packet body begins with a `u16` packet id followed
/// by the schema of the packet. If present, the implementations of [`Encode`]
/// and [`Decode`] on `Self` are expected to only encode/decode the _schema_
/// of this packet without the leading id.
pub trait Packet: std::fmt::Debug {
    /// The leading `u16` id of this packet.
    const ID: u16;
    /// The name of this packet for debugging purposes.
    const NAME: &'static str;
    /// The side this packet is intended for.
    const SIDE: PacketSide;

    /// Encodes this packet's id first, followed by the packet's body.
    fn encode_with_id(&self, mut w: impl Write) -> anyhow::Result<()>
    where
        Self: Encode,
    {
        w.write_u16::<LittleEndian>(Self::ID)
            .context("failed to encode packet id")?;

        self.encode(w)
    }
}

/// The side a packet is intended for.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PacketSide {
    /// Server -> Client
    Clientbound,
    /// Client -> Server
    Serverbound,
}

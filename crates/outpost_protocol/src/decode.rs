use anyhow::{bail, ensure};
use bytes::{Buf, BytesMut};

use crate::{Decode, Packet, FRAME_HEADER_LEN, MAX_FRAME_SIZE};

/// Reassembles frames from a stream of bytes.
///
/// Bytes read off the socket are handed to [`queue_bytes`] and complete
/// frames come back out of [`try_next_packet`], which yields `None` while a
/// frame is still partial. One decoder is owned per session.
///
/// [`queue_bytes`]: Self::queue_bytes
/// [`try_next_packet`]: Self::try_next_packet
#[derive(Default)]
pub struct PacketDecoder {
    buf: BytesMut,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_next_packet(&mut self) -> anyhow::Result<Option<PacketFrame>> {
        let mut r = &self.buf[..];

        if r.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let frame_len = r.get_u32_le() as usize;

        if frame_len > MAX_FRAME_SIZE {
            // The stream is unrecoverable past a bogus length prefix.
            self.buf.clear();
            bail!("frame length of {frame_len} exceeds the maximum of {MAX_FRAME_SIZE}");
        }

        if frame_len < 2 {
            self.buf.clear();
            bail!("frame length of {frame_len} is too short to carry a packet id");
        }

        if r.len() < frame_len {
            // Not enough data arrived yet.
            return Ok(None);
        }

        self.buf.advance(FRAME_HEADER_LEN);

        let mut body = self.buf.split_to(frame_len);
        let id = (&body[..]).get_u16_le();
        body.advance(2);

        Ok(Some(PacketFrame { id, body }))
    }

    pub fn queue_bytes(&mut self, bytes: BytesMut) {
        self.buf.unsplit(bytes);
    }

    pub fn queue_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn take_capacity(&mut self) -> BytesMut {
        self.buf.split_off(self.buf.len())
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }
}

/// One reassembled frame: the packet id and the body bytes after it.
#[derive(Clone, Debug)]
pub struct PacketFrame {
    /// The id of the decoded packet.
    pub id: u16,
    /// The contents of the packet after the leading id.
    pub body: BytesMut,
}

impl PacketFrame {
    /// Attempts to decode this frame as type `P`. An error is returned if the
    /// packet id does not match, the body of the packet failed to decode, or
    /// some input was missed.
    pub fn decode<'a, P>(&'a self) -> anyhow::Result<P>
    where
        P: Packet + Decode<'a>,
    {
        ensure!(
            P::ID == self.id,
            "packet id mismatch while decoding '{}': expected {}, got {}",
            P::NAME,
            P::ID,
            self.id
        );

        let mut r = &self.body[..];

        let pkt = P::decode(&mut r)?;

        ensure!(
            r.is_empty(),
            "missed {} bytes while decoding '{}'",
            r.len(),
            P::NAME
        );

        Ok(pkt)
    }
}

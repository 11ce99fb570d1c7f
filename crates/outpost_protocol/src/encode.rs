use anyhow::ensure;
use bytes::{BufMut, BytesMut};

use crate::{Encode, Packet, FRAME_HEADER_LEN, MAX_FRAME_SIZE};

/// Serializes packets into length-prefixed frames.
///
/// Multiple packets may be appended before [`take`] hands the accumulated
/// bytes off for a single socket write.
///
/// [`take`]: Self::take
#[derive(Default)]
pub struct PacketEncoder {
    buf: BytesMut,
}

impl PacketEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_packet<P>(&mut self, pkt: &P) -> anyhow::Result<()>
    where
        P: Packet + Encode,
    {
        let start_len = self.buf.len();

        // Reserve the length prefix, then back-fill it once the body size is
        // known.
        self.buf.put_bytes(0, FRAME_HEADER_LEN);

        pkt.encode_with_id((&mut self.buf).writer())?;

        let frame_len = self.buf.len() - start_len - FRAME_HEADER_LEN;

        ensure!(
            frame_len <= MAX_FRAME_SIZE,
            "frame length of {frame_len} exceeds the maximum of {MAX_FRAME_SIZE}"
        );

        self.buf[start_len..start_len + FRAME_HEADER_LEN]
            .copy_from_slice(&(frame_len as u32).to_le_bytes());

        Ok(())
    }

    /// Takes all the frames written so far.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::PacketDecoder;
    use crate::packets::HeartbeatC2s;
    use crate::MoveRequestC2s;

    #[test]
    fn frames_carry_length_and_id() {
        let mut enc = PacketEncoder::new();
        enc.append_packet(&HeartbeatC2s).unwrap();

        let bytes = enc.take();
        assert_eq!(&bytes[..], &[2, 0, 0, 0, 0x28, 0x23]);
    }

    #[test]
    fn encoder_feeds_decoder() {
        let mut enc = PacketEncoder::new();
        enc.append_packet(&MoveRequestC2s {
            target: glam::Vec3::new(10.0, 0.0, -3.5),
        })
        .unwrap();
        enc.append_packet(&HeartbeatC2s).unwrap();

        let mut dec = PacketDecoder::new();
        dec.queue_slice(&enc.take());

        let first = dec.try_next_packet().unwrap().unwrap();
        let mv: MoveRequestC2s = first.decode().unwrap();
        assert_eq!(mv.target, glam::Vec3::new(10.0, 0.0, -3.5));

        let second = dec.try_next_packet().unwrap().unwrap();
        assert_eq!(second.id, HeartbeatC2s::ID);

        assert!(dec.try_next_packet().unwrap().is_none());
    }
}

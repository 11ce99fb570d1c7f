use std::io::Write;

use anyhow::bail;
use byteorder::ReadBytesExt;
use thiserror::Error;

use crate::{Decode, Encode};

/// A `u32` encoded with variable length, used as the byte-count prefix of
/// wire strings. Seven bits per byte, least significant group first, high bit
/// set on every byte except the last.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct VarUint(pub u32);

impl VarUint {
    /// The maximum number of bytes a `VarUint` could occupy on the wire.
    pub const MAX_SIZE: usize = 5;

    /// Returns the exact number of bytes this value will write when
    /// [`Encode::encode`] is called, assuming no error occurs.
    pub fn written_size(self) -> usize {
        match self.0 {
            0 => 1,
            n => (31 - n.leading_zeros() as usize) / 7 + 1,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum VarUintDecodeError {
    #[error("incomplete VarUint decode")]
    Incomplete,
    #[error("VarUint is too large")]
    TooLarge,
}

impl Encode for VarUint {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        let mut val = self.0;
        loop {
            let byte = (val & 0b0111_1111) as u8;
            val >>= 7;
            if val == 0 {
                w.write_all(&[byte])?;
                return Ok(());
            }
            w.write_all(&[byte | 0b1000_0000])?;
        }
    }
}

impl Decode<'_> for VarUint {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        let mut val = 0u32;
        for i in 0..Self::MAX_SIZE {
            let byte = r.read_u8()?;
            val |= u32::from(byte & 0b0111_1111) << (i * 7);
            if byte & 0b1000_0000 == 0 {
                // The fifth byte may only contribute four bits.
                if i == Self::MAX_SIZE - 1 && byte > 0b1111 {
                    bail!("VarUint is too large");
                }
                return Ok(VarUint(val));
            }
        }
        bail!("VarUint is too large")
    }
}

impl From<u32> for VarUint {
    fn from(n: u32) -> Self {
        VarUint(n)
    }
}

impl From<VarUint> for u32 {
    fn from(n: VarUint) -> Self {
        n.0
    }
}

#[cfg(test)]
mod tests {
    use rand::{thread_rng, Rng};

    use super::*;

    #[test]
    fn var_uint_written_size() {
        let mut rng = thread_rng();
        let mut buf = vec![];

        for n in (0..100_000)
            .map(|_| rng.gen())
            .chain([0, 1, u32::from(u16::MAX), u32::MAX])
            .map(VarUint)
        {
            buf.clear();
            n.encode(&mut buf).unwrap();
            assert_eq!(buf.len(), n.written_size());
        }
    }

    #[test]
    fn var_uint_round_trip() {
        let mut rng = thread_rng();
        let mut buf = vec![];

        for n in (0..100_000)
            .map(|_| rng.gen())
            .chain([0, 1, 127, 128, u32::MAX])
            .map(VarUint)
        {
            buf.clear();
            n.encode(&mut buf).unwrap();

            let mut r = &buf[..];
            assert_eq!(VarUint::decode(&mut r).unwrap(), n);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn var_uint_rejects_overlong() {
        let mut r: &[u8] = &[0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(VarUint::decode(&mut r).is_err());
    }
}

use std::io::Write;

use crate::{Decode, Encode};

/// The flag byte of an `ObjectUpdate` packet, marking which field groups
/// follow.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct UpdateFlags(pub u8);

impl UpdateFlags {
    pub const POSITION: u8 = 0x01;
    pub const HP: u8 = 0x02;
    pub const LEVEL: u8 = 0x04;

    pub const fn position(self) -> bool {
        self.0 & Self::POSITION != 0
    }

    pub const fn hp(self) -> bool {
        self.0 & Self::HP != 0
    }

    pub const fn level(self) -> bool {
        self.0 & Self::LEVEL != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn with_position(self) -> Self {
        Self(self.0 | Self::POSITION)
    }

    #[must_use]
    pub const fn with_hp(self) -> Self {
        Self(self.0 | Self::HP)
    }

    #[must_use]
    pub const fn with_level(self) -> Self {
        Self(self.0 | Self::LEVEL)
    }
}

impl Encode for UpdateFlags {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.0.encode(w)
    }
}

impl Decode<'_> for UpdateFlags {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self(u8::decode(r)?))
    }
}

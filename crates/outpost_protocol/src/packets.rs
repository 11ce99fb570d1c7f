//! All of the server's network packets.
//!
//! Names carry a `C2s`/`S2c` suffix for the direction they travel. The
//! implementations of [`Encode`]/[`Decode`] cover the packet body only; the
//! leading id is handled by [`Packet::encode_with_id`] and the frame layer.

use std::io::Write;

use anyhow::{bail, ensure};
use glam::Vec3;

use crate::{Decode, Encode, Packet, UpdateFlags};

macro_rules! packets {
    ($($id:literal = $packet:ident: $side:ident),* $(,)?) => {
        $(
            impl Packet for $packet {
                const ID: u16 = $id;
                const NAME: &'static str = stringify!($packet);
                const SIDE: crate::PacketSide = crate::PacketSide::$side;
            }
        )*
    };
}

packets! {
    1000 = LoginRequestC2s: Serverbound,
    1001 = LoginResponseS2c: Clientbound,
    1004 = ReconnectRequestC2s: Serverbound,
    1005 = ReconnectResponseS2c: Clientbound,
    2003 = MoveRequestC2s: Serverbound,
    3000 = ObjectSpawnS2c: Clientbound,
    3001 = ObjectDespawnS2c: Clientbound,
    3002 = ObjectUpdateS2c: Clientbound,
    3003 = ObjectSnapshotS2c: Clientbound,
    9000 = HeartbeatC2s: Serverbound,
    9999 = ErrorS2c: Clientbound,
}

/// The dispatch priority of a packet id. Higher runs earlier.
pub fn dispatch_priority(packet_id: u16) -> i32 {
    match packet_id {
        // Game actions and object updates preempt everything else.
        2000..=2999 | ObjectUpdateS2c::ID => 100,
        ObjectSpawnS2c::ID
        | ObjectDespawnS2c::ID
        | LoginRequestC2s::ID
        | LoginResponseS2c::ID
        | ReconnectRequestC2s::ID
        | ReconnectResponseS2c::ID => 50,
        HeartbeatC2s::ID => -50,
        _ => 0,
    }
}

/// The type tag carried by spawn and snapshot packets, inferrable from an
/// object id when the full record is absent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum ObjectKind {
    Character = 0,
    Monster = 1,
    Npc = 2,
    Item = 3,
    Projectile = 4,
    Effect = 5,
}

impl Encode for ObjectKind {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        (*self as u8).encode(w)
    }
}

impl Decode<'_> for ObjectKind {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(match u8::decode(r)? {
            0 => Self::Character,
            1 => Self::Monster,
            2 => Self::Npc,
            3 => Self::Item,
            4 => Self::Projectile,
            5 => Self::Effect,
            n => bail!("invalid object kind tag {n}"),
        })
    }
}

/// The full broadcast state of one object, as carried by [`ObjectSpawnS2c`]
/// and repeated inside [`ObjectSnapshotS2c`].
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ObjectState {
    pub id: u32,
    pub kind: ObjectKind,
    pub position: Vec3,
    pub hp: i32,
    pub max_hp: i32,
    pub level: i32,
}

impl Encode for ObjectState {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.id.encode(&mut w)?;
        self.kind.encode(&mut w)?;
        self.position.encode(&mut w)?;
        self.hp.encode(&mut w)?;
        self.max_hp.encode(&mut w)?;
        self.level.encode(w)
    }
}

impl Decode<'_> for ObjectState {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            id: u32::decode(r)?,
            kind: ObjectKind::decode(r)?,
            position: Vec3::decode(r)?,
            hp: i32::decode(r)?,
            max_hp: i32::decode(r)?,
            level: i32::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoginRequestC2s {
    pub username: String,
    pub password: String,
}

impl Encode for LoginRequestC2s {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.username.encode(&mut w)?;
        self.password.encode(w)
    }
}

impl Decode<'_> for LoginRequestC2s {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            username: String::decode(r)?,
            password: String::decode(r)?,
        })
    }
}

/// `token` is empty when the login failed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LoginResponseS2c {
    pub success: bool,
    pub message: String,
    pub token: String,
}

impl Encode for LoginResponseS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.success.encode(&mut w)?;
        self.message.encode(&mut w)?;
        self.token.encode(w)
    }
}

impl Decode<'_> for LoginResponseS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            success: bool::decode(r)?,
            message: String::decode(r)?,
            token: String::decode(r)?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReconnectRequestC2s {
    pub token: String,
    pub username: String,
}

impl Encode for ReconnectRequestC2s {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.token.encode(&mut w)?;
        self.username.encode(w)
    }
}

impl Decode<'_> for ReconnectRequestC2s {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            token: String::decode(r)?,
            username: String::decode(r)?,
        })
    }
}

/// `session_id` is empty when no prior session was adopted.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReconnectResponseS2c {
    pub success: bool,
    pub message: String,
    pub session_id: String,
}

impl Encode for ReconnectResponseS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.success.encode(&mut w)?;
        self.message.encode(&mut w)?;
        self.session_id.encode(w)
    }
}

impl Decode<'_> for ReconnectResponseS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            success: bool::decode(r)?,
            message: String::decode(r)?,
            session_id: String::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct MoveRequestC2s {
    pub target: Vec3,
}

impl Encode for MoveRequestC2s {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.target.encode(w)
    }
}

impl Decode<'_> for MoveRequestC2s {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            target: Vec3::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ObjectSpawnS2c {
    pub object: ObjectState,
}

impl Encode for ObjectSpawnS2c {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.object.encode(w)
    }
}

impl Decode<'_> for ObjectSpawnS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            object: ObjectState::decode(r)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ObjectDespawnS2c {
    pub id: u32,
}

impl Encode for ObjectDespawnS2c {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.id.encode(w)
    }
}

impl Decode<'_> for ObjectDespawnS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            id: u32::decode(r)?,
        })
    }
}

/// A field-level delta. The flag byte is derived from which fields are
/// present, so an encoded update always matches its payload.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ObjectUpdateS2c {
    pub id: u32,
    pub position: Option<Vec3>,
    pub hp: Option<i32>,
    pub level: Option<i32>,
}

impl ObjectUpdateS2c {
    pub fn flags(&self) -> UpdateFlags {
        let mut flags = UpdateFlags::default();
        if self.position.is_some() {
            flags = flags.with_position();
        }
        if self.hp.is_some() {
            flags = flags.with_hp();
        }
        if self.level.is_some() {
            flags = flags.with_level();
        }
        flags
    }
}

impl Encode for ObjectUpdateS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        ensure!(
            !self.flags().is_empty(),
            "refusing to encode an empty object update"
        );

        self.id.encode(&mut w)?;
        self.flags().encode(&mut w)?;

        if let Some(position) = self.position {
            position.encode(&mut w)?;
        }
        if let Some(hp) = self.hp {
            hp.encode(&mut w)?;
        }
        if let Some(level) = self.level {
            level.encode(&mut w)?;
        }

        Ok(())
    }
}

impl Decode<'_> for ObjectUpdateS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        let id = u32::decode(r)?;
        let flags = UpdateFlags::decode(r)?;

        Ok(Self {
            id,
            position: flags.position().then(|| Vec3::decode(r)).transpose()?,
            hp: flags.hp().then(|| i32::decode(r)).transpose()?,
            level: flags.level().then(|| i32::decode(r)).transpose()?,
        })
    }
}

/// The initial view sent on login: every object currently inside the new
/// session's interest area.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ObjectSnapshotS2c {
    pub objects: Vec<ObjectState>,
}

impl Encode for ObjectSnapshotS2c {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        (self.objects.len() as i32).encode(&mut w)?;
        for object in &self.objects {
            object.encode(&mut w)?;
        }
        Ok(())
    }
}

impl Decode<'_> for ObjectSnapshotS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        let count = i32::decode(r)?;
        ensure!(count >= 0, "snapshot count of {count} is negative");

        let mut objects = Vec::with_capacity(cautious_capacity::<ObjectState>(count as usize));
        for _ in 0..count {
            objects.push(ObjectState::decode(r)?);
        }

        Ok(Self { objects })
    }
}

/// Prevents preallocating too much memory in case we get a malicious or
/// invalid sequence length.
fn cautious_capacity<Element>(size_hint: usize) -> usize {
    const MAX_PREALLOC_BYTES: usize = 1024 * 1024;

    if std::mem::size_of::<Element>() == 0 {
        0
    } else {
        size_hint.min(MAX_PREALLOC_BYTES / std::mem::size_of::<Element>())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HeartbeatC2s;

impl Encode for HeartbeatC2s {
    fn encode(&self, _w: impl Write) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Decode<'_> for HeartbeatC2s {
    fn decode(_r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ErrorS2c {
    pub message: String,
}

impl Encode for ErrorS2c {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.message.encode(w)
    }
}

impl Decode<'_> for ErrorS2c {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            message: String::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_flags_follow_payload() {
        let update = ObjectUpdateS2c {
            id: 7,
            position: Some(Vec3::new(1.0, 2.0, 3.0)),
            hp: None,
            level: Some(4),
        };

        let mut buf = vec![];
        update.encode(&mut buf).unwrap();

        // id (4) | flags (1) | position (12) | level (4)
        assert_eq!(buf.len(), 21);
        assert_eq!(buf[4], UpdateFlags::POSITION | UpdateFlags::LEVEL);

        let mut r = &buf[..];
        let back = ObjectUpdateS2c::decode(&mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(back, update);
    }

    #[test]
    fn empty_update_is_refused() {
        let update = ObjectUpdateS2c {
            id: 7,
            position: None,
            hp: None,
            level: None,
        };

        assert!(update.encode(&mut vec![]).is_err());
    }

    #[test]
    fn snapshot_round_trips_byte_for_byte() {
        let snapshot = ObjectSnapshotS2c {
            objects: vec![
                ObjectState {
                    id: 1,
                    kind: ObjectKind::Character,
                    position: Vec3::new(0.5, 0.0, -9.25),
                    hp: 100,
                    max_hp: 100,
                    level: 3,
                },
                ObjectState {
                    id: 10_000,
                    kind: ObjectKind::Monster,
                    position: Vec3::ZERO,
                    hp: 40,
                    max_hp: 40,
                    level: 1,
                },
            ],
        };

        let mut buf = vec![];
        snapshot.encode(&mut buf).unwrap();

        let mut r = &buf[..];
        let back = ObjectSnapshotS2c::decode(&mut r).unwrap();
        assert!(r.is_empty());

        let mut again = vec![];
        back.encode(&mut again).unwrap();
        assert_eq!(buf, again);
    }

    #[test]
    fn negative_snapshot_count_is_rejected() {
        let mut r: &[u8] = &(-1_i32).to_le_bytes();
        assert!(ObjectSnapshotS2c::decode(&mut r).is_err());
    }

    #[test]
    fn priorities_match_the_dispatch_table() {
        assert_eq!(dispatch_priority(MoveRequestC2s::ID), 100);
        assert_eq!(dispatch_priority(ObjectUpdateS2c::ID), 100);
        assert_eq!(dispatch_priority(LoginRequestC2s::ID), 50);
        assert_eq!(dispatch_priority(ObjectSpawnS2c::ID), 50);
        assert_eq!(dispatch_priority(ObjectSnapshotS2c::ID), 0);
        assert_eq!(dispatch_priority(60_000), 0);
        assert_eq!(dispatch_priority(HeartbeatC2s::ID), -50);
    }
}

use glam::Vec3;
use outpost_protocol::packets::{ObjectKind, ObjectState};
use rustc_hash::FxHashMap;

use crate::character::Character;
use crate::grid::SpatialGrid;
use crate::monster::Monster;

/// Character ids are allocated upward from here.
pub const CHARACTER_ID_START: u32 = 1;

/// Monster ids are allocated upward from here. The partition makes the type
/// tag inferrable from an id when the full record is absent.
pub const MONSTER_ID_START: u32 = 10_000;

/// Infers the type tag from an object id's range.
pub fn kind_of_id(id: u32) -> ObjectKind {
    if id < MONSTER_ID_START {
        ObjectKind::Character
    } else {
        ObjectKind::Monster
    }
}

/// What an entity may consult while updating: the authoritative position grid
/// and a point-in-time snapshot of the active characters on the map.
pub struct AiContext<'a> {
    pub grid: &'a SpatialGrid,
    pub characters: &'a FxHashMap<u32, Vec3>,
}

impl AiContext<'_> {
    pub fn character_position(&self, id: u32) -> Option<Vec3> {
        self.characters.get(&id).copied()
    }
}

/// Everything that can live on a map.
#[derive(Clone, Debug)]
pub enum Entity {
    Character(Character),
    Monster(Monster),
}

impl Entity {
    pub fn id(&self) -> u32 {
        match self {
            Self::Character(c) => c.id(),
            Self::Monster(m) => m.id(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Character(_) => ObjectKind::Character,
            Self::Monster(_) => ObjectKind::Monster,
        }
    }

    pub fn position(&self) -> Vec3 {
        match self {
            Self::Character(c) => c.position,
            Self::Monster(m) => m.position,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::Character(c) => c.active,
            Self::Monster(m) => m.active,
        }
    }

    /// Advances the entity by `dt` seconds of simulation time.
    pub fn update(&mut self, dt: f32, ctx: &AiContext) {
        match self {
            Self::Character(c) => c.update(dt),
            Self::Monster(m) => m.update(dt, ctx),
        }
    }

    /// The full broadcast state, as carried by spawn and snapshot packets.
    pub fn object_state(&self) -> ObjectState {
        match self {
            Self::Character(c) => ObjectState {
                id: c.id(),
                kind: ObjectKind::Character,
                position: c.position,
                hp: c.hp,
                max_hp: c.max_hp,
                level: c.level,
            },
            Self::Monster(m) => ObjectState {
                id: m.id(),
                kind: ObjectKind::Monster,
                position: m.position,
                hp: m.hp,
                max_hp: m.max_hp,
                level: m.level,
            },
        }
    }

    pub fn as_character(&self) -> Option<&Character> {
        match self {
            Self::Character(c) => Some(c),
            Self::Monster(_) => None,
        }
    }

    pub fn as_character_mut(&mut self) -> Option<&mut Character> {
        match self {
            Self::Character(c) => Some(c),
            Self::Monster(_) => None,
        }
    }
}

use glam::Vec3;
use outpost_network::SessionId;

use crate::entity::CHARACTER_ID_START;
use crate::pool::PoolObject;

pub const DEFAULT_MOVE_SPEED: f32 = 5.0;
pub const DEFAULT_HP: i32 = 100;

/// How close to a move target counts as arrival.
const ARRIVE_EPSILON: f32 = 0.05;

/// A player avatar.
///
/// Handlers only write *intent* (the move target); the tick loop integrates
/// actual motion, so positions have a single writer.
#[derive(Clone, Debug)]
pub struct Character {
    id: u32,
    pub position: Vec3,
    pub active: bool,
    pub move_speed: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub level: i32,
    pub move_target: Option<Vec3>,
    /// The session currently driving this character. Cleared while parked.
    pub session: Option<SessionId>,
}

impl Character {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Walks toward the move target at `move_speed`, clearing the target on
    /// arrival.
    pub(crate) fn update(&mut self, dt: f32) {
        let Some(target) = self.move_target else {
            return;
        };

        let to_target = target - self.position;
        let distance = to_target.length();
        let step = self.move_speed * dt;

        if distance <= step + ARRIVE_EPSILON {
            self.position = target;
            self.move_target = None;
        } else {
            self.position += to_target / distance * step;
        }
    }
}

impl PoolObject for Character {
    const ID_START: u32 = CHARACTER_ID_START;

    fn create(id: u32, position: Vec3) -> Self {
        Self {
            id,
            position,
            active: true,
            move_speed: DEFAULT_MOVE_SPEED,
            hp: DEFAULT_HP,
            max_hp: DEFAULT_HP,
            level: 1,
            move_target: None,
            session: None,
        }
    }

    fn reset(&mut self, position: Vec3) {
        let id = self.id;
        *self = Self::create(id, position);
    }

    fn id(&self) -> u32 {
        self.id
    }
}

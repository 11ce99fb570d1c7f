use glam::Vec3;
use rand::Rng;

use crate::entity::{AiContext, MONSTER_ID_START};
use crate::pool::PoolObject;

pub const DEFAULT_MOVE_SPEED: f32 = 3.0;
pub const DEFAULT_HP: i32 = 100;
pub const DEFAULT_ATTACK_DAMAGE: i32 = 10;
pub const DEFAULT_ATTACK_RANGE: f32 = 2.0;
pub const DEFAULT_DETECT_RANGE: f32 = 15.0;
pub const DEFAULT_PATROL_RADIUS: f32 = 5.0;

/// Seconds of idling before picking a patrol target.
const IDLE_TO_PATROL_SECS: f32 = 3.0;
/// How often an idle or patrolling monster rescans for characters.
const TARGET_RESCAN_SECS: f32 = 0.3;
/// Arrival threshold for patrol targets.
const PATROL_ARRIVE_DISTANCE: f32 = 0.5;
/// A chase is abandoned past this multiple of the detect range.
const CHASE_LEASH_FACTOR: f32 = 1.5;
/// The rescan query is widened by the same factor so a leashed target is
/// still visible to the scan.
const RESCAN_RANGE_FACTOR: f32 = 1.5;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AiState {
    Idle,
    Patrol,
    Chase,
    Attack,
    Dead,
}

impl AiState {
    /// The update cadence of each state. Attack re-evaluates every tick.
    fn update_interval(self) -> f32 {
        match self {
            Self::Idle => 0.5,
            Self::Patrol => 0.2,
            Self::Chase => 0.1,
            Self::Attack | Self::Dead => 0.0,
        }
    }
}

/// An AI-driven mob.
#[derive(Clone, Debug)]
pub struct Monster {
    id: u32,
    pub position: Vec3,
    pub active: bool,
    pub hp: i32,
    pub max_hp: i32,
    pub level: i32,
    pub move_speed: f32,
    pub attack_damage: i32,
    pub attack_range: f32,
    pub detect_range: f32,
    /// Where the monster was spawned; patrol targets scatter around this.
    pub spawn_anchor: Vec3,
    pub patrols: bool,
    pub patrol_radius: f32,
    state: AiState,
    /// Time spent in the current state.
    state_timer: f32,
    /// Time accumulated toward the state's update cadence.
    update_timer: f32,
    /// Time accumulated toward the next target rescan.
    scan_timer: f32,
    patrol_target: Vec3,
    /// The character currently being chased or attacked.
    pub target: Option<u32>,
}

impl Monster {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> AiState {
        self.state
    }

    fn enter(&mut self, state: AiState) {
        self.state = state;
        self.state_timer = 0.0;
        self.update_timer = 0.0;
        self.scan_timer = 0.0;
    }

    pub(crate) fn update(&mut self, dt: f32, ctx: &AiContext) {
        if !self.active {
            return;
        }

        if self.hp <= 0 {
            self.enter(AiState::Dead);
            self.active = false;
            return;
        }

        self.state_timer += dt;
        self.update_timer += dt;
        self.scan_timer += dt;

        if matches!(self.state, AiState::Idle | AiState::Patrol)
            && self.scan_timer >= TARGET_RESCAN_SECS
        {
            self.scan_timer = 0.0;

            if let Some(target) = self.acquire_target(ctx) {
                self.target = Some(target);
                self.enter(AiState::Chase);
                return;
            }
        }

        if self.update_timer < self.state.update_interval() {
            return;
        }

        // Integrate over the whole accumulated interval so movement speed is
        // independent of the cadence.
        let step_dt = self.update_timer;
        self.update_timer = 0.0;

        match self.state {
            AiState::Idle => {
                if self.patrols && self.state_timer >= IDLE_TO_PATROL_SECS {
                    self.patrol_target = self.pick_patrol_target();
                    self.enter(AiState::Patrol);
                }
            }
            AiState::Patrol => {
                self.step_toward(self.patrol_target, step_dt);

                if self.position.distance(self.patrol_target) < PATROL_ARRIVE_DISTANCE {
                    self.enter(AiState::Idle);
                }
            }
            AiState::Chase => match self.target.and_then(|id| ctx.character_position(id)) {
                Some(target_pos) => {
                    let distance = self.position.distance(target_pos);

                    if distance <= self.attack_range {
                        self.enter(AiState::Attack);
                    } else if distance > self.detect_range * CHASE_LEASH_FACTOR {
                        self.target = None;
                        self.enter(AiState::Idle);
                    } else {
                        self.step_toward(target_pos, step_dt);
                    }
                }
                None => {
                    self.target = None;
                    self.enter(AiState::Idle);
                }
            },
            AiState::Attack => match self.target.and_then(|id| ctx.character_position(id)) {
                Some(target_pos) => {
                    if self.position.distance(target_pos) > self.attack_range {
                        self.enter(AiState::Chase);
                    }
                    // Damage application is an extension point.
                }
                None => {
                    self.target = None;
                    self.enter(AiState::Idle);
                }
            },
            AiState::Dead => {}
        }
    }

    /// The nearest active character within detect range, found through the
    /// grid with the query widened to the leash distance.
    fn acquire_target(&self, ctx: &AiContext) -> Option<u32> {
        let nearby = ctx
            .grid
            .range(self.position, self.detect_range * RESCAN_RANGE_FACTOR);

        nearby
            .into_iter()
            .filter(|id| *id < MONSTER_ID_START)
            .filter_map(|id| {
                let pos = ctx.character_position(id)?;
                let distance = self.position.distance(pos);
                (distance <= self.detect_range).then_some((id, distance))
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(id, _)| id)
    }

    fn pick_patrol_target(&self) -> Vec3 {
        let mut rng = rand::thread_rng();
        let r = self.patrol_radius;

        self.spawn_anchor
            + Vec3::new(rng.gen_range(-r..=r), 0.0, rng.gen_range(-r..=r))
    }

    fn step_toward(&mut self, target: Vec3, dt: f32) {
        let to_target = target - self.position;
        let distance = to_target.length();
        let step = self.move_speed * dt;

        if distance <= step {
            self.position = target;
        } else {
            self.position += to_target / distance * step;
        }
    }
}

impl PoolObject for Monster {
    const ID_START: u32 = MONSTER_ID_START;

    fn create(id: u32, position: Vec3) -> Self {
        Self {
            id,
            position,
            active: true,
            hp: DEFAULT_HP,
            max_hp: DEFAULT_HP,
            level: 1,
            move_speed: DEFAULT_MOVE_SPEED,
            attack_damage: DEFAULT_ATTACK_DAMAGE,
            attack_range: DEFAULT_ATTACK_RANGE,
            detect_range: DEFAULT_DETECT_RANGE,
            spawn_anchor: position,
            patrols: true,
            patrol_radius: DEFAULT_PATROL_RADIUS,
            state: AiState::Idle,
            state_timer: 0.0,
            update_timer: 0.0,
            scan_timer: 0.0,
            patrol_target: position,
            target: None,
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

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::*;
    use crate::grid::SpatialGrid;

    fn context<'a>(grid: &'a SpatialGrid, characters: &'a FxHashMap<u32, Vec3>) -> AiContext<'a> {
        AiContext { grid, characters }
    }

    fn drive(monster: &mut Monster, ctx: &AiContext, seconds: f32) {
        let dt = 0.05;
        let steps = (seconds / dt).round() as usize;
        for _ in 0..steps {
            monster.update(dt, ctx);
        }
    }

    #[test]
    fn idle_monster_starts_patrolling() {
        let grid = SpatialGrid::new(10.0);
        let characters = FxHashMap::default();
        let ctx = context(&grid, &characters);

        let mut m = Monster::create(10_000, Vec3::ZERO);
        drive(&mut m, &ctx, 4.0);

        assert_eq!(m.state(), AiState::Patrol);
        let offset = m.patrol_target - m.spawn_anchor;
        assert!(offset.x.abs() <= DEFAULT_PATROL_RADIUS);
        assert!(offset.z.abs() <= DEFAULT_PATROL_RADIUS);
    }

    #[test]
    fn non_patrolling_monster_stays_idle() {
        let grid = SpatialGrid::new(10.0);
        let characters = FxHashMap::default();
        let ctx = context(&grid, &characters);

        let mut m = Monster::create(10_000, Vec3::ZERO);
        m.patrols = false;
        drive(&mut m, &ctx, 10.0);

        assert_eq!(m.state(), AiState::Idle);
    }

    #[test]
    fn nearby_character_triggers_a_chase() {
        let grid = SpatialGrid::new(10.0);
        let mut characters = FxHashMap::default();

        let char_pos = Vec3::new(10.0, 0.0, 0.0);
        grid.add(1, char_pos);
        characters.insert(1, char_pos);

        let ctx = context(&grid, &characters);

        let mut m = Monster::create(10_000, Vec3::ZERO);
        drive(&mut m, &ctx, 1.0);

        assert_eq!(m.state(), AiState::Chase);
        assert_eq!(m.target, Some(1));

        // The monster closes distance toward the character.
        let before = m.position.distance(char_pos);
        drive(&mut m, &ctx, 1.0);
        assert!(m.position.distance(char_pos) < before);
    }

    #[test]
    fn chase_reaches_attack_and_falls_back() {
        let grid = SpatialGrid::new(10.0);
        let mut characters = FxHashMap::default();

        let char_pos = Vec3::new(5.0, 0.0, 0.0);
        grid.add(1, char_pos);
        characters.insert(1, char_pos);

        let mut m = Monster::create(10_000, Vec3::ZERO);

        {
            let ctx = context(&grid, &characters);
            drive(&mut m, &ctx, 5.0);
            assert_eq!(m.state(), AiState::Attack);
        }

        // The character teleports just out of attack range: back to chasing.
        characters.insert(1, Vec3::new(10.0, 0.0, 0.0));
        {
            let ctx = context(&grid, &characters);
            drive(&mut m, &ctx, 0.5);
            assert_eq!(m.state(), AiState::Chase);
        }
    }

    #[test]
    fn chase_is_leashed_to_the_detect_range() {
        let grid = SpatialGrid::new(10.0);
        let mut characters = FxHashMap::default();

        characters.insert(1, Vec3::new(10.0, 0.0, 0.0));
        grid.add(1, Vec3::new(10.0, 0.0, 0.0));

        let mut m = Monster::create(10_000, Vec3::ZERO);
        {
            let ctx = context(&grid, &characters);
            drive(&mut m, &ctx, 0.5);
            assert_eq!(m.state(), AiState::Chase);
        }

        // The character escapes far beyond 1.5x detect range.
        let far = Vec3::new(100.0, 0.0, 0.0);
        characters.insert(1, far);
        grid.update(1, far);
        {
            let ctx = context(&grid, &characters);
            drive(&mut m, &ctx, 0.5);
            assert_eq!(m.state(), AiState::Idle);
            assert_eq!(m.target, None);
        }
    }

    #[test]
    fn dead_monster_deactivates() {
        let grid = SpatialGrid::new(10.0);
        let characters = FxHashMap::default();
        let ctx = context(&grid, &characters);

        let mut m = Monster::create(10_000, Vec3::ZERO);
        m.hp = 0;
        m.update(0.05, &ctx);

        assert_eq!(m.state(), AiState::Dead);
        assert!(!m.active);
    }
}

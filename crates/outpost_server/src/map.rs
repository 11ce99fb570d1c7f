use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use glam::Vec3;
use outpost_network::SessionId;
use outpost_protocol::packets::ObjectState;
use parking_lot::RwLock;
use rand::Rng;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tracing::info;

use crate::character::Character;
use crate::config::GameSettings;
use crate::descriptor::MapDescriptor;
use crate::entity::{AiContext, Entity};
use crate::grid::SpatialGrid;
use crate::interest::InterestManager;
use crate::monster::Monster;
use crate::pool::ObjectPool;
use crate::tracker::StateTracker;

/// How long an empty map sleeps between character checks.
const IDLE_SLEEP: Duration = Duration::from_secs(1);

/// One independent world: the entity population, its spatial grid, the
/// interest areas of the sessions playing on it, and their broadcast
/// snapshots.
///
/// Invariant: every entity in the map is also present in the spatial grid at
/// its current (x, z) cell. The tick loop is the only writer of entity
/// positions; packet handlers write intent only.
pub struct Map {
    id: u32,
    name: String,
    tick_period: Duration,
    entities: RwLock<FxHashMap<u32, Entity>>,
    grid: SpatialGrid,
    interest: InterestManager,
    tracker: StateTracker,
    characters: ObjectPool<Character>,
    monsters: ObjectPool<Monster>,
    character_count: AtomicUsize,
}

impl Map {
    pub fn new(id: u32, name: impl Into<String>, settings: &GameSettings) -> Self {
        Self {
            id,
            name: name.into(),
            tick_period: settings.tick_period,
            entities: RwLock::new(FxHashMap::default()),
            grid: SpatialGrid::new(settings.cell_size),
            interest: InterestManager::new(),
            tracker: StateTracker::new(),
            characters: ObjectPool::new(settings.character_pool_capacity),
            monsters: ObjectPool::new(settings.monster_pool_capacity),
            character_count: AtomicUsize::new(0),
        }
    }

    /// Builds the map and populates it with the descriptor's monsters.
    pub fn from_descriptor(descriptor: &MapDescriptor, settings: &GameSettings) -> Self {
        let map = Self::new(descriptor.map_id, descriptor.name.clone(), settings);
        let mut rng = rand::thread_rng();

        for spawn in &descriptor.monster_spawns {
            for _ in 0..spawn.count {
                let anchor: Vec3 = spawn.position.into();
                let r = spawn.spawn_radius;
                let position = if r > 0.0 {
                    anchor + Vec3::new(rng.gen_range(-r..=r), 0.0, rng.gen_range(-r..=r))
                } else {
                    anchor
                };

                let mut monster = map.monsters.rent(position);
                monster.spawn_anchor = position;
                monster.patrols = spawn.patrol;
                monster.patrol_radius = spawn.patrol_radius;
                if let Some(hp) = spawn.hp {
                    monster.hp = hp;
                    monster.max_hp = hp;
                }
                if let Some(level) = spawn.level {
                    monster.level = level;
                }
                if let Some(speed) = spawn.move_speed {
                    monster.move_speed = speed;
                }
                if let Some(range) = spawn.detect_range {
                    monster.detect_range = range;
                }
                if let Some(range) = spawn.attack_range {
                    monster.attack_range = range;
                }

                map.insert(Entity::Monster(monster));
            }
        }

        info!(map = %map.name, entities = map.entity_count(), "map loaded");

        map
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn interest(&self) -> &InterestManager {
        &self.interest
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Rents a character from this map's pool. The caller inserts it once its
    /// owning session is wired up.
    pub fn rent_character(&self, position: Vec3) -> Character {
        self.characters.rent(position)
    }

    /// Returns a character whose grace window expired or whose map is being
    /// torn down.
    pub fn return_character(&self, character: Character) {
        self.characters.give_back(character);
    }

    /// Adds an entity, keeping the spatial grid consistent.
    pub fn insert(&self, entity: Entity) {
        let id = entity.id();
        self.grid.add(id, entity.position());

        if matches!(entity, Entity::Character(_)) {
            self.character_count.fetch_add(1, Ordering::Relaxed);
        }

        self.entities.write().insert(id, entity);
    }

    /// Removes an entity and returns it to its pool.
    pub fn remove(&self, id: u32) -> bool {
        match self.take(id) {
            Some(Entity::Character(c)) => {
                self.characters.give_back(c);
                true
            }
            Some(Entity::Monster(m)) => {
                // TODO: schedule a respawn after the descriptor's
                // respawnSeconds instead of retiring the monster for good.
                self.monsters.give_back(m);
                true
            }
            None => false,
        }
    }

    /// Removes an entity *without* pooling it, handing ownership to the
    /// caller. Used to park a disconnected session's character.
    pub fn take(&self, id: u32) -> Option<Entity> {
        let entity = self.entities.write().remove(&id)?;
        self.grid.remove(id);

        if matches!(entity, Entity::Character(_)) {
            self.character_count.fetch_sub(1, Ordering::Relaxed);
        }

        Some(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    pub fn character_count(&self) -> usize {
        self.character_count.load(Ordering::Relaxed)
    }

    pub fn position_of(&self, id: u32) -> Option<Vec3> {
        self.grid.position_of(id)
    }

    pub fn entity_state(&self, id: u32) -> Option<ObjectState> {
        self.entities.read().get(&id).map(Entity::object_state)
    }

    /// The broadcast state of every active entity.
    pub fn all_states(&self) -> Vec<ObjectState> {
        self.entities
            .read()
            .values()
            .filter(|e| e.is_active())
            .map(Entity::object_state)
            .collect()
    }

    /// The broadcast state of every active entity within `radius` of
    /// `center`, optionally excluding one id.
    pub fn states_in_range(
        &self,
        center: Vec3,
        radius: f32,
        exclude: Option<u32>,
    ) -> Vec<ObjectState> {
        let ids = self.grid.range(center, radius);
        let entities = self.entities.read();

        ids.into_iter()
            .filter(|id| Some(*id) != exclude)
            .filter_map(|id| entities.get(&id))
            .filter(|e| e.is_active())
            .map(Entity::object_state)
            .collect()
    }

    /// The ids within `radius` of `center`, straight off the grid.
    pub fn ids_in_range(&self, center: Vec3, radius: f32) -> Vec<u32> {
        self.grid.range(center, radius)
    }

    /// The character owned by a session.
    pub fn character_of_session(&self, sid: SessionId) -> Option<u32> {
        self.entities.read().values().find_map(|e| {
            let c = e.as_character()?;
            (c.session == Some(sid)).then_some(c.id())
        })
    }

    /// Records a character's move intent. Returns `false` for unknown ids.
    pub fn set_move_target(&self, id: u32, target: Vec3) -> bool {
        let mut entities = self.entities.write();

        match entities.get_mut(&id).and_then(Entity::as_character_mut) {
            Some(c) => {
                c.move_target = Some(target);
                true
            }
            None => false,
        }
    }

    /// Rebinds the session that owns a character. Returns `false` for
    /// unknown ids.
    pub fn set_character_session(&self, id: u32, session: Option<SessionId>) -> bool {
        let mut entities = self.entities.write();

        match entities.get_mut(&id).and_then(Entity::as_character_mut) {
            Some(c) => {
                c.session = session;
                true
            }
            None => false,
        }
    }

    /// One simulation step: updates every entity, propagates positions to
    /// the grid, and sweeps out inactive entities. Returns the removed ids.
    pub fn tick(&self, dt: f32) -> Vec<u32> {
        let mut entities = self.entities.write();

        // Monsters chase against a snapshot of character positions from the
        // start of the tick; stale-by-one-tick reads are acceptable here.
        let characters: FxHashMap<u32, Vec3> = entities
            .values()
            .filter_map(|e| {
                let c = e.as_character()?;
                c.active.then_some((c.id(), c.position))
            })
            .collect();

        let ctx = AiContext {
            grid: &self.grid,
            characters: &characters,
        };

        let mut removed = vec![];

        for (&id, entity) in entities.iter_mut() {
            let old_pos = entity.position();
            entity.update(dt, &ctx);

            let new_pos = entity.position();
            if new_pos != old_pos {
                self.grid.update(id, new_pos);
            }

            if !entity.is_active() {
                removed.push(id);
            }
        }

        for &id in &removed {
            let Some(entity) = entities.remove(&id) else {
                continue;
            };
            self.grid.remove(id);

            match entity {
                Entity::Character(c) => {
                    self.character_count.fetch_sub(1, Ordering::Relaxed);
                    self.characters.give_back(c);
                }
                Entity::Monster(m) => {
                    // TODO: schedule a respawn after the descriptor's
                    // respawnSeconds instead of retiring the monster for good.
                    self.monsters.give_back(m);
                }
            }
        }

        removed
    }
}

/// Hook invoked after every simulation step, while the tick task holds no
/// locks. The game service uses it to run the delta broadcast pass.
#[async_trait]
pub trait TickObserver: Send + Sync + 'static {
    async fn after_tick(&self, map: &Arc<Map>, removed: Vec<u32>);
}

/// Spawns the map's tick task. The loop holds the configured rate, with an
/// idle fast-path while the map has no characters.
pub fn spawn_tick_loop(map: Arc<Map>, observer: Arc<dyn TickObserver>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = map.tick_period();
        let dt = period.as_secs_f32();

        loop {
            if map.character_count() == 0 {
                tokio::time::sleep(IDLE_SLEEP).await;
                continue;
            }

            let start = Instant::now();

            let removed = map.tick(dt);
            observer.after_tick(&map, removed).await;

            tokio::time::sleep(period.saturating_sub(start.elapsed())).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellPos;

    fn test_map() -> Map {
        Map::new(1, "proving-grounds", &GameSettings::default())
    }

    #[test]
    fn entities_stay_in_their_grid_cell() {
        let map = test_map();

        let mut c = map.rent_character(Vec3::new(15.0, 0.0, -5.0));
        c.move_target = Some(Vec3::new(35.0, 0.0, -5.0));
        let id = c.id();
        map.insert(Entity::Character(c));

        // Walk for a while; the grid must agree with the entity position at
        // every step.
        for _ in 0..100 {
            map.tick(0.05);

            let state = map.entity_state(id).unwrap();
            let cell = map.grid().cell_of(id).unwrap();
            assert_eq!(
                cell,
                CellPos::from_pos(state.position, map.grid().cell_size())
            );
        }

        assert_eq!(
            map.entity_state(id).unwrap().position,
            Vec3::new(35.0, 0.0, -5.0)
        );
    }

    #[test]
    fn inactive_entities_are_swept_and_pooled() {
        let descriptor = MapDescriptor::default_map();
        let map = Map::from_descriptor(&descriptor, &GameSettings::default());
        assert_eq!(map.entity_count(), 10);

        // Kill one monster through the public surface: find it, zero its HP.
        let victim = map.all_states()[0].id;
        {
            let mut entities = map.entities.write();
            if let Some(Entity::Monster(m)) = entities.get_mut(&victim) {
                m.hp = 0;
            }
        }

        let removed = map.tick(0.05);
        assert_eq!(removed, [victim]);
        assert_eq!(map.entity_count(), 9);
        assert_eq!(map.position_of(victim), None);
    }

    #[test]
    fn take_preserves_the_character_for_parking() {
        let map = test_map();

        let sid = uuid::Uuid::new_v4();
        let mut c = map.rent_character(Vec3::new(20.0, 0.0, 20.0));
        c.session = Some(sid);
        let id = c.id();
        map.insert(Entity::Character(c));
        assert_eq!(map.character_count(), 1);
        assert_eq!(map.character_of_session(sid), Some(id));

        let taken = map.take(id).unwrap();
        assert_eq!(taken.position(), Vec3::new(20.0, 0.0, 20.0));
        assert_eq!(map.character_count(), 0);
        assert_eq!(map.position_of(id), None);

        // Re-inserting restores it at the same spot.
        map.insert(taken);
        assert_eq!(
            map.entity_state(id).unwrap().position,
            Vec3::new(20.0, 0.0, 20.0)
        );
    }
}

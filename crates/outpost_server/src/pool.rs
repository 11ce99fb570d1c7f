use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;
use parking_lot::Mutex;

/// An entity that can be rented from an [`ObjectPool`].
pub trait PoolObject: Send {
    /// The bottom of this type's id range. Ids are allocated upward from
    /// here and never reused across live instances.
    const ID_START: u32;

    fn create(id: u32, position: Vec3) -> Self;

    /// Returns every field except the id to its default.
    fn reset(&mut self, position: Vec3);

    fn id(&self) -> u32;
}

/// A free list of reusable entity instances.
///
/// Renting either recycles a returned instance or creates a fresh one with a
/// newly allocated id; either way the caller gets fully initialized state.
/// The pool is an optimization only: an instance handed out by `rent` is
/// owned by the caller until returned.
pub struct ObjectPool<T> {
    free: Mutex<Vec<T>>,
    next_id: AtomicU32,
    capacity: usize,
}

impl<T: PoolObject> ObjectPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(T::ID_START),
            capacity,
        }
    }

    /// Hands out an initialized instance positioned at `position`.
    pub fn rent(&self, position: Vec3) -> T {
        if let Some(mut obj) = self.free.lock().pop() {
            obj.reset(position);
            return obj;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        T::create(id, position)
    }

    /// Takes an instance back. Dropped instead of retained when the pool is
    /// at capacity; returning an id that is already in the free list is a
    /// no-op.
    pub fn give_back(&self, mut obj: T) {
        let mut free = self.free.lock();

        if free.len() >= self.capacity || free.iter().any(|o| o.id() == obj.id()) {
            return;
        }

        obj.reset(Vec3::ZERO);
        free.push(obj);
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Character;
    use crate::monster::Monster;

    #[test]
    fn ids_are_unique_and_partitioned_by_type() {
        let characters = ObjectPool::<Character>::new(16);
        let monsters = ObjectPool::<Monster>::new(16);

        let a = characters.rent(Vec3::ZERO);
        let b = characters.rent(Vec3::ZERO);
        let m = monsters.rent(Vec3::ZERO);

        assert_eq!(a.id(), Character::ID_START);
        assert_ne!(a.id(), b.id());
        assert_eq!(m.id(), Monster::ID_START);
    }

    #[test]
    fn returned_instances_are_recycled_with_fresh_state() {
        let pool = ObjectPool::<Character>::new(16);

        let mut c = pool.rent(Vec3::new(5.0, 0.0, 5.0));
        let id = c.id();
        c.hp = 1;
        c.move_target = Some(Vec3::ONE);

        pool.give_back(c);
        assert_eq!(pool.free_count(), 1);

        let again = pool.rent(Vec3::ZERO);
        assert_eq!(again.id(), id);
        assert_eq!(again.position, Vec3::ZERO);
        assert_eq!(again.hp, again.max_hp);
        assert!(again.move_target.is_none());
    }

    #[test]
    fn double_return_is_a_no_op() {
        let pool = ObjectPool::<Character>::new(16);

        let c = pool.rent(Vec3::ZERO);
        let clone = c.clone();

        pool.give_back(c);
        pool.give_back(clone);

        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn capacity_bounds_the_free_list() {
        let pool = ObjectPool::<Character>::new(1);

        let a = pool.rent(Vec3::ZERO);
        let b = pool.rent(Vec3::ZERO);

        pool.give_back(a);
        pool.give_back(b);

        assert_eq!(pool.free_count(), 1);
    }
}
